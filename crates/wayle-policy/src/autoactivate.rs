//! Component C: auto-activation decider (spec §4.C).

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::collaborators::{ManagerHandle, SettingsStoreHandle};
use crate::ids::DeviceId;
use crate::model::{ActivationType, DeviceHandle, ProfileSnapshot, Subject};

/// Runs the decider for exactly one device: assume-probe first, then the
/// sorted-candidate scan. No-op if the device already has an active
/// request. Activation failures are logged and discarded (spec §4.C).
#[instrument(skip(device, settings, manager), fields(device = %device.id()))]
pub async fn decide_and_activate(
    device: &Arc<dyn DeviceHandle>,
    settings: &Arc<dyn SettingsStoreHandle>,
    manager: &Arc<dyn ManagerHandle>,
) {
    if device.has_active_request() {
        debug!("device already has an active request, skipping");
        return;
    }

    if let Some((profile, specific_object)) = assume_probe(device, settings, manager).await {
        activate(manager, &profile, specific_object, device.id(), ActivationType::Assume).await;
        return;
    }

    let Some((profile, specific_object)) = pick_candidate(device, settings).await else {
        debug!("no activatable profile found for device");
        return;
    };

    activate(manager, &profile, specific_object, device.id(), ActivationType::Full).await;
}

async fn assume_probe(
    device: &Arc<dyn DeviceHandle>,
    settings: &Arc<dyn SettingsStoreHandle>,
    manager: &Arc<dyn ManagerHandle>,
) -> Option<(crate::ids::ProfileUuid, Option<String>)> {
    let uuid = device.consume_assume_hint().await?;

    let profile = settings.profile(&uuid).await?;

    let bound_elsewhere = manager
        .connection_device(&uuid)
        .is_some_and(|bound| bound != device.id());
    if bound_elsewhere {
        return None;
    }

    if !device.profile_available_for_user_request(&uuid).await {
        return None;
    }

    if !device.link_exists() {
        return None;
    }

    let link_topology_matches = if profile.slave_linkage.is_some() {
        device.master_index().is_some()
    } else {
        device.link_up() && device.master_index().is_none()
    };
    if !link_topology_matches {
        return None;
    }

    let specific_object = device.device_permits(&uuid).await.flatten();
    Some((uuid, specific_object))
}

async fn pick_candidate(
    device: &Arc<dyn DeviceHandle>,
    settings: &Arc<dyn SettingsStoreHandle>,
) -> Option<(crate::ids::ProfileUuid, Option<String>)> {
    let mut candidates: Vec<ProfileSnapshot> = settings.profiles().await;
    candidates.sort_by(|a, b| {
        b.autoconnect_priority
            .cmp(&a.autoconnect_priority)
            .then(b.last_connect_timestamp.cmp(&a.last_connect_timestamp))
    });

    for profile in candidates {
        if !profile.can_autoconnect() {
            continue;
        }

        if let Some(specific_object) = device.device_permits(&profile.uuid).await {
            return Some((profile.uuid, specific_object));
        }
    }

    None
}

async fn activate(
    manager: &Arc<dyn ManagerHandle>,
    profile: &crate::ids::ProfileUuid,
    specific_object: Option<String>,
    device: DeviceId,
    activation_type: ActivationType,
) {
    match manager
        .activate(
            profile,
            specific_object,
            Some(device),
            Subject::Internal,
            activation_type,
        )
        .await
    {
        Ok(session) => {
            info!(%session, %profile, ?activation_type, "auto-activation requested");
        }
        Err(reason) => {
            warn!(%profile, %device, %reason, "auto-activation request failed, will retry on a future event");
        }
    }
}
