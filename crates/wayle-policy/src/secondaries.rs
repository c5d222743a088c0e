//! Component G: secondary-activation tracker (spec §4.G).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;

use tracing::{info, instrument, warn};

use crate::collaborators::{DeactivateReason, ManagerHandle, SettingsStoreHandle};
use crate::ids::{DeviceId, SessionId};
use crate::model::{ActivationType, ActiveSessionHandle, ProfileSnapshot};

/// Outcome of a secondary session's `activated` transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecondaryProgress {
    /// The base's secondary set is now empty; promote it to `activated`.
    Promote,
    /// Other secondaries are still outstanding.
    StillPending,
    /// This base device wasn't being tracked (already resolved, or never
    /// entered `secondaries`).
    NotTracked,
}

/// Per-base-device bookkeeping: the set of launched session ids still
/// unresolved (spec §3: "invariant: the set is non-empty while the entry
/// exists").
struct Entry {
    pending: HashSet<SessionId>,
}

/// Tracks in-flight secondary (VPN) activations per base device.
#[derive(Default)]
pub struct SecondaryTracker {
    entries: Mutex<HashMap<DeviceId, Entry>>,
}

impl SecondaryTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `base_device` currently has unresolved secondaries.
    #[must_use]
    pub fn is_tracking(&self, base_device: DeviceId) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains_key(&base_device)
    }

    /// Launches every secondary declared by `profile`, in declared order
    /// (spec §4.G). On a precondition violation (missing or non-VPN
    /// secondary, or an activation failure) the whole batch is aborted:
    /// sessions already launched are deactivated and the base is driven to
    /// `failed(secondary-connection-failed)` via `manager.deactivate` on the
    /// base session.
    #[instrument(skip(self, base_session, settings, manager), fields(base = %base_device))]
    pub async fn launch(
        &self,
        base_device: DeviceId,
        base_session: &Arc<dyn ActiveSessionHandle>,
        profile: &ProfileSnapshot,
        settings: &Arc<dyn SettingsStoreHandle>,
        manager: &Arc<dyn ManagerHandle>,
    ) -> bool {
        let subject = base_session.subject();
        let mut launched = Vec::new();

        for uuid in &profile.secondary_uuids {
            let secondary = settings.profile(uuid).await;
            let Some(secondary) = secondary.filter(|p| p.is_vpn) else {
                warn!(%uuid, "declared secondary missing or not a vpn, aborting batch");
                self.abort(base_session, &launched, manager).await;
                return false;
            };

            match manager
                .activate(&secondary.uuid, None, None, subject, ActivationType::Full)
                .await
            {
                Ok(session) => launched.push(session),
                Err(reason) => {
                    warn!(%uuid, %reason, "secondary activation failed, aborting batch");
                    self.abort(base_session, &launched, manager).await;
                    return false;
                }
            }
        }

        if launched.is_empty() {
            return true;
        }

        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(
                base_device,
                Entry {
                    pending: launched.into_iter().collect(),
                },
            );
        true
    }

    async fn abort(
        &self,
        base_session: &Arc<dyn ActiveSessionHandle>,
        launched: &[SessionId],
        manager: &Arc<dyn ManagerHandle>,
    ) {
        for session in launched {
            let _ = manager.deactivate(*session, DeactivateReason::Other).await;
        }
        let _ = manager
            .deactivate(base_session.id(), DeactivateReason::SecondaryConnectionFailed)
            .await;
    }

    /// A secondary session entered `activated` (spec §4.G).
    pub fn on_secondary_activated(&self, base_device: DeviceId, secondary: SessionId) -> SecondaryProgress {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let Some(entry) = entries.get_mut(&base_device) else {
            return SecondaryProgress::NotTracked;
        };

        entry.pending.remove(&secondary);
        if entry.pending.is_empty() {
            entries.remove(&base_device);
            info!(base = %base_device, "all secondaries activated, promoting base");
            SecondaryProgress::Promote
        } else {
            SecondaryProgress::StillPending
        }
    }

    /// A secondary session entered `deactivated` (spec §4.G): the entire
    /// base entry is discarded and the base should fail, regardless of which
    /// other secondaries were still pending.
    pub fn on_secondary_deactivated(&self, base_device: DeviceId, secondary: SessionId) -> bool {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        match entries.get(&base_device) {
            Some(entry) if entry.pending.contains(&secondary) => {
                entries.remove(&base_device);
                true
            }
            _ => false,
        }
    }

    /// A VPN's internal retry-after-failure signal (spec §4.G): re-activates
    /// that profile with no device override, using the VPN's own subject.
    pub async fn on_vpn_retry_after_failure(
        vpn_session: &Arc<dyn ActiveSessionHandle>,
        manager: &Arc<dyn ManagerHandle>,
    ) {
        let profile = vpn_session.profile_uuid();
        let subject = vpn_session.subject();
        if let Err(reason) = manager
            .activate(&profile, None, None, subject, ActivationType::Full)
            .await
        {
            warn!(%profile, %reason, "vpn retry-after-failure activation failed");
        }
    }
}
