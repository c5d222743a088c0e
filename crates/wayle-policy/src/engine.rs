//! The policy engine: wires the eight components together behind the public
//! event-handler surface a host calls into (spec §6).

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::autoactivate;
use crate::collaborators::{
    BoxTask, DefaultRouteManagerHandle, DispatcherHandle, DnsManagerHandle, FirewallManagerHandle,
    KernelHandle, ManagerHandle, ReverseDnsResolverHandle, SchedulerHandle, SettingsStoreHandle,
};
use crate::default_route::DefaultArbitration;
use crate::dns_driver::DnsUpdateGuard;
use crate::family::IpFamily;
use crate::hostname::HostnamePipeline;
use crate::ids::{DeviceId, ProfileUuid, SessionId};
use crate::model::{ActiveSessionHandle, DeviceHandle, DeviceState, DeviceStateReason};
use crate::pending::PendingActions;
use crate::registry::DeviceRegistry;
use crate::retry::RetryScheduler;
use crate::secondaries::{SecondaryProgress, SecondaryTracker};

/// The reactive network policy engine (spec §1-§9).
///
/// Holds no I/O handles of its own; every effect is delegated to one of the
/// injected collaborators passed to [`PolicyEngine::new`].
pub struct PolicyEngine {
    manager: Arc<dyn ManagerHandle>,
    settings: Arc<dyn SettingsStoreHandle>,
    dns_manager: Arc<dyn DnsManagerHandle>,
    firewall_manager: Arc<dyn FirewallManagerHandle>,
    dispatcher: Arc<dyn DispatcherHandle>,
    kernel: Arc<dyn KernelHandle>,
    resolver: Arc<dyn ReverseDnsResolverHandle>,
    scheduler: Arc<dyn SchedulerHandle>,
    route_v4: Arc<dyn DefaultRouteManagerHandle>,
    route_v6: Arc<dyn DefaultRouteManagerHandle>,

    registry: DeviceRegistry,
    pending: PendingActions,
    retry: RetryScheduler,
    arb_v4: DefaultArbitration,
    arb_v6: DefaultArbitration,
    secondaries: SecondaryTracker,
    hostname: Arc<HostnamePipeline>,
}

impl PolicyEngine {
    /// Constructs the engine from its injected collaborators (spec §6,
    /// §12). `original_hostname` is the kernel hostname observed at
    /// construction time, feeding rung 3 of the hostname ladder.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        manager: Arc<dyn ManagerHandle>,
        settings: Arc<dyn SettingsStoreHandle>,
        dns_manager: Arc<dyn DnsManagerHandle>,
        firewall_manager: Arc<dyn FirewallManagerHandle>,
        dispatcher: Arc<dyn DispatcherHandle>,
        kernel: Arc<dyn KernelHandle>,
        resolver: Arc<dyn ReverseDnsResolverHandle>,
        scheduler: Arc<dyn SchedulerHandle>,
        route_v4: Arc<dyn DefaultRouteManagerHandle>,
        route_v6: Arc<dyn DefaultRouteManagerHandle>,
        original_hostname: Option<String>,
    ) -> Self {
        if let Some(name) = original_hostname.clone() {
            let dns_manager = Arc::clone(&dns_manager);
            tokio::spawn(async move {
                dns_manager.set_initial_hostname(&name).await;
            });
        }

        Self {
            manager,
            settings,
            dns_manager,
            firewall_manager,
            dispatcher,
            kernel,
            resolver,
            scheduler,
            route_v4,
            route_v6,
            registry: DeviceRegistry::new(),
            pending: PendingActions::new(),
            retry: RetryScheduler::new(),
            arb_v4: DefaultArbitration::new(IpFamily::V4),
            arb_v6: DefaultArbitration::new(IpFamily::V6),
            secondaries: SecondaryTracker::new(),
            hostname: Arc::new(HostnamePipeline::new(original_hostname)),
        }
    }

    /// Tears the engine down (spec §14): cancels every pending per-device
    /// task and any in-flight reverse-DNS lookup.
    pub fn dispose(&self) {
        for device in self.registry_snapshot() {
            self.pending.clear(device);
        }
        self.hostname.cancel_pending_lookup();
    }

    fn registry_snapshot(&self) -> Vec<DeviceId> {
        self.manager
            .devices()
            .iter()
            .map(|d| d.id())
            .filter(|id| self.registry.is_registered(*id))
            .collect()
    }

    /// The v4 default-device property.
    #[must_use]
    pub fn default_v4_device(&self) -> Option<DeviceId> {
        self.arb_v4.default_device().get()
    }

    /// The v6 default-device property.
    #[must_use]
    pub fn default_v6_device(&self) -> Option<DeviceId> {
        self.arb_v6.default_device().get()
    }

    /// The v4 activating-device property.
    #[must_use]
    pub fn activating_v4_device(&self) -> Option<DeviceId> {
        self.arb_v4.activating_device().get()
    }

    /// The v6 activating-device property.
    #[must_use]
    pub fn activating_v6_device(&self) -> Option<DeviceId> {
        self.arb_v6.activating_device().get()
    }

    /// Explicit operator-triggered activation (spec §12), bypassing the
    /// auto-activation decider: a host binary calls this directly (e.g. from
    /// a CLI or UI "connect" action) rather than waiting for the engine to
    /// pick a profile on its own. Unlike auto-activation, failure is
    /// reported to the caller instead of being dropped.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UnknownProfile`] if `profile` isn't in the
    /// settings store, or [`crate::Error::ActivationFailed`] if the
    /// manager's `activate` call itself fails.
    #[instrument(skip(self))]
    pub async fn activate_now(
        &self,
        profile: &ProfileUuid,
        device: Option<DeviceId>,
    ) -> crate::Result<SessionId> {
        if self.settings.profile(profile).await.is_none() {
            return Err(crate::Error::UnknownProfile(profile.clone()));
        }

        self.manager
            .activate(
                profile,
                None,
                device,
                crate::model::Subject::User,
                crate::model::ActivationType::Full,
            )
            .await
            .map_err(|reason| crate::Error::ActivationFailed {
                profile: profile.clone(),
                device,
                reason,
            })
    }

    /// *device-added* (spec §6): registers the device (component A) and
    /// requests an auto-activation decision.
    #[instrument(skip(self, device), fields(device = %device.id()))]
    pub async fn on_device_added(&self, device: &Arc<dyn DeviceHandle>) {
        self.registry.register(device.id());
        self.schedule_auto_activate(device);
        self.recompute_arbitration().await;
    }

    /// *device-removed* (spec §6): unregisters and clears any pending entry.
    pub async fn on_device_removed(&self, device: DeviceId) {
        self.registry.unregister(device);
        self.pending.clear(device);
        self.recompute_arbitration().await;
    }

    /// *recheck-auto-activate* (spec §14 supplemented behavior): handled
    /// identically to a fresh trigger for the device.
    pub fn on_recheck_auto_activate(&self, device: &Arc<dyn DeviceHandle>) {
        if !self.registry.is_registered(device.id()) {
            return;
        }
        self.schedule_auto_activate(device);
    }

    /// *autoconnect-permission-changed* on a device.
    pub fn on_autoconnect_permission_changed(&self, device: &Arc<dyn DeviceHandle>) {
        if !self.registry.is_registered(device.id()) {
            return;
        }
        self.schedule_auto_activate(device);
    }

    fn schedule_auto_activate(&self, device: &Arc<dyn DeviceHandle>) {
        if self.manager.is_sleeping() {
            debug!("manager is sleeping, not scheduling auto-activation");
            return;
        }
        if device.state() == DeviceState::Unmanaged {
            debug!(device = %device.id(), "device is disabled/unmanaged, not scheduling auto-activation");
            return;
        }
        if !device.autoconnect_permitted() {
            return;
        }
        if device.has_active_request() {
            return;
        }

        let device_id = device.id();
        let device = Arc::clone(device);
        let settings = Arc::clone(&self.settings);
        let manager = Arc::clone(&self.manager);

        let scheduled = self.pending.schedule(device_id, || {
            device.set_autoactivate_pending(true);
            let task: BoxTask = Box::pin(async move {
                autoactivate::decide_and_activate(&device, &settings, &manager).await;
                device.set_autoactivate_pending(false);
            });
            self.scheduler.schedule_idle(task)
        });

        if !scheduled {
            debug!(device = %device_id, "auto-activation already pending for this device");
        }
    }

    /// *state-changed(new, old, reason)* on a device (spec §4.D, §4.G).
    #[instrument(skip(self, device, profile, base_session), fields(device = %device.id(), ?old, ?new))]
    pub async fn on_device_state_changed(
        &self,
        device: &Arc<dyn DeviceHandle>,
        old: DeviceState,
        new: DeviceState,
        reason: DeviceStateReason,
        profile: Option<&ProfileUuid>,
        base_session: Option<&Arc<dyn ActiveSessionHandle>>,
    ) {
        if !self.registry.is_registered(device.id()) {
            return;
        }
        self.pending.clear(device.id());

        if new == DeviceState::Failed
            && matches!(
                old,
                DeviceState::Prepare
                    | DeviceState::IpConfig
                    | DeviceState::Secondaries
                    | DeviceState::Activated
            )
        {
            if let Some(profile) = profile {
                self.retry
                    .on_device_failed(profile, reason, &self.settings, &self.scheduler, || {})
                    .await;
            }
        } else if new == DeviceState::Activated
            && let Some(profile) = profile
        {
            self.retry.on_device_activated(profile, &self.settings).await;
        } else if new == DeviceState::IpConfig
            && let Some(profile) = profile
        {
            self.retry.on_device_ip_config(profile, &self.settings).await;
        }

        if new == DeviceState::Secondaries
            && let (Some(profile_uuid), Some(base_session)) = (profile, base_session)
            && let Some(snapshot) = self.settings.profile(profile_uuid).await
            && !snapshot.secondary_uuids.is_empty()
        {
            self.secondaries
                .launch(device.id(), base_session, &snapshot, &self.settings, &self.manager)
                .await;
        }

        self.firewall_manager.update_firewall_zone(device.id()).await;
        self.recompute_arbitration().await;
    }

    /// *ip4-changed* / *ip6-changed* on a device (spec §4.E, §4.H).
    pub async fn on_device_ip_changed(&self, device: &Arc<dyn DeviceHandle>) {
        if !self.registry.is_registered(device.id()) {
            return;
        }
        self.recompute_arbitration().await;
    }

    /// A secondary session's own `state-changed` (spec §4.G).
    pub async fn on_secondary_session_state_changed(
        &self,
        base_device: DeviceId,
        secondary_session: SessionId,
        new_state: crate::model::SessionState,
        base_session: Option<&Arc<dyn ActiveSessionHandle>>,
    ) {
        match new_state {
            crate::model::SessionState::Activated
                if self.secondaries.on_secondary_activated(base_device, secondary_session)
                    == SecondaryProgress::Promote =>
            {
                debug!(base = %base_device, "all secondaries resolved, base promotes to activated");
            }
            crate::model::SessionState::Deactivated => {
                if self.secondaries.on_secondary_deactivated(base_device, secondary_session)
                    && let Some(base_session) = base_session
                {
                    let _ = self
                        .manager
                        .deactivate(base_session.id(), crate::collaborators::DeactivateReason::SecondaryConnectionFailed)
                        .await;
                }
            }
            _ => {}
        }
    }

    /// A VPN session's *internal-retry-after-failure* (spec §4.G).
    pub async fn on_vpn_retry_after_failure(&self, vpn_session: &Arc<dyn ActiveSessionHandle>) {
        SecondaryTracker::on_vpn_retry_after_failure(vpn_session, &self.manager).await;
    }

    /// A secret agent registered (spec §4.D).
    pub async fn on_secret_agent_registered(&self) {
        if self.retry.on_secret_agent_registered(&self.settings).await {
            self.schedule_activate_all();
        }
    }

    /// Manager entered *sleeping* or *networking-disabled* (spec §4.D).
    pub async fn on_sleeping_or_networking_disabled(&self) {
        self.retry.on_sleeping_or_networking_disabled(&self.settings).await;
        self.schedule_activate_all();
    }

    /// A profile was updated by the user (spec §4.D).
    pub async fn on_profile_updated_by_user(&self, profile: &ProfileUuid) {
        self.retry.on_profile_updated_by_user(profile, &self.settings).await;
    }

    fn schedule_activate_all(&self) {
        for device in self.manager.devices() {
            self.schedule_auto_activate(&device);
        }
    }

    /// *config-changed* on the DNS manager (spec §4.H: invalidates an
    /// in-flight reverse lookup).
    pub fn on_dns_config_changed(&self) {
        self.recompute_hostname();
    }

    /// The manager's *hostname* property changed (spec §4.H rung 1).
    pub fn on_configured_hostname_changed(&self) {
        self.recompute_hostname();
    }

    async fn recompute_arbitration(&self) {
        let devices = self.manager.devices();
        let sessions = self.manager.active_sessions();

        let chosen_v4 = self.arb_v4.routing_update(&devices, &sessions, self.route_v4.as_ref());
        let chosen_v6 = self.arb_v6.routing_update(&devices, &sessions, self.route_v6.as_ref());
        self.arb_v4.activating_update(&devices, &sessions, self.route_v4.as_ref());
        self.arb_v6.activating_update(&devices, &sessions, self.route_v6.as_ref());

        let guard = DnsUpdateGuard::begin(Arc::clone(&self.dns_manager), "default-route").await;
        self.arb_v4
            .dns_update(chosen_v4, &devices, &sessions, &self.dns_manager)
            .await;
        self.arb_v6
            .dns_update(chosen_v6, &devices, &sessions, &self.dns_manager)
            .await;
        guard.finish().await;

        self.recompute_hostname();
    }

    /// *carrier-up* on a device (spec §4.D): resets retry counters only for
    /// profiles this device reports as compatible.
    pub async fn on_carrier_up(&self, device: &Arc<dyn DeviceHandle>) {
        if !self.registry.is_registered(device.id()) {
            return;
        }
        let mut compatible = Vec::new();
        for profile in self.settings.profiles().await {
            if device.device_permits(&profile.uuid).await.is_some() {
                compatible.push(profile.uuid);
            }
        }
        self.retry.on_carrier_up(&compatible, &self.settings).await;
    }

    fn recompute_hostname(&self) {
        let devices = self.manager.devices();
        let best_v4 = self
            .default_v4_device()
            .and_then(|id| devices.iter().find(|d| d.id() == id).cloned());
        let best_v6 = self
            .default_v6_device()
            .and_then(|id| devices.iter().find(|d| d.id() == id).cloned());

        self.hostname.recompute(
            self.manager.configured_hostname(),
            best_v4,
            best_v6,
            Arc::clone(&self.settings),
            Arc::clone(&self.dns_manager),
            Arc::clone(&self.kernel),
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.resolver),
            Arc::clone(&self.scheduler),
        );
    }
}
