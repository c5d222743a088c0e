//! In-memory fakes for the collaborator traits, shared by every component's
//! and the engine's test modules (spec ambient-stack §13).

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::collaborators::{
    BoxTask, DeactivateReason, DispatcherHandle, DnsManagerHandle, DnsPriorityTag,
    FirewallManagerHandle, HostnameCompletion, KernelHandle, ManagerHandle,
    ReverseDnsResolverHandle, SchedulerHandle, SettingsStoreHandle, TaskHandle,
};
use crate::family::IpFamily;
use crate::ids::{DeviceId, ProfileUuid, SessionId};
use crate::model::{
    ActivationType, ActiveSessionHandle, AutoconnectBlockedReason, DeviceHandle, DeviceState,
    Dhcp4ConfigSnapshot, Dhcp6ConfigSnapshot, Ip4ConfigSnapshot, Ip6ConfigSnapshot,
    ProfileSnapshot, SessionState, Subject, VpnExtras,
};

/// A fully test-controllable [`DeviceHandle`].
pub struct FakeDevice {
    pub id: DeviceId,
    pub interface: String,
    pub kernel_index: u32,
    pub state: Mutex<DeviceState>,
    pub autoconnect_permitted: Mutex<bool>,
    pub software: bool,
    pub master_index: Mutex<Option<u32>>,
    pub link_up: Mutex<bool>,
    pub link_exists: Mutex<bool>,
    pub has_active_request: Mutex<bool>,
    pub assume_hint: Mutex<Option<ProfileUuid>>,
    pub permits: Mutex<HashMap<ProfileUuid, Option<String>>>,
    pub available_for_user_request: Mutex<std::collections::HashSet<ProfileUuid>>,
    pub ip4: Mutex<Option<Ip4ConfigSnapshot>>,
    pub ip6: Mutex<Option<Ip6ConfigSnapshot>>,
    pub dhcp4: Mutex<Option<Dhcp4ConfigSnapshot>>,
    pub dhcp6: Mutex<Option<Dhcp6ConfigSnapshot>>,
    pub autoactivate_pending: Mutex<bool>,
}

impl FakeDevice {
    #[must_use]
    pub fn new(id: u64, interface: &str) -> Arc<Self> {
        Arc::new(Self {
            id: DeviceId(id),
            interface: interface.to_string(),
            kernel_index: id as u32,
            state: Mutex::new(DeviceState::Disconnected),
            autoconnect_permitted: Mutex::new(true),
            software: false,
            master_index: Mutex::new(None),
            link_up: Mutex::new(true),
            link_exists: Mutex::new(true),
            has_active_request: Mutex::new(false),
            assume_hint: Mutex::new(None),
            permits: Mutex::new(HashMap::new()),
            available_for_user_request: Mutex::new(std::collections::HashSet::new()),
            ip4: Mutex::new(None),
            ip6: Mutex::new(None),
            dhcp4: Mutex::new(None),
            dhcp6: Mutex::new(None),
            autoactivate_pending: Mutex::new(false),
        })
    }

    pub fn set_state(&self, state: DeviceState) {
        *self.state.lock().unwrap() = state;
    }

    pub fn allow_profile(self: &Arc<Self>, profile: &ProfileUuid, specific_object: Option<String>) {
        self.permits
            .lock()
            .unwrap()
            .insert(profile.clone(), specific_object);
        self.available_for_user_request
            .lock()
            .unwrap()
            .insert(profile.clone());
    }

    pub fn set_ip4(&self, cfg: Ip4ConfigSnapshot) {
        *self.ip4.lock().unwrap() = Some(cfg);
    }

    pub fn set_ip6(&self, cfg: Ip6ConfigSnapshot) {
        *self.ip6.lock().unwrap() = Some(cfg);
    }

    pub fn set_dhcp4(&self, cfg: Dhcp4ConfigSnapshot) {
        *self.dhcp4.lock().unwrap() = Some(cfg);
    }
}

#[async_trait]
impl DeviceHandle for FakeDevice {
    fn id(&self) -> DeviceId {
        self.id
    }

    fn interface(&self) -> &str {
        &self.interface
    }

    fn kernel_index(&self) -> u32 {
        self.kernel_index
    }

    fn state(&self) -> DeviceState {
        *self.state.lock().unwrap()
    }

    fn autoconnect_permitted(&self) -> bool {
        *self.autoconnect_permitted.lock().unwrap()
    }

    fn is_software(&self) -> bool {
        self.software
    }

    fn master_index(&self) -> Option<u32> {
        *self.master_index.lock().unwrap()
    }

    fn link_up(&self) -> bool {
        *self.link_up.lock().unwrap()
    }

    fn link_exists(&self) -> bool {
        *self.link_exists.lock().unwrap()
    }

    fn has_active_request(&self) -> bool {
        *self.has_active_request.lock().unwrap()
    }

    fn set_autoactivate_pending(&self, pending: bool) {
        *self.autoactivate_pending.lock().unwrap() = pending;
    }

    async fn consume_assume_hint(&self) -> Option<ProfileUuid> {
        self.assume_hint.lock().unwrap().take()
    }

    async fn device_permits(&self, profile: &ProfileUuid) -> Option<Option<String>> {
        self.permits.lock().unwrap().get(profile).cloned()
    }

    async fn profile_available_for_user_request(&self, profile: &ProfileUuid) -> bool {
        self.available_for_user_request
            .lock()
            .unwrap()
            .contains(profile)
    }

    fn ip4_config(&self, _ignore_never_default: bool) -> Option<Ip4ConfigSnapshot> {
        self.ip4.lock().unwrap().clone()
    }

    fn ip6_config(&self, _ignore_never_default: bool) -> Option<Ip6ConfigSnapshot> {
        self.ip6.lock().unwrap().clone()
    }

    fn dhcp4_config(&self) -> Option<Dhcp4ConfigSnapshot> {
        self.dhcp4.lock().unwrap().clone()
    }

    fn dhcp6_config(&self) -> Option<Dhcp6ConfigSnapshot> {
        self.dhcp6.lock().unwrap().clone()
    }
}

pub fn ipv4(a: u8, b: u8, c: u8, d: u8) -> Ipv4Addr {
    Ipv4Addr::new(a, b, c, d)
}

pub fn ip4_config(id: u64, addr: Ipv4Addr) -> Ip4ConfigSnapshot {
    Ip4ConfigSnapshot {
        id,
        primary_address: Some(addr),
        never_default: false,
    }
}

pub fn ip6_config(id: u64, addr: Ipv6Addr) -> Ip6ConfigSnapshot {
    Ip6ConfigSnapshot {
        id,
        primary_address: Some(addr),
        never_default: false,
    }
}

/// A fully test-controllable [`ActiveSessionHandle`], optionally VPN-tagged.
pub struct FakeSession {
    pub id: SessionId,
    pub profile: ProfileUuid,
    pub device: Mutex<Option<DeviceId>>,
    pub activation_type: ActivationType,
    pub state: Mutex<SessionState>,
    pub subject: Subject,
    pub default_v4: Mutex<bool>,
    pub default_v6: Mutex<bool>,
    pub path: String,
    pub vpn: Option<FakeVpnExtras>,
}

#[derive(Default)]
pub struct FakeVpnExtras {
    pub ip4: Mutex<Option<Ip4ConfigSnapshot>>,
    pub ip6: Mutex<Option<Ip6ConfigSnapshot>>,
}

impl VpnExtras for FakeVpnExtras {
    fn ip4_config(&self) -> Option<Ip4ConfigSnapshot> {
        self.ip4.lock().unwrap().clone()
    }

    fn ip6_config(&self) -> Option<Ip6ConfigSnapshot> {
        self.ip6.lock().unwrap().clone()
    }
}

impl FakeSession {
    #[must_use]
    pub fn device_session(
        id: u64,
        profile: &ProfileUuid,
        device: DeviceId,
        activation_type: ActivationType,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: SessionId(id),
            profile: profile.clone(),
            device: Mutex::new(Some(device)),
            activation_type,
            state: Mutex::new(SessionState::Activating),
            subject: Subject::Internal,
            default_v4: Mutex::new(false),
            default_v6: Mutex::new(false),
            path: format!("/session/{id}"),
            vpn: None,
        })
    }

    #[must_use]
    pub fn vpn_session(id: u64, profile: &ProfileUuid) -> Arc<Self> {
        Arc::new(Self {
            id: SessionId(id),
            profile: profile.clone(),
            device: Mutex::new(None),
            activation_type: ActivationType::Full,
            state: Mutex::new(SessionState::Activating),
            subject: Subject::Internal,
            default_v4: Mutex::new(false),
            default_v6: Mutex::new(false),
            path: format!("/session/{id}"),
            vpn: Some(FakeVpnExtras::default()),
        })
    }

    pub fn set_state(&self, state: SessionState) {
        *self.state.lock().unwrap() = state;
    }
}

impl ActiveSessionHandle for FakeSession {
    fn id(&self) -> SessionId {
        self.id
    }

    fn profile_uuid(&self) -> ProfileUuid {
        self.profile.clone()
    }

    fn device(&self) -> Option<DeviceId> {
        *self.device.lock().unwrap()
    }

    fn bind_device(&self, device: DeviceId) {
        *self.device.lock().unwrap() = Some(device);
    }

    fn activation_type(&self) -> ActivationType {
        self.activation_type
    }

    fn state(&self) -> SessionState {
        *self.state.lock().unwrap()
    }

    fn subject(&self) -> Subject {
        self.subject
    }

    fn default(&self, family: IpFamily) -> bool {
        match family {
            IpFamily::V4 => *self.default_v4.lock().unwrap(),
            IpFamily::V6 => *self.default_v6.lock().unwrap(),
        }
    }

    fn set_default(&self, family: IpFamily, value: bool) {
        match family {
            IpFamily::V4 => *self.default_v4.lock().unwrap() = value,
            IpFamily::V6 => *self.default_v6.lock().unwrap() = value,
        }
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn as_vpn(&self) -> Option<&dyn VpnExtras> {
        self.vpn.as_ref().map(|v| v as &dyn VpnExtras)
    }
}

/// Records of calls made to [`FakeManager::activate`], for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateCall {
    pub profile: ProfileUuid,
    pub device: Option<DeviceId>,
    pub subject: Subject,
    pub activation_type: ActivationType,
}

#[derive(Default)]
pub struct FakeManager {
    pub devices: Mutex<Vec<Arc<dyn DeviceHandle>>>,
    pub sessions: Mutex<Vec<Arc<dyn ActiveSessionHandle>>>,
    pub activate_calls: Mutex<Vec<ActivateCall>>,
    pub deactivate_calls: Mutex<Vec<(SessionId, DeactivateReason)>>,
    pub next_session: AtomicU64,
    pub sleeping: Mutex<bool>,
    pub networking_enabled: Mutex<bool>,
    pub configured_hostname: Mutex<Option<String>>,
    pub fail_activate: Mutex<bool>,
}

impl FakeManager {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            networking_enabled: Mutex::new(true),
            next_session: AtomicU64::new(1),
            ..Self::default()
        })
    }

    pub fn add_device(&self, device: Arc<dyn DeviceHandle>) {
        self.devices.lock().unwrap().push(device);
    }

    pub fn add_session(&self, session: Arc<dyn ActiveSessionHandle>) {
        self.sessions.lock().unwrap().push(session);
    }
}

#[async_trait]
impl ManagerHandle for FakeManager {
    async fn activate(
        &self,
        profile: &ProfileUuid,
        _specific_object: Option<String>,
        device: Option<DeviceId>,
        subject: Subject,
        activation_type: ActivationType,
    ) -> Result<SessionId, String> {
        self.activate_calls.lock().unwrap().push(ActivateCall {
            profile: profile.clone(),
            device,
            subject,
            activation_type,
        });

        if *self.fail_activate.lock().unwrap() {
            return Err("activation refused".to_string());
        }

        let id = self.next_session.fetch_add(1, Ordering::SeqCst);
        Ok(SessionId(id))
    }

    async fn deactivate(&self, session: SessionId, reason: DeactivateReason) -> Result<(), String> {
        self.deactivate_calls.lock().unwrap().push((session, reason));
        Ok(())
    }

    fn devices(&self) -> Vec<Arc<dyn DeviceHandle>> {
        self.devices.lock().unwrap().clone()
    }

    fn active_sessions(&self) -> Vec<Arc<dyn ActiveSessionHandle>> {
        self.sessions.lock().unwrap().clone()
    }

    fn connection_device(&self, profile: &ProfileUuid) -> Option<DeviceId> {
        self.sessions
            .lock()
            .unwrap()
            .iter()
            .find(|s| &s.profile_uuid() == profile)
            .and_then(|s| s.device())
    }

    fn is_sleeping(&self) -> bool {
        *self.sleeping.lock().unwrap()
    }

    fn is_networking_enabled(&self) -> bool {
        *self.networking_enabled.lock().unwrap()
    }

    fn configured_hostname(&self) -> Option<String> {
        self.configured_hostname.lock().unwrap().clone()
    }
}

#[derive(Default)]
pub struct FakeSettingsStore {
    pub profiles: Mutex<HashMap<ProfileUuid, ProfileSnapshot>>,
    pub default_retries: u32,
}

impl FakeSettingsStore {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            default_retries: 4,
            ..Self::default()
        })
    }

    pub fn insert(&self, profile: ProfileSnapshot) {
        self.profiles.lock().unwrap().insert(profile.uuid.clone(), profile);
    }
}

#[async_trait]
impl SettingsStoreHandle for FakeSettingsStore {
    async fn profile(&self, uuid: &ProfileUuid) -> Option<ProfileSnapshot> {
        self.profiles.lock().unwrap().get(uuid).cloned()
    }

    async fn profiles(&self) -> Vec<ProfileSnapshot> {
        self.profiles.lock().unwrap().values().cloned().collect()
    }

    async fn set_blocked_reason(&self, uuid: &ProfileUuid, reason: AutoconnectBlockedReason) {
        if let Some(profile) = self.profiles.lock().unwrap().get_mut(uuid) {
            profile.autoconnect_blocked_reason = reason;
        }
    }

    async fn decrement_retries(&self, uuid: &ProfileUuid) -> u32 {
        let mut profiles = self.profiles.lock().unwrap();
        if let Some(profile) = profiles.get_mut(uuid) {
            if profile.autoconnect_retries_remaining > 0 {
                profile.autoconnect_retries_remaining -= 1;
            }
            profile.autoconnect_retries_remaining
        } else {
            0
        }
    }

    async fn reset_retries(&self, uuid: &ProfileUuid) {
        if let Some(profile) = self.profiles.lock().unwrap().get_mut(uuid) {
            profile.autoconnect_retries_remaining = self.default_retries;
        }
    }

    async fn set_retry_time(&self, uuid: &ProfileUuid, retry_time: u64) {
        if let Some(profile) = self.profiles.lock().unwrap().get_mut(uuid) {
            profile.autoconnect_retry_time = retry_time;
        }
    }

    async fn clear_secrets(&self, _uuid: &ProfileUuid) {}

    async fn set_transient_hostname(&self, _name: &str, completion: HostnameCompletion) {
        completion(Ok(()));
    }
}

#[derive(Default)]
pub struct FakeDnsManager {
    pub begin_calls: Mutex<Vec<String>>,
    pub end_calls: Mutex<Vec<String>>,
    pub v4_registrations: Mutex<Vec<(String, u64, DnsPriorityTag)>>,
    pub v6_registrations: Mutex<Vec<(String, u64, DnsPriorityTag)>>,
    pub removed_v4: Mutex<Vec<u64>>,
    pub removed_v6: Mutex<Vec<u64>>,
    pub hostname: Mutex<Option<String>>,
}

impl FakeDnsManager {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl DnsManagerHandle for FakeDnsManager {
    async fn begin_updates(&self, tag: &str) {
        self.begin_calls.lock().unwrap().push(tag.to_string());
    }

    async fn end_updates(&self, tag: &str) {
        self.end_calls.lock().unwrap().push(tag.to_string());
    }

    async fn add_v4_config(&self, interface: &str, config: &Ip4ConfigSnapshot, tag: DnsPriorityTag) {
        self.v4_registrations
            .lock()
            .unwrap()
            .push((interface.to_string(), config.id, tag));
    }

    async fn add_v6_config(&self, interface: &str, config: &Ip6ConfigSnapshot, tag: DnsPriorityTag) {
        self.v6_registrations
            .lock()
            .unwrap()
            .push((interface.to_string(), config.id, tag));
    }

    async fn remove_v4_config(&self, config_id: u64) {
        self.removed_v4.lock().unwrap().push(config_id);
    }

    async fn remove_v6_config(&self, config_id: u64) {
        self.removed_v6.lock().unwrap().push(config_id);
    }

    async fn set_initial_hostname(&self, hostname: &str) {
        *self.hostname.lock().unwrap() = Some(hostname.to_string());
    }

    async fn set_hostname(&self, hostname: &str) {
        *self.hostname.lock().unwrap() = Some(hostname.to_string());
    }
}

#[derive(Default)]
pub struct FakeFirewallManager {
    pub calls: Mutex<Vec<DeviceId>>,
}

impl FakeFirewallManager {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl FirewallManagerHandle for FakeFirewallManager {
    async fn update_firewall_zone(&self, device: DeviceId) {
        self.calls.lock().unwrap().push(device);
    }
}

#[derive(Default)]
pub struct FakeDispatcher {
    pub hostname_calls: Mutex<u32>,
}

impl FakeDispatcher {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl DispatcherHandle for FakeDispatcher {
    async fn call_hostname_hook(&self) {
        *self.hostname_calls.lock().unwrap() += 1;
    }
}

#[derive(Default)]
pub struct FakeKernel {
    pub hostname: Mutex<String>,
    pub fail_sethostname: Mutex<Option<String>>,
}

impl FakeKernel {
    #[must_use]
    pub fn new(initial: &str) -> Arc<Self> {
        Arc::new(Self {
            hostname: Mutex::new(initial.to_string()),
            fail_sethostname: Mutex::new(None),
        })
    }
}

impl KernelHandle for FakeKernel {
    fn gethostname(&self) -> String {
        self.hostname.lock().unwrap().clone()
    }

    fn sethostname(&self, name: &str) -> Result<(), String> {
        if let Some(err) = self.fail_sethostname.lock().unwrap().clone() {
            return Err(err);
        }
        *self.hostname.lock().unwrap() = name.to_string();
        Ok(())
    }
}

pub struct FakeReverseDnsResolver {
    pub result: Mutex<Option<Result<String, ()>>>,
}

impl FakeReverseDnsResolver {
    #[must_use]
    pub fn new(result: Result<String, ()>) -> Arc<Self> {
        Arc::new(Self {
            result: Mutex::new(Some(result)),
        })
    }
}

#[async_trait]
impl ReverseDnsResolverHandle for FakeReverseDnsResolver {
    async fn resolve(&self, _address: IpAddr, cancel: CancellationToken) -> Result<String, ()> {
        if cancel.is_cancelled() {
            return Err(());
        }
        self.result.lock().unwrap().take().unwrap_or(Err(()))
    }
}

/// A [`SchedulerHandle`] that runs idle tasks on a real `tokio::spawn` and
/// honors `schedule_after`'s requested delay via a real `tokio::time::sleep`.
/// A test that needs to observe a timer firing waits out the delay with a
/// margin wide enough not to race it, rather than relying on virtual time.
#[derive(Default)]
pub struct FakeScheduler;

impl FakeScheduler {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

impl SchedulerHandle for FakeScheduler {
    fn schedule_idle(&self, task: BoxTask) -> TaskHandle {
        let token = CancellationToken::new();
        let child = token.clone();
        let join = tokio::spawn(async move {
            tokio::select! {
                () = child.cancelled() => {}
                () = task => {}
            }
        });
        TaskHandle::new(token, join)
    }

    fn schedule_after(&self, delay: std::time::Duration, task: BoxTask) -> TaskHandle {
        let token = CancellationToken::new();
        let child = token.clone();
        let join = tokio::spawn(async move {
            tokio::select! {
                () = child.cancelled() => {}
                () = async {
                    tokio::time::sleep(delay).await;
                    task.await;
                } => {}
            }
        });
        TaskHandle::new(token, join)
    }
}

/// Test-only profile builder with sane defaults.
#[must_use]
pub fn profile(uuid: &str, priority: i32, last_connect: i64) -> ProfileSnapshot {
    ProfileSnapshot {
        uuid: ProfileUuid::from(uuid),
        display_id: uuid.to_string(),
        is_vpn: false,
        autoconnect_priority: priority,
        last_connect_timestamp: last_connect,
        autoconnect_retries_remaining: 4,
        autoconnect_blocked_reason: AutoconnectBlockedReason::None,
        autoconnect_retry_time: 0,
        visible: true,
        slave_linkage: None,
        secondary_uuids: Vec::new(),
    }
}
