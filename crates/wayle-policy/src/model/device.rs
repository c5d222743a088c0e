use std::net::{Ipv4Addr, Ipv6Addr};

use async_trait::async_trait;

use crate::ids::{DeviceId, ProfileUuid};

/// Device-level state, per spec §3's enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceState {
    /// The device is not managed by the engine at all.
    Unmanaged,
    /// Managed, but not currently usable (e.g. no carrier, radio killed).
    Unavailable,
    /// Available, no connection attempt in progress.
    Disconnected,
    /// A connection attempt has begun.
    Prepare,
    /// Waiting for IP configuration (DHCP/RA/static apply).
    IpConfig,
    /// Waiting on dependent (VPN) connections (spec §4.G).
    Secondaries,
    /// Fully up.
    Activated,
    /// Tearing down.
    Deactivating,
    /// The connection attempt failed.
    Failed,
}

/// Why a device entered [`DeviceState::Failed`], insofar as the engine cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceStateReason {
    /// No reason of interest to the retry scheduler or secondaries tracker.
    Other,
    /// Secrets were required and unavailable or rejected.
    NoSecrets,
    /// A declared secondary (VPN) connection failed (spec §4.G).
    SecondaryConnectionFailed,
}

/// A snapshot of a device's IPv4 configuration, as much of it as the engine
/// needs: the primary (first) address, for hostname reverse-lookup (§4.H),
/// and a `never_default` flag mirroring NetworkManager's semantics (an
/// interface explicitly opted out of carrying the default route/DNS still
/// reports a config, but the "ignore-never-default" DNS re-query in §4.E
/// must be able to see it anyway).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ip4ConfigSnapshot {
    /// Opaque identity used when deregistering this config from the DNS
    /// manager (`remove-v4-config`).
    pub id: u64,
    /// First address in the config, used for reverse-DNS (§4.H rung 4).
    pub primary_address: Option<Ipv4Addr>,
    /// Whether this device opted out of ever carrying the default route.
    pub never_default: bool,
}

/// IPv6 counterpart of [`Ip4ConfigSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ip6ConfigSnapshot {
    /// Opaque identity used when deregistering this config from the DNS
    /// manager (`remove-v6-config`).
    pub id: u64,
    /// First address in the config, used for reverse-DNS (§4.H rung 4).
    pub primary_address: Option<Ipv6Addr>,
    /// Whether this device opted out of ever carrying the default route.
    pub never_default: bool,
}

/// DHCPv4-supplied option data the hostname ladder reads (spec §4.H rung 2).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dhcp4ConfigSnapshot {
    /// The `host_name` DHCP option, unprocessed (may contain leading
    /// whitespace; the hostname pipeline is responsible for stripping it).
    pub host_name: Option<String>,
}

/// DHCPv6 counterpart of [`Dhcp4ConfigSnapshot`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dhcp6ConfigSnapshot {
    /// The DHCPv6 hostname option, unprocessed.
    pub host_name: Option<String>,
}

/// A managed network device, as the policy engine sees it.
///
/// The engine never owns a device's fields; per spec §5's shared-resource
/// policy this is a handle into an object owned by the manager, and every
/// method here is a query or a narrow, explicit mutation (`bind`,
/// `consume_assume_hint`) rather than direct field access.
#[async_trait]
pub trait DeviceHandle: Send + Sync {
    /// Stable device identity.
    fn id(&self) -> DeviceId;

    /// Kernel interface name (e.g. `eth0`).
    fn interface(&self) -> &str;

    /// Kernel link index, used to check master/up-down relationships during
    /// the assume-probe (spec §4.C).
    fn kernel_index(&self) -> u32;

    /// Current device-level state.
    fn state(&self) -> DeviceState;

    /// Whether the device currently permits autoconnect at all (distinct
    /// from any one profile's permission).
    fn autoconnect_permitted(&self) -> bool;

    /// `true` for software devices (bridges, tunnels, etc.), `false` for
    /// physical hardware. Informational; the spec does not gate decisions on
    /// it directly but collaborators may.
    fn is_software(&self) -> bool;

    /// Kernel master link index, if this link is enslaved (0 / `None` if
    /// not). Used by the assume-probe's slave/non-slave branches.
    fn master_index(&self) -> Option<u32>;

    /// Whether the kernel reports the link as administratively/physically up.
    fn link_up(&self) -> bool;

    /// Whether the platform link named by `kernel_index` still exists at all.
    fn link_exists(&self) -> bool;

    /// `true` if some active request (a not-yet-resolved activation) is
    /// already bound to this device.
    fn has_active_request(&self) -> bool;

    /// Sets the "autoactivate pending" marker (spec §4.B), so external
    /// waiters (e.g. a CLI `nmcli device connect` call blocking on
    /// readiness) can observe that the engine has a decision in flight.
    fn set_autoactivate_pending(&self, pending: bool);

    /// Consumes and returns the "connection uuid to assume" hint, if the
    /// device has one queued. A device exposes this at most once per
    /// activation attempt (spec §4.C: "consuming the hint if present").
    async fn consume_assume_hint(&self) -> Option<ProfileUuid>;

    /// Asks the device whether `profile` is compatible with it, producing an
    /// optional "specific object" identifier (e.g. an access-point path) on
    /// success. Mirrors spec §4.C's `device-permits` check.
    async fn device_permits(&self, profile: &ProfileUuid) -> Option<Option<String>>;

    /// Checks availability of `profile` on this device for a user-request,
    /// used by the assume-probe's "available on this device" condition.
    async fn profile_available_for_user_request(&self, profile: &ProfileUuid) -> bool;

    /// Current IPv4 configuration, if any. `ignore_never_default` requests
    /// the variant used by the DNS re-query in §4.E, which must see
    /// never-default configs the routing arbitration itself would skip.
    fn ip4_config(&self, ignore_never_default: bool) -> Option<Ip4ConfigSnapshot>;

    /// Current IPv6 configuration, if any.
    fn ip6_config(&self, ignore_never_default: bool) -> Option<Ip6ConfigSnapshot>;

    /// Current DHCPv4 lease data, if any (spec §4.H rung 2).
    fn dhcp4_config(&self) -> Option<Dhcp4ConfigSnapshot>;

    /// Current DHCPv6 lease data, if any.
    fn dhcp6_config(&self) -> Option<Dhcp6ConfigSnapshot>;
}
