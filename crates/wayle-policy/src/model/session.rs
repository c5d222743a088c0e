use async_trait::async_trait;

use crate::family::IpFamily;
use crate::ids::{DeviceId, ProfileUuid, SessionId};
use crate::model::device::{Ip4ConfigSnapshot, Ip6ConfigSnapshot};

/// How a session was brought up (spec §3, glossary "Assume activation").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivationType {
    /// Adopted an already-configured link without replaying activation.
    Assume,
    /// Ran the full activation sequence.
    Full,
}

/// Runtime state of an active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Activation requested, not yet resolved.
    Activating,
    /// Fully up.
    Activated,
    /// Tearing down.
    Deactivating,
    /// Fully down; a terminal state.
    Deactivated,
}

/// Who asked for an activation — distinguishes engine-internal
/// auto-activation from a user-initiated request, per spec §3/§6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subject {
    /// The engine itself decided to activate this.
    Internal,
    /// A user (or another component acting on a user's behalf) requested it.
    User,
}

/// Capability trait exposed only by VPN sessions (design note §9: "sum type
/// ... or equivalent capability traits, dispatch on the variant").
/// [`ActiveSessionHandle::as_vpn`] returns `Some` only for sessions backed by
/// a VPN profile.
pub trait VpnExtras: Send + Sync {
    /// The VPN's own IPv4 configuration (independent of any carrier
    /// device's), used for late-binding in §4.E.
    fn ip4_config(&self) -> Option<Ip4ConfigSnapshot>;

    /// The VPN's own IPv6 configuration.
    fn ip6_config(&self) -> Option<Ip6ConfigSnapshot>;
}

/// The runtime instance of a profile being brought up or in effect on a
/// device (glossary: "Active session"). Owned by the manager; the engine
/// holds shared handles and mutates only through these methods (spec §5).
#[async_trait]
pub trait ActiveSessionHandle: Send + Sync {
    /// Stable session identity.
    fn id(&self) -> SessionId;

    /// The profile this session activates.
    fn profile_uuid(&self) -> ProfileUuid;

    /// The device this session is bound to, if any. VPN sessions may be
    /// unbound until late-binding occurs in §4.E's routing update.
    fn device(&self) -> Option<DeviceId>;

    /// Binds this session to a device. Used only for VPN late-binding.
    fn bind_device(&self, device: DeviceId);

    /// How this session was activated.
    fn activation_type(&self) -> ActivationType;

    /// Current session state.
    fn state(&self) -> SessionState;

    /// Who requested this activation.
    fn subject(&self) -> Subject;

    /// Whether this session currently carries the default flag for `family`.
    fn default(&self, family: IpFamily) -> bool;

    /// Sets the default flag for `family`. The two-phase clear-then-set
    /// choreography that preserves the single-default invariant lives in
    /// the default-arbitration component, not here.
    fn set_default(&self, family: IpFamily, value: bool);

    /// Exported object path, used for `deactivate`.
    fn path(&self) -> &str;

    /// Downcasts to VPN-only capabilities, or `None` for a device session.
    fn as_vpn(&self) -> Option<&dyn VpnExtras>;
}
