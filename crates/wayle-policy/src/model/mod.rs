//! Core domain model (spec §3): devices, profiles, and active sessions.

mod device;
mod profile;
mod session;

pub use device::{
    DeviceHandle, DeviceState, DeviceStateReason, Dhcp4ConfigSnapshot, Dhcp6ConfigSnapshot,
    Ip4ConfigSnapshot, Ip6ConfigSnapshot,
};
pub use profile::{AutoconnectBlockedReason, ProfileSnapshot, SlaveLinkage};
pub use session::{ActivationType, ActiveSessionHandle, SessionState, Subject, VpnExtras};
