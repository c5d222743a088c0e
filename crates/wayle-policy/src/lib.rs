//! A transport-free network policy engine.
//!
//! Decides which profile to auto-activate on which device, which device
//! carries the default route/DNS priority for IPv4 and IPv6, which VPN
//! profiles to chain as secondaries, and what the system hostname should be.
//! The engine performs no I/O of its own: every external effect goes through
//! one of the collaborator traits in [`collaborators`], so a hosting process
//! (talking to NetworkManager over D-Bus, the kernel, a dispatcher script,
//! ...) and a test suite (in-memory fakes) can drive identical logic.
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod autoactivate;
mod collaborators;
mod default_route;
mod dns_driver;
mod engine;
mod error;
mod family;
#[cfg(test)]
mod fixtures;
mod hostname;
mod ids;
mod model;
mod pending;
mod registry;
mod retry;
mod secondaries;

pub use collaborators::{
    BoxTask, DeactivateReason, DefaultRouteManagerHandle, DispatcherHandle, DnsManagerHandle,
    DnsPriorityTag, FirewallManagerHandle, HostnameCompletion, KernelHandle, ManagerHandle,
    ReverseDnsResolverHandle, SchedulerHandle, SettingsStoreHandle, TaskHandle, TokioScheduler,
};
pub use engine::PolicyEngine;
pub use error::Error;
pub use family::IpFamily;
pub use ids::{DeviceId, ProfileUuid, SessionId};
pub use model::{
    ActivationType, ActiveSessionHandle, AutoconnectBlockedReason, DeviceHandle, DeviceState,
    DeviceStateReason, Dhcp4ConfigSnapshot, Dhcp6ConfigSnapshot, Ip4ConfigSnapshot,
    Ip6ConfigSnapshot, ProfileSnapshot, SessionState, SlaveLinkage, Subject, VpnExtras,
};

/// Convenience alias matching the collaborator traits' fallible return shape.
pub type Result<T> = std::result::Result<T, Error>;
