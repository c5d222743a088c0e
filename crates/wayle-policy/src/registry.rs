//! Component A: device registry (spec §4.A).
//!
//! The real subscribe/unsubscribe wiring (state-changed, ip4-changed,
//! ip6-changed, autoconnect-permission-changed, recheck-auto-activate) is a
//! property of the transport the host uses to deliver events to the engine
//! (e.g. zbus signal streams in a NetworkManager-backed host) — out of scope
//! for a transport-free core (spec §1). What the core owns is the
//! bookkeeping that makes registration idempotent and unregistration
//! complete: a device id present here is one the engine will act on. Every
//! per-device `on_*` handler on [`crate::PolicyEngine`] checks
//! [`DeviceRegistry::is_registered`] first and silently returns otherwise,
//! which is what "no residual callbacks fire after unregister" reduces to
//! once the host is relaying through the engine rather than wiring devices
//! to collaborators directly.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::ids::DeviceId;

/// Tracks the set of devices the engine currently considers registered.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    registered: Mutex<HashSet<DeviceId>>,
}

impl DeviceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `device`. Idempotent: registering an already-registered
    /// device is a no-op and returns `false`.
    pub fn register(&self, device: DeviceId) -> bool {
        self.registered
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(device)
    }

    /// Unregisters `device`, detaching it fully. Returns `false` if it
    /// wasn't registered.
    pub fn unregister(&self, device: DeviceId) -> bool {
        self.registered
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&device)
    }

    /// Whether `device` is currently registered.
    #[must_use]
    pub fn is_registered(&self, device: DeviceId) -> bool {
        self.registered
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains(&device)
    }
}
