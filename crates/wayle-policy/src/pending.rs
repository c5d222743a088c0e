//! Component B: pending-action set (spec §4.B).
//!
//! Coalesces auto-activation decision requests per device: `schedule`
//! refuses a second entry for a device that already has one outstanding,
//! which is the "at-most-one-pending-per-device" invariant of spec §8.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::collaborators::TaskHandle;
use crate::ids::DeviceId;

/// The pending auto-activation set.
#[derive(Default)]
pub struct PendingActions {
    entries: Mutex<HashMap<DeviceId, TaskHandle>>,
}

impl PendingActions {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `device` already has a pending entry.
    #[must_use]
    pub fn is_pending(&self, device: DeviceId) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains_key(&device)
    }

    /// Inserts a pending entry for `device`, built by `make_task`.
    ///
    /// `make_task` is only invoked if no entry already exists, so callers
    /// can defer the (possibly non-trivial) task construction until it's
    /// known to be needed. Returns `false` without calling `make_task` if an
    /// entry already exists.
    pub fn schedule(&self, device: DeviceId, make_task: impl FnOnce() -> TaskHandle) -> bool {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if entries.contains_key(&device) {
            return false;
        }

        entries.insert(device, make_task());
        true
    }

    /// Removes and cancels the pending entry for `device`, if any.
    pub fn clear(&self, device: DeviceId) -> bool {
        let removed = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&device);

        if let Some(mut handle) = removed {
            handle.cancel();
            true
        } else {
            false
        }
    }
}
