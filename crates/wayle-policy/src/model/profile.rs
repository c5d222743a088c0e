use crate::ids::ProfileUuid;

/// Per-profile gate preventing auto-activation until explicitly cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AutoconnectBlockedReason {
    /// Not blocked.
    None,
    /// Activation needs secrets that were unavailable or rejected.
    NoSecrets,
    /// A user explicitly disabled autoconnect for this profile.
    UserRequested,
}

/// Master/slave linkage for bonds, bridges, and teams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlaveLinkage {
    /// Name or uuid of the master connection.
    pub master: String,
    /// The slave type (e.g. `"bond"`, `"bridge"`, `"team"`).
    pub slave_type: String,
}

/// A read-only snapshot of a stored connection profile's fields the core
/// cares about (spec §3). Mutations happen through [`crate::SettingsStore`]
/// methods, never by editing this snapshot in place — it is a point-in-time
/// copy the engine can freely move and compare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSnapshot {
    /// Stable uuid.
    pub uuid: ProfileUuid,
    /// Human-readable display id.
    pub display_id: String,
    /// `true` if this profile is a VPN connection.
    pub is_vpn: bool,
    /// Autoconnect priority; higher sorts first (spec §4.C).
    pub autoconnect_priority: i32,
    /// Monotonic-ish timestamp of last successful connect, used as the
    /// priority tie-break (spec §4.C).
    pub last_connect_timestamp: i64,
    /// Remaining autoconnect retries.
    pub autoconnect_retries_remaining: u32,
    /// Current block, if any.
    pub autoconnect_blocked_reason: AutoconnectBlockedReason,
    /// Monotonic seconds at which `autoconnect_retries_remaining` may next
    /// be reset by the shared retry timer.
    pub autoconnect_retry_time: u64,
    /// Whether the profile is visible to the current user/session.
    pub visible: bool,
    /// Master/slave linkage, if this profile is a bond/bridge/team slave.
    pub slave_linkage: Option<SlaveLinkage>,
    /// Declared secondary (dependency) uuids, in declared order (spec §4.G).
    pub secondary_uuids: Vec<ProfileUuid>,
}

impl ProfileSnapshot {
    /// `can-autoconnect` from spec §4.C: permitted, not blocked, and has
    /// retries remaining.
    #[must_use]
    pub fn can_autoconnect(&self) -> bool {
        self.visible
            && self.autoconnect_blocked_reason == AutoconnectBlockedReason::None
            && self.autoconnect_retries_remaining > 0
    }
}
