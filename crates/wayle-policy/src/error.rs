use crate::ids::{DeviceId, ProfileUuid, SessionId};

/// Errors the policy engine surfaces to its host.
///
/// Per spec §7's propagation policy, event handlers never return errors —
/// events are notifications, not requests, and a failed activation is
/// expressed through the device's subsequent state trajectory instead. This
/// enum exists for the handful of operations a host explicitly invokes on
/// the engine (construction, an operator-triggered `activate_now`).
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A collaborator call the engine directly depends on the result of
    /// failed (e.g. the device named is not currently registered).
    #[error("unknown device: {0}")]
    UnknownDevice(DeviceId),

    /// The profile named does not exist in the settings store.
    #[error("unknown profile: {0}")]
    UnknownProfile(ProfileUuid),

    /// The session named does not exist among the manager's active sessions.
    #[error("unknown session: {0}")]
    UnknownSession(SessionId),

    /// The manager rejected an activation request.
    #[error("activation of {profile} on {device:?} failed: {reason}")]
    ActivationFailed {
        /// Profile that failed to activate.
        profile: ProfileUuid,
        /// Device the activation was attempted on, if any.
        device: Option<DeviceId>,
        /// Collaborator-supplied failure reason.
        reason: String,
    },

    /// The kernel `sethostname` call failed (typically `EPERM`).
    #[error("cannot set kernel hostname: {0} (run a privileged hostname daemon, e.g. hostnamed)")]
    SetHostnameFailed(String),
}
