//! Injected collaborator interfaces (spec §6, design note §9).
//!
//! The policy engine performs no I/O itself; every external effect and every
//! piece of state it does not own goes through one of these traits. A host
//! process implements them against its real NetworkManager D-Bus proxies,
//! kernel shims, and dispatcher hook; tests implement them as in-memory
//! fakes (see `engine::fixtures`).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::family::IpFamily;
use crate::ids::{DeviceId, ProfileUuid, SessionId};
use crate::model::{ActiveSessionHandle, ActivationType, DeviceHandle, ProfileSnapshot, Subject};

/// A boxed, one-shot unit of work submitted to a [`Scheduler`].
pub type BoxTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Reason passed to [`ManagerHandle::deactivate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeactivateReason {
    /// A secondary (VPN) dependency failed (spec §4.G).
    SecondaryConnectionFailed,
    /// The engine is shutting down and tearing down sessions it started.
    EngineDisposed,
    /// Some other user- or collaborator-driven reason.
    Other,
}

/// The manager: owns devices and active sessions, and is the only
/// collaborator that can actually bring a profile up or down (spec §6).
#[async_trait]
pub trait ManagerHandle: Send + Sync {
    /// Requests activation. Failure is a transient-collaborator-failure per
    /// spec §7 item 1: callers should log and drop, not retry inline.
    async fn activate(
        &self,
        profile: &ProfileUuid,
        specific_object: Option<String>,
        device: Option<DeviceId>,
        subject: Subject,
        activation_type: ActivationType,
    ) -> Result<SessionId, String>;

    /// Requests deactivation of a session.
    async fn deactivate(&self, session: SessionId, reason: DeactivateReason) -> Result<(), String>;

    /// All devices currently visible to the manager.
    fn devices(&self) -> Vec<Arc<dyn DeviceHandle>>;

    /// All sessions the manager currently tracks (any state).
    fn active_sessions(&self) -> Vec<Arc<dyn ActiveSessionHandle>>;

    /// The device a given profile is presently bound to, if any.
    fn connection_device(&self, profile: &ProfileUuid) -> Option<DeviceId>;

    /// `true` while the host is asleep/suspended.
    fn is_sleeping(&self) -> bool;

    /// `true` while networking is administratively enabled.
    fn is_networking_enabled(&self) -> bool;

    /// The manager's own `hostname` property, as currently known (this is
    /// the "configured hostname" of spec §4.H rung 1).
    fn configured_hostname(&self) -> Option<String>;
}

/// Completion callback passed to [`SettingsStoreHandle::set_transient_hostname`].
pub type HostnameCompletion = Box<dyn FnOnce(Result<(), String>) + Send>;

/// The settings store: owns stored connection profiles and their retry /
/// blocked-reason bookkeeping (spec §6).
#[async_trait]
pub trait SettingsStoreHandle: Send + Sync {
    /// Fetches one profile by uuid.
    async fn profile(&self, uuid: &ProfileUuid) -> Option<ProfileSnapshot>;

    /// Fetches every profile currently known (unsorted — the auto-activation
    /// decider is responsible for the stable priority/recency sort, spec
    /// §4.C).
    async fn profiles(&self) -> Vec<ProfileSnapshot>;

    /// Sets a profile's autoconnect-blocked reason.
    async fn set_blocked_reason(
        &self,
        uuid: &ProfileUuid,
        reason: crate::model::AutoconnectBlockedReason,
    );

    /// Decrements `autoconnect_retries_remaining`, returning the new value.
    async fn decrement_retries(&self, uuid: &ProfileUuid) -> u32;

    /// Resets `autoconnect_retries_remaining` to the store's default.
    async fn reset_retries(&self, uuid: &ProfileUuid);

    /// Sets the monotonic retry time at which retries may next be reset.
    async fn set_retry_time(&self, uuid: &ProfileUuid, retry_time: u64);

    /// Clears cached secrets for a profile.
    async fn clear_secrets(&self, uuid: &ProfileUuid);

    /// Requests a transient hostname change; `completion` is invoked once
    /// the store has durably committed (or failed to commit) the change.
    async fn set_transient_hostname(&self, name: &str, completion: HostnameCompletion);
}

/// Tag used to group DNS registrations by where they came from, so the DNS
/// manager can order results (spec §4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DnsPriorityTag {
    /// The carrier is a VPN.
    Vpn,
    /// The carrier is the plain best device.
    BestDevice,
}

/// The DNS manager (spec §6). `begin_updates`/`end_updates` bracket a batch
/// of registration changes; nesting is the DNS manager's concern (it
/// reference-counts), the engine's contract is simply "every begin has a
/// matching end on every return path" (spec §4.F).
#[async_trait]
pub trait DnsManagerHandle: Send + Sync {
    /// Begins a batched update window tagged `tag` (for diagnostics).
    async fn begin_updates(&self, tag: &str);

    /// Ends the update window opened by the matching `begin_updates`.
    async fn end_updates(&self, tag: &str);

    /// Registers (or re-registers) an IPv4 config for DNS resolution.
    async fn add_v4_config(
        &self,
        interface: &str,
        config: &crate::model::Ip4ConfigSnapshot,
        tag: DnsPriorityTag,
    );

    /// Registers (or re-registers) an IPv6 config.
    async fn add_v6_config(
        &self,
        interface: &str,
        config: &crate::model::Ip6ConfigSnapshot,
        tag: DnsPriorityTag,
    );

    /// Removes a previously registered IPv4 config by its opaque id.
    async fn remove_v4_config(&self, config_id: u64);

    /// Removes a previously registered IPv6 config by its opaque id.
    async fn remove_v6_config(&self, config_id: u64);

    /// Records the hostname captured at startup.
    async fn set_initial_hostname(&self, hostname: &str);

    /// Informs the DNS manager of a newly committed hostname, so it can
    /// extract the domain suffix into its search list (spec §4.H).
    async fn set_hostname(&self, hostname: &str);
}

/// The firewall coordinator (spec §6); notified whenever a device's default
/// status or zone-relevant state may have changed.
#[async_trait]
pub trait FirewallManagerHandle: Send + Sync {
    /// Re-evaluates and applies the firewall zone for a device.
    async fn update_firewall_zone(&self, device: DeviceId);
}

/// Per-family external arbitrator that knows how to rank devices/sessions by
/// routing suitability (spec §4.E). Injected so the core stays free of
/// routing-table and netlink concerns (spec §1 non-goals).
pub trait DefaultRouteManagerHandle: Send + Sync {
    /// Address family this instance arbitrates for.
    fn family(&self) -> IpFamily;

    /// Picks the best device and session, if any qualify.
    ///
    /// `require_fully_activated` selects between the `default-device`
    /// computation (`true`) and the `activating-device` computation
    /// (`false`) of spec §4.E. `last_default_device` breaks ties in favor of
    /// stability (avoid route flapping between equally-good devices).
    fn best(
        &self,
        devices: &[Arc<dyn DeviceHandle>],
        sessions: &[Arc<dyn ActiveSessionHandle>],
        require_fully_activated: bool,
        last_default_device: Option<DeviceId>,
    ) -> Option<(DeviceId, SessionId)>;
}

/// The dispatcher-script hook (spec §6): fired on a real hostname change.
#[async_trait]
pub trait DispatcherHandle: Send + Sync {
    /// Invokes the dispatcher for the `hostname` action.
    async fn call_hostname_hook(&self);
}

/// Reverse-DNS resolution, the one genuinely long-running async operation
/// the hostname pipeline performs (spec §4.H rung 4).
#[async_trait]
pub trait ReverseDnsResolverHandle: Send + Sync {
    /// Resolves `address` to a hostname, honoring `cancel` — implementations
    /// must treat cancellation as a silent abort, returning `Err` only for
    /// genuine resolution failure.
    async fn resolve(
        &self,
        address: std::net::IpAddr,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Result<String, ()>;
}

/// Kernel hostname access, used only as a fallback when the settings store
/// has no hostnamed proxy available (spec §4.H).
pub trait KernelHandle: Send + Sync {
    /// Reads the current kernel hostname.
    fn gethostname(&self) -> String;

    /// Sets the kernel hostname directly.
    ///
    /// # Errors
    ///
    /// Returns a human-readable error (e.g. `"EPERM"`) if the platform call
    /// fails, typically due to insufficient privilege.
    fn sethostname(&self, name: &str) -> Result<(), String>;
}

/// A handle to a task submitted to a [`SchedulerHandle`]; cancelling frees
/// the task's captured state exactly once (spec §5's cancellation
/// contract), whether or not the task had already run.
pub struct TaskHandle {
    cancel: tokio_util::sync::CancellationToken,
    join: Option<tokio::task::JoinHandle<()>>,
}

impl TaskHandle {
    /// Wraps a spawned task and its cancellation token.
    #[must_use]
    pub fn new(
        cancel: tokio_util::sync::CancellationToken,
        join: tokio::task::JoinHandle<()>,
    ) -> Self {
        Self {
            cancel,
            join: Some(join),
        }
    }

    /// Cancels the task if it hasn't run yet, and detaches its join handle.
    /// Idempotent.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        if let Some(join) = self.join.take() {
            join.abort();
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// The three suspension points of spec §5: idle activate-all, idle
/// per-device auto-activate, and the reverse-DNS callback all go through
/// this abstraction instead of raw `tokio::spawn`, so tests can drive them
/// deterministically (design note §9).
pub trait SchedulerHandle: Send + Sync {
    /// Schedules `task` to run on the next idle turn of the event loop.
    fn schedule_idle(&self, task: BoxTask) -> TaskHandle;

    /// Schedules `task` to run after `delay`.
    fn schedule_after(&self, delay: Duration, task: BoxTask) -> TaskHandle;
}

/// A [`SchedulerHandle`] backed by real `tokio` tasks, suitable for a
/// production host.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

impl SchedulerHandle for TokioScheduler {
    fn schedule_idle(&self, task: BoxTask) -> TaskHandle {
        let token = tokio_util::sync::CancellationToken::new();
        let child = token.clone();
        let join = tokio::spawn(async move {
            tokio::select! {
                () = child.cancelled() => {}
                () = task => {}
            }
        });
        TaskHandle::new(token, join)
    }

    fn schedule_after(&self, delay: Duration, task: BoxTask) -> TaskHandle {
        let token = tokio_util::sync::CancellationToken::new();
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
