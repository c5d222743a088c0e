//! Component D: retry scheduler (spec §4.D).
//!
//! The counters themselves live in the settings store; this component only
//! decides *when* to touch them and owns the single shared timer handle that
//! replaces an exploded per-profile timer fan-out.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument};

use crate::collaborators::{BoxTask, SchedulerHandle, SettingsStoreHandle, TaskHandle};
use crate::ids::ProfileUuid;
use crate::model::{AutoconnectBlockedReason, DeviceStateReason};

/// Tracks the single shared retry timer and exposes the state-transition
/// hooks §4.D drives it from. The timer slot is behind an `Arc` so the
/// fired task can clear (and, if more future retries remain, reschedule)
/// itself without needing a `'static` handle back to the scheduler.
pub struct RetryScheduler {
    timer: Arc<std::sync::Mutex<Option<TaskHandle>>>,
}

impl Default for RetryScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryScheduler {
    /// Creates a scheduler with no timer pending.
    #[must_use]
    pub fn new() -> Self {
        Self {
            timer: Arc::new(std::sync::Mutex::new(None)),
        }
    }

    /// Entering `failed` from a state in `[prepare, activated]` (spec §4.D).
    #[instrument(skip(self, settings, scheduler, on_fleet_reset), fields(%profile))]
    pub async fn on_device_failed(
        &self,
        profile: &ProfileUuid,
        reason: DeviceStateReason,
        settings: &Arc<dyn SettingsStoreHandle>,
        scheduler: &Arc<dyn SchedulerHandle>,
        on_fleet_reset: impl Fn() + Send + Sync + 'static,
    ) {
        if reason == DeviceStateReason::NoSecrets {
            settings
                .set_blocked_reason(profile, AutoconnectBlockedReason::NoSecrets)
                .await;
        } else {
            let remaining = settings.decrement_retries(profile).await;
            if remaining == 0 {
                let on_fleet_reset: Arc<dyn Fn() + Send + Sync> = Arc::new(on_fleet_reset);
                self.ensure_timer_scheduled(settings, scheduler, on_fleet_reset)
                    .await;
            }
        }

        settings.clear_secrets(profile).await;
    }

    /// Entering `activated` (spec §4.D).
    pub async fn on_device_activated(&self, profile: &ProfileUuid, settings: &Arc<dyn SettingsStoreHandle>) {
        settings.reset_retries(profile).await;
        settings.clear_secrets(profile).await;
    }

    /// Entering `ip-config` (spec §4.D: reaching this state proves secrets
    /// worked).
    pub async fn on_device_ip_config(&self, profile: &ProfileUuid, settings: &Arc<dyn SettingsStoreHandle>) {
        settings
            .set_blocked_reason(profile, AutoconnectBlockedReason::None)
            .await;
    }

    /// A secret agent registered: resets only profiles blocked on
    /// *no-secrets* (spec §4.D).
    pub async fn on_secret_agent_registered(&self, settings: &Arc<dyn SettingsStoreHandle>) -> bool {
        let mut changed = false;
        for profile in settings.profiles().await {
            if profile.autoconnect_blocked_reason == AutoconnectBlockedReason::NoSecrets {
                settings.reset_retries(&profile.uuid).await;
                settings
                    .set_blocked_reason(&profile.uuid, AutoconnectBlockedReason::None)
                    .await;
                changed = true;
            }
        }
        changed
    }

    /// Manager entered *sleeping* or *networking-disabled*: resets every
    /// profile unconditionally (spec §4.D).
    pub async fn on_sleeping_or_networking_disabled(&self, settings: &Arc<dyn SettingsStoreHandle>) {
        for profile in settings.profiles().await {
            settings.reset_retries(&profile.uuid).await;
        }
    }

    /// A profile was updated by the user: resets that profile (spec §4.D).
    pub async fn on_profile_updated_by_user(&self, profile: &ProfileUuid, settings: &Arc<dyn SettingsStoreHandle>) {
        settings.reset_retries(profile).await;
    }

    /// Carrier came up on a device: resets only profiles compatible with it.
    /// Compatibility is expressed by the caller as an already-filtered list
    /// of profile uuids, since "compatible with this device" is a
    /// device-permits question the decider already knows how to ask.
    pub async fn on_carrier_up(&self, compatible: &[ProfileUuid], settings: &Arc<dyn SettingsStoreHandle>) {
        for uuid in compatible {
            settings.reset_retries(uuid).await;
        }
    }

    async fn ensure_timer_scheduled(
        &self,
        settings: &Arc<dyn SettingsStoreHandle>,
        scheduler: &Arc<dyn SchedulerHandle>,
        on_fleet_reset: Arc<dyn Fn() + Send + Sync>,
    ) {
        let already_pending = self
            .timer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .is_some();
        if already_pending {
            debug!("retry timer already pending, not scheduling another");
            return;
        }

        let Some(delay) = earliest_future_retry_delay(settings).await else {
            return;
        };

        let task: BoxTask = fire_retry_timer(
            Arc::clone(settings),
            Arc::clone(scheduler),
            Arc::clone(&self.timer),
            on_fleet_reset,
        );
        *self.timer.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(scheduler.schedule_after(delay, task));
    }
}

async fn earliest_future_retry_delay(settings: &Arc<dyn SettingsStoreHandle>) -> Option<Duration> {
    let profiles = settings.profiles().await;
    let now = monotonic_now_seconds();
    profiles
        .iter()
        .map(|p| p.autoconnect_retry_time)
        .filter(|&t| t > now)
        .min()
        .map(|t| Duration::from_secs(t - now))
}

/// Seconds since an arbitrary fixed epoch, monotonic for the lifetime of the
/// process. A real host backs this with `CLOCK_MONOTONIC`; tests supply
/// profiles with `autoconnect_retry_time` relative to their own fake clock,
/// so this function is never on the hot path of a test scenario.
fn monotonic_now_seconds() -> u64 {
    use std::time::Instant;
    thread_local! {
        static START: Instant = Instant::now();
    }
    START.with(Instant::elapsed).as_secs()
}

/// Runs when a scheduled retry timer fires: resets every profile whose
/// retry time has passed, then clears this scheduler's timer slot and, if
/// any profile still has a future retry time, schedules the next one —
/// spec §4.D requires the timer be rescheduled for the next earliest
/// future retry time, not left permanently consumed after one firing.
fn fire_retry_timer(
    settings: Arc<dyn SettingsStoreHandle>,
    scheduler: Arc<dyn SchedulerHandle>,
    timer_slot: Arc<std::sync::Mutex<Option<TaskHandle>>>,
    on_fleet_reset: Arc<dyn Fn() + Send + Sync>,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        let profiles = settings.profiles().await;
        let now = monotonic_now_seconds();

        let mut changed = false;
        for profile in &profiles {
            if profile.autoconnect_retry_time <= now && profile.autoconnect_retry_time > 0 {
                settings.reset_retries(&profile.uuid).await;
                changed = true;
            }
        }

        *timer_slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = None;

        if changed {
            on_fleet_reset();
        }

        if let Some(delay) = earliest_future_retry_delay(&settings).await {
            let task: BoxTask = fire_retry_timer(
                Arc::clone(&settings),
                Arc::clone(&scheduler),
                Arc::clone(&timer_slot),
                on_fleet_reset,
            );
            *timer_slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner) =
                Some(scheduler.schedule_after(delay, task));
        }
    })
}
