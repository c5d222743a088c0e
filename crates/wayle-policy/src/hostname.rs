//! Component H: hostname pipeline (spec §4.H).

use std::net::IpAddr;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::collaborators::{
    BoxTask, DispatcherHandle, DnsManagerHandle, KernelHandle, ReverseDnsResolverHandle,
    SchedulerHandle, SettingsStoreHandle, TaskHandle,
};
use crate::model::DeviceHandle;

/// The hostname that rung 4 falls back to when reverse-DNS fails (spec
/// §4.H).
pub const FALLBACK_HOSTNAME: &str = "localhost.localdomain";

/// Well-known placeholder values that do not count as a "specific hostname"
/// for precedence purposes (spec §4.H rungs 1 and 3).
fn is_specific_hostname(name: &str) -> bool {
    !matches!(name.trim(), "" | "(none)" | "localhost" | "localhost.localdomain")
}

/// Result of evaluating the precedence ladder up to, but not including, the
/// asynchronous reverse-DNS rung.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LadderOutcome {
    /// A rung 1-3 hostname won outright.
    Resolved(String),
    /// No earlier rung matched; reverse-DNS should be attempted against
    /// these addresses (v4 preferred over v6, per the recorded open
    /// question).
    NeedsReverseLookup {
        /// Primary v4 address of the best fully-activated v4 device.
        v4: Option<std::net::Ipv4Addr>,
        /// Primary v6 address of the best fully-activated v6 device, used
        /// only when `v4` is absent.
        v6: Option<std::net::Ipv6Addr>,
    },
}

/// Evaluates rungs 1-3 of the precedence ladder (spec §4.H). Pure and
/// synchronous so it can be unit-tested without any collaborators.
pub fn evaluate_ladder(
    configured_hostname: Option<&str>,
    best_v4_device: Option<&Arc<dyn DeviceHandle>>,
    best_v6_device: Option<&Arc<dyn DeviceHandle>>,
    original_at_startup: Option<&str>,
) -> LadderOutcome {
    if let Some(configured) = configured_hostname
        && is_specific_hostname(configured)
    {
        return LadderOutcome::Resolved(configured.to_string());
    }

    if let Some(device) = best_v4_device
        && let Some(dhcp) = device.dhcp4_config().and_then(|c| c.host_name)
    {
        let stripped = dhcp.trim_start();
        if !stripped.trim().is_empty() {
            return LadderOutcome::Resolved(stripped.to_string());
        }
        warn!("dhcpv4 host_name was empty after stripping, continuing the ladder");
    }
    if let Some(device) = best_v6_device
        && let Some(dhcp) = device.dhcp6_config().and_then(|c| c.host_name)
    {
        let stripped = dhcp.trim_start();
        if !stripped.trim().is_empty() {
            return LadderOutcome::Resolved(stripped.to_string());
        }
        warn!("dhcpv6 host_name was empty after stripping, continuing the ladder");
    }

    if let Some(original) = original_at_startup
        && is_specific_hostname(original)
    {
        return LadderOutcome::Resolved(original.to_string());
    }

    let v4 = best_v4_device.and_then(|d| d.ip4_config(false)).and_then(|c| c.primary_address);
    let v6 = if v4.is_none() {
        best_v6_device.and_then(|d| d.ip6_config(false)).and_then(|c| c.primary_address)
    } else {
        None
    };
    LadderOutcome::NeedsReverseLookup { v4, v6 }
}

struct State {
    original_at_startup: Option<String>,
    desired: Option<String>,
    ever_set: bool,
    lookup: Option<TaskHandle>,
}

/// Drives the precedence ladder end to end, including the cancellable
/// reverse-DNS rung and the committing setter.
pub struct HostnamePipeline {
    state: Mutex<State>,
}

impl HostnamePipeline {
    /// Creates a pipeline, recording the hostname observed at startup.
    #[must_use]
    pub fn new(original_at_startup: Option<String>) -> Self {
        Self {
            state: Mutex::new(State {
                original_at_startup,
                desired: None,
                ever_set: false,
                lookup: None,
            }),
        }
    }

    /// Cancels any in-flight reverse-DNS lookup (spec §5: fired on engine
    /// dispose or any upstream invalidator).
    pub fn cancel_pending_lookup(&self) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(mut handle) = state.lookup.take() {
            handle.cancel();
        }
    }

    /// Re-evaluates the ladder and, if rung 4 is reached, issues a fresh
    /// reverse-DNS lookup (cancelling any prior one first).
    #[instrument(skip_all)]
    #[allow(clippy::too_many_arguments)]
    pub fn recompute(
        self: &Arc<Self>,
        configured_hostname: Option<String>,
        best_v4_device: Option<Arc<dyn DeviceHandle>>,
        best_v6_device: Option<Arc<dyn DeviceHandle>>,
        settings: Arc<dyn SettingsStoreHandle>,
        dns_manager: Arc<dyn DnsManagerHandle>,
        kernel: Arc<dyn KernelHandle>,
        dispatcher: Arc<dyn DispatcherHandle>,
        resolver: Arc<dyn ReverseDnsResolverHandle>,
        scheduler: Arc<dyn SchedulerHandle>,
    ) {
        self.cancel_pending_lookup();

        let original = {
            let state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            state.original_at_startup.clone()
        };

        let outcome = evaluate_ladder(
            configured_hostname.as_deref(),
            best_v4_device.as_ref(),
            best_v6_device.as_ref(),
            original.as_deref(),
        );

        match outcome {
            LadderOutcome::Resolved(name) => {
                let pipeline = Arc::clone(self);
                tokio::spawn(async move {
                    pipeline
                        .commit(name, settings, dns_manager, kernel, dispatcher)
                        .await;
                });
            }
            LadderOutcome::NeedsReverseLookup { v4, v6 } => {
                let Some(address) = v4.map(IpAddr::V4).or(v6.map(IpAddr::V6)) else {
                    debug!("no address available for reverse lookup, leaving hostname as-is");
                    return;
                };

                let cancel = CancellationToken::new();
                let pipeline = Arc::clone(self);
                let lookup_cancel = cancel.clone();
                let task: BoxTask = Box::pin(async move {
                    let result = resolver.resolve(address, lookup_cancel.clone()).await;
                    if lookup_cancel.is_cancelled() {
                        return;
                    }
                    let name = result.unwrap_or_else(|()| FALLBACK_HOSTNAME.to_string());
                    pipeline.commit(name, settings, dns_manager, kernel, dispatcher).await;
                });
                let handle = scheduler.schedule_idle(task);

                let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                state.lookup = Some(handle);
            }
        }
    }

    /// The setter (spec §4.H): no-op checks, commit, kernel apply, dispatcher
    /// hook.
    async fn commit(
        &self,
        name: String,
        settings: Arc<dyn SettingsStoreHandle>,
        dns_manager: Arc<dyn DnsManagerHandle>,
        kernel: Arc<dyn KernelHandle>,
        dispatcher: Arc<dyn DispatcherHandle>,
    ) {
        {
            let state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if !state.ever_set && state.original_at_startup.as_deref() == Some(name.as_str()) {
                debug!(%name, "hostname matches original and was never set, no-op");
                return;
            }
            if state.desired.as_deref() == Some(name.as_str()) {
                debug!(%name, "hostname already desired, no-op");
                return;
            }
        }

        {
            let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            state.desired = Some(name.clone());
            state.ever_set = true;
        }

        dns_manager.set_hostname(&name).await;

        let (tx, rx) = tokio::sync::oneshot::channel();
        let name_for_store = name.clone();
        settings
            .set_transient_hostname(
                &name_for_store,
                Box::new(move |result| {
                    let _ = tx.send(result);
                }),
            )
            .await;

        match rx.await {
            Ok(Ok(())) => {}
            _ => {
                if let Err(reason) = kernel.sethostname(&name) {
                    warn!(
                        %name,
                        %reason,
                        "sethostname failed, a privileged hostname daemon (hostnamed) is required"
                    );
                }
            }
        }

        info!(%name, "hostname committed");
        dispatcher.call_hostname_hook().await;
    }
}
