//! Component F: DNS-update driver (spec §4.F).
//!
//! Brackets a batch of DNS manager mutations in matched begin/end calls on
//! every return path, including early returns and panics that unwind through
//! it, by tying the `end_updates` call to an RAII guard's `Drop`.

use std::sync::Arc;

use crate::collaborators::DnsManagerHandle;

/// Holds open a DNS manager update window until dropped.
///
/// `end_updates` cannot be awaited from `Drop`, so the guard spawns it as a
/// detached task on drop; callers that need the end call's completion
/// observed should call [`DnsUpdateGuard::finish`] explicitly instead of
/// relying on drop.
pub struct DnsUpdateGuard {
    dns_manager: Arc<dyn DnsManagerHandle>,
    tag: &'static str,
    finished: bool,
}

impl DnsUpdateGuard {
    /// Opens a new update window tagged `tag`.
    pub async fn begin(dns_manager: Arc<dyn DnsManagerHandle>, tag: &'static str) -> Self {
        dns_manager.begin_updates(tag).await;
        Self {
            dns_manager,
            tag,
            finished: false,
        }
    }

    /// Closes the update window, awaiting the matching `end_updates` call.
    pub async fn finish(mut self) {
        self.dns_manager.end_updates(self.tag).await;
        self.finished = true;
    }
}

impl Drop for DnsUpdateGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let dns_manager = Arc::clone(&self.dns_manager);
        let tag = self.tag;
        tokio::spawn(async move {
            dns_manager.end_updates(tag).await;
        });
    }
}
