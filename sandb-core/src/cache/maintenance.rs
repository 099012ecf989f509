//! Background eviction task

use super::SegmentCache;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Handle to a running maintenance task
pub struct MaintenanceHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl MaintenanceHandle {
    /// Spawn a task on the current tokio runtime that runs
    /// [`SegmentCache::run_maintenance`] every `period`.
    pub fn spawn(cache: Arc<SegmentCache>, period: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            debug!("Cache maintenance started (period {:?})", period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let report = cache.run_maintenance();
                        if report.total() > 0 {
                            info!(
                                "Cache maintenance evicted {} segments ({} by count, {} by size)",
                                report.total(),
                                report.by_count,
                                report.by_size
                            );
                        }
                    }
                }
            }
            debug!("Cache maintenance stopped");
        });

        Self { cancel, join }
    }

    /// Check if the task has exited
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Stop the task and wait for it to exit
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.join.await {
            warn!("Cache maintenance task failed: {}", e);
        }
    }
}
