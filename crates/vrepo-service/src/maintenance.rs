//! Periodic version retention.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::repository::RepositoryService;

/// Handle to the background cleanup loop.
#[derive(Debug)]
pub struct CleanupTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl CleanupTask {
    /// Signal the loop to stop and wait for it to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Version cleanup task ended abnormally");
        }
    }

    /// Whether the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Run [`RepositoryService::cleanup_old_versions`] every `interval` until
/// `cancel` fires. The first run happens one interval after start.
/// Failures are logged and the loop keeps going.
pub fn spawn_version_cleanup(
    service: RepositoryService,
    interval: Duration,
    cancel: CancellationToken,
) -> CleanupTask {
    let token = cancel.clone();
    let handle = tokio::spawn(async move {
        info!(interval_secs = interval.as_secs_f64(), "Version cleanup task started");
        let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    match service.cleanup_old_versions().await {
                        Ok(removed) => info!(removed, "Scheduled version cleanup finished"),
                        Err(e) => warn!(error = %e, "Scheduled version cleanup failed"),
                    }
                }
            }
        }
        info!("Version cleanup task stopped");
    });
    CleanupTask { cancel, handle }
}
