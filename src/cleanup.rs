//! Scheduled cleanup of expired refresh records and idle rate-limit state.

use crate::db::Database;
use crate::rate_limit::RateLimitConfig;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{error, info};

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Run all cleanup tasks once.
pub async fn run_cleanup(db: &Database, rate_limits: Option<&RateLimitConfig>) {
    // Expired refresh records, including ones left behind by a failed rotation
    match db.refresh_tokens().delete_expired(now_secs()).await {
        Ok(count) if count > 0 => info!(count, "Cleaned up expired refresh tokens"),
        Ok(_) => {}
        Err(e) => error!(error = %e, "Failed to clean up expired refresh tokens"),
    }

    if let Some(rate_limits) = rate_limits {
        rate_limits.retain_recent();
    }
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(
    db: Database,
    rate_limits: Arc<RateLimitConfig>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
        // The first tick completes immediately; startup already ran a pass.
        interval.tick().await;

        loop {
            interval.tick().await;
            run_cleanup(&db, Some(&rate_limits)).await;
        }
    })
}
