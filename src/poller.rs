use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::api::{ChatApi, TokenUsageStats};

/// Periodic token-usage refresh for the admin view. The task is aborted by
/// `stop()` or on drop so a torn-down view cannot leak its timer.
pub struct UsagePoller {
    latest: Arc<RwLock<Option<TokenUsageStats>>>,
    task: tokio::task::JoinHandle<()>,
}

impl UsagePoller {
    pub fn start(api: ChatApi, every: Duration) -> Self {
        let latest: Arc<RwLock<Option<TokenUsageStats>>> = Arc::new(RwLock::new(None));
        let slot = latest.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                match api.token_usage().await {
                    Ok(stats) => *slot.write() = Some(stats),
                    Err(e) => log::warn!("token usage refresh failed: {e}"),
                }
            }
        });
        Self { latest, task }
    }

    pub fn latest(&self) -> Option<TokenUsageStats> {
        self.latest.read().clone()
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for UsagePoller {
    fn drop(&mut self) {
        self.task.abort();
    }
}
