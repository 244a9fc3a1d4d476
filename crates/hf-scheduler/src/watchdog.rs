//! Silence Watchdog (spec.md §4.9(f)): detects Runs that have gone quiet
//! and invokes registered callbacks. The periodic wait is cancellable and
//! never holds the activity-map lock while sleeping.

use hf_agent::CancellationToken;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

pub struct SilenceWatchdog {
    last_activity: Mutex<HashMap<String, Instant>>,
    threshold: Duration,
}

impl SilenceWatchdog {
    pub fn new(threshold: Duration) -> Self {
        SilenceWatchdog {
            last_activity: Mutex::new(HashMap::new()),
            threshold,
        }
    }

    /// The spec's documented default: 60 seconds.
    pub fn with_default_threshold() -> Self {
        Self::new(Duration::from_secs(60))
    }

    pub async fn register_run(&self, run_id: &str) {
        self.last_activity.lock().await.insert(run_id.to_string(), Instant::now());
    }

    pub async fn unregister_run(&self, run_id: &str) {
        self.last_activity.lock().await.remove(run_id);
    }

    /// Refreshed by any appended event for the Run.
    pub async fn touch(&self, run_id: &str) {
        if let Some(t) = self.last_activity.lock().await.get_mut(run_id) {
            *t = Instant::now();
        }
    }

    pub async fn breached_runs(&self) -> Vec<String> {
        let now = Instant::now();
        self.last_activity
            .lock()
            .await
            .iter()
            .filter(|(_, t)| now.saturating_duration_since(**t) >= self.threshold)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Runs until `cancellation` fires, checking for breaches once per
    /// `threshold` interval. The sleep happens without holding the
    /// activity-map lock.
    pub async fn run_loop(&self, cancellation: &CancellationToken, mut on_breach: impl FnMut(&str)) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.threshold) => {}
                _ = cancellation.cancelled() => return,
            }
            for run_id in self.breached_runs().await {
                on_breach(&run_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_registration_is_not_breached() {
        let watchdog = SilenceWatchdog::new(Duration::from_secs(60));
        watchdog.register_run("run-1").await;
        assert!(watchdog.breached_runs().await.is_empty());
    }

    #[tokio::test]
    async fn stale_run_is_breached() {
        let watchdog = SilenceWatchdog::new(Duration::from_millis(5));
        watchdog.register_run("run-1").await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(watchdog.breached_runs().await, vec!["run-1".to_string()]);
    }

    #[tokio::test]
    async fn touch_resets_the_clock() {
        let watchdog = SilenceWatchdog::new(Duration::from_millis(20));
        watchdog.register_run("run-1").await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        watchdog.touch("run-1").await;
        tokio::time::sleep(Duration::from_millis(15)).await;
        assert!(watchdog.breached_runs().await.is_empty());
    }

    #[tokio::test]
    async fn unregistered_run_never_breaches() {
        let watchdog = SilenceWatchdog::new(Duration::from_millis(5));
        watchdog.register_run("run-1").await;
        watchdog.unregister_run("run-1").await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(watchdog.breached_runs().await.is_empty());
    }

    #[tokio::test]
    async fn run_loop_exits_on_cancellation() {
        let watchdog = SilenceWatchdog::new(Duration::from_millis(5));
        let cancellation = CancellationToken::new();
        let cancel_clone = cancellation.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel_clone.cancel();
        });
        watchdog.run_loop(&cancellation, |_| {}).await;
    }
}
