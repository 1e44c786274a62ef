// ─── Status Poller ───
// Periodically reads the status file of the running instance.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use super::store::{read_status, StatusReport};

#[derive(Debug, Clone, Copy)]
pub struct PollerConfig {
    pub interval: Duration,
    /// Freshness window for the status timestamp.
    pub stale_after: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            stale_after: Duration::from_secs(5),
        }
    }
}

/// Background task bound to one data directory.
///
/// Owned by the process monitor, which stops it before reporting the
/// terminal outcome, so a poller never outlives its process.
pub struct StatusPoller {
    data_dir: PathBuf,
    handle: JoinHandle<()>,
}

impl StatusPoller {
    /// Start polling. `report` receives every non-pending result, in order.
    pub fn spawn<F>(data_dir: PathBuf, config: PollerConfig, report: F) -> Self
    where
        F: Fn(StatusReport) + Send + 'static,
    {
        let dir = data_dir.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let status = read_status(&dir).await;
                match StatusReport::evaluate(status.as_ref(), Utc::now(), config.stale_after) {
                    // Keep whatever is currently displayed.
                    StatusReport::Pending => {}
                    other => report(other),
                }
            }
        });

        debug!("Status poller started for {:?}", data_dir);
        Self { data_dir, handle }
    }

    /// Cancel the task and wait until it is gone.
    pub async fn stop(self) {
        self.handle.abort();
        let _ = self.handle.await;
        debug!("Status poller stopped for {:?}", self.data_dir);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::status::GameState;
    use tokio::sync::mpsc;

    fn fast_config() -> PollerConfig {
        PollerConfig {
            interval: Duration::from_millis(20),
            stale_after: Duration::from_secs(5),
        }
    }

    fn write_status(dir: &std::path::Path, state: &str, score: i64, age_secs: f64) {
        let timestamp = Utc::now().timestamp_millis() as f64 / 1000.0 - age_secs;
        std::fs::write(
            dir.join("status.json"),
            format!(r#"{{"state":"{state}","score":{score},"timestamp":{timestamp}}}"#),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn reports_fresh_status() {
        let dir = tempfile::tempdir().unwrap();
        write_status(dir.path(), "playing", 42, 1.0);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let poller = StatusPoller::spawn(dir.path().to_path_buf(), fast_config(), move |r| {
            let _ = tx.send(r);
        });

        let report = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            report,
            StatusReport::Game {
                state: GameState::Playing,
                score: 42
            }
        );
        poller.stop().await;
    }

    #[tokio::test]
    async fn reports_timeout_for_stale_file() {
        let dir = tempfile::tempdir().unwrap();
        write_status(dir.path(), "playing", 5, 6.0);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let poller = StatusPoller::spawn(dir.path().to_path_buf(), fast_config(), move |r| {
            let _ = tx.send(r);
        });

        let report = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report, StatusReport::TimedOut);
        poller.stop().await;
    }

    #[tokio::test]
    async fn absent_file_reports_nothing_and_stop_ends_the_task() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let poller = StatusPoller::spawn(dir.path().to_path_buf(), fast_config(), move |r| {
            let _ = tx.send(r);
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
        assert!(!poller.handle.is_finished());

        poller.stop().await;
        // The closure (and its sender) is dropped with the task.
        assert!(rx.recv().await.is_none());
    }
}
