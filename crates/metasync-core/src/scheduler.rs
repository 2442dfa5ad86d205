use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::orchestrator::SyncOrchestrator;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Periodic [`SyncOrchestrator::refresh_all`] on a background task.
///
/// The first refresh runs immediately. A refresh that overruns the interval
/// delays the next tick instead of bursting.
pub struct RefreshScheduler {
    orchestrator: SyncOrchestrator,
    interval: Duration,
}

impl RefreshScheduler {
    pub fn new(orchestrator: SyncOrchestrator, interval: Duration) -> Self {
        Self {
            orchestrator,
            interval: interval.max(MIN_INTERVAL),
        }
    }

    pub const fn interval(&self) -> Duration {
        self.interval
    }

    pub fn start(self) -> SchedulerHandle {
        let (stop, mut stopped) = watch::channel(false);
        let Self {
            orchestrator,
            interval,
        } = self;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut runs = 0_u64;

            loop {
                tokio::select! {
                    _ = stopped.changed() => break,
                    _ = ticker.tick() => {
                        let summary = orchestrator.refresh_all().await;
                        runs += 1;
                        tracing::info!(
                            run = runs,
                            patch = summary.patch.as_ref().map(|patch| patch.as_str()),
                            "scheduled refresh finished"
                        );
                    }
                }
            }

            tracing::debug!(runs, "scheduler stopped");
            runs
        });

        SchedulerHandle { stop, task }
    }
}

/// Stops the scheduler task started by [`RefreshScheduler::start`].
pub struct SchedulerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<u64>,
}

impl SchedulerHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Waits for an in-progress refresh, then returns how many refreshes ran.
    pub async fn stop(self) -> u64 {
        let _ = self.stop.send(true);
        match self.task.await {
            Ok(runs) => runs,
            Err(error) => {
                tracing::warn!(%error, "scheduler task did not complete");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_until_stopped() {
        let orchestrator = SyncOrchestrator::builder().with_offline_fixtures().build();
        let handle = RefreshScheduler::new(orchestrator.clone(), Duration::from_millis(50)).start();

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(handle.is_running());
        let runs = handle.stop().await;

        assert!(runs >= 1);
        assert!(orchestrator.is_offline_data_available(None).await);
    }

    #[test]
    fn zero_interval_is_clamped() {
        let orchestrator = SyncOrchestrator::builder().build();
        let scheduler = RefreshScheduler::new(orchestrator, Duration::ZERO);
        assert_eq!(scheduler.interval(), MIN_INTERVAL);
    }
}
