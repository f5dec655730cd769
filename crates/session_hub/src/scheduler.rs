//! Periodic job scheduler.
//!
//! Each job runs on its own tokio task, ticking at a fixed period. The first
//! run happens one period after scheduling. A job that overruns delays the
//! next tick instead of triggering a burst of catch-up runs.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

/// Runs callbacks on fixed intervals until shut down.
#[derive(Debug)]
pub struct Scheduler {
    shutdown: watch::Sender<bool>,
    jobs: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shutdown,
            jobs: Mutex::new(Vec::new()),
        }
    }

    /// Schedules `job` to run every `period`.
    pub fn every<F, Fut>(&self, period: Duration, mut job: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut shutdown = self.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => job().await,
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("Scheduled job stopped");
        });

        if let Ok(mut jobs) = self.jobs.lock() {
            jobs.retain(|job| !job.is_finished());
            jobs.push(handle);
        }
    }

    pub fn job_count(&self) -> usize {
        self.jobs
            .lock()
            .map(|jobs| jobs.iter().filter(|job| !job.is_finished()).count())
            .unwrap_or(0)
    }

    /// Stops every scheduled job after its current run.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn runs_on_every_period() {
        let scheduler = Scheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();

        scheduler.every(Duration::from_secs(5), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        // nothing runs before the first period elapses
        tokio::time::sleep(Duration::from_millis(4900)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(10_200)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert_eq!(scheduler.job_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_jobs() {
        let scheduler = Scheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();

        scheduler.every(Duration::from_secs(1), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(1500)).await;
        scheduler.shutdown();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.job_count(), 0);
    }
}
