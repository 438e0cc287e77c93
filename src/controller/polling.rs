//! Background polling as a scoped resource

use std::future::Future;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};

/// A running poll loop; aborted when stopped or dropped
#[derive(Debug)]
pub struct PollingHandle {
    task: Option<JoinHandle<()>>,
    period: Duration,
}

impl PollingHandle {
    /// Spawn a loop calling `tick` every `period`, starting one period from now
    ///
    /// `tick` returns `None` to end the loop (its owner is gone). Each tick's
    /// work runs as its own task, so a slow or hung fetch never holds back the
    /// next tick. In-flight work is aborted with the loop. Must be called from
    /// within a tokio runtime and with a non-zero period.
    pub(crate) fn spawn<F, Fut>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Option<Fut> + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut in_flight = JoinSet::new();
            loop {
                interval.tick().await;
                while in_flight.try_join_next().is_some() {}
                let Some(work) = tick() else {
                    break;
                };
                in_flight.spawn(work);
            }
        });
        Self {
            task: Some(task),
            period,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!(period_ms = self.period.as_millis() as u64, "Polling stopped");
        }
    }
}

impl Drop for PollingHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
