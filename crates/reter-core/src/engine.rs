//! Trigger engine
//!
//! One control loop per registered task. The loop owns the timing (fixed
//! interval or daily wall-clock time) and hands every firing to the
//! [`ExecutionGate`]. Attempts within one loop are strictly sequential and
//! cancellation always wins over a ready timer.

use chrono::{DateTime, Local, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::gate::{ExecutionGate, RunWindow};
use crate::logger::TaskLogger;
use crate::task::{TaskDescriptor, Trigger};
use crate::time::TimeOfDay;

/// Default wait before retrying a failed daily occurrence
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(3);

/// Drives task loops until the shared cancellation token fires
pub struct TriggerEngine {
    gate: Arc<ExecutionGate>,
    logger: Arc<dyn TaskLogger>,
    cancel: CancellationToken,
    retry_backoff: Duration,
}

impl TriggerEngine {
    /// Create an engine
    pub fn new(
        gate: Arc<ExecutionGate>,
        logger: Arc<dyn TaskLogger>,
        cancel: CancellationToken,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            gate,
            logger,
            cancel,
            retry_backoff,
        }
    }

    /// Run the loop of `task` until cancellation
    pub async fn run(&self, task: &TaskDescriptor) {
        let name = task.name();
        self.logger
            .info(name, &format!("run task ({})", task.trigger()));

        match task.trigger() {
            Trigger::Interval(period) => self.run_interval(task, period).await,
            Trigger::Daily(at) => self.run_daily(task, at).await,
        }

        self.logger.info(name, "task has been finished");
    }

    /// Sleep for `duration`; false when cancelled first
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    async fn run_interval(&self, task: &TaskDescriptor, period: Duration) {
        let Some(start) = Instant::now().checked_add(period) else {
            // first tick lies beyond the representable future
            self.cancel.cancelled().await;
            return;
        };

        let mut ticker = tokio::time::interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    // failures are logged by the gate; the loop keeps its cadence
                    if let Ok(outcome) = self.gate.attempt(task, RunWindow::Interval(period)).await {
                        trace!(task = %task.name(), ?outcome, "interval attempt finished");
                    }
                }
            }
        }
    }

    async fn run_daily(&self, task: &TaskDescriptor, at: TimeOfDay) {
        let name = task.name();
        let mut earliest = self.gate.clock().now();

        loop {
            let target = next_daily_target(at, earliest);
            let wait = (target - self.gate.clock().now())
                .to_std()
                .unwrap_or(Duration::ZERO);
            self.logger
                .debug(name, &format!("next run at {}", target.to_rfc3339()));

            if !self.pause(wait).await {
                return;
            }

            while let Err(err) = self
                .gate
                .attempt(task, RunWindow::Occurrence(target))
                .await
            {
                self.logger.debug(
                    name,
                    &format!("retrying in {:?} after: {}", self.retry_backoff, err),
                );
                if !self.pause(self.retry_backoff).await {
                    return;
                }
            }

            earliest = target + chrono::Duration::seconds(1);
        }
    }
}

/// First occurrence of `at` in local time that is not before `earliest`
fn next_daily_target(at: TimeOfDay, earliest: DateTime<Utc>) -> DateTime<Utc> {
    at.next_occurrence(&earliest.with_timezone(&Local))
        .with_timezone(&Utc)
}
