//! Fluent schedule construction
//!
//! ```ignore
//! scheduler.every(5).minutes().run("cleanup", handler).await?;
//! scheduler.at("22-15-30").run("report", handler).await?;
//! ```
//!
//! The terminal [`ScheduleBuilder::run`] validates the definition, hands it
//! to a [`Runner`] and resolves once the task loop stops.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

use crate::error::{Result, SchedulerError};
use crate::task::{handler_fn, TaskDescriptor, TaskHandler, Trigger};
use crate::time::TimeOfDay;

/// Accepts validated task descriptors and drives them
#[async_trait]
pub trait Runner: Send + Sync {
    /// Register `task` and run its loop until cancellation
    async fn run(&self, task: TaskDescriptor) -> Result<()>;
}

/// Interval count waiting for its unit
#[must_use]
pub struct Every<'a> {
    runner: &'a dyn Runner,
    count: u64,
}

impl<'a> Every<'a> {
    /// Start an interval definition of `count` units
    pub fn new(runner: &'a dyn Runner, count: u64) -> Self {
        Self { runner, count }
    }

    fn unit(self, secs: u64) -> ScheduleBuilder<'a> {
        let period = Duration::from_secs(self.count.saturating_mul(secs));
        ScheduleBuilder::new(self.runner, Ok(Trigger::Interval(period)))
    }

    /// `count` seconds
    pub fn seconds(self) -> ScheduleBuilder<'a> {
        self.unit(1)
    }

    /// `count` minutes
    pub fn minutes(self) -> ScheduleBuilder<'a> {
        self.unit(60)
    }

    /// `count` hours
    pub fn hours(self) -> ScheduleBuilder<'a> {
        self.unit(60 * 60)
    }
}

/// Schedule definition waiting for its name and handler
#[must_use]
pub struct ScheduleBuilder<'a> {
    runner: &'a dyn Runner,
    trigger: Result<Trigger>,
}

impl<'a> ScheduleBuilder<'a> {
    /// Builder over an already chosen trigger (or a deferred definition error)
    pub fn new(runner: &'a dyn Runner, trigger: Result<Trigger>) -> Self {
        Self { runner, trigger }
    }

    /// Fixed interval trigger
    pub fn interval(runner: &'a dyn Runner, period: Duration) -> Self {
        Self::new(runner, Ok(Trigger::Interval(period)))
    }

    /// Daily trigger at `HH-MM` or `HH-MM-SS` local time
    ///
    /// A malformed time is reported by [`ScheduleBuilder::run`].
    pub fn at(runner: &'a dyn Runner, time: &str) -> Self {
        Self::new(runner, TimeOfDay::parse(time).map(Trigger::Daily))
    }

    /// Trigger this builder resolved to
    pub fn trigger(&self) -> Result<Trigger> {
        self.trigger.clone()
    }

    /// Register the task and run it until the scheduler shuts down
    pub async fn run(self, name: impl Into<String>, handler: TaskHandler) -> Result<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(SchedulerError::EmptyTaskName);
        }
        let task = TaskDescriptor::new(name, self.trigger?, handler)?;
        self.runner.run(task).await
    }

    /// Same as [`ScheduleBuilder::run`] with a plain async closure
    pub async fn run_fn<F, Fut>(self, name: impl Into<String>, f: F) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.run(name, handler_fn(f)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records what it was given instead of running it
    #[derive(Default)]
    struct RecordingRunner {
        seen: Mutex<Vec<(String, Trigger)>>,
    }

    #[async_trait]
    impl Runner for RecordingRunner {
        async fn run(&self, task: TaskDescriptor) -> Result<()> {
            self.seen
                .lock()
                .unwrap()
                .push((task.name().to_string(), task.trigger()));
            Ok(())
        }
    }

    fn noop() -> TaskHandler {
        handler_fn(|| async {})
    }

    #[tokio::test]
    async fn test_units_convert_to_intervals() {
        let runner = RecordingRunner::default();

        Every::new(&runner, 2).seconds().run("s", noop()).await.unwrap();
        Every::new(&runner, 3).minutes().run("m", noop()).await.unwrap();
        Every::new(&runner, 1).hours().run("h", noop()).await.unwrap();
        ScheduleBuilder::interval(&runner, Duration::from_millis(250))
            .run_fn("ms", || async {})
            .await
            .unwrap();

        let seen = runner.seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                ("s".to_string(), Trigger::Interval(Duration::from_secs(2))),
                ("m".to_string(), Trigger::Interval(Duration::from_secs(180))),
                ("h".to_string(), Trigger::Interval(Duration::from_secs(3600))),
                ("ms".to_string(), Trigger::Interval(Duration::from_millis(250))),
            ]
        );
    }

    #[tokio::test]
    async fn test_definition_errors_reach_the_caller() {
        let runner = RecordingRunner::default();

        assert_eq!(
            Every::new(&runner, 1).seconds().run("", noop()).await,
            Err(SchedulerError::EmptyTaskName)
        );
        assert_eq!(
            Every::new(&runner, 0).minutes().run("zero", noop()).await,
            Err(SchedulerError::ZeroInterval)
        );
        assert!(matches!(
            ScheduleBuilder::at(&runner, "24-68-00").run("bad", noop()).await,
            Err(SchedulerError::InvalidTimeFormat(_))
        ));
        assert!(matches!(
            ScheduleBuilder::at(&runner, "rude-invalid-string")
                .run("bad", noop())
                .await,
            Err(SchedulerError::InvalidTimeFormat(_))
        ));
        assert!(runner.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_at_builds_daily_trigger() {
        let runner = RecordingRunner::default();
        let builder = ScheduleBuilder::at(&runner, "22-15");
        assert_eq!(
            builder.trigger(),
            Ok(Trigger::Daily(TimeOfDay::new(22, 15, 0).unwrap()))
        );
        builder.run("report", noop()).await.unwrap();
        assert_eq!(runner.seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_huge_counts_saturate() {
        let runner = RecordingRunner::default();
        let builder = Every::new(&runner, u64::MAX).hours();
        assert_eq!(
            builder.trigger(),
            Ok(Trigger::Interval(Duration::from_secs(u64::MAX)))
        );
    }
}
