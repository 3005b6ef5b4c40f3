//! Fleet integration tests
//!
//! Several schedulers in one process share a `MemoryCoordinator`, standing in
//! for separate processes sharing one coordination store.

use chrono::{TimeZone, Utc};
use reter::{MemoryCoordinator, NoopLogger, Scheduler, TokioClock};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Counts runs and the highest number of overlapping runs
#[derive(Default)]
struct Probe {
    runs: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Probe {
    async fn run(&self, work: Duration) {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(work).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Wall clock shared by all members of one test
fn fleet_clock() -> TokioClock {
    TokioClock::starting_at(Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap())
}

fn member(store: &MemoryCoordinator, clock: TokioClock) -> Arc<Scheduler> {
    Arc::new(
        Scheduler::builder(Arc::new(store.clone()))
            .logger(Arc::new(NoopLogger))
            .clock(Arc::new(clock))
            .build(),
    )
}

fn every_second(
    scheduler: &Arc<Scheduler>,
    name: &'static str,
    probe: &Arc<Probe>,
) -> JoinHandle<reter::Result<()>> {
    let scheduler = scheduler.clone();
    let probe = probe.clone();
    tokio::spawn(async move {
        scheduler
            .every(1)
            .seconds()
            .run_fn(name, move || {
                let probe = probe.clone();
                async move { probe.run(Duration::from_millis(100)).await }
            })
            .await
    })
}

#[tokio::test(start_paused = true)]
async fn test_single_member_runs_every_period() {
    let store = MemoryCoordinator::new();
    let scheduler = member(&store, fleet_clock());
    let probe = Arc::new(Probe::default());

    let handle = every_second(&scheduler, "t1", &probe);
    tokio::time::sleep(Duration::from_millis(3500)).await;
    scheduler.shutdown();
    handle.await.unwrap().unwrap();

    assert_eq!(probe.runs.load(Ordering::SeqCst), 3);
    assert_eq!(store.record("t1").as_deref(), Some("2024-06-01T08:00:03Z"));
}

#[tokio::test(start_paused = true)]
async fn test_two_members_run_once_per_period_fleet_wide() {
    let store = MemoryCoordinator::new();
    let clock = fleet_clock();
    let first = member(&store, clock);
    let second = member(&store, clock);
    let probe = Arc::new(Probe::default());

    let a = every_second(&first, "t1", &probe);
    let b = every_second(&second, "t1", &probe);
    tokio::time::sleep(Duration::from_millis(3500)).await;
    first.shutdown();
    second.shutdown();
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    assert_eq!(probe.runs.load(Ordering::SeqCst), 3);
    assert_eq!(probe.max_in_flight.load(Ordering::SeqCst), 1);
    assert!(!store.is_locked("t1"));
}

#[tokio::test(start_paused = true)]
async fn test_distinct_tasks_do_not_block_each_other() {
    let store = MemoryCoordinator::new();
    let clock = fleet_clock();
    let first = member(&store, clock);
    let second = member(&store, clock);
    let reports = Arc::new(Probe::default());
    let cleanups = Arc::new(Probe::default());

    let handles = [
        every_second(&first, "report", &reports),
        every_second(&second, "report", &reports),
        every_second(&first, "cleanup", &cleanups),
        every_second(&second, "cleanup", &cleanups),
    ];
    tokio::time::sleep(Duration::from_millis(3500)).await;
    first.shutdown();
    second.shutdown();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(reports.runs.load(Ordering::SeqCst), 3);
    assert_eq!(cleanups.runs.load(Ordering::SeqCst), 3);
    assert_eq!(first.registered_tasks(), vec!["cleanup", "report"]);
}

#[tokio::test(start_paused = true)]
async fn test_member_joining_late_respects_recent_run() {
    let store = MemoryCoordinator::new();
    let clock = fleet_clock();
    let early = member(&store, clock);
    let probe = Arc::new(Probe::default());

    let a = every_second(&early, "t1", &probe);
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(probe.runs.load(Ordering::SeqCst), 1);

    // joins at 1.5s, first tick at 2.5s, by which time 2s already ran
    let late = member(&store, clock);
    let b = every_second(&late, "t1", &probe);
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(probe.runs.load(Ordering::SeqCst), 2);

    early.shutdown();
    late.shutdown();
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();
}
