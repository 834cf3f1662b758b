use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::blocker::engine::{BlockerEngine, EngineSnapshot};
use crate::blocker::error::EngineError;
use crate::blocker::types::Clock;

/// Non-blocking single-holder guard; a second tick is skipped, never queued
#[derive(Debug, Default)]
pub struct TickGuard {
    busy: AtomicBool,
}

impl TickGuard {
    pub fn try_acquire(self: &Arc<Self>) -> Option<TickPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TickPermit {
                guard: Arc::clone(self),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Released when dropped
#[derive(Debug)]
pub struct TickPermit {
    guard: Arc<TickGuard>,
}

impl Drop for TickPermit {
    fn drop(&mut self) {
        self.guard.busy.store(false, Ordering::Release);
    }
}

/// Result of asking for a tick
#[derive(Debug)]
pub enum TickDispatch {
    /// The tick runs on the blocking pool
    Dispatched(JoinHandle<()>),
    /// A previous tick still holds the guard
    SkippedBusy,
    /// The scheduler was stopped
    Cancelled,
}

/// Tick counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub ticks_run: u64,
    pub ticks_skipped: u64,
    pub ticks_failed: u64,
}

#[derive(Default)]
struct Counters {
    run: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

struct Shared {
    engine: Arc<Mutex<BlockerEngine>>,
    clock: Arc<dyn Clock>,
    guard: Arc<TickGuard>,
    cancelled: AtomicBool,
    counters: Counters,
}

impl Shared {
    fn dispatch(shared: &Arc<Self>) -> TickDispatch {
        if shared.cancelled.load(Ordering::SeqCst) {
            return TickDispatch::Cancelled;
        }

        let Some(permit) = shared.guard.try_acquire() else {
            shared.counters.skipped.fetch_add(1, Ordering::Relaxed);
            debug!("Previous tick still running, skipping");
            return TickDispatch::SkippedBusy;
        };

        let shared = Arc::clone(shared);
        TickDispatch::Dispatched(tokio::task::spawn_blocking(move || {
            let _permit = permit;
            shared.run_tick();
        }))
    }

    fn run_tick(&self) {
        let mut engine = self.engine.blocking_lock();
        if self.cancelled.load(Ordering::SeqCst) {
            debug!("Scheduler stopped before tick started");
            return;
        }

        let now = self.clock.now();
        match engine.tick(now) {
            Ok(report) => {
                self.counters.run.fetch_add(1, Ordering::Relaxed);
                if let Some(outcome) = &report.dispatch.triggered {
                    debug!("Enforcement triggered: {:?}", outcome);
                }
            }
            // logged by the engine when health changes
            Err(EngineError::PermissionDenied(reason)) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                debug!("Tick halted: {}", reason);
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                error!("Error in monitoring tick: {:#}", e);
            }
        }
    }
}

/// Drives the engine on a fixed interval.
///
/// Ticks run on the blocking pool because enforcement shells out to the
/// host. Overlapping ticks are skipped. `stop` waits for an in-flight tick
/// and nothing runs after it returns.
pub struct Scheduler {
    shared: Arc<Shared>,
    interval: Duration,
    running: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(engine: BlockerEngine, clock: Arc<dyn Clock>) -> Self {
        let interval = engine.settings().tick_interval;
        Self {
            shared: Arc::new(Shared {
                engine: Arc::new(Mutex::new(engine)),
                clock,
                guard: Arc::new(TickGuard::default()),
                cancelled: AtomicBool::new(false),
                counters: Counters::default(),
            }),
            interval,
            running: AtomicBool::new(false),
            handle: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> SchedulerStats {
        let counters = &self.shared.counters;
        SchedulerStats {
            ticks_run: counters.run.load(Ordering::Relaxed),
            ticks_skipped: counters.skipped.load(Ordering::Relaxed),
            ticks_failed: counters.failed.load(Ordering::Relaxed),
        }
    }

    pub async fn snapshot(&self) -> EngineSnapshot {
        let engine = self.shared.engine.lock().await;
        engine.snapshot(self.shared.clock.now())
    }

    /// Request a single tick outside the timer loop
    pub fn dispatch_tick(&self) -> TickDispatch {
        Shared::dispatch(&self.shared)
    }

    /// Start the timer loop
    pub async fn start(&self) -> Result<()> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            anyhow::bail!("Scheduler is already running");
        }
        self.shared.cancelled.store(false, Ordering::SeqCst);

        info!("Starting monitoring every {:?}", self.interval);

        let shared = Arc::clone(&self.shared);
        let period = self.interval;
        let handle = tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                if let TickDispatch::Cancelled = Shared::dispatch(&shared) {
                    break;
                }
            }
        });

        *self.handle.lock().await = Some(handle);
        Ok(())
    }

    /// Stop the timer loop and wait for an in-flight tick. Idempotent.
    pub async fn stop(&self) {
        self.shared.cancelled.store(true, Ordering::SeqCst);

        if let Some(handle) = self.handle.lock().await.take() {
            handle.abort();
            let _ = handle.await;
        }

        // ticks check `cancelled` after taking the lock, and the lock is fair
        drop(self.shared.engine.lock().await);

        if self.running.swap(false, Ordering::SeqCst) {
            info!("Monitoring stopped");
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shared.cancelled.store(true, Ordering::SeqCst);
        if let Ok(mut handle) = self.handle.try_lock() {
            if let Some(handle) = handle.take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocker::engine::EngineSettings;
    use crate::blocker::enforcement::WatchdogSettings;
    use crate::blocker::error::Result as EngineResult;
    use crate::blocker::host::{EventSource, HostBindings};
    use crate::blocker::testing::{
        ManualClock, Permissions, RecordingHost, ScriptedEvents, SharedLimits, at,
    };
    use crate::blocker::types::{EnforcementAction, EventKind, ForegroundEvent};
    use chrono::{DateTime, Local};
    use std::sync::mpsc;

    const SOCIAL: &str = "com.example.social";

    fn settings(tick: Duration) -> EngineSettings {
        EngineSettings {
            tick_interval: tick,
            watchdog: WatchdogSettings {
                interval: tick,
                max_iterations: 15,
            },
            chain: EnforcementAction::default_chain(),
        }
    }

    fn make_scheduler(
        events: Box<dyn EventSource>,
        permissions: Permissions,
        tick: Duration,
    ) -> (Scheduler, ManualClock) {
        let clock = ManualClock::new(at(10, 9, 0));
        let bindings = HostBindings {
            events,
            limits: Box::new(SharedLimits::with(SOCIAL, 30)),
            permissions: Box::new(permissions),
            actions: Box::new(RecordingHost::default()),
        };
        let engine = BlockerEngine::new(settings(tick), bindings, clock.now());
        (Scheduler::new(engine, Arc::new(clock.clone())), clock)
    }

    /// Blocks inside the event query until released
    struct GatedEvents {
        entered: mpsc::Sender<()>,
        release: mpsc::Receiver<()>,
    }

    impl EventSource for GatedEvents {
        fn events_between(
            &self,
            _start: DateTime<Local>,
            _end: DateTime<Local>,
        ) -> EngineResult<Vec<ForegroundEvent>> {
            let _ = self.entered.send(());
            let _ = self.release.recv();
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_tick_guard_single_holder() {
        let guard = Arc::new(TickGuard::default());
        let permit = guard.try_acquire().unwrap();
        assert!(guard.is_busy());
        assert!(guard.try_acquire().is_none());

        drop(permit);
        assert!(!guard.is_busy());
        assert!(guard.try_acquire().is_some());
    }

    #[tokio::test]
    async fn test_dispatch_tick_runs_engine() {
        let events = ScriptedEvents::default();
        events.push(ForegroundEvent::new(SOCIAL, at(10, 8, 59), EventKind::Resumed));
        let (scheduler, _clock) = make_scheduler(
            Box::new(events),
            Permissions::new(true, true),
            Duration::from_secs(60),
        );

        let TickDispatch::Dispatched(handle) = scheduler.dispatch_tick() else {
            panic!("tick should have been dispatched");
        };
        handle.await.unwrap();

        assert_eq!(scheduler.stats().ticks_run, 1);
        let snapshot = scheduler.snapshot().await;
        assert_eq!(snapshot.usage.minutes_for(SOCIAL), 1);
        assert_eq!(snapshot.usage.foreground.as_deref(), Some(SOCIAL));
    }

    #[tokio::test]
    async fn test_failed_ticks_are_counted() {
        let (scheduler, _clock) = make_scheduler(
            Box::new(ScriptedEvents::default()),
            Permissions::new(false, false),
            Duration::from_secs(2),
        );

        for _ in 0..3 {
            if let TickDispatch::Dispatched(handle) = scheduler.dispatch_tick() {
                handle.await.unwrap();
            }
        }

        let stats = scheduler.stats();
        assert_eq!(stats.ticks_failed, 3);
        assert_eq!(stats.ticks_run, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_overlapping_tick_is_skipped() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let (scheduler, clock) = make_scheduler(
            Box::new(GatedEvents {
                entered: entered_tx,
                release: release_rx,
            }),
            Permissions::new(true, true),
            Duration::from_secs(2),
        );

        let TickDispatch::Dispatched(first) = scheduler.dispatch_tick() else {
            panic!("first tick should have been dispatched");
        };
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        assert!(matches!(scheduler.dispatch_tick(), TickDispatch::SkippedBusy));

        release_tx.send(()).unwrap();
        first.await.unwrap();

        clock.advance(chrono::TimeDelta::seconds(2));
        release_tx.send(()).unwrap();
        let TickDispatch::Dispatched(second) = scheduler.dispatch_tick() else {
            panic!("guard should be free again");
        };
        second.await.unwrap();

        let stats = scheduler.stats();
        assert_eq!(stats.ticks_run, 2);
        assert_eq!(stats.ticks_skipped, 1);
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let (scheduler, _clock) = make_scheduler(
            Box::new(ScriptedEvents::default()),
            Permissions::new(true, true),
            Duration::from_millis(10),
        );

        scheduler.start().await.unwrap();
        assert!(scheduler.is_running());
        assert!(scheduler.start().await.is_err());
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_no_ticks_after_stop() {
        let (scheduler, _clock) = make_scheduler(
            Box::new(ScriptedEvents::default()),
            Permissions::new(true, true),
            Duration::from_millis(10),
        );

        scheduler.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        scheduler.stop().await;

        let after_stop = scheduler.stats();
        assert!(after_stop.ticks_run >= 1);
        assert!(!scheduler.is_running());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(scheduler.stats(), after_stop);
        assert!(matches!(scheduler.dispatch_tick(), TickDispatch::Cancelled));

        // stopping again is a no-op
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let (scheduler, _clock) = make_scheduler(
            Box::new(ScriptedEvents::default()),
            Permissions::new(true, true),
            Duration::from_millis(10),
        );

        scheduler.start().await.unwrap();
        scheduler.stop().await;
        scheduler.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        scheduler.stop().await;

        assert!(scheduler.stats().ticks_run >= 1);
    }
}
