use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::blocker::error::EngineError;
use crate::blocker::host::EnforcementHost;
use crate::blocker::types::{BlockReason, BlockRequest, Breach, BreachCounter, EnforcementAction};

pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_WATCH_MAX_ITERATIONS: u32 = 15;

/// Enforcement session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Triggered,
    Watching,
}

/// The single enforcement session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnforcementState {
    pub session_id: Option<Uuid>,
    pub blocked_package: Option<String>,
    pub phase: Phase,
    pub watch_iteration: u32,
    pub started_at: Option<DateTime<Local>>,
}

impl EnforcementState {
    pub fn idle() -> Self {
        Self {
            session_id: None,
            blocked_package: None,
            phase: Phase::Idle,
            watch_iteration: 0,
            started_at: None,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle
    }
}

/// Re-block supervision settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogSettings {
    pub interval: Duration,
    pub max_iterations: u32,
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_WATCH_INTERVAL,
            max_iterations: DEFAULT_WATCH_MAX_ITERATIONS,
        }
    }
}

impl WatchdogSettings {
    /// Scheduler ticks between two watchdog checks
    pub fn ticks_per_check(&self, tick: Duration) -> u32 {
        if tick.is_zero() {
            return 1;
        }
        let ratio = self.interval.as_secs_f64() / tick.as_secs_f64();
        (ratio.round() as u32).max(1)
    }
}

/// Result of running the fallback chain once
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainOutcome {
    /// Step that accepted the request, if any
    pub dispatched: Option<EnforcementAction>,
    /// Steps that were skipped or rejected, in order
    pub failed: Vec<EnforcementAction>,
}

/// Result of one watchdog check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchOutcome {
    pub iteration: u32,
    pub reappeared: bool,
    pub reblock: Option<ChainOutcome>,
    pub ended: bool,
}

/// What the dispatcher did during one tick
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub triggered: Option<ChainOutcome>,
    pub watch: Option<WatchOutcome>,
}

/// Remove duplicates and make sure the chain ends with a notification
pub fn normalize_chain(chain: &[EnforcementAction]) -> Vec<EnforcementAction> {
    let mut normalized: Vec<EnforcementAction> = Vec::with_capacity(chain.len() + 1);
    for action in chain {
        if !normalized.contains(action) {
            normalized.push(*action);
        }
    }
    if !normalized.contains(&EnforcementAction::Notification) {
        normalized.push(EnforcementAction::Notification);
    }
    normalized
}

/// Enforcement state machine.
///
/// At most one session is active. A breach while idle triggers the fallback
/// chain and starts a bounded watchdog that re-blocks whenever the package
/// comes back to the foreground. Foreground breaches of other packages during
/// a session are listed as pending for reporting; the next session always
/// goes to whichever breached package is in the foreground. Each package adds to the breach counter at most
/// once per day, however many sessions it takes to keep it blocked.
pub struct EnforcementDispatcher {
    host: Box<dyn EnforcementHost>,
    chain: Vec<EnforcementAction>,
    watchdog: WatchdogSettings,
    ticks_per_check: u32,
    state: EnforcementState,
    request: Option<BlockRequest>,
    ticks_until_check: u32,
    pending: VecDeque<String>,
    counted: BTreeSet<String>,
    breaches: BreachCounter,
}

impl EnforcementDispatcher {
    pub fn new(
        host: Box<dyn EnforcementHost>,
        chain: &[EnforcementAction],
        watchdog: WatchdogSettings,
        tick: Duration,
        breaches: BreachCounter,
    ) -> Self {
        let ticks_per_check = watchdog.ticks_per_check(tick);
        Self {
            host,
            chain: normalize_chain(chain),
            watchdog,
            ticks_per_check,
            state: EnforcementState::idle(),
            request: None,
            ticks_until_check: ticks_per_check,
            pending: VecDeque::new(),
            counted: BTreeSet::new(),
            breaches,
        }
    }

    pub fn state(&self) -> &EnforcementState {
        &self.state
    }

    /// Packages that breached in the foreground during the current session
    pub fn pending(&self) -> impl Iterator<Item = &str> {
        self.pending.iter().map(String::as_str)
    }

    /// Packages already counted as breached today
    pub fn counted(&self) -> impl Iterator<Item = &str> {
        self.counted.iter().map(String::as_str)
    }

    /// Mark packages as counted without touching the counter
    pub fn restore_counted<I>(&mut self, packages: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.counted.extend(packages);
    }

    /// Forget the queue and the counted packages at the start of a new day
    pub fn reset_day(&mut self) {
        self.pending.clear();
        self.counted.clear();
    }

    /// Advance the state machine by one scheduler tick
    pub fn on_tick(
        &mut self,
        breaches: &[Breach],
        foreground: Option<&str>,
        overlay_available: bool,
        now: DateTime<Local>,
    ) -> DispatchReport {
        match self.state.phase {
            Phase::Idle => {
                let triggered = self
                    .next_candidate(breaches, foreground)
                    .and_then(|breach| self.trigger(&breach, overlay_available, now));
                DispatchReport {
                    triggered,
                    watch: None,
                }
            }
            Phase::Triggered | Phase::Watching => {
                self.queue(breaches, foreground);
                DispatchReport {
                    triggered: None,
                    watch: self.watchdog_step(foreground, overlay_available),
                }
            }
        }
    }

    /// Start a session for `breach`.
    ///
    /// Returns `None` and queues the package when a session is already active.
    pub fn trigger(
        &mut self,
        breach: &Breach,
        overlay_available: bool,
        now: DateTime<Local>,
    ) -> Option<ChainOutcome> {
        if !self.state.is_idle() {
            self.enqueue(&breach.package);
            return None;
        }

        let count = if self.counted.insert(breach.package.clone()) {
            self.breaches.increment()
        } else {
            debug!("{} already counted today", breach.package);
            self.breaches.get()
        };
        let session_id = Uuid::new_v4();
        self.state = EnforcementState {
            session_id: Some(session_id),
            blocked_package: Some(breach.package.clone()),
            phase: Phase::Triggered,
            watch_iteration: 0,
            started_at: Some(now),
        };
        info!(
            "Limit reached for {} ({} of {} minutes); limits reached today: {}",
            breach.package, breach.used_minutes, breach.limit_minutes, count
        );

        let request = BlockRequest {
            session_id,
            package: breach.package.clone(),
            used_minutes: breach.used_minutes,
            limit_minutes: breach.limit_minutes,
            reason: BlockReason::LimitReached,
        };
        let outcome = self.run_chain(&request, overlay_available);

        // Watch even when nothing was dispatched so reappearances are retried
        self.state.phase = Phase::Watching;
        self.request = Some(request);
        self.ticks_until_check = self.ticks_per_check;
        debug!(
            "Watching {} for up to {} checks",
            breach.package, self.watchdog.max_iterations
        );

        Some(outcome)
    }

    /// Run one watchdog check if one is due
    pub fn watchdog_step(
        &mut self,
        foreground: Option<&str>,
        overlay_available: bool,
    ) -> Option<WatchOutcome> {
        if self.state.phase != Phase::Watching {
            return None;
        }

        self.ticks_until_check = self.ticks_until_check.saturating_sub(1);
        if self.ticks_until_check > 0 {
            return None;
        }
        self.ticks_until_check = self.ticks_per_check;

        self.state.watch_iteration += 1;
        let iteration = self.state.watch_iteration;
        let reappeared = foreground.is_some() && foreground == self.state.blocked_package.as_deref();

        let reblock = match (&self.request, reappeared) {
            (Some(request), true) => {
                warn!("Blocked app reappeared: {} - blocking again", request.package);
                let mut request = request.clone();
                request.reason = BlockReason::Reappeared;
                Some(self.run_chain(&request, overlay_available))
            }
            _ => None,
        };

        let ended = iteration >= self.watchdog.max_iterations;
        if ended {
            info!(
                "Enforcement session for {} ended after {} checks",
                self.state.blocked_package.as_deref().unwrap_or("<unknown>"),
                iteration
            );
            self.finish();
        }

        Some(WatchOutcome {
            iteration,
            reappeared,
            reblock,
            ended,
        })
    }

    fn finish(&mut self) {
        self.state = EnforcementState::idle();
        self.request = None;
        self.ticks_until_check = self.ticks_per_check;
    }

    fn enqueue(&mut self, package: &str) {
        if self.pending.iter().any(|p| p == package) {
            return;
        }
        info!(
            "{} reached its limit while {} is being enforced; queued",
            package,
            self.state.blocked_package.as_deref().unwrap_or("<unknown>")
        );
        self.pending.push_back(package.to_string());
    }

    /// Queue foreground breaches of packages other than the blocked one
    fn queue(&mut self, breaches: &[Breach], foreground: Option<&str>) {
        let blocked = self.state.blocked_package.clone();
        for breach in breaches {
            if Some(breach.package.as_str()) == blocked.as_deref() {
                continue;
            }
            if Some(breach.package.as_str()) == foreground {
                self.enqueue(&breach.package);
            }
        }
    }

    /// Breach to enforce next: only the package in the foreground can be blocked
    fn next_candidate(&mut self, breaches: &[Breach], foreground: Option<&str>) -> Option<Breach> {
        self.pending
            .retain(|package| breaches.iter().any(|b| &b.package == package));

        let foreground = foreground?;
        let candidate = breaches.iter().find(|b| b.package == foreground)?.clone();
        if let Some(pos) = self.pending.iter().position(|p| p == foreground) {
            self.pending.remove(pos);
        }
        Some(candidate)
    }

    /// Try each step in order until one is accepted
    fn run_chain(&self, request: &BlockRequest, overlay_available: bool) -> ChainOutcome {
        let mut failed = Vec::new();

        for &action in &self.chain {
            let result = match action {
                EnforcementAction::Overlay if !overlay_available => Err(
                    EngineError::PermissionDenied("overlay capability not granted".to_string()),
                ),
                EnforcementAction::Overlay => self.host.show_overlay(request),
                EnforcementAction::ModalScreen => self.host.open_blocking_screen(request),
                EnforcementAction::Notification => self.host.post_notification(request),
            };

            match result {
                Ok(()) => {
                    info!("Dispatched {} for {}", action, request.package);
                    return ChainOutcome {
                        dispatched: Some(action),
                        failed,
                    };
                }
                Err(e) => {
                    debug!("Skipping {} for {}: {}", action, request.package, e);
                    failed.push(action);
                }
            }
        }

        let e = EngineError::HostServiceUnavailable {
            package: request.package.clone(),
        };
        error!("{}", e);
        ChainOutcome {
            dispatched: None,
            failed,
        }
    }
}
