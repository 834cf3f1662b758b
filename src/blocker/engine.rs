use chrono::{DateTime, Local, TimeDelta};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::blocker::aggregator::{UsageAggregator, UsageSnapshot};
use crate::blocker::enforcement::{
    DispatchReport, EnforcementDispatcher, EnforcementState, WatchdogSettings,
};
use crate::blocker::error::{EngineError, Result};
use crate::blocker::evaluator::{Evaluation, LimitEvaluator};
use crate::blocker::host::{EventSource, HostBindings, LimitStore, PermissionGate};
use crate::blocker::types::{Breach, BreachCounter, EnforcementAction};

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(2);

/// Engine timing and enforcement settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub tick_interval: Duration,
    pub watchdog: WatchdogSettings,
    pub chain: Vec<EnforcementAction>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            watchdog: WatchdogSettings::default(),
            chain: EnforcementAction::default_chain(),
        }
    }
}

/// Whether the engine can currently observe usage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineHealth {
    /// No tick has run yet
    Starting,
    Healthy,
    /// Usage access is missing; ticks are halted until it is granted
    Degraded,
}

/// What happened during one tick
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub day_reset: bool,
    pub foreground: Option<String>,
    pub evaluations: Vec<(String, Evaluation)>,
    pub dispatch: DispatchReport,
}

/// Point-in-time view for external readers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineSnapshot {
    pub taken_at: DateTime<Local>,
    pub health: EngineHealth,
    pub usage: UsageSnapshot,
    pub enforcement: EnforcementState,
    pub pending: Vec<String>,
    pub breaches_today: u32,
    /// Packages that already added to `breaches_today`
    pub counted_today: Vec<String>,
}

/// The monitoring pipeline run once per tick.
///
/// Order inside a tick is fixed: permission check, day reset, event query,
/// usage attribution, limit evaluation, enforcement.
pub struct BlockerEngine {
    settings: EngineSettings,
    events: Box<dyn EventSource>,
    limits: Box<dyn LimitStore>,
    permissions: Box<dyn PermissionGate>,
    aggregator: UsageAggregator,
    dispatcher: EnforcementDispatcher,
    breaches: BreachCounter,
    window_end: Option<DateTime<Local>>,
    health: EngineHealth,
}

impl BlockerEngine {
    pub fn new(settings: EngineSettings, host: HostBindings, now: DateTime<Local>) -> Self {
        let breaches = BreachCounter::new();
        let dispatcher = EnforcementDispatcher::new(
            host.actions,
            &settings.chain,
            settings.watchdog,
            settings.tick_interval,
            breaches.clone(),
        );

        Self {
            settings,
            events: host.events,
            limits: host.limits,
            permissions: host.permissions,
            aggregator: UsageAggregator::new(now),
            dispatcher,
            breaches,
            window_end: None,
            health: EngineHealth::Starting,
        }
    }

    /// Continue from persisted usage; ignored when it belongs to another day
    pub fn restore(
        &mut self,
        usage: UsageSnapshot,
        breaches_today: u32,
        counted_today: Vec<String>,
        now: DateTime<Local>,
    ) {
        if usage.day != now.date_naive() {
            debug!("Ignoring persisted usage from {}", usage.day);
            return;
        }
        self.aggregator = UsageAggregator::restore(usage, now);
        self.breaches.set(breaches_today);
        self.dispatcher.restore_counted(counted_today);
        info!(
            "Restored usage for {} packages ({} limits reached today)",
            self.aggregator.records().count(),
            breaches_today
        );
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn health(&self) -> EngineHealth {
        self.health
    }

    /// Handle for reporting "limits reached today"
    pub fn breach_counter(&self) -> BreachCounter {
        self.breaches.clone()
    }

    pub fn enforcement_state(&self) -> &EnforcementState {
        self.dispatcher.state()
    }

    pub fn minutes_for(&self, package: &str) -> u64 {
        self.aggregator.minutes_for(package)
    }

    pub fn snapshot(&self, now: DateTime<Local>) -> EngineSnapshot {
        EngineSnapshot {
            taken_at: now,
            health: self.health,
            usage: self.aggregator.snapshot(),
            enforcement: self.dispatcher.state().clone(),
            pending: self.dispatcher.pending().map(str::to_owned).collect(),
            breaches_today: self.breaches.get(),
            counted_today: self.dispatcher.counted().map(str::to_owned).collect(),
        }
    }

    /// Run the pipeline once
    pub fn tick(&mut self, now: DateTime<Local>) -> Result<TickReport> {
        if !self.permissions.has_usage_access() {
            if self.health != EngineHealth::Degraded {
                warn!("Usage access not granted; monitoring paused until it is");
            }
            self.health = EngineHealth::Degraded;
            return Err(EngineError::PermissionDenied(
                "usage access not granted".to_string(),
            ));
        }
        if self.health == EngineHealth::Degraded {
            info!("Usage access granted; monitoring resumed");
        }
        self.health = EngineHealth::Healthy;

        let mut report = TickReport::default();

        if self.aggregator.reset_if_needed(now) {
            info!("New day {}; resetting usage", self.aggregator.day());
            self.breaches.reset();
            self.dispatcher.reset_day();
            report.day_reset = true;
        }

        let overlay_available = self.permissions.has_overlay_capability();
        let breaches = match self.observe(now, &mut report) {
            Ok(breaches) => breaches,
            Err(e) => {
                self.advance_watchdog(overlay_available);
                return Err(e);
            }
        };

        let foreground = self.aggregator.foreground().map(str::to_owned);
        report.dispatch =
            self.dispatcher
                .on_tick(&breaches, foreground.as_deref(), overlay_available, now);
        report.foreground = foreground;

        Ok(report)
    }

    /// Query events, credit usage and evaluate every selected package
    fn observe(&mut self, now: DateTime<Local>, report: &mut TickReport) -> Result<Vec<Breach>> {
        let tick = self.settings.tick_interval;
        let start = self.window_end.unwrap_or_else(|| now - to_delta(tick));
        let events = self.events.events_between(start, now)?;
        self.window_end = Some(now);
        debug!("{} foreground events in window", events.len());

        self.aggregator.apply(&events, tick);

        let mut breaches = Vec::new();
        for package in self.limits.selected_packages()? {
            let limit = self.limits.limit(&package)?;
            let used = self.aggregator.minutes_for(&package);
            let evaluation = LimitEvaluator::evaluate(&package, used, limit);
            if evaluation == Evaluation::Breached {
                breaches.push(Breach {
                    package: package.clone(),
                    used_minutes: used,
                    limit_minutes: limit.unwrap_or(0),
                });
            }
            report.evaluations.push((package, evaluation));
        }
        Ok(breaches)
    }

    /// Keep an active session's watchdog bounded while the hosts are failing.
    ///
    /// The last known foreground package stands in for the one that could
    /// not be observed.
    fn advance_watchdog(&mut self, overlay_available: bool) {
        if self.dispatcher.state().is_idle() {
            return;
        }
        let foreground = self.aggregator.foreground().map(str::to_owned);
        if let Some(outcome) = self
            .dispatcher
            .watchdog_step(foreground.as_deref(), overlay_available)
        {
            debug!(
                "Watchdog check {} ran on last known foreground during a failed tick",
                outcome.iteration
            );
        }
    }
}

fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::zero())
}
