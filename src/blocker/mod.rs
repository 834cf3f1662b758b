/// Usage monitoring and limit enforcement engine
///
/// This module provides functionality to:
/// - Attribute foreground time to packages for the current day
/// - Compare usage against per-package daily limits
/// - Block an app that reached its limit through a fallback chain
/// - Re-block it when it comes back during a bounded watch period

pub mod aggregator;
pub mod enforcement;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod host;
pub mod scheduler;
pub mod types;

#[cfg(test)]
mod testing;

pub use aggregator::{UsageAggregator, UsageRecord, UsageSnapshot};
pub use enforcement::{EnforcementDispatcher, EnforcementState, Phase, WatchdogSettings};
pub use engine::{BlockerEngine, EngineHealth, EngineSettings, EngineSnapshot, TickReport};
pub use error::EngineError;
pub use evaluator::{Evaluation, LimitEvaluator};
pub use host::{EnforcementHost, EventSource, HostBindings, LimitStore, PermissionGate};
pub use scheduler::{Scheduler, SchedulerStats, TickDispatch};
pub use types::{
    BlockReason, BlockRequest, Breach, BreachCounter, Clock, EnforcementAction, EventKind,
    ForegroundEvent, SystemClock,
};
