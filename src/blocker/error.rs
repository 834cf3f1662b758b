//! Errors raised inside the monitoring and enforcement engine.
//!
//! None of these are fatal: the scheduler logs them and keeps ticking.

use thiserror::Error;

use crate::blocker::types::EnforcementAction;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Usage access or overlay capability is missing; retried every tick
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The usage-event query failed; the tick is aborted
    #[error("Event source unavailable: {0}")]
    EventSourceUnavailable(String),

    /// The limit store could not be read; the tick is aborted
    #[error("Limit store unavailable: {0}")]
    LimitStoreUnavailable(String),

    /// One step of the fallback chain failed
    #[error("Failed to dispatch {action}: {reason}")]
    ActionDispatchFailed {
        action: EnforcementAction,
        reason: String,
    },

    /// Every step of the fallback chain failed
    #[error("No enforcement action could be dispatched for {package}")]
    HostServiceUnavailable { package: String },
}

impl EngineError {
    pub fn dispatch_failed(action: EnforcementAction, reason: impl Into<String>) -> Self {
        Self::ActionDispatchFailed {
            action,
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
