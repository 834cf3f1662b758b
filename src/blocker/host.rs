//! Interfaces of the collaborators the engine talks to.
//!
//! The engine owns boxed implementations of these traits and only calls them
//! from inside a tick, so `Send` is all they need.

use chrono::{DateTime, Local};
use std::collections::BTreeSet;

use crate::blocker::error::Result;
use crate::blocker::types::{BlockRequest, ForegroundEvent};

/// Host usage-event log
pub trait EventSource: Send {
    /// Foreground transitions in `[start, end)`, in non-decreasing timestamp order
    fn events_between(
        &self,
        start: DateTime<Local>,
        end: DateTime<Local>,
    ) -> Result<Vec<ForegroundEvent>>;
}

/// Read-only view of the configured limits
pub trait LimitStore: Send {
    /// Packages the user chose to limit
    fn selected_packages(&self) -> Result<BTreeSet<String>>;

    /// Daily limit in minutes; `None` or `Some(0)` means unlimited
    fn limit(&self, package: &str) -> Result<Option<u32>>;
}

/// Capabilities granted by the host
pub trait PermissionGate: Send {
    fn has_usage_access(&self) -> bool;
    fn has_overlay_capability(&self) -> bool;
}

/// Enforcement sinks.
///
/// Each call is fire-and-forget: `Ok` means the host accepted the request,
/// not that anything is on screen yet.
pub trait EnforcementHost: Send {
    fn show_overlay(&self, request: &BlockRequest) -> Result<()>;
    fn open_blocking_screen(&self, request: &BlockRequest) -> Result<()>;
    fn post_notification(&self, request: &BlockRequest) -> Result<()>;
}

/// The full set of collaborators an engine is wired to
pub struct HostBindings {
    pub events: Box<dyn EventSource>,
    pub limits: Box<dyn LimitStore>,
    pub permissions: Box<dyn PermissionGate>,
    pub actions: Box<dyn EnforcementHost>,
}
