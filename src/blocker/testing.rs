//! Fakes for the engine collaborators, shared by the unit tests.

use chrono::{DateTime, Local, TimeZone};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::blocker::error::{EngineError, Result};
use crate::blocker::host::{EnforcementHost, EventSource, LimitStore, PermissionGate};
use crate::blocker::types::{BlockReason, BlockRequest, Clock, EnforcementAction, ForegroundEvent};

pub fn at(day: u32, hour: u32, minute: u32) -> DateTime<Local> {
    Local.with_ymd_and_hms(2025, 3, day, hour, minute, 0).unwrap()
}

/// Event log the test appends to
#[derive(Clone, Default)]
pub struct ScriptedEvents {
    pub log: Arc<Mutex<Vec<ForegroundEvent>>>,
    pub failing: Arc<AtomicBool>,
}

impl ScriptedEvents {
    pub fn push(&self, event: ForegroundEvent) {
        self.log.lock().unwrap().push(event);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl EventSource for ScriptedEvents {
    fn events_between(
        &self,
        start: DateTime<Local>,
        end: DateTime<Local>,
    ) -> Result<Vec<ForegroundEvent>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EngineError::EventSourceUnavailable("scripted failure".to_string()));
        }
        Ok(self
            .log
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.timestamp >= start && e.timestamp < end)
            .cloned()
            .collect())
    }
}

/// In-memory limits the test can change between ticks
#[derive(Clone, Default)]
pub struct SharedLimits {
    pub limits: Arc<Mutex<BTreeMap<String, u32>>>,
}

impl SharedLimits {
    pub fn with(package: &str, minutes: u32) -> Self {
        let limits = Self::default();
        limits.set(package, minutes);
        limits
    }

    pub fn set(&self, package: &str, minutes: u32) {
        self.limits.lock().unwrap().insert(package.to_string(), minutes);
    }
}

impl LimitStore for SharedLimits {
    fn selected_packages(&self) -> Result<BTreeSet<String>> {
        Ok(self.limits.lock().unwrap().keys().cloned().collect())
    }

    fn limit(&self, package: &str) -> Result<Option<u32>> {
        Ok(self.limits.lock().unwrap().get(package).copied())
    }
}

#[derive(Clone)]
pub struct Permissions {
    pub usage: Arc<AtomicBool>,
    pub overlay: Arc<AtomicBool>,
}

impl Permissions {
    pub fn new(usage: bool, overlay: bool) -> Self {
        Self {
            usage: Arc::new(AtomicBool::new(usage)),
            overlay: Arc::new(AtomicBool::new(overlay)),
        }
    }
}

impl PermissionGate for Permissions {
    fn has_usage_access(&self) -> bool {
        self.usage.load(Ordering::SeqCst)
    }

    fn has_overlay_capability(&self) -> bool {
        self.overlay.load(Ordering::SeqCst)
    }
}

/// Records every accepted dispatch; actions listed in `rejecting` fail
#[derive(Clone, Default)]
pub struct RecordingHost {
    pub calls: Arc<Mutex<Vec<(EnforcementAction, BlockReason, String)>>>,
    pub rejecting: Arc<Mutex<HashSet<EnforcementAction>>>,
}

impl RecordingHost {
    pub fn rejecting(actions: &[EnforcementAction]) -> Self {
        let host = Self::default();
        host.rejecting.lock().unwrap().extend(actions.iter().copied());
        host
    }

    pub fn calls(&self) -> Vec<(EnforcementAction, BlockReason, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, action: EnforcementAction, reason: BlockReason) -> usize {
        self.calls()
            .iter()
            .filter(|(a, r, _)| *a == action && *r == reason)
            .count()
    }

    fn record(&self, action: EnforcementAction, request: &BlockRequest) -> Result<()> {
        if self.rejecting.lock().unwrap().contains(&action) {
            return Err(EngineError::dispatch_failed(action, "host rejected request"));
        }
        self.calls
            .lock()
            .unwrap()
            .push((action, request.reason, request.package.clone()));
        Ok(())
    }
}

impl EnforcementHost for RecordingHost {
    fn show_overlay(&self, request: &BlockRequest) -> Result<()> {
        self.record(EnforcementAction::Overlay, request)
    }

    fn open_blocking_screen(&self, request: &BlockRequest) -> Result<()> {
        self.record(EnforcementAction::ModalScreen, request)
    }

    fn post_notification(&self, request: &BlockRequest) -> Result<()> {
        self.record(EnforcementAction::Notification, request)
    }
}

/// Clock the test moves by hand
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Local>>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Local>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn advance(&self, by: chrono::TimeDelta) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.lock().unwrap()
    }
}
