/// Desktop implementations of the engine's host interfaces

pub mod common;

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(target_os = "linux")]
pub mod linux;

use anyhow::Result;
use chrono::{DateTime, Local, TimeDelta};
use std::sync::Mutex;
use tracing::debug;

use crate::blocker::{
    BlockRequest, EnforcementAction, EnforcementHost, EngineError, EventKind, EventSource,
    ForegroundEvent, PermissionGate,
};

/// Identifier of the app that currently has focus
pub fn foreground_app() -> Result<Option<String>> {
    #[cfg(target_os = "macos")]
    {
        macos::foreground_app()
    }

    #[cfg(target_os = "linux")]
    {
        linux::foreground_app()
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        anyhow::bail!("Foreground detection is not supported on this operating system")
    }
}

/// Whether foreground detection can work at all
pub fn has_usage_access() -> bool {
    #[cfg(target_os = "macos")]
    {
        macos::has_usage_access()
    }

    #[cfg(target_os = "linux")]
    {
        linux::has_usage_access()
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        false
    }
}

/// Post a desktop notification
pub fn send_notification(title: &str, message: &str) -> Result<()> {
    #[cfg(target_os = "macos")]
    {
        macos::send_notification(title, message)
    }

    #[cfg(target_os = "linux")]
    {
        linux::send_notification(title, message)
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        let _ = (title, message);
        anyhow::bail!("Notifications are not supported on this operating system")
    }
}

/// Open a modal dialog without waiting for it to be dismissed
pub fn show_blocking_dialog(title: &str, message: &str) -> Result<()> {
    #[cfg(target_os = "macos")]
    {
        macos::show_blocking_dialog(title, message)
    }

    #[cfg(target_os = "linux")]
    {
        linux::show_blocking_dialog(title, message)
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        let _ = (title, message);
        anyhow::bail!("Blocking dialogs are not supported on this operating system")
    }
}

type Probe = Box<dyn Fn() -> Result<Option<String>> + Send>;

/// Event source that samples the focused app once per query.
///
/// A change of focus becomes a `MovedToForeground` event stamped just before
/// the end of the window. Losing focus to nothing cannot be reported, so the
/// last app keeps being credited until another one takes focus.
pub struct DesktopEventSource {
    probe: Probe,
    last: Mutex<Option<String>>,
}

impl DesktopEventSource {
    pub fn new() -> Self {
        Self::with_probe(Box::new(foreground_app))
    }

    pub fn with_probe(probe: Probe) -> Self {
        Self {
            probe,
            last: Mutex::new(None),
        }
    }
}

impl Default for DesktopEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for DesktopEventSource {
    fn events_between(
        &self,
        start: DateTime<Local>,
        end: DateTime<Local>,
    ) -> Result<Vec<ForegroundEvent>, EngineError> {
        let probed = (self.probe)()
            .map_err(|e| EngineError::EventSourceUnavailable(format!("{:#}", e)))?;

        let mut last = self
            .last
            .lock()
            .map_err(|_| EngineError::EventSourceUnavailable("probe state poisoned".to_string()))?;

        let Some(package) = probed else {
            return Ok(Vec::new());
        };
        if last.as_deref() == Some(package.as_str()) {
            return Ok(Vec::new());
        }

        debug!("Focus moved to {}", package);
        *last = Some(package.clone());
        let timestamp = (end - TimeDelta::milliseconds(1)).max(start);
        Ok(vec![ForegroundEvent::new(
            package,
            timestamp,
            EventKind::MovedToForeground,
        )])
    }
}

/// Desktop capabilities; overlays are never available
#[derive(Debug, Default, Clone, Copy)]
pub struct DesktopPermissions;

impl PermissionGate for DesktopPermissions {
    fn has_usage_access(&self) -> bool {
        has_usage_access()
    }

    fn has_overlay_capability(&self) -> bool {
        false
    }
}

/// Enforcement through desktop dialogs and notifications
#[derive(Debug, Default, Clone, Copy)]
pub struct DesktopEnforcer;

impl EnforcementHost for DesktopEnforcer {
    fn show_overlay(&self, _request: &BlockRequest) -> Result<(), EngineError> {
        Err(EngineError::dispatch_failed(
            EnforcementAction::Overlay,
            "overlays are not supported on the desktop",
        ))
    }

    fn open_blocking_screen(&self, request: &BlockRequest) -> Result<(), EngineError> {
        show_blocking_dialog(request.title(), &request.message()).map_err(|e| {
            EngineError::dispatch_failed(EnforcementAction::ModalScreen, format!("{:#}", e))
        })
    }

    fn post_notification(&self, request: &BlockRequest) -> Result<(), EngineError> {
        send_notification(request.title(), &request.message()).map_err(|e| {
            EngineError::dispatch_failed(EnforcementAction::Notification, format!("{:#}", e))
        })
    }
}
