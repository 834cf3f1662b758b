use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use uuid::Uuid;

/// Kind of foreground transition reported by the host's usage-event log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// An activity of the package was resumed
    Resumed,
    /// The package moved to the foreground
    MovedToForeground,
}

/// A single foreground transition
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ForegroundEvent {
    pub package: String,
    pub timestamp: DateTime<Local>,
    pub kind: EventKind,
}

impl ForegroundEvent {
    pub fn new(package: impl Into<String>, timestamp: DateTime<Local>, kind: EventKind) -> Self {
        Self {
            package: package.into(),
            timestamp,
            kind,
        }
    }
}

/// Blocking mechanisms, in the order they are normally tried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementAction {
    /// Surface drawn over the offending app (needs overlay capability)
    Overlay,
    /// Blocking screen brought to the foreground
    ModalScreen,
    /// Best-effort notification
    Notification,
}

impl EnforcementAction {
    pub fn default_chain() -> Vec<Self> {
        vec![Self::Overlay, Self::ModalScreen, Self::Notification]
    }
}

impl fmt::Display for EnforcementAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Overlay => "overlay",
            Self::ModalScreen => "modal screen",
            Self::Notification => "notification",
        };
        f.write_str(name)
    }
}

/// Why a block request was issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    /// The daily limit was just reached
    LimitReached,
    /// The blocked package came back to the foreground during the watchdog
    Reappeared,
}

/// Request handed to the enforcement host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockRequest {
    pub session_id: Uuid,
    pub package: String,
    pub used_minutes: u64,
    pub limit_minutes: u32,
    pub reason: BlockReason,
}

impl BlockRequest {
    /// Notification title for this request
    pub fn title(&self) -> &'static str {
        match self.reason {
            BlockReason::LimitReached => "App access blocked",
            BlockReason::Reappeared => "Repeated access attempt",
        }
    }

    /// Human readable message for this request
    pub fn message(&self) -> String {
        match self.reason {
            BlockReason::LimitReached => format!(
                "Time limit reached for {} ({} of {} minutes). It has been blocked for today.",
                self.package, self.used_minutes, self.limit_minutes
            ),
            BlockReason::Reappeared => format!(
                "{} is still blocked. Please choose a different activity.",
                self.package
            ),
        }
    }
}

/// A package whose usage has met its limit this tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breach {
    pub package: String,
    pub used_minutes: u64,
    pub limit_minutes: u32,
}

/// Count of limits reached today.
///
/// Clones share the same counter, so reporting collaborators can hold a
/// handle and read it at any time. Only the engine mutates it.
#[derive(Debug, Clone, Default)]
pub struct BreachCounter {
    count: Arc<AtomicU32>,
}

impl BreachCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits reached today
    pub fn get(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }

    pub(crate) fn increment(&self) -> u32 {
        self.count.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn set(&self, value: u32) {
        self.count.store(value, Ordering::SeqCst);
    }

    pub(crate) fn reset(&self) {
        self.set(0);
    }
}

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breach_counter_is_shared_between_clones() {
        let counter = BreachCounter::new();
        let reader = counter.clone();

        assert_eq!(counter.increment(), 1);
        assert_eq!(counter.increment(), 2);
        assert_eq!(reader.get(), 2);

        counter.reset();
        assert_eq!(reader.get(), 0);
    }

    #[test]
    fn test_default_chain_ends_with_notification() {
        let chain = EnforcementAction::default_chain();
        assert_eq!(chain.last(), Some(&EnforcementAction::Notification));
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn test_action_serde_names() {
        let json = serde_json::to_string(&EnforcementAction::ModalScreen).unwrap();
        assert_eq!(json, "\"modal_screen\"");
    }

    #[test]
    fn test_request_message_mentions_package() {
        let request = BlockRequest {
            session_id: Uuid::new_v4(),
            package: "com.example.social".to_string(),
            used_minutes: 31,
            limit_minutes: 30,
            reason: BlockReason::LimitReached,
        };
        assert!(request.message().contains("com.example.social"));
        assert!(request.message().contains("31 of 30"));
        assert_eq!(request.title(), "App access blocked");
    }
}
