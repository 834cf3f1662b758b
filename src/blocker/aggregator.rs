use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use crate::blocker::types::ForegroundEvent;

/// Usage of one package for one day
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UsageRecord {
    pub package: String,
    pub cumulative_millis: u64,
    pub day: NaiveDate,
}

impl UsageRecord {
    fn new(package: String, day: NaiveDate) -> Self {
        Self {
            package,
            cumulative_millis: 0,
            day,
        }
    }

    /// Whole minutes used
    pub fn cumulative_minutes(&self) -> u64 {
        self.cumulative_millis / 60_000
    }
}

/// Point-in-time copy of the aggregator
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UsageSnapshot {
    pub day: NaiveDate,
    pub records: Vec<UsageRecord>,
    pub foreground: Option<String>,
}

impl UsageSnapshot {
    pub fn minutes_for(&self, package: &str) -> u64 {
        self.records
            .iter()
            .find(|r| r.package == package)
            .map(UsageRecord::cumulative_minutes)
            .unwrap_or(0)
    }
}

/// Turns foreground transitions into per-package usage for the current day.
///
/// Events only mark transitions, so each tick credits the whole tick to the
/// package that most recently came to the foreground. When a window holds
/// no transition, the previously credited package keeps accruing. Apps that
/// are foregrounded and left again within one window are not credited.
#[derive(Debug, Clone)]
pub struct UsageAggregator {
    day: NaiveDate,
    records: BTreeMap<String, UsageRecord>,
    foreground: Option<String>,
}

impl UsageAggregator {
    pub fn new(now: DateTime<Local>) -> Self {
        Self {
            day: now.date_naive(),
            records: BTreeMap::new(),
            foreground: None,
        }
    }

    /// Rebuild from a snapshot; a snapshot from another day yields a fresh aggregator
    pub fn restore(snapshot: UsageSnapshot, now: DateTime<Local>) -> Self {
        let mut aggregator = Self::new(now);
        if snapshot.day != aggregator.day {
            debug!("Discarding usage snapshot from {}", snapshot.day);
            return aggregator;
        }

        for record in snapshot.records {
            aggregator.records.insert(record.package.clone(), record);
        }
        aggregator.foreground = snapshot.foreground;
        aggregator
    }

    /// Day the current records belong to
    pub fn day(&self) -> NaiveDate {
        self.day
    }

    /// Zero every record if `now` falls on a new calendar day
    pub fn reset_if_needed(&mut self, now: DateTime<Local>) -> bool {
        let today = now.date_naive();
        if today == self.day {
            return false;
        }

        for record in self.records.values_mut() {
            record.cumulative_millis = 0;
            record.day = today;
        }
        self.day = today;
        true
    }

    /// Credit one tick of usage
    pub fn apply(&mut self, events: &[ForegroundEvent], tick: Duration) {
        for event in events {
            if !self.records.contains_key(&event.package) {
                self.records.insert(
                    event.package.clone(),
                    UsageRecord::new(event.package.clone(), self.day),
                );
            }
        }

        // max_by_key keeps the last of equal timestamps
        if let Some(latest) = events.iter().max_by_key(|e| e.timestamp) {
            if self.foreground.as_deref() != Some(latest.package.as_str()) {
                debug!("Foreground is now {}", latest.package);
            }
            self.foreground = Some(latest.package.clone());
        }

        let Some(package) = self.foreground.as_deref() else {
            return;
        };
        if let Some(record) = self.records.get_mut(package) {
            let millis = u64::try_from(tick.as_millis()).unwrap_or(u64::MAX);
            record.cumulative_millis = record.cumulative_millis.saturating_add(millis);
        }
    }

    pub fn minutes_for(&self, package: &str) -> u64 {
        self.records
            .get(package)
            .map(UsageRecord::cumulative_minutes)
            .unwrap_or(0)
    }

    /// Package currently credited with usage
    pub fn foreground(&self) -> Option<&str> {
        self.foreground.as_deref()
    }

    pub fn records(&self) -> impl Iterator<Item = &UsageRecord> {
        self.records.values()
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        UsageSnapshot {
            day: self.day,
            records: self.records.values().cloned().collect(),
            foreground: self.foreground.clone(),
        }
    }
}
