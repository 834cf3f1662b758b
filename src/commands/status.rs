use anyhow::Result;
use chrono::Local;
use std::path::Path;

use app_blocker::blocker::{Evaluation, LimitEvaluator, UsageSnapshot};
use app_blocker::config::{BlockerConfig, load_config};
use app_blocker::state::{get_state_path, load_state};

use super::utils::format_minutes;

/// One line of the status table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRow {
    pub package: String,
    pub used_minutes: u64,
    pub limit_minutes: u32,
    pub remaining_minutes: Option<u64>,
    pub evaluation: Evaluation,
}

/// Compare today's usage with every configured app
pub fn status_rows(config: &BlockerConfig, usage: Option<&UsageSnapshot>) -> Vec<StatusRow> {
    config
        .apps
        .iter()
        .map(|app| {
            let used = usage.map(|u| u.minutes_for(&app.package)).unwrap_or(0);
            let limit = Some(app.limit_minutes);
            StatusRow {
                package: app.package.clone(),
                used_minutes: used,
                limit_minutes: app.limit_minutes,
                remaining_minutes: LimitEvaluator::remaining_minutes(used, limit),
                evaluation: LimitEvaluator::evaluate(&app.package, used, limit),
            }
        })
        .collect()
}

/// Show today's usage against the configured limits
pub fn status(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let now = Local::now();

    let state = load_state(&get_state_path()?)?.filter(|s| s.is_current(now));
    let usage = state.as_ref().map(|s| &s.usage);
    let breaches_today = state.as_ref().map(|s| s.breaches_today).unwrap_or(0);

    println!("\n=== App Blocker Status ({}) ===\n", now.format("%Y-%m-%d"));

    if config.apps.is_empty() {
        println!("No apps are limited.");
        println!("Add one with: app-blocker limits set <package> <minutes>");
        return Ok(());
    }

    println!(
        "{:<32} {:>8} {:>8} {:>10}  STATUS",
        "APP", "USED", "LIMIT", "REMAINING"
    );
    for row in status_rows(&config, usage) {
        let (limit, remaining) = match row.remaining_minutes {
            Some(remaining) => (
                format_minutes(u64::from(row.limit_minutes)),
                format_minutes(remaining),
            ),
            None => ("-".to_string(), "-".to_string()),
        };
        let status = match row.evaluation {
            Evaluation::NoLimit => "unlimited",
            Evaluation::Under => "✓ ok",
            Evaluation::Breached => "🔒 limit reached",
        };
        println!(
            "{:<32} {:>8} {:>8} {:>10}  {}",
            row.package,
            format_minutes(row.used_minutes),
            limit,
            remaining,
            status
        );
    }

    println!("\nLimits reached today: {}", breaches_today);

    match &state {
        Some(state) => println!("Last saved: {}", state.saved_at.format("%H:%M:%S")),
        None => println!("No usage recorded today. Is 'app-blocker run' running?"),
    }

    Ok(())
}
