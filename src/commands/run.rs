use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{error, info, warn};

use app_blocker::blocker::{BlockerEngine, Clock, HostBindings, Scheduler, SystemClock};
use app_blocker::config::{BlockerConfig, load_config};
use app_blocker::platform::{DesktopEnforcer, DesktopEventSource, DesktopPermissions};
use app_blocker::state::{UsageState, get_state_path, load_state, save_state};
use app_blocker::store::FileLimitStore;

use super::utils::init_logging;

/// How often usage is written to the state file while running
const PERSIST_INTERVAL: Duration = Duration::from_secs(30);

/// Monitor usage in the foreground until Ctrl+C
pub fn run(config_path: &Path, verbose: bool) -> Result<()> {
    let config = load_config(config_path)
        .context("Failed to load configuration. Run 'app-blocker init' first.")?;
    init_logging(verbose, &config.logging.level);

    let state_path = get_state_path()?;

    println!("Monitoring {} apps", config.apps.len());
    println!("Press Ctrl+C to stop");
    println!();

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_monitor(config, config_path.to_path_buf(), state_path))
}

async fn run_monitor(config: BlockerConfig, config_path: PathBuf, state_path: PathBuf) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let now = clock.now();

    let bindings = HostBindings {
        events: Box::new(DesktopEventSource::new()),
        limits: Box::new(FileLimitStore::with_table(&config_path, config.limits_table())),
        permissions: Box::new(DesktopPermissions),
        actions: Box::new(DesktopEnforcer),
    };
    let mut engine = BlockerEngine::new(config.engine_settings(), bindings, now);

    match load_state(&state_path) {
        Ok(Some(state)) if state.is_current(now) => {
            engine.restore(state.usage, state.breaches_today, state.counted_today, now);
        }
        Ok(Some(_)) => info!("Discarding usage state from a previous day"),
        Ok(None) => {}
        Err(e) => warn!("Failed to load usage state, starting fresh: {:#}", e),
    }

    let scheduler = Scheduler::new(engine, clock);
    scheduler.start().await?;

    let mut persist = time::interval(PERSIST_INTERVAL);
    persist.tick().await;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = persist.tick() => persist_state(&scheduler, &state_path).await,
            result = &mut shutdown => {
                result.context("Failed to listen for Ctrl+C")?;
                info!("Shutting down");
                break;
            }
        }
    }

    scheduler.stop().await;
    persist_state(&scheduler, &state_path).await;

    let stats = scheduler.stats();
    info!(
        "Ran {} ticks ({} skipped, {} failed)",
        stats.ticks_run, stats.ticks_skipped, stats.ticks_failed
    );

    Ok(())
}

async fn persist_state(scheduler: &Scheduler, state_path: &Path) {
    let snapshot = scheduler.snapshot().await;
    if let Err(e) = save_state(state_path, &UsageState::from_snapshot(&snapshot)) {
        error!("Failed to save usage state: {:#}", e);
    }
}
