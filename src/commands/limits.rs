use anyhow::{Context, Result};
use std::path::Path;

use app_blocker::config::{BlockerConfig, EXAMPLE_CONFIG, load_config, save_config};
use app_blocker::platform::common::atomic_write;

use super::utils::format_minutes;

/// Initialize a new configuration file
pub fn init(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists: {}\nUse --force to overwrite",
            config_path.display()
        );
    }

    atomic_write(config_path, EXAMPLE_CONFIG.as_bytes())
        .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

    println!("✓ Created configuration file: {}", config_path.display());
    println!("\nEdit the [[apps]] entries or use 'app-blocker limits set <package> <minutes>'.");
    println!("Then start monitoring with: app-blocker run");

    Ok(())
}

/// List configured limits
pub fn list(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;

    if config.apps.is_empty() {
        println!("No apps are limited");
        return Ok(());
    }

    println!("{:<40} {:>10}", "APP", "LIMIT");
    for app in &config.apps {
        let limit = match app.limit_minutes {
            0 => "unlimited".to_string(),
            minutes => format_minutes(u64::from(minutes)),
        };
        println!("{:<40} {:>10}", app.package, limit);
    }

    Ok(())
}

/// Add an app or change its limit
pub fn set(config_path: &Path, package: &str, minutes: u32) -> Result<()> {
    let mut config = load_or_default(config_path)?;
    let previous = config.limit_for(package);
    config.set_limit(package, minutes);
    save_config(config_path, &config)?;

    match previous {
        Some(old) => println!("✓ Changed limit for {}: {} -> {} minutes", package, old, minutes),
        None => println!("✓ Limited {} to {} minutes per day", package, minutes),
    }
    println!("A running monitor picks up the change on its next tick.");

    Ok(())
}

/// Stop limiting an app
pub fn remove(config_path: &Path, package: &str) -> Result<()> {
    let mut config = load_config(config_path)?;

    if !config.remove_limit(package) {
        anyhow::bail!("{} is not limited", package);
    }
    save_config(config_path, &config)?;

    println!("✓ Removed limit for {}", package);
    Ok(())
}

fn load_or_default(config_path: &Path) -> Result<BlockerConfig> {
    if config_path.exists() {
        load_config(config_path)
    } else {
        Ok(BlockerConfig::default())
    }
}
