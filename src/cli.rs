use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use app_blocker::config::get_config_path;

/// App Blocker
///
/// Tracks how long each app is in the foreground and blocks it once its
/// daily limit is reached.
#[derive(Parser, Debug)]
#[command(name = "app-blocker")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file (defaults to the per-user config directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Args {
    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => get_config_path(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Monitor usage and enforce limits until interrupted
    Run,
    /// Show today's usage against the configured limits
    Status,
    /// Create a configuration file from the example
    Init {
        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },
    /// Manage per-app limits
    Limits {
        #[command(subcommand)]
        command: LimitsCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum LimitsCommands {
    /// List configured limits
    List,
    /// Add an app or change its daily limit
    Set {
        /// Package or process name
        package: String,

        /// Minutes per day (0 = unlimited)
        minutes: u32,
    },
    /// Stop limiting an app
    Remove {
        /// Package or process name
        package: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_limits_set() {
        let args = Args::parse_from(["app-blocker", "limits", "set", "firefox", "45", "-v"]);
        assert!(args.verbose);
        match args.command {
            Commands::Limits {
                command: LimitsCommands::Set { package, minutes },
            } => {
                assert_eq!(package, "firefox");
                assert_eq!(minutes, 45);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_explicit_config_path() {
        let args = Args::parse_from(["app-blocker", "--config", "/tmp/blocker.toml", "status"]);
        assert_eq!(args.config_path().unwrap(), PathBuf::from("/tmp/blocker.toml"));
    }
}
