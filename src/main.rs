use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use cli::{Args, Commands, LimitsCommands};

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    let config_path = args.config_path()?;

    match args.command {
        Commands::Run => commands::run::run(&config_path, args.verbose),
        Commands::Status => commands::status::status(&config_path),
        Commands::Init { force } => commands::limits::init(&config_path, force),
        Commands::Limits { command } => match command {
            LimitsCommands::List => commands::limits::list(&config_path),
            LimitsCommands::Set { package, minutes } => {
                commands::limits::set(&config_path, &package, minutes)
            }
            LimitsCommands::Remove { package } => commands::limits::remove(&config_path, &package),
        },
    }
}
