//! routerboot - database router bootstrap
//!
//! Provisions the router's metadata account, stores its password in an
//! encrypted keyring and writes the router configuration.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use routerboot_bootstrap::{BootstrapError, EXIT_FAILURE, EXIT_USAGE};

mod commands;
mod config;
mod connection;

/// routerboot - database router bootstrap
#[derive(Parser, Debug)]
#[command(name = "routerboot")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Settings file, layered under ROUTERBOOT_* variables and flags
    #[arg(short, long, global = true, default_value = "routerboot.toml")]
    config: PathBuf,

    /// Log filter (trace, debug, info, warn, error or directives)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Provision the router account, keyring and configuration
    Bootstrap(commands::bootstrap::BootstrapArgs),

    /// Keyring maintenance
    #[command(subcommand)]
    Keyring(commands::keyring::KeyringCommand),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let logger = match cli.log_level.as_deref() {
        Some(level) => routerboot_log::init_with(routerboot_log::Config {
            level: level.to_string(),
            ..routerboot_log::Config::from_env()
        }),
        None => routerboot_log::auto_init(),
    };
    if let Err(e) = logger {
        eprintln!("Error: {e}");
        return exit(EXIT_USAGE);
    }

    let result = match cli.command {
        Commands::Bootstrap(args) => commands::bootstrap::run(&cli.config, args),
        Commands::Keyring(command) => commands::keyring::run(&cli.config, command),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            exit(exit_code(&e))
        }
    }
}

/// Exit code of the first bootstrap error in the chain
fn exit_code(error: &anyhow::Error) -> i32 {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<BootstrapError>())
        .map_or(EXIT_FAILURE, BootstrapError::exit_code)
}

fn exit(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
