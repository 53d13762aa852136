// SPDX-FileCopyrightText: 2026 Usher Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Usher - event registration with card and transfer payment rails.
//!
//! This is the binary entry point for the registration service.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use clap::{Parser, Subcommand};

mod serve;
mod sweep;

/// Usher - event registration with card and transfer payment rails.
#[derive(Parser, Debug)]
#[command(name = "usher", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the registration server.
    Serve,
    /// Run the expiry sweeps once and exit.
    Sweep,
    /// Manage Usher configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Validate the configuration and report anything missing for serving.
    Check,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match usher_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            usher_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Sweep) => sweep::run_sweep(config).await,
        Some(Commands::Config {
            command: ConfigCommands::Check,
        }) => {
            println!("configuration is valid");
            for missing in usher_config::validation::serve_requirements(&config) {
                println!("warning: {missing}");
            }
            Ok(())
        }
        None => {
            println!("usher: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn binary_loads_config_defaults() {
        let config = usher_config::load_and_validate_str("")
            .expect("default config should be valid");
        assert_eq!(config.server.port, 8580);
    }
}
