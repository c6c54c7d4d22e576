// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Courier - a messaging gateway between channel providers and a send queue.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod channels;
mod check;
mod serve;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Courier - a messaging gateway between channel providers and a send queue.
#[derive(Parser, Debug)]
#[command(name = "courier", version, about, long_about = None)]
struct Cli {
    /// Config file to load instead of the default search path.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the webhook server and the send workers.
    Serve,
    /// Validate configuration, storage and handlers, then exit.
    Check,
    /// Manage channel records.
    Channel {
        #[command(subcommand)]
        action: ChannelCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ChannelCommand {
    /// Create or replace channels from a JSON file (one object or an array).
    Import { file: PathBuf },
    /// List stored channels.
    List,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => courier_config::load_and_validate_path(path),
        None => courier_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            courier_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Check) => check::run_check(&config).await,
        Some(Commands::Channel {
            action: ChannelCommand::Import { file },
        }) => channels::run_import(&config, &file).await,
        Some(Commands::Channel {
            action: ChannelCommand::List,
        }) => channels::run_list(&config).await,
        None => {
            println!("courier: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("courier: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_loads_config_defaults() {
        let config = courier_config::load_and_validate_str("").expect("default config should be valid");
        assert_eq!(config.server.mount, "c");
    }

    #[test]
    fn parses_channel_import() {
        let cli = Cli::parse_from(["courier", "--config", "c.toml", "channel", "import", "channels.json"]);
        assert_eq!(cli.config, Some(PathBuf::from("c.toml")));
        match cli.command {
            Some(Commands::Channel {
                action: ChannelCommand::Import { file },
            }) => assert_eq!(file, PathBuf::from("channels.json")),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
