//! # Tello CLI
//!
//! Command-line front end for `tello-link`.
//!
//! ```bash
//! # Watch link health and telemetry
//! tello-cli monitor
//!
//! # Enter SDK mode, take off, hover, land
//! tello-cli send command takeoff "rc 0 0 0 0" land
//!
//! # Print the effective configuration
//! tello-cli config show
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

use commands::{ConfigCommand, LinkArgs, MonitorCommand, SendCommand};

/// Tello link command-line tool
#[derive(Parser, Debug)]
#[command(name = "tello-cli")]
#[command(about = "Monitor and command a Tello over its UDP link", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to <config_dir>/tello/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Tick the link and print status and telemetry
    Monitor {
        #[command(flatten)]
        link: LinkArgs,
        #[command(flatten)]
        args: MonitorCommand,
    },

    /// Send commands and print the responses
    Send {
        #[command(flatten)]
        link: LinkArgs,
        #[command(flatten)]
        args: SendCommand,
    },

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommand),
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tello_cli=info".parse()?)
                .add_directive("tello_link=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config;

    match cli.command {
        Commands::Monitor { link, args } => {
            let config = link.resolve(config_path.as_deref())?;
            args.execute(config)
        },

        Commands::Send { link, args } => {
            let config = link.resolve(config_path.as_deref())?;
            args.execute(config)
        },

        Commands::Config(cmd) => cmd.execute(config_path.as_deref()),
    }
}
