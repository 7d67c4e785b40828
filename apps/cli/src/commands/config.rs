//! Configuration management

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use std::fs;
use std::path::{Path, PathBuf};
use tello_link::LinkConfig;

/// Default config file: `<config_dir>/tello/config.toml`
pub fn default_config_file() -> Result<PathBuf> {
    let mut path = dirs::config_dir().context("Cannot determine config directory")?;
    path.push("tello");
    path.push("config.toml");
    Ok(path)
}

/// Load the effective configuration.
///
/// An explicit path must exist. The default path is optional; without it
/// the built-in defaults apply.
pub fn load(explicit: Option<&Path>) -> Result<LinkConfig> {
    if let Some(path) = explicit {
        return LinkConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()));
    }

    let path = default_config_file()?;
    if !path.exists() {
        return Ok(LinkConfig::default());
    }
    LinkConfig::load(&path).with_context(|| format!("Failed to load config from {}", path.display()))
}

/// Config command
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration as TOML
    Show,

    /// Print the config file path
    Path,

    /// Write the default configuration to the config file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

impl ConfigCommand {
    pub fn execute(self, explicit: Option<&Path>) -> Result<()> {
        match self {
            ConfigCommand::Show => {
                let config = load(explicit)?;
                print!("{}", config.to_toml_string()?);
                Ok(())
            },

            ConfigCommand::Path => {
                println!("{}", resolve_path(explicit)?.display());
                Ok(())
            },

            ConfigCommand::Init { force } => {
                let path = resolve_path(explicit)?;
                init(&path, force)?;
                println!("Wrote default configuration to {}", path.display());
                Ok(())
            },
        }
    }
}

fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => default_config_file(),
    }
}

fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create config directory")?;
    }
    let content = format!(
        "# Tello link configuration\n\n{}",
        LinkConfig::default().to_toml_string()?
    );
    fs::write(path, content).context("Failed to write config file")?;
    Ok(())
}
