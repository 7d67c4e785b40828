//! Subcommands

pub mod config;
pub mod monitor;
pub mod send;

pub use config::ConfigCommand;
pub use monitor::MonitorCommand;
pub use send::SendCommand;

use anyhow::Result;
use clap::Args;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tello_link::LinkConfig;

/// Link overrides shared by `monitor` and `send`
#[derive(Args, Debug, Clone, Default)]
pub struct LinkArgs {
    /// Device control endpoint (e.g. 192.168.10.1:8889)
    #[arg(short, long)]
    pub device: Option<SocketAddr>,

    /// Keepalive window in ticks
    #[arg(long)]
    pub window: Option<u32>,

    /// Tick period in milliseconds
    #[arg(long)]
    pub tick_ms: Option<u64>,
}

impl LinkArgs {
    /// Load the config file (if any) and apply command-line overrides.
    pub fn resolve(&self, config_path: Option<&Path>) -> Result<LinkConfig> {
        let mut config = config::load(config_path)?;
        if let Some(device) = self.device {
            config.device_addr = device;
        }
        if let Some(window) = self.window {
            config.window_ticks = window;
        }
        if let Some(tick_ms) = self.tick_ms {
            config.tick_period_ms = tick_ms;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Flag cleared by Ctrl+C
pub(crate) fn interrupt_flag() -> Result<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nReceived interrupt signal. Shutting down...");
        flag.store(false, Ordering::SeqCst);
    })?;
    Ok(running)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_overrides_win_over_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "window_ticks = 60\ntick_period_ms = 500").unwrap();

        let args = LinkArgs {
            device: Some("10.0.0.2:8889".parse().unwrap()),
            window: Some(20),
            tick_ms: None,
        };
        let config = args.resolve(Some(file.path())).unwrap();
        assert_eq!(config.device_addr, "10.0.0.2:8889".parse().unwrap());
        assert_eq!(config.window_ticks, 20);
        assert_eq!(config.tick_period_ms, 500);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let args = LinkArgs {
            window: Some(1),
            ..LinkArgs::default()
        };
        assert!(args.resolve(Some(file.path())).is_err());
    }
}
