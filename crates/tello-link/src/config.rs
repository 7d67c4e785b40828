//! Link configuration
//!
//! Constants the setup layer hands to the link: device endpoint, local ports,
//! window lengths. All values are fixed once the link is built.

use crate::error::{LinkError, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Device address on its own access point.
pub const DEFAULT_DEVICE_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 10, 1);
/// UDP port for commands and their responses.
pub const DEFAULT_CONTROL_PORT: u16 = 8889;
/// UDP port the device streams telemetry to.
pub const DEFAULT_STATE_PORT: u16 = 8890;
/// Full keepalive window in ticks (4 minutes at 1 Hz).
pub const DEFAULT_WINDOW_TICKS: u32 = 4 * 60;
/// Missed windows tolerated before the channels are rebound.
pub const DEFAULT_MISSED_WINDOW_LIMIT: u32 = 2;
/// Payload of the automatic keepalive ping.
pub const KEEPALIVE_COMMAND: &str = "command";

/// Link configuration
///
/// Every field has a default, so a TOML file only needs the values it changes:
///
/// ```
/// use tello_link::LinkConfig;
///
/// let config = LinkConfig::from_toml_str("window_ticks = 120").unwrap();
/// assert_eq!(config.window_ticks, 120);
/// assert_eq!(config.keepalive_threshold(), 60);
/// assert_eq!(config.state_port, 8890);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Device control endpoint (commands are sent here)
    pub device_addr: SocketAddr,
    /// Local IP for the command channel; `None` resolves the interface that routes to the device
    pub command_bind_ip: Option<IpAddr>,
    /// Local port for the command channel
    pub control_port: u16,
    /// Local IP for the telemetry channel
    pub state_bind_ip: IpAddr,
    /// Local port for the telemetry channel
    pub state_port: u16,
    /// Full keepalive window, in ticks
    pub window_ticks: u32,
    /// Rebind once missed windows exceed this
    pub missed_window_limit: u32,
    /// Receive poll interval (ms); only used to observe stop flags
    pub receive_poll_ms: u64,
    /// Receive buffer size in bytes
    pub receive_buffer_size: usize,
    /// Minimum spacing between repeated receive-error log lines (ms)
    pub error_log_interval_ms: u64,
    /// Suggested tick period for [`Ticker`](crate::Ticker) (ms)
    pub tick_period_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            device_addr: SocketAddr::new(IpAddr::V4(DEFAULT_DEVICE_IP), DEFAULT_CONTROL_PORT),
            command_bind_ip: None,
            control_port: DEFAULT_CONTROL_PORT,
            state_bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            state_port: DEFAULT_STATE_PORT,
            window_ticks: DEFAULT_WINDOW_TICKS,
            missed_window_limit: DEFAULT_MISSED_WINDOW_LIMIT,
            receive_poll_ms: 100,
            receive_buffer_size: 2048,
            error_log_interval_ms: 5_000,
            tick_period_ms: 1_000,
        }
    }
}

impl LinkConfig {
    /// Parse a TOML document; missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| LinkError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| LinkError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Serialize back to TOML (used by the CLI `config` command).
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| LinkError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_ticks < 2 {
            return Err(LinkError::Config(format!(
                "window_ticks must be at least 2, got {}",
                self.window_ticks
            )));
        }
        if self.receive_poll_ms == 0 {
            return Err(LinkError::Config("receive_poll_ms must be > 0".to_string()));
        }
        if self.receive_buffer_size == 0 {
            return Err(LinkError::Config("receive_buffer_size must be > 0".to_string()));
        }
        if self.tick_period_ms == 0 {
            return Err(LinkError::Config("tick_period_ms must be > 0".to_string()));
        }
        Ok(())
    }

    /// Tick count at which the keepalive ping fires (half the window, rounded up).
    pub fn keepalive_threshold(&self) -> u32 {
        self.window_ticks.div_ceil(2)
    }

    pub fn receive_poll(&self) -> Duration {
        Duration::from_millis(self.receive_poll_ms)
    }

    pub fn error_log_interval(&self) -> Duration {
        Duration::from_millis(self.error_log_interval_ms)
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    /// Local endpoint for the telemetry channel.
    pub fn state_bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.state_bind_ip, self.state_port)
    }
}
