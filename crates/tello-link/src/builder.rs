//! Builder for [`TelloLink`]
//!
//! Chained construction on top of [`LinkConfig`]; anything not set keeps its
//! default.

use crate::channel::ChannelBinder;
use crate::config::LinkConfig;
use crate::error::Result;
use crate::link::TelloLink;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Chained constructor for [`TelloLink`]
///
/// # Example
///
/// ```no_run
/// use tello_link::TelloLinkBuilder;
///
/// let link = TelloLinkBuilder::new()
///     .device_addr("192.168.10.1:8889".parse().unwrap())
///     .window_ticks(120)
///     .build()
///     .unwrap();
/// ```
#[derive(Default)]
pub struct TelloLinkBuilder {
    config: LinkConfig,
    binder: Option<Box<dyn ChannelBinder>>,
}

impl TelloLinkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration (e.g. one loaded from TOML).
    pub fn from_config(config: LinkConfig) -> Self {
        Self {
            config,
            binder: None,
        }
    }

    pub fn device_addr(mut self, addr: SocketAddr) -> Self {
        self.config.device_addr = addr;
        self
    }

    /// Pin the command channel to a local IP instead of resolving it.
    pub fn command_bind_ip(mut self, ip: IpAddr) -> Self {
        self.config.command_bind_ip = Some(ip);
        self
    }

    pub fn control_port(mut self, port: u16) -> Self {
        self.config.control_port = port;
        self
    }

    pub fn state_bind_ip(mut self, ip: IpAddr) -> Self {
        self.config.state_bind_ip = ip;
        self
    }

    pub fn state_port(mut self, port: u16) -> Self {
        self.config.state_port = port;
        self
    }

    /// Full keepalive window in ticks; the ping fires at half of it.
    pub fn window_ticks(mut self, ticks: u32) -> Self {
        self.config.window_ticks = ticks;
        self
    }

    pub fn missed_window_limit(mut self, limit: u32) -> Self {
        self.config.missed_window_limit = limit;
        self
    }

    pub fn receive_poll(mut self, poll: Duration) -> Self {
        self.config.receive_poll_ms = poll.as_millis() as u64;
        self
    }

    pub fn receive_buffer_size(mut self, size: usize) -> Self {
        self.config.receive_buffer_size = size;
        self
    }

    pub fn tick_period(mut self, period: Duration) -> Self {
        self.config.tick_period_ms = period.as_millis() as u64;
        self
    }

    /// Replace the UDP binder (tests, alternative transports).
    pub fn binder(mut self, binder: Box<dyn ChannelBinder>) -> Self {
        self.binder = Some(binder);
        self
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Validate the configuration, bind both channels and start the receivers.
    ///
    /// # Errors
    /// - [`LinkError::Config`](crate::LinkError::Config): invalid configuration
    /// - [`LinkError::Bind`](crate::LinkError::Bind): a local port is unavailable
    pub fn build(self) -> Result<TelloLink> {
        match self.binder {
            Some(binder) => TelloLink::with_binder(self.config, binder),
            None => TelloLink::new(self.config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LinkError;
    use crate::channel::ChannelRole;
    use crate::testing::MockBinder;

    #[test]
    fn test_builder_sets_fields() {
        let builder = TelloLinkBuilder::new()
            .device_addr("10.0.0.5:8889".parse().unwrap())
            .control_port(9000)
            .state_port(9001)
            .window_ticks(10)
            .missed_window_limit(3)
            .receive_poll(Duration::from_millis(20));

        let config = builder.config();
        assert_eq!(config.device_addr, "10.0.0.5:8889".parse().unwrap());
        assert_eq!(config.control_port, 9000);
        assert_eq!(config.state_port, 9001);
        assert_eq!(config.keepalive_threshold(), 5);
        assert_eq!(config.missed_window_limit, 3);
        assert_eq!(config.receive_poll_ms, 20);
    }

    #[test]
    fn test_build_with_mock_binder() {
        let binder = MockBinder::new();
        let link = TelloLinkBuilder::new()
            .window_ticks(6)
            .binder(Box::new(binder.clone()))
            .build()
            .unwrap();

        assert_eq!(link.config().keepalive_threshold(), 3);
        assert_eq!(binder.bind_count(), 2);
        assert!(link.local_addr(ChannelRole::Command).is_some());
    }

    #[test]
    fn test_build_validates() {
        let result = TelloLinkBuilder::new()
            .receive_poll(Duration::ZERO)
            .binder(Box::new(MockBinder::new()))
            .build();
        assert!(matches!(result, Err(LinkError::Config(_))));
    }
}
