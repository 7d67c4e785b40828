//! Receiver loops
//!
//! Two background threads, one per channel. Each blocks on its channel for
//! at most one poll interval, then re-checks the shutdown and gating flags.
//! Nothing a receiver sees is fatal: poll expiry is ignored, socket faults
//! are counted and logged (throttled), closed channels are waited out until
//! a rebind installs a fresh one.

use crate::channel::ChannelRole;
use crate::config::LinkConfig;
use crate::error::{LinkError, Result};
use crate::state::LinkContext;
use crate::telemetry::decode_datagram;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Receiver thread settings
///
/// # Example
///
/// ```
/// use tello_link::{LinkConfig, ReceiverConfig};
///
/// let config = ReceiverConfig::from(&LinkConfig::default());
/// assert_eq!(config.buffer_size, 2048);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverConfig {
    /// Largest datagram accepted; longer ones are truncated
    pub buffer_size: usize,
    /// Sleep between checks while the receiver is gated off
    pub idle_interval: Duration,
    /// Minimum spacing between logged receive faults
    pub error_log_interval: Duration,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self::from(&LinkConfig::default())
    }
}

impl From<&LinkConfig> for ReceiverConfig {
    fn from(config: &LinkConfig) -> Self {
        Self {
            buffer_size: config.receive_buffer_size,
            idle_interval: config.receive_poll(),
            error_log_interval: config.error_log_interval(),
        }
    }
}

/// Rate limiter for repeated receive faults
///
/// The first fault in an interval is logged; the rest are only counted and
/// summarized with the next logged one.
#[derive(Debug)]
pub struct ErrorThrottle {
    interval: Duration,
    last_logged: Option<Instant>,
    suppressed: u64,
}

impl ErrorThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_logged: None,
            suppressed: 0,
        }
    }

    /// Returns the number of faults suppressed since the last logged one,
    /// or `None` if this fault should stay quiet.
    pub fn admit(&mut self) -> Option<u64> {
        let now = Instant::now();
        match self.last_logged {
            Some(last) if now.duration_since(last) < self.interval => {
                self.suppressed += 1;
                None
            },
            _ => {
                self.last_logged = Some(now);
                Some(std::mem::take(&mut self.suppressed))
            },
        }
    }

    fn report(&mut self, role: ChannelRole, err: &LinkError) {
        if let Some(suppressed) = self.admit() {
            if suppressed > 0 {
                warn!("{} receive error: {} ({} similar suppressed)", role, err, suppressed);
            } else {
                warn!("{} receive error: {}", role, err);
            }
        }
    }
}

/// Command channel receiver
///
/// Every datagram (`ok`, `error`, or a query answer) counts as liveness. The
/// text is kept as the last response for diagnostics.
pub fn command_rx_loop(ctx: Arc<LinkContext>, config: ReceiverConfig) {
    let mut buf = vec![0u8; config.buffer_size];
    let mut throttle = ErrorThrottle::new(config.error_log_interval);

    loop {
        // Acquire: if we see false, we see every cleanup write before it
        if !ctx.is_running() {
            trace!("Command RX thread: is_running flag is false, exiting");
            break;
        }

        if !ctx.receivers_active() {
            thread::sleep(config.idle_interval);
            continue;
        }
        let Some(channel) = ctx.channel(ChannelRole::Command) else {
            thread::sleep(config.idle_interval);
            continue;
        };

        match channel.receive(&mut buf) {
            Ok((len, from)) => {
                ctx.metrics.rx_command_datagrams.fetch_add(1, Ordering::Relaxed);
                ctx.raise_incoming();
                let response = String::from_utf8_lossy(&buf[..len]).trim().to_string();
                debug!("Response from {}: {}", from, response);
                ctx.set_last_response(response);
            },
            Err(LinkError::Timeout) => continue,
            Err(LinkError::ChannelClosed) => thread::sleep(config.idle_interval),
            Err(e) => {
                ctx.metrics.rx_errors.fetch_add(1, Ordering::Relaxed);
                throttle.report(ChannelRole::Command, &e);
            },
        }
    }
}

/// Telemetry channel receiver
///
/// Each datagram replaces the telemetry snapshot. Telemetry counts as
/// liveness only for the first datagram after a rebind.
pub fn telemetry_rx_loop(ctx: Arc<LinkContext>, config: ReceiverConfig) {
    let mut buf = vec![0u8; config.buffer_size];
    let mut throttle = ErrorThrottle::new(config.error_log_interval);

    loop {
        if !ctx.is_running() {
            trace!("Telemetry RX thread: is_running flag is false, exiting");
            break;
        }

        if !ctx.receivers_active() {
            thread::sleep(config.idle_interval);
            continue;
        }
        let Some(channel) = ctx.channel(ChannelRole::Telemetry) else {
            thread::sleep(config.idle_interval);
            continue;
        };

        let len = match channel.receive(&mut buf) {
            Ok((len, _)) => len,
            Err(LinkError::Timeout) => continue,
            Err(LinkError::ChannelClosed) => {
                thread::sleep(config.idle_interval);
                continue;
            },
            Err(e) => {
                ctx.metrics.rx_errors.fetch_add(1, Ordering::Relaxed);
                throttle.report(ChannelRole::Telemetry, &e);
                continue;
            },
        };
        ctx.metrics.rx_telemetry_datagrams.fetch_add(1, Ordering::Relaxed);

        match decode_datagram(&buf[..len]) {
            Ok(fields) => {
                ctx.telemetry.ingest(fields);
                if ctx.take_awaiting_telemetry_liveness() {
                    debug!("First telemetry after rebind, raising incoming");
                    ctx.raise_incoming();
                }
            },
            Err(e) => {
                ctx.metrics.decode_errors.fetch_add(1, Ordering::Relaxed);
                throttle.report(ChannelRole::Telemetry, &e);
            },
        }
    }
}

/// Start both receiver threads.
///
/// # Errors
/// - [`LinkError::Thread`]: the OS refused to start a thread
pub fn spawn_receivers(
    ctx: &Arc<LinkContext>,
    config: &ReceiverConfig,
) -> Result<(JoinHandle<()>, JoinHandle<()>)> {
    let command = spawn_named("tello-command-rx", {
        let ctx = ctx.clone();
        let config = config.clone();
        move || command_rx_loop(ctx, config)
    })?;

    let telemetry = match spawn_named("tello-telemetry-rx", {
        let ctx = ctx.clone();
        let config = config.clone();
        move || telemetry_rx_loop(ctx, config)
    }) {
        Ok(handle) => handle,
        Err(e) => {
            ctx.stop();
            let _ = command.join();
            return Err(e);
        },
    };

    Ok((command, telemetry))
}

fn spawn_named(name: &str, f: impl FnOnce() + Send + 'static) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map_err(|source| LinkError::Thread {
            name: name.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockChannel;

    fn test_config() -> ReceiverConfig {
        ReceiverConfig {
            buffer_size: 256,
            idle_interval: Duration::from_millis(2),
            error_log_interval: Duration::from_secs(5),
        }
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    fn start(ctx: &Arc<LinkContext>) -> (JoinHandle<()>, JoinHandle<()>) {
        spawn_receivers(ctx, &test_config()).unwrap()
    }

    fn stop(ctx: &Arc<LinkContext>, handles: (JoinHandle<()>, JoinHandle<()>)) {
        ctx.stop();
        handles.0.join().unwrap();
        handles.1.join().unwrap();
    }

    #[test]
    fn test_throttle_admits_first_then_counts() {
        let mut throttle = ErrorThrottle::new(Duration::from_secs(60));
        assert_eq!(throttle.admit(), Some(0));
        assert_eq!(throttle.admit(), None);
        assert_eq!(throttle.admit(), None);

        let mut throttle = ErrorThrottle::new(Duration::ZERO);
        assert_eq!(throttle.admit(), Some(0));
        assert_eq!(throttle.admit(), Some(0));
    }

    #[test]
    fn test_response_raises_incoming() {
        let ctx = Arc::new(LinkContext::new());
        let command = MockChannel::new("127.0.0.1:8889");
        ctx.install_channel(ChannelRole::Command, command.clone());
        let handles = start(&ctx);

        command.push_inbound(b"ok\r\n");
        assert!(wait_until(|| ctx.incoming_pending()));
        assert_eq!(ctx.last_response().as_deref(), Some("ok"));
        assert_eq!(ctx.metrics.snapshot().rx_command_datagrams, 1);

        stop(&ctx, handles);
    }

    #[test]
    fn test_telemetry_updates_buffer_without_liveness() {
        let ctx = Arc::new(LinkContext::new());
        let telemetry = MockChannel::new("0.0.0.0:8890");
        ctx.install_channel(ChannelRole::Telemetry, telemetry.clone());
        let handles = start(&ctx);

        telemetry.push_inbound(b"bat:87;h:120;mid:-1;\r\n");
        assert!(wait_until(|| ctx.telemetry.lookup("bat").is_some()));
        assert_eq!(ctx.telemetry.lookup("h").as_deref(), Some("120"));
        assert!(!ctx.incoming_pending());

        stop(&ctx, handles);
    }

    #[test]
    fn test_first_telemetry_after_rebind_counts_once() {
        let ctx = Arc::new(LinkContext::new());
        let telemetry = MockChannel::new("0.0.0.0:8890");
        ctx.install_channel(ChannelRole::Telemetry, telemetry.clone());
        ctx.set_awaiting_telemetry_liveness(true);
        let handles = start(&ctx);

        telemetry.push_inbound(b"bat:50;");
        assert!(wait_until(|| ctx.incoming_pending()));
        assert!(ctx.take_incoming());
        assert!(!ctx.awaiting_telemetry_liveness());

        telemetry.push_inbound(b"bat:49;");
        assert!(wait_until(|| ctx.telemetry.lookup("bat").as_deref() == Some("49")));
        assert!(!ctx.incoming_pending());

        stop(&ctx, handles);
    }

    #[test]
    fn test_bad_telemetry_keeps_snapshot() {
        let ctx = Arc::new(LinkContext::new());
        let telemetry = MockChannel::new("0.0.0.0:8890");
        ctx.install_channel(ChannelRole::Telemetry, telemetry.clone());
        let handles = start(&ctx);

        telemetry.push_inbound(b"bat:87;");
        assert!(wait_until(|| ctx.telemetry.lookup("bat").is_some()));

        telemetry.push_inbound(&[0xff, 0xfe, b';']);
        assert!(wait_until(|| ctx.metrics.snapshot().decode_errors == 1));
        assert_eq!(ctx.telemetry.lookup("bat").as_deref(), Some("87"));

        stop(&ctx, handles);
    }

    #[test]
    fn test_receive_errors_are_survived() {
        let ctx = Arc::new(LinkContext::new());
        let command = MockChannel::new("127.0.0.1:8889");
        ctx.install_channel(ChannelRole::Command, command.clone());
        let handles = start(&ctx);

        for _ in 0..5 {
            command.push_receive_error();
        }
        command.push_inbound(b"ok");
        assert!(wait_until(|| ctx.incoming_pending()));
        assert_eq!(ctx.metrics.snapshot().rx_errors, 5);

        stop(&ctx, handles);
    }

    #[test]
    fn test_receivers_idle_while_gated() {
        let ctx = Arc::new(LinkContext::new());
        let command = MockChannel::new("127.0.0.1:8889");
        ctx.install_channel(ChannelRole::Command, command.clone());
        ctx.set_downlink_hold(true);
        let handles = start(&ctx);

        command.push_inbound(b"ok");
        thread::sleep(Duration::from_millis(30));
        assert_eq!(command.pending_inbound(), 1);
        assert!(!ctx.incoming_pending());

        ctx.set_downlink_hold(false);
        assert!(wait_until(|| ctx.incoming_pending()));

        ctx.set_enabled(false);
        thread::sleep(Duration::from_millis(10));
        command.push_inbound(b"ok");
        thread::sleep(Duration::from_millis(30));
        assert_eq!(command.pending_inbound(), 1);

        stop(&ctx, handles);
    }

    #[test]
    fn test_closed_channel_waits_for_rebind() {
        let ctx = Arc::new(LinkContext::new());
        let old = MockChannel::new("127.0.0.1:8889");
        ctx.install_channel(ChannelRole::Command, old.clone());
        let handles = start(&ctx);

        crate::channel::DatagramChannel::close(old.as_ref());
        thread::sleep(Duration::from_millis(20));
        assert_eq!(ctx.metrics.snapshot().rx_errors, 0);

        let fresh = MockChannel::new("127.0.0.1:8889");
        fresh.push_inbound(b"ok");
        ctx.install_channel(ChannelRole::Command, fresh);
        assert!(wait_until(|| ctx.incoming_pending()));

        stop(&ctx, handles);
    }

    #[test]
    fn test_stop_ends_threads() {
        let ctx = Arc::new(LinkContext::new());
        let handles = start(&ctx);
        stop(&ctx, handles);
        assert!(!ctx.is_running());
    }
}
