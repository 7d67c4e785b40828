//! Uplink gate
//!
//! Single outbound path for commands, shared by callers and the keepalive.
//! Every call records the caller's hold request; the state machine reads it
//! when deciding whether its own ping is needed.

use crate::channel::ChannelRole;
use crate::state::LinkContext;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use tracing::{debug, trace, warn};

/// What happened to an uplink request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UplinkOutcome {
    /// Handed to the socket
    Sent,
    /// Link disconnected; dropped silently
    Disabled,
    /// Channels are being rebound; dropped
    RebindInProgress,
    /// No command channel bound; dropped
    NoChannel,
    /// The socket refused the datagram (logged)
    Failed,
}

impl UplinkOutcome {
    pub fn is_sent(self) -> bool {
        self == Self::Sent
    }
}

/// Sends text commands to the device control endpoint
#[derive(Debug, Clone, Copy)]
pub struct UplinkGate {
    device_addr: SocketAddr,
}

impl UplinkGate {
    pub fn new(device_addr: SocketAddr) -> Self {
        Self { device_addr }
    }

    pub fn device_addr(&self) -> SocketAddr {
        self.device_addr
    }

    /// Send `command` as one datagram.
    ///
    /// `hold = true` suppresses the next automatic keepalive until the window
    /// times out; any call with `hold = false` lifts it again. Nothing here
    /// fails past this boundary: drops and socket errors are logged and
    /// counted.
    pub fn send(&self, ctx: &LinkContext, command: &str, hold: bool) -> UplinkOutcome {
        if !ctx.is_enabled() {
            ctx.metrics.uplinks_dropped.fetch_add(1, Ordering::Relaxed);
            return UplinkOutcome::Disabled;
        }

        ctx.set_uplink_hold(hold);

        if ctx.downlink_hold() {
            debug!("Uplink '{}' dropped: rebind in progress", command);
            ctx.metrics.uplinks_dropped.fetch_add(1, Ordering::Relaxed);
            return UplinkOutcome::RebindInProgress;
        }

        let Some(channel) = ctx.channel(ChannelRole::Command) else {
            debug!("Uplink '{}' dropped: command channel not bound", command);
            ctx.metrics.uplinks_dropped.fetch_add(1, Ordering::Relaxed);
            return UplinkOutcome::NoChannel;
        };

        match channel.send_to(command.as_bytes(), self.device_addr) {
            Ok(_) => {
                trace!("Uplink '{}' -> {}", command, self.device_addr);
                ctx.metrics.commands_sent.fetch_add(1, Ordering::Relaxed);
                UplinkOutcome::Sent
            },
            Err(e) => {
                warn!("Uplink '{}' to {} failed: {}", command, self.device_addr, e);
                ctx.metrics.send_errors.fetch_add(1, Ordering::Relaxed);
                UplinkOutcome::Failed
            },
        }
    }
}
