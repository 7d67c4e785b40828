//! Connection state machine
//!
//! Externally clocked: the caller ticks it at a steady cadence (1 Hz by
//! default). Each tick runs the same fixed sequence:
//!
//! 1. advance the tick counter
//! 2. dead-connection detection (`alive` and too many missed windows)
//! 3. rebind (not `alive` and too many missed windows)
//! 4. keepalive ping at half the window, once per window, unless held
//! 5. full-window timeout: clear hold, re-arm the ping, restart the counter
//! 6. consume the incoming flag: alive, all counters reset
//!
//! Steps 2 and 3 guard the same counter independently, so coming from an
//! already dead state both can fire within one tick.

use crate::channel::{ChannelBinder, ChannelRole};
use crate::config::{KEEPALIVE_COMMAND, LinkConfig};
use crate::error::{LinkError, Result};
use crate::state::LinkContext;
use crate::uplink::{UplinkGate, UplinkOutcome};
use std::sync::atomic::Ordering;
use tracing::{debug, error, info, warn};

/// Liveness bookkeeping owned by the state machine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionState {
    /// A datagram arrived since the last dead-connection reset
    pub alive: bool,
    /// Keepalive already handled in this window
    pub ping_sent_this_window: bool,
    /// Ticks since the last liveness or window reset
    pub tick_counter: u32,
    /// Consecutive windows without inbound traffic
    pub missed_windows: u32,
}

/// Keepalive decision taken during a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveAction {
    /// Ping handed to the uplink gate
    Pinged(UplinkOutcome),
    /// Caller holds the uplink; no ping this window
    Suppressed,
}

/// What a single tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// `false` when the link is disconnected and the tick was a no-op
    pub ticked: bool,
    /// `alive` dropped to false this tick
    pub connection_lost: bool,
    /// Rebind attempted this tick; `Some(false)` if a channel failed to bind
    pub rebind: Option<bool>,
    pub keepalive: Option<KeepaliveAction>,
    /// Full window elapsed; hold cleared and ping re-armed
    pub window_reset: bool,
    /// Incoming flag consumed; connection alive
    pub liveness_consumed: bool,
}

/// Keepalive / liveness state machine
#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    state: ConnectionState,
    keepalive_threshold: u32,
    window_ticks: u32,
    missed_window_limit: u32,
}

impl ConnectionMachine {
    pub fn new(config: &LinkConfig) -> Self {
        Self::with_thresholds(
            config.keepalive_threshold(),
            config.window_ticks,
            config.missed_window_limit,
        )
    }

    /// Explicit thresholds, e.g. `with_thresholds(2, 4, 1)`.
    pub fn with_thresholds(
        keepalive_threshold: u32,
        window_ticks: u32,
        missed_window_limit: u32,
    ) -> Self {
        Self {
            state: ConnectionState::default(),
            keepalive_threshold,
            window_ticks,
            missed_window_limit,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_alive(&self) -> bool {
        self.state.alive
    }

    /// Forget liveness (used by `disconnect`).
    pub(crate) fn mark_dead(&mut self) {
        self.state.alive = false;
    }

    /// Advance the machine by one control period.
    pub fn tick(
        &mut self,
        ctx: &LinkContext,
        gate: &UplinkGate,
        binder: &dyn ChannelBinder,
    ) -> TickReport {
        let mut report = TickReport::default();

        if !ctx.is_enabled() {
            return report;
        }
        report.ticked = true;

        let state = &mut self.state;
        state.tick_counter = state.tick_counter.saturating_add(1);

        if state.alive && state.missed_windows > self.missed_window_limit {
            warn!(
                "No response from device for {} keepalive windows, connection lost",
                state.missed_windows
            );
            state.missed_windows = 0;
            state.alive = false;
            report.connection_lost = true;
        }

        if !state.alive && state.missed_windows > self.missed_window_limit {
            report.rebind = Some(match rebind_channels(ctx, binder) {
                Ok(()) => true,
                Err(e) => {
                    error!("Channel rebind failed: {}", e);
                    false
                },
            });
            state.missed_windows = 0;
        }

        if state.tick_counter >= self.keepalive_threshold && !state.ping_sent_this_window {
            let action = if ctx.uplink_hold() {
                debug!("Keepalive suppressed: uplink held by caller");
                ctx.metrics.keepalives_suppressed.fetch_add(1, Ordering::Relaxed);
                KeepaliveAction::Suppressed
            } else {
                info!("Ping...");
                let outcome = gate.send(ctx, KEEPALIVE_COMMAND, false);
                if outcome.is_sent() {
                    ctx.metrics.keepalives_sent.fetch_add(1, Ordering::Relaxed);
                }
                KeepaliveAction::Pinged(outcome)
            };
            report.keepalive = Some(action);
            state.missed_windows = state.missed_windows.saturating_add(1);
            state.ping_sent_this_window = true;
        }

        if state.tick_counter >= self.window_ticks {
            ctx.set_uplink_hold(false);
            state.ping_sent_this_window = false;
            state.tick_counter = 0;
            report.window_reset = true;
        }

        if ctx.take_incoming() {
            if !state.alive {
                info!("Device responding, connection alive");
            }
            state.alive = true;
            state.tick_counter = 0;
            state.ping_sent_this_window = false;
            state.missed_windows = 0;
            report.liveness_consumed = true;
        }

        report
    }
}

/// Close both channels and bind fresh ones.
///
/// Receivers and the uplink gate stand down while `downlink_hold` is raised.
/// Both roles are attempted even if the first fails; the first error is
/// returned and a failed role's slot stays empty until the next rebind.
pub fn rebind_channels(ctx: &LinkContext, binder: &dyn ChannelBinder) -> Result<()> {
    ctx.set_downlink_hold(true);
    ctx.close_channels();

    let mut first_error: Option<LinkError> = None;
    for role in [ChannelRole::Command, ChannelRole::Telemetry] {
        match binder.bind(role) {
            Ok(channel) => {
                ctx.install_channel(role, channel);
            },
            Err(e) => {
                warn!("Failed to rebind {} channel: {}", role, e);
                first_error.get_or_insert(e);
            },
        }
    }

    ctx.set_downlink_hold(false);

    match first_error {
        None => {
            ctx.set_awaiting_telemetry_liveness(true);
            ctx.metrics.rebinds.fetch_add(1, Ordering::Relaxed);
            info!("Channels rebound");
            Ok(())
        },
        Some(e) => {
            ctx.metrics.rebind_failures.fetch_add(1, Ordering::Relaxed);
            Err(e)
        },
    }
}
