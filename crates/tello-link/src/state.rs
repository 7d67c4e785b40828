//! Shared link context
//!
//! Everything the control task and the two receiver threads touch lives in
//! one [`LinkContext`] behind an `Arc`. Flags are atomics, the channel slots
//! are short-lived read/write locks (never held across a blocking call), and
//! telemetry goes through [`TelemetryBuffer`]'s `ArcSwap`.

use crate::channel::{ChannelRole, DatagramChannel};
use crate::metrics::LinkMetrics;
use crate::telemetry::TelemetryBuffer;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

type ChannelSlot = RwLock<Option<Arc<dyn DatagramChannel>>>;

/// State shared between the control task and the receiver threads
pub struct LinkContext {
    /// Master toggle (`connect`/`disconnect`)
    enabled: AtomicBool,
    /// Cleared once at shutdown; receiver threads exit when they see it
    is_running: AtomicBool,
    /// Any datagram arrived since the last tick consumed it
    incoming: AtomicBool,
    /// Caller is streaming; skip the automatic keepalive
    uplink_hold: AtomicBool,
    /// Rebind in progress; receivers idle and uplinks are dropped
    downlink_hold: AtomicBool,
    /// Next telemetry datagram counts as liveness (set after a rebind)
    awaiting_telemetry_liveness: AtomicBool,
    command_channel: ChannelSlot,
    telemetry_channel: ChannelSlot,
    last_response: RwLock<Option<String>>,
    pub telemetry: TelemetryBuffer,
    pub metrics: LinkMetrics,
}

impl LinkContext {
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            is_running: AtomicBool::new(true),
            incoming: AtomicBool::new(false),
            uplink_hold: AtomicBool::new(false),
            downlink_hold: AtomicBool::new(false),
            awaiting_telemetry_liveness: AtomicBool::new(false),
            command_channel: RwLock::new(None),
            telemetry_channel: RwLock::new(None),
            last_response: RwLock::new(None),
            telemetry: TelemetryBuffer::new(),
            metrics: LinkMetrics::new(),
        }
    }

    fn slot(&self, role: ChannelRole) -> &ChannelSlot {
        match role {
            ChannelRole::Command => &self.command_channel,
            ChannelRole::Telemetry => &self.telemetry_channel,
        }
    }

    /// Current channel for `role`, if bound.
    pub fn channel(&self, role: ChannelRole) -> Option<Arc<dyn DatagramChannel>> {
        self.slot(role).read().clone()
    }

    /// Install a freshly bound channel, returning the one it replaces.
    pub fn install_channel(
        &self,
        role: ChannelRole,
        channel: Arc<dyn DatagramChannel>,
    ) -> Option<Arc<dyn DatagramChannel>> {
        self.slot(role).write().replace(channel)
    }

    /// Empty the slot for `role`.
    pub fn take_channel(&self, role: ChannelRole) -> Option<Arc<dyn DatagramChannel>> {
        self.slot(role).write().take()
    }

    /// Take both channels out of their slots and close them.
    pub fn close_channels(&self) {
        for role in [ChannelRole::Command, ChannelRole::Telemetry] {
            if let Some(channel) = self.take_channel(role) {
                channel.close();
            }
        }
    }

    /// Whether either slot is empty or holds a closed channel.
    pub fn channels_closed(&self) -> bool {
        [ChannelRole::Command, ChannelRole::Telemetry]
            .into_iter()
            .any(|role| self.channel(role).is_none_or(|c| c.is_closed()))
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    pub(crate) fn stop(&self) {
        self.is_running.store(false, Ordering::Release);
    }

    /// Receivers may call `receive` only while this holds.
    pub fn receivers_active(&self) -> bool {
        self.is_enabled() && !self.downlink_hold()
    }

    /// Mark that a datagram arrived.
    pub fn raise_incoming(&self) {
        self.incoming.store(true, Ordering::Release);
    }

    /// Consume the incoming flag, returning whether it was set.
    pub fn take_incoming(&self) -> bool {
        self.incoming.swap(false, Ordering::AcqRel)
    }

    pub fn incoming_pending(&self) -> bool {
        self.incoming.load(Ordering::Acquire)
    }

    pub fn uplink_hold(&self) -> bool {
        self.uplink_hold.load(Ordering::Acquire)
    }

    pub(crate) fn set_uplink_hold(&self, hold: bool) {
        self.uplink_hold.store(hold, Ordering::Release);
    }

    pub fn downlink_hold(&self) -> bool {
        self.downlink_hold.load(Ordering::Acquire)
    }

    pub(crate) fn set_downlink_hold(&self, hold: bool) {
        self.downlink_hold.store(hold, Ordering::Release);
    }

    pub fn awaiting_telemetry_liveness(&self) -> bool {
        self.awaiting_telemetry_liveness.load(Ordering::Acquire)
    }

    pub(crate) fn set_awaiting_telemetry_liveness(&self, awaiting: bool) {
        self.awaiting_telemetry_liveness.store(awaiting, Ordering::Release);
    }

    /// Consume the awaiting-telemetry flag, returning whether it was set.
    pub(crate) fn take_awaiting_telemetry_liveness(&self) -> bool {
        self.awaiting_telemetry_liveness.swap(false, Ordering::AcqRel)
    }

    /// Last response text received on the command channel.
    pub fn last_response(&self) -> Option<String> {
        self.last_response.read().clone()
    }

    pub(crate) fn set_last_response(&self, response: String) {
        *self.last_response.write() = Some(response);
    }
}

impl Default for LinkContext {
    fn default() -> Self {
        Self::new()
    }
}
