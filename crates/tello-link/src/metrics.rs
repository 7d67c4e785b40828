//! Link metrics
//!
//! Lock-free counters updated by the receiver threads, the uplink gate and
//! the connection state machine. Safe to read from any thread.

use std::sync::atomic::{AtomicU64, Ordering};

/// Link counters
///
/// ```rust
/// use tello_link::LinkMetrics;
/// use std::sync::atomic::Ordering;
///
/// let metrics = LinkMetrics::new();
/// metrics.commands_sent.fetch_add(1, Ordering::Relaxed);
/// assert_eq!(metrics.snapshot().commands_sent, 1);
/// ```
#[derive(Debug, Default)]
pub struct LinkMetrics {
    /// Datagrams received on the command channel (responses)
    pub rx_command_datagrams: AtomicU64,

    /// Datagrams received on the telemetry channel
    pub rx_telemetry_datagrams: AtomicU64,

    /// Socket faults while receiving (poll expiry not included)
    pub rx_errors: AtomicU64,

    /// Telemetry datagrams that failed to decode
    pub decode_errors: AtomicU64,

    /// Commands handed to the socket, keepalives included
    pub commands_sent: AtomicU64,

    /// Commands the socket refused
    pub send_errors: AtomicU64,

    /// Commands dropped by the gate (disconnected, rebind in progress, no channel)
    pub uplinks_dropped: AtomicU64,

    /// Automatic keepalive pings sent
    pub keepalives_sent: AtomicU64,

    /// Keepalive pings suppressed by an uplink hold
    pub keepalives_suppressed: AtomicU64,

    /// Successful channel rebinds
    pub rebinds: AtomicU64,

    /// Rebind attempts where at least one channel failed to bind
    pub rebind_failures: AtomicU64,
}

impl LinkMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read all counters at once.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rx_command_datagrams: self.rx_command_datagrams.load(Ordering::Relaxed),
            rx_telemetry_datagrams: self.rx_telemetry_datagrams.load(Ordering::Relaxed),
            rx_errors: self.rx_errors.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            commands_sent: self.commands_sent.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            uplinks_dropped: self.uplinks_dropped.load(Ordering::Relaxed),
            keepalives_sent: self.keepalives_sent.load(Ordering::Relaxed),
            keepalives_suppressed: self.keepalives_suppressed.load(Ordering::Relaxed),
            rebinds: self.rebinds.load(Ordering::Relaxed),
            rebind_failures: self.rebind_failures.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.rx_command_datagrams.store(0, Ordering::Relaxed);
        self.rx_telemetry_datagrams.store(0, Ordering::Relaxed);
        self.rx_errors.store(0, Ordering::Relaxed);
        self.decode_errors.store(0, Ordering::Relaxed);
        self.commands_sent.store(0, Ordering::Relaxed);
        self.send_errors.store(0, Ordering::Relaxed);
        self.uplinks_dropped.store(0, Ordering::Relaxed);
        self.keepalives_sent.store(0, Ordering::Relaxed);
        self.keepalives_suppressed.store(0, Ordering::Relaxed);
        self.rebinds.store(0, Ordering::Relaxed);
        self.rebind_failures.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time copy of [`LinkMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub rx_command_datagrams: u64,
    pub rx_telemetry_datagrams: u64,
    pub rx_errors: u64,
    pub decode_errors: u64,
    pub commands_sent: u64,
    pub send_errors: u64,
    pub uplinks_dropped: u64,
    pub keepalives_sent: u64,
    pub keepalives_suppressed: u64,
    pub rebinds: u64,
    pub rebind_failures: u64,
}

impl MetricsSnapshot {
    /// Datagrams received on either channel.
    pub fn rx_datagrams_total(&self) -> u64 {
        self.rx_command_datagrams + self.rx_telemetry_datagrams
    }
}
