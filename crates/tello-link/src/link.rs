//! Link facade
//!
//! [`TelloLink`] owns the shared context, the two receiver threads, the
//! uplink gate and the connection state machine. None of its operations
//! fail once constructed; faults are logged and counted instead.

use crate::channel::{ChannelBinder, ChannelRole, UdpBinder};
use crate::config::LinkConfig;
use crate::connection::{ConnectionMachine, ConnectionState, TickReport, rebind_channels};
use crate::error::Result;
use crate::metrics::MetricsSnapshot;
use crate::pipeline::{ReceiverConfig, spawn_receivers};
use crate::state::LinkContext;
use crate::telemetry::{TelemetryKey, TelemetrySnapshot};
use crate::uplink::{UplinkGate, UplinkOutcome};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{JoinHandle, spawn};
use std::time::Duration;
use tracing::{error, info};

/// Upper bound on waiting for a receiver thread at shutdown
const RECEIVER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Extension trait for timeout-capable thread joins
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();

        // Watchdog joins the target; receiver may have given up by then
        spawn(move || {
            let result = self.join();
            let _ = tx.send(result);
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Thread join timeout",
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "Thread panicked during join",
            ))),
        }
    }
}

/// Point-in-time view of the link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStatus {
    pub enabled: bool,
    pub connection: ConnectionState,
    pub uplink_hold: bool,
    pub command_addr: Option<SocketAddr>,
    pub telemetry_addr: Option<SocketAddr>,
    pub last_response: Option<String>,
    pub metrics: MetricsSnapshot,
}

/// Command/telemetry link to one device
///
/// ```no_run
/// use tello_link::{LinkConfig, TelloLink};
///
/// let link = TelloLink::new(LinkConfig::default())?;
/// link.uplink("takeoff", false);
/// for _ in 0..5 {
///     link.tick();
///     std::thread::sleep(std::time::Duration::from_secs(1));
/// }
/// println!("battery: {:?}", link.get_telemetry("bat"));
/// # Ok::<(), tello_link::LinkError>(())
/// ```
pub struct TelloLink {
    ctx: Arc<LinkContext>,
    machine: Mutex<ConnectionMachine>,
    gate: UplinkGate,
    binder: Box<dyn ChannelBinder>,
    config: LinkConfig,
    command_rx_thread: Option<JoinHandle<()>>,
    telemetry_rx_thread: Option<JoinHandle<()>>,
}

impl TelloLink {
    /// Bind both UDP channels and start the receivers.
    ///
    /// # Errors
    /// - [`LinkError::Config`](crate::LinkError::Config): invalid configuration
    /// - [`LinkError::Bind`](crate::LinkError::Bind): a local port is unavailable
    pub fn new(config: LinkConfig) -> Result<Self> {
        let binder = UdpBinder::new(&config);
        Self::with_binder(config, Box::new(binder))
    }

    /// Same as [`new`](Self::new) with a custom channel binder.
    pub fn with_binder(config: LinkConfig, binder: Box<dyn ChannelBinder>) -> Result<Self> {
        config.validate()?;

        let ctx = Arc::new(LinkContext::new());
        for role in [ChannelRole::Command, ChannelRole::Telemetry] {
            let channel = binder.bind(role).inspect_err(|_| ctx.close_channels())?;
            ctx.install_channel(role, channel);
        }

        let (command_rx_thread, telemetry_rx_thread) =
            spawn_receivers(&ctx, &ReceiverConfig::from(&config))
                .inspect_err(|_| ctx.close_channels())?;

        info!(
            "Link to {} up (window {} ticks, ping at {})",
            config.device_addr,
            config.window_ticks,
            config.keepalive_threshold()
        );

        Ok(Self {
            machine: Mutex::new(ConnectionMachine::new(&config)),
            gate: UplinkGate::new(config.device_addr),
            ctx,
            binder,
            config,
            command_rx_thread: Some(command_rx_thread),
            telemetry_rx_thread: Some(telemetry_rx_thread),
        })
    }

    /// Enable the link, rebinding channels closed by [`disconnect`](Self::disconnect).
    ///
    /// Idempotent. Always returns `true`; a failed rebind is logged and
    /// retried by the tick's rebind path.
    pub fn connect(&self) -> bool {
        let _machine = self.machine.lock();
        if self.ctx.channels_closed()
            && let Err(e) = rebind_channels(&self.ctx, self.binder.as_ref())
        {
            error!("Rebind on connect failed: {}", e);
        }
        if !self.ctx.is_enabled() {
            info!("Link enabled");
        }
        self.ctx.set_enabled(true);
        true
    }

    /// Disable the link and close both channels. Idempotent, returns `true`.
    pub fn disconnect(&self) -> bool {
        let mut machine = self.machine.lock();
        if self.ctx.is_enabled() {
            info!("Link disabled");
        }
        self.ctx.set_enabled(false);
        machine.mark_dead();
        self.ctx.close_channels();
        true
    }

    /// Send one text command. `hold = true` suppresses the automatic keepalive
    /// for the rest of the current window.
    pub fn uplink(&self, command: &str, hold: bool) -> UplinkOutcome {
        self.gate.send(&self.ctx, command, hold)
    }

    /// Latest telemetry value for `key` (e.g. `"bat"`).
    pub fn get_telemetry(&self, key: &str) -> Option<String> {
        self.ctx.telemetry.lookup(key)
    }

    pub fn telemetry_value(&self, key: TelemetryKey) -> Option<String> {
        self.ctx.telemetry.get(key)
    }

    /// Current telemetry snapshot.
    pub fn telemetry(&self) -> Arc<TelemetrySnapshot> {
        self.ctx.telemetry.snapshot()
    }

    /// Advance the connection state machine by one control period.
    pub fn tick(&self) -> TickReport {
        self.machine
            .lock()
            .tick(&self.ctx, &self.gate, self.binder.as_ref())
    }

    pub fn is_alive(&self) -> bool {
        self.machine.lock().is_alive()
    }

    pub fn is_enabled(&self) -> bool {
        self.ctx.is_enabled()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.machine.lock().state()
    }

    /// Last response text seen on the command channel.
    pub fn last_response(&self) -> Option<String> {
        self.ctx.last_response()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.ctx.metrics.snapshot()
    }

    /// Local address of the channel currently bound for `role`.
    pub fn local_addr(&self, role: ChannelRole) -> Option<SocketAddr> {
        self.ctx.channel(role).and_then(|c| c.local_addr())
    }

    pub fn status(&self) -> LinkStatus {
        LinkStatus {
            enabled: self.ctx.is_enabled(),
            connection: self.connection_state(),
            uplink_hold: self.ctx.uplink_hold(),
            command_addr: self.local_addr(ChannelRole::Command),
            telemetry_addr: self.local_addr(ChannelRole::Telemetry),
            last_response: self.ctx.last_response(),
            metrics: self.metrics(),
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Stop the receivers and release both channels.
    ///
    /// Called by `Drop`; safe to call more than once.
    pub fn shutdown(&mut self) {
        self.ctx.stop();
        self.ctx.set_enabled(false);
        self.ctx.close_channels();

        for (name, handle) in [
            ("command", self.command_rx_thread.take()),
            ("telemetry", self.telemetry_rx_thread.take()),
        ] {
            let Some(handle) = handle else { continue };
            if handle.join_timeout(RECEIVER_JOIN_TIMEOUT).is_err() {
                error!(
                    "{} RX thread failed to shut down within {:?}",
                    name, RECEIVER_JOIN_TIMEOUT
                );
            }
        }
    }
}

impl Drop for TelloLink {
    fn drop(&mut self) {
        if self.command_rx_thread.is_some() || self.telemetry_rx_thread.is_some() {
            self.shutdown();
            info!("Link to {} shut down", self.config.device_addr);
        }
    }
}

impl std::fmt::Debug for TelloLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelloLink")
            .field("device_addr", &self.config.device_addr)
            .field("enabled", &self.ctx.is_enabled())
            .field("connection", &self.connection_state())
            .finish()
    }
}
