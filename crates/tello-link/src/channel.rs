//! Datagram channels
//!
//! One channel per direction of interest: the command channel (commands out,
//! `ok`/`error` responses in) and the telemetry channel (state stream in).
//! Channels sit behind [`DatagramChannel`] and are created through a
//! [`ChannelBinder`], so rebinding can be exercised without real sockets.

use crate::config::LinkConfig;
use crate::error::{LinkError, Result};
use parking_lot::RwLock;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Which of the two link channels a socket serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelRole {
    /// Commands and their responses
    Command,
    /// Periodic telemetry stream
    Telemetry,
}

impl fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command => write!(f, "command"),
            Self::Telemetry => write!(f, "telemetry"),
        }
    }
}

/// A bound, closable datagram endpoint
///
/// Implementations must be shareable between the receiver thread and the
/// uplink path: `receive` and `send_to` may run concurrently.
pub trait DatagramChannel: Send + Sync {
    /// Send one datagram. Best effort, no retry.
    fn send_to(&self, bytes: &[u8], remote: SocketAddr) -> Result<usize>;

    /// Block for one datagram (bounded by the channel's poll interval).
    ///
    /// Poll expiry returns [`LinkError::Timeout`]; a closed channel returns
    /// [`LinkError::ChannelClosed`].
    fn receive(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)>;

    /// Release the socket. Closing an already closed channel is a no-op.
    fn close(&self);

    fn is_closed(&self) -> bool;

    fn local_addr(&self) -> Option<SocketAddr>;
}

/// UDP implementation of [`DatagramChannel`]
///
/// The socket lives behind a read/write lock: sends and receives share it,
/// `close` takes it exclusively. An in-flight receive therefore finishes
/// (within one poll interval) before the descriptor is dropped, which leaves
/// the fixed port free for an immediate rebind.
pub struct UdpChannel {
    role: ChannelRole,
    local_addr: SocketAddr,
    socket: RwLock<Option<UdpSocket>>,
}

impl UdpChannel {
    /// Bind a UDP socket at `addr`.
    ///
    /// # Errors
    /// - [`LinkError::Bind`]: address or port unavailable
    pub fn bind(role: ChannelRole, addr: SocketAddr, poll_interval: Duration) -> Result<Self> {
        let socket = UdpSocket::bind(addr).map_err(|source| LinkError::Bind { addr, source })?;
        socket
            .set_read_timeout(Some(poll_interval))
            .map_err(|source| LinkError::Bind { addr, source })?;
        let local_addr = socket.local_addr().unwrap_or(addr);

        debug!("{} channel bound to {}", role, local_addr);

        Ok(Self {
            role,
            local_addr,
            socket: RwLock::new(Some(socket)),
        })
    }

    pub fn role(&self) -> ChannelRole {
        self.role
    }
}

impl DatagramChannel for UdpChannel {
    fn send_to(&self, bytes: &[u8], remote: SocketAddr) -> Result<usize> {
        let guard = self.socket.read();
        let socket = guard.as_ref().ok_or(LinkError::ChannelClosed)?;
        socket.send_to(bytes, remote).map_err(LinkError::Send)
    }

    fn receive(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        let guard = self.socket.read();
        let socket = guard.as_ref().ok_or(LinkError::ChannelClosed)?;
        socket.recv_from(buf).map_err(LinkError::from_receive)
    }

    fn close(&self) {
        if self.socket.write().take().is_some() {
            debug!("{} channel on {} closed", self.role, self.local_addr);
        }
    }

    fn is_closed(&self) -> bool {
        self.socket.read().is_none()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        Some(self.local_addr)
    }
}

impl fmt::Debug for UdpChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UdpChannel")
            .field("role", &self.role)
            .field("local_addr", &self.local_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Creates channels for a role; called at construction, connect and rebind
pub trait ChannelBinder: Send + Sync {
    fn bind(&self, role: ChannelRole) -> Result<Arc<dyn DatagramChannel>>;
}

/// Binds real UDP sockets at the configured local endpoints
///
/// The command channel's local IP is re-resolved on every bind unless the
/// configuration pins it, so a rebind follows an interface that changed
/// address (e.g. after rejoining the device's access point).
#[derive(Debug, Clone)]
pub struct UdpBinder {
    device_addr: SocketAddr,
    command_bind_ip: Option<IpAddr>,
    control_port: u16,
    state_addr: SocketAddr,
    poll_interval: Duration,
}

impl UdpBinder {
    pub fn new(config: &LinkConfig) -> Self {
        Self {
            device_addr: config.device_addr,
            command_bind_ip: config.command_bind_ip,
            control_port: config.control_port,
            state_addr: config.state_bind_addr(),
            poll_interval: config.receive_poll(),
        }
    }

    fn command_addr(&self) -> SocketAddr {
        let ip = self
            .command_bind_ip
            .unwrap_or_else(|| resolve_local_ip(self.device_addr));
        SocketAddr::new(ip, self.control_port)
    }
}

impl ChannelBinder for UdpBinder {
    fn bind(&self, role: ChannelRole) -> Result<Arc<dyn DatagramChannel>> {
        let addr = match role {
            ChannelRole::Command => self.command_addr(),
            ChannelRole::Telemetry => self.state_addr,
        };
        let channel = UdpChannel::bind(role, addr, self.poll_interval)?;
        info!("{} channel listening on {}", role, addr);
        Ok(Arc::new(channel))
    }
}

/// Local interface address that routes to `remote`
///
/// Connecting an unbound UDP socket sends nothing; it only asks the OS to
/// pick a route. Falls back to the wildcard address when no route exists.
pub fn resolve_local_ip(remote: SocketAddr) -> IpAddr {
    let wildcard = match remote {
        SocketAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        SocketAddr::V6(_) => IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED),
    };

    let probe = UdpSocket::bind(SocketAddr::new(wildcard, 0))
        .and_then(|socket| socket.connect(remote).map(|_| socket))
        .and_then(|socket| socket.local_addr());

    match probe {
        Ok(local) if !local.ip().is_unspecified() => local.ip(),
        Ok(_) => wildcard,
        Err(e) => {
            debug!("No route to {} ({}), binding command channel to {}", remote, e, wildcard);
            wildcard
        },
    }
}
