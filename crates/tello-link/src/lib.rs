//! # Tello Link
//!
//! Link layer for the Tello text-command protocol over UDP.
//!
//! The device is connectionless: commands go out as single text datagrams,
//! responses come back on the same socket, and a separate port carries a
//! periodic telemetry stream. This crate keeps such a link healthy:
//!
//! - two receiver threads (command responses and telemetry)
//! - an externally clocked keepalive / liveness state machine that pings
//!   once per window and rebinds both sockets after repeated silence
//! - an uplink gate whose `hold` flag lets a streaming caller stand in for
//!   the keepalive
//! - a lock-free telemetry buffer with string and typed lookups
//!
//! ```no_run
//! use std::sync::Arc;
//! use tello_link::{LinkConfig, TelloLink, Ticker};
//!
//! let config = LinkConfig::default();
//! let link = Arc::new(TelloLink::new(config.clone())?);
//! let _ticker = Ticker::spawn(link.clone(), config.tick_period())?;
//!
//! link.uplink("command", false);
//! link.uplink("rc 0 20 0 0", true);
//! println!("height: {:?}", link.get_telemetry("h"));
//! # Ok::<(), tello_link::LinkError>(())
//! ```

mod builder;
pub mod channel;
pub mod config;
pub mod connection;
mod error;
mod link;
pub mod metrics;
pub mod pipeline;
pub mod state;
pub mod telemetry;
mod ticker;
pub mod uplink;

#[cfg(test)]
mod testing;

pub use builder::TelloLinkBuilder;
pub use channel::{ChannelBinder, ChannelRole, DatagramChannel, UdpBinder, UdpChannel};
pub use config::LinkConfig;
pub use connection::{ConnectionMachine, ConnectionState, KeepaliveAction, TickReport};
pub use error::{LinkError, Result};
pub use link::{LinkStatus, TelloLink};
pub use metrics::{LinkMetrics, MetricsSnapshot};
pub use pipeline::{ErrorThrottle, ReceiverConfig};
pub use state::LinkContext;
pub use telemetry::{TelemetryBuffer, TelemetryKey, TelemetrySnapshot, UnknownTelemetryKey};
pub use ticker::{TickCallback, Ticker};
pub use uplink::{UplinkGate, UplinkOutcome};
