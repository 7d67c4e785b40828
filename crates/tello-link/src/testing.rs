//! In-memory channels for unit tests

use crate::channel::{ChannelBinder, ChannelRole, DatagramChannel};
use crate::error::{LinkError, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Channel that records sends and serves queued inbound datagrams
pub struct MockChannel {
    local_addr: SocketAddr,
    sent: Mutex<Vec<(Vec<u8>, SocketAddr)>>,
    inbound: Mutex<VecDeque<Result<Vec<u8>>>>,
    closed: AtomicBool,
    close_count: AtomicUsize,
    fail_sends: AtomicBool,
}

impl MockChannel {
    pub fn new(local_addr: &str) -> Arc<Self> {
        Arc::new(Self {
            local_addr: local_addr.parse().unwrap(),
            sent: Mutex::new(Vec::new()),
            inbound: Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
            close_count: AtomicUsize::new(0),
            fail_sends: AtomicBool::new(false),
        })
    }

    pub fn push_inbound(&self, bytes: &[u8]) {
        self.inbound.lock().push_back(Ok(bytes.to_vec()));
    }

    pub fn push_receive_error(&self) {
        self.inbound.lock().push_back(Err(LinkError::Receive(io::Error::from(
            io::ErrorKind::ConnectionReset,
        ))));
    }

    pub fn sent(&self) -> Vec<(Vec<u8>, SocketAddr)> {
        self.sent.lock().clone()
    }

    pub fn sent_commands(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .map(|(bytes, _)| String::from_utf8_lossy(bytes).into_owned())
            .collect()
    }

    /// Number of close calls that actually released the channel.
    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }

    pub fn pending_inbound(&self) -> usize {
        self.inbound.lock().len()
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }
}

impl DatagramChannel for MockChannel {
    fn send_to(&self, bytes: &[u8], remote: SocketAddr) -> Result<usize> {
        if self.is_closed() {
            return Err(LinkError::ChannelClosed);
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(LinkError::Send(io::Error::from(io::ErrorKind::NetworkUnreachable)));
        }
        self.sent.lock().push((bytes.to_vec(), remote));
        Ok(bytes.len())
    }

    fn receive(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        if self.is_closed() {
            return Err(LinkError::ChannelClosed);
        }
        let next = self.inbound.lock().pop_front();
        match next {
            Some(Ok(bytes)) => {
                let len = bytes.len().min(buf.len());
                buf[..len].copy_from_slice(&bytes[..len]);
                Ok((len, "192.168.10.1:8889".parse().unwrap()))
            },
            Some(Err(e)) => Err(e),
            None => {
                std::thread::sleep(Duration::from_millis(2));
                Err(LinkError::Timeout)
            },
        }
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.close_count.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        Some(self.local_addr)
    }
}

/// Binder handing out fresh [`MockChannel`]s and remembering them
#[derive(Default)]
pub struct MockBinder {
    bound: Mutex<Vec<(ChannelRole, Arc<MockChannel>)>>,
    fail_binds: AtomicBool,
}

impl MockBinder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_fail_binds(&self, fail: bool) {
        self.fail_binds.store(fail, Ordering::SeqCst);
    }

    /// Every channel bound so far for `role`, oldest first.
    pub fn bound(&self, role: ChannelRole) -> Vec<Arc<MockChannel>> {
        self.bound
            .lock()
            .iter()
            .filter(|(r, _)| *r == role)
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub fn latest(&self, role: ChannelRole) -> Arc<MockChannel> {
        self.bound(role).pop().expect("no channel bound for role")
    }

    pub fn bind_count(&self) -> usize {
        self.bound.lock().len()
    }
}

impl ChannelBinder for MockBinder {
    fn bind(&self, role: ChannelRole) -> Result<Arc<dyn DatagramChannel>> {
        let port = match role {
            ChannelRole::Command => 8889,
            ChannelRole::Telemetry => 8890,
        };
        let addr: SocketAddr = format!("127.0.0.1:{}", port).parse().unwrap();
        if self.fail_binds.load(Ordering::SeqCst) {
            return Err(LinkError::Bind {
                addr,
                source: io::Error::from(io::ErrorKind::AddrInUse),
            });
        }
        let channel = MockChannel::new(&addr.to_string());
        self.bound.lock().push((role, channel.clone()));
        Ok(channel)
    }
}

impl ChannelBinder for Arc<MockBinder> {
    fn bind(&self, role: ChannelRole) -> Result<Arc<dyn DatagramChannel>> {
        self.as_ref().bind(role)
    }
}
