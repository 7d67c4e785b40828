//! Loopback integration tests
//!
//! A plain UDP socket on 127.0.0.1 plays the device: it receives commands,
//! answers them, and pushes telemetry at the link's state port. All ports
//! are ephemeral so tests can run in parallel.

use std::net::{SocketAddr, UdpSocket};
use std::thread;
use std::time::{Duration, Instant};
use tello_link::{ChannelRole, LinkConfig, TelloLink, TelloLinkBuilder, UplinkOutcome};

struct FakeDevice {
    socket: UdpSocket,
}

impl FakeDevice {
    fn new() -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        Self { socket }
    }

    fn addr(&self) -> SocketAddr {
        self.socket.local_addr().unwrap()
    }

    fn recv_command(&self) -> (String, SocketAddr) {
        let mut buf = [0u8; 256];
        let (len, from) = self.socket.recv_from(&mut buf).unwrap();
        (String::from_utf8_lossy(&buf[..len]).into_owned(), from)
    }

    fn reply(&self, to: SocketAddr, text: &str) {
        self.socket.send_to(text.as_bytes(), to).unwrap();
    }

    fn push_telemetry(&self, link: &TelloLink, datagram: &str) {
        let to = link.local_addr(ChannelRole::Telemetry).unwrap();
        self.socket.send_to(datagram.as_bytes(), to).unwrap();
    }
}

fn loopback_config(device: &FakeDevice) -> LinkConfig {
    LinkConfig {
        device_addr: device.addr(),
        command_bind_ip: Some("127.0.0.1".parse().unwrap()),
        control_port: 0,
        state_bind_ip: "127.0.0.1".parse().unwrap(),
        state_port: 0,
        window_ticks: 4,
        missed_window_limit: 1,
        receive_poll_ms: 10,
        ..LinkConfig::default()
    }
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn test_uplink_reaches_device() {
    let device = FakeDevice::new();
    let link = TelloLink::new(loopback_config(&device)).unwrap();

    assert_eq!(link.uplink("takeoff", false), UplinkOutcome::Sent);
    let (command, from) = device.recv_command();
    assert_eq!(command, "takeoff");
    assert_eq!(Some(from), link.local_addr(ChannelRole::Command));
}

#[test]
fn test_response_marks_link_alive() {
    let device = FakeDevice::new();
    let link = TelloLink::new(loopback_config(&device)).unwrap();
    assert!(!link.is_alive());

    link.uplink("battery?", false);
    let (_, from) = device.recv_command();
    device.reply(from, "87\r\n");

    assert!(wait_until(|| link.last_response().is_some()));
    assert_eq!(link.last_response().as_deref(), Some("87"));

    let report = link.tick();
    assert!(report.liveness_consumed);
    assert!(link.is_alive());
}

#[test]
fn test_telemetry_lookup() {
    let device = FakeDevice::new();
    let link = TelloLink::new(loopback_config(&device)).unwrap();
    assert_eq!(link.get_telemetry("bat"), None);

    device.push_telemetry(&link, "bat:87;h:120;mid:-1;\r\n");
    assert!(wait_until(|| link.get_telemetry("bat").is_some()));

    assert_eq!(link.get_telemetry("bat").as_deref(), Some("87"));
    assert_eq!(link.get_telemetry("h").as_deref(), Some("120"));
    assert_eq!(link.get_telemetry("mid").as_deref(), Some("-1"));
    assert_eq!(link.get_telemetry("yaw"), None);
    assert_eq!(link.get_telemetry("not_a_key"), None);

    // Telemetry alone does not count as liveness outside a rebind
    assert!(!link.tick().liveness_consumed);
}

#[test]
fn test_keepalive_over_udp() {
    let device = FakeDevice::new();
    let link = TelloLink::new(loopback_config(&device)).unwrap();

    link.tick();
    link.tick();
    let (command, _) = device.recv_command();
    assert_eq!(command, "command");
    assert_eq!(link.metrics().keepalives_sent, 1);
}

#[test]
fn test_disconnect_and_reconnect() {
    let device = FakeDevice::new();
    let link = TelloLink::new(loopback_config(&device)).unwrap();

    assert!(link.disconnect());
    assert!(link.disconnect());
    assert_eq!(link.local_addr(ChannelRole::Command), None);
    assert_eq!(link.uplink("land", false), UplinkOutcome::Disabled);

    assert!(link.connect());
    assert!(link.connect());
    assert!(link.local_addr(ChannelRole::Command).is_some());

    assert_eq!(link.uplink("land", false), UplinkOutcome::Sent);
    let (command, _) = device.recv_command();
    assert_eq!(command, "land");
}

#[test]
fn test_rebind_after_silence_and_telemetry_revives() {
    let device = FakeDevice::new();
    let link = TelloLinkBuilder::from_config(loopback_config(&device))
        .window_ticks(2)
        .missed_window_limit(0)
        .build()
        .unwrap();

    // Threshold 1: tick 1 pings, tick 2 finds one missed window and rebinds
    link.tick();
    let _ = device.recv_command();
    let report = link.tick();
    assert_eq!(report.rebind, Some(true));
    assert_eq!(link.metrics().rebinds, 1);
    assert!(link.local_addr(ChannelRole::Telemetry).is_some());

    device.push_telemetry(&link, "bat:80;");
    assert!(wait_until(|| link.get_telemetry("bat").is_some()));

    let report = link.tick();
    assert!(report.liveness_consumed);
    assert!(link.is_alive());
}

#[test]
fn test_fixed_port_in_use_is_fatal() {
    let device = FakeDevice::new();
    let taken = UdpSocket::bind("127.0.0.1:0").unwrap();
    let config = LinkConfig {
        state_port: taken.local_addr().unwrap().port(),
        ..loopback_config(&device)
    };

    let err = TelloLink::new(config).unwrap_err();
    assert!(matches!(err, tello_link::LinkError::Bind { .. }), "{:?}", err);
}
