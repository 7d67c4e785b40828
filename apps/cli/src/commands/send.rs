//! `send`: send commands in order and print each response

use anyhow::{Context, Result, bail};
use clap::Args;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tello_link::{LinkConfig, TelloLink, Ticker, UplinkOutcome};
use tracing::{info, warn};

#[derive(Args, Debug)]
pub struct SendCommand {
    /// Commands to send, in order (e.g. command takeoff "rc 0 0 0 0" land)
    #[arg(required = true)]
    pub commands: Vec<String>,

    /// Send with hold, suppressing the automatic keepalive
    #[arg(long)]
    pub hold: bool,

    /// Seconds to wait for each response
    #[arg(short, long, default_value_t = 10.0)]
    pub wait: f64,

    /// Keep ticking for this many seconds after the last command
    #[arg(long, default_value_t = 0.0)]
    pub linger: f64,
}

impl SendCommand {
    pub fn execute(self, config: LinkConfig) -> Result<()> {
        let running = super::interrupt_flag()?;
        let wait = Duration::try_from_secs_f64(self.wait).context("Invalid --wait")?;
        let linger = Duration::try_from_secs_f64(self.linger).context("Invalid --linger")?;

        let link = Arc::new(TelloLink::new(config.clone()).context("Failed to open link")?);
        let ticker = Ticker::spawn(link.clone(), config.tick_period())?;

        let mut failed = 0usize;
        for command in &self.commands {
            if !running.load(Ordering::SeqCst) {
                break;
            }
            match send_and_wait(&link, command, self.hold, wait, &running) {
                Some(response) => println!("{} -> {}", command, response),
                None => {
                    failed += 1;
                    println!("{} -> (no response)", command);
                },
            }
        }

        let until = Instant::now() + linger;
        while running.load(Ordering::SeqCst) && Instant::now() < until {
            thread::sleep(Duration::from_millis(100));
        }

        ticker.stop();
        if failed > 0 {
            bail!("{} of {} commands got no response", failed, self.commands.len());
        }
        Ok(())
    }
}

/// Send one command and wait for the next datagram on the command channel.
fn send_and_wait(
    link: &TelloLink,
    command: &str,
    hold: bool,
    wait: Duration,
    running: &AtomicBool,
) -> Option<String> {
    let before = link.metrics().rx_command_datagrams;

    match link.uplink(command, hold) {
        UplinkOutcome::Sent => info!("Sent '{}'", command),
        outcome => {
            warn!("'{}' not sent: {:?}", command, outcome);
            return None;
        },
    }

    let deadline = Instant::now() + wait;
    while running.load(Ordering::SeqCst) && Instant::now() < deadline {
        if link.metrics().rx_command_datagrams > before {
            return link.last_response();
        }
        thread::sleep(Duration::from_millis(10));
    }
    None
}
