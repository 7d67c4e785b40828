//! `monitor`: tick the link and print its state

use anyhow::{Context, Result};
use clap::Args;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};
use tello_link::{LinkConfig, LinkStatus, TelemetryKey, TelloLink, Ticker};
use tracing::info;

/// Telemetry keys shown in the status line
const SHOWN_KEYS: [TelemetryKey; 5] = [
    TelemetryKey::Battery,
    TelemetryKey::Height,
    TelemetryKey::TimeOfFlight,
    TelemetryKey::TempHigh,
    TelemetryKey::Yaw,
];

#[derive(Args, Debug)]
pub struct MonitorCommand {
    /// Seconds between status lines
    #[arg(short, long, default_value_t = 1.0)]
    pub interval: f64,

    /// Stop after this many seconds (runs until Ctrl+C otherwise)
    #[arg(long)]
    pub duration: Option<f64>,

    /// Do not send the initial `command` (SDK mode entry)
    #[arg(long)]
    pub no_enter: bool,

    /// Print every telemetry field instead of the summary
    #[arg(short, long)]
    pub verbose: bool,
}

impl MonitorCommand {
    pub fn execute(self, config: LinkConfig) -> Result<()> {
        let running = super::interrupt_flag()?;
        let interval = Duration::try_from_secs_f64(self.interval)
            .context("Invalid --interval")?;
        let deadline = self
            .duration
            .map(Duration::try_from_secs_f64)
            .transpose()
            .context("Invalid --duration")?
            .map(|d| Instant::now() + d);

        let link = Arc::new(TelloLink::new(config.clone()).context("Failed to open link")?);
        let ticker = Ticker::spawn(link.clone(), config.tick_period())?;
        info!("Monitoring {} (Ctrl+C to stop)", config.device_addr);

        if !self.no_enter {
            link.uplink("command", false);
        }

        while running.load(Ordering::SeqCst) && deadline.is_none_or(|d| Instant::now() < d) {
            thread::sleep(interval);
            println!("{}", format_status(&link.status()));
            if self.verbose {
                for (key, value) in link.telemetry().iter() {
                    println!("    {:>5} = {}", key, value);
                }
            } else {
                println!("    {}", format_telemetry(&link));
            }
        }

        ticker.stop();
        Ok(())
    }
}

fn format_status(status: &LinkStatus) -> String {
    let state = match (status.enabled, status.connection.alive) {
        (false, _) => "disabled",
        (true, true) => "alive",
        (true, false) => "silent",
    };
    format!(
        "[{}] tick {} missed {} hold {} | rx {} cmd / {} telem | tx {} | rebinds {} | last {:?}",
        state,
        status.connection.tick_counter,
        status.connection.missed_windows,
        status.uplink_hold,
        status.metrics.rx_command_datagrams,
        status.metrics.rx_telemetry_datagrams,
        status.metrics.commands_sent,
        status.metrics.rebinds,
        status.last_response.as_deref().unwrap_or("-"),
    )
}

fn format_telemetry(link: &TelloLink) -> String {
    SHOWN_KEYS
        .iter()
        .map(|key| {
            let value = link.telemetry_value(*key);
            format!("{}={}", key, value.as_deref().unwrap_or("?"))
        })
        .collect::<Vec<_>>()
        .join(" ")
}
