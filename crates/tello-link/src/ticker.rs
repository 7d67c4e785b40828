//! Background tick driver
//!
//! Calls [`TelloLink::tick`] at a fixed period on its own thread. Ticks are
//! anchored to a schedule rather than to the end of the previous tick, so a
//! slow tick (e.g. one that rebinds) does not drift the cadence.

use crate::connection::TickReport;
use crate::error::{LinkError, Result};
use crate::link::TelloLink;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{trace, warn};

/// Longest single sleep, so `stop` is observed promptly
const MAX_SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Callback invoked after every tick
pub type TickCallback = Box<dyn FnMut(&TickReport) + Send + 'static>;

/// Periodic tick thread for a shared link
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use tello_link::{LinkConfig, TelloLink, Ticker};
///
/// let link = Arc::new(TelloLink::new(LinkConfig::default())?);
/// let ticker = Ticker::spawn(link.clone(), Duration::from_secs(1))?;
/// link.uplink("battery?", false);
/// std::thread::sleep(Duration::from_secs(10));
/// ticker.stop();
/// # Ok::<(), tello_link::LinkError>(())
/// ```
pub struct Ticker {
    is_running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Ticker {
    pub fn spawn(link: Arc<TelloLink>, period: Duration) -> Result<Self> {
        Self::spawn_with(link, period, None)
    }

    /// Like [`spawn`](Self::spawn), calling `on_tick` with every report.
    pub fn spawn_with(
        link: Arc<TelloLink>,
        period: Duration,
        mut on_tick: Option<TickCallback>,
    ) -> Result<Self> {
        if period.is_zero() {
            return Err(LinkError::Config("tick period must be > 0".to_string()));
        }

        let is_running = Arc::new(AtomicBool::new(true));
        let running = is_running.clone();

        let thread = thread::Builder::new()
            .name("tello-ticker".to_string())
            .spawn(move || {
                let mut next_tick = Instant::now() + period;
                while running.load(Ordering::Acquire) {
                    if !sleep_until(next_tick, &running) {
                        break;
                    }

                    let report = link.tick();
                    trace!("Tick: {:?}", report);
                    if let Some(callback) = on_tick.as_mut() {
                        callback(&report);
                    }

                    next_tick += period;
                    let now = Instant::now();
                    if next_tick < now {
                        warn!(
                            "Tick overrun by {:?}, resetting schedule",
                            now.duration_since(next_tick)
                        );
                        next_tick = now + period;
                    }
                }
            })
            .map_err(|source| LinkError::Thread {
                name: "tello-ticker".to_string(),
                source,
            })?;

        Ok(Self {
            is_running,
            thread: Some(thread),
        })
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// Stop ticking and wait for the thread.
    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.is_running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!("Ticker thread panicked");
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.halt();
    }
}

/// Sleep until `deadline` in short slices. Returns `false` if stopped early.
fn sleep_until(deadline: Instant, running: &AtomicBool) -> bool {
    loop {
        if !running.load(Ordering::Acquire) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        spin_sleep::sleep((deadline - now).min(MAX_SLEEP_SLICE));
    }
}
