//! Interval scheduler with a start/stop lifecycle.
//!
//! Timer cadence runs on tokio's clock, so tests drive it with paused time
//! (`#[tokio::test(start_paused = true)]`). What a tick does with "now" comes
//! from the `Clock` injected into the tick itself.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// A unit of periodic work.
#[async_trait]
pub trait Tick: Send + Sync {
    fn name(&self) -> &str;

    async fn tick(&self) -> anyhow::Result<()>;
}

/// Running timer state.
struct TimerSlot {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

/// Fires a [`Tick`] on a fixed interval until stopped.
pub struct IntervalScheduler {
    interval: Duration,
    slot: Mutex<Option<TimerSlot>>,
}

impl IntervalScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            slot: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start firing `tick`. Restarts the timer if it was already running.
    pub fn start(&self, tick: Arc<dyn Tick>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let interval = self.interval;
        let handle = tokio::spawn(run_timer(tick.clone(), interval, shutdown_rx));

        let mut slot = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(old) = slot.replace(TimerSlot {
            handle,
            shutdown_tx,
        }) {
            let _ = old.shutdown_tx.send(true);
            old.handle.abort();
        }
        info!(
            name = tick.name(),
            interval_ms = interval.as_millis() as u64,
            "timer started"
        );
    }

    /// Stop the timer. Ticks already in flight run to completion.
    pub fn stop(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(old) = slot.take() {
            let _ = old.shutdown_tx.send(true);
            old.handle.abort();
            info!("timer stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        let slot = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        slot.as_ref().is_some_and(|s| !s.handle.is_finished())
    }
}

impl Drop for IntervalScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_timer(tick: Arc<dyn Tick>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                let tick = tick.clone();
                tokio::spawn(async move {
                    debug!(name = tick.name(), "tick");
                    if let Err(e) = tick.tick().await {
                        error!(name = tick.name(), error = %e, "tick failed");
                    }
                });
            }
            _ = shutdown.changed() => {
                debug!(name = tick.name(), "timer shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Counter {
        fired: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl Tick for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        async fn tick(&self) -> anyhow::Result<()> {
            self.fired.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("tick error");
            }
            Ok(())
        }
    }

    fn counter(fail: bool) -> Arc<Counter> {
        Arc::new(Counter {
            fired: AtomicU32::new(0),
            fail,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn fires_on_interval_until_stopped() {
        let scheduler = IntervalScheduler::new(Duration::from_secs(10));
        let tick = counter(false);
        scheduler.start(tick.clone());
        assert!(scheduler.is_running());

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(tick.fired.load(Ordering::SeqCst), 3);

        scheduler.stop();
        assert!(!scheduler.is_running());
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(tick.fired.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_tick_keeps_timer_alive() {
        let scheduler = IntervalScheduler::new(Duration::from_secs(1));
        let tick = counter(true);
        scheduler.start(tick.clone());

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(tick.fired.load(Ordering::SeqCst), 3);
        assert!(scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_previous_timer() {
        let scheduler = IntervalScheduler::new(Duration::from_secs(10));
        let first = counter(false);
        let second = counter(false);
        scheduler.start(first.clone());
        scheduler.start(second.clone());

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(first.fired.load(Ordering::SeqCst), 0);
        assert_eq!(second.fired.load(Ordering::SeqCst), 1);
    }
}
