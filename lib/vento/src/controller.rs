use std::sync::{Arc, Mutex, PoisonError};

use log::{error, info};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::fan::{Fan, Snapshot};
use crate::Result;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Consecutive failed polls tolerated before the unit is reported
/// unavailable, so a single lost datagram does not flap availability.
const FAILURES_BEFORE_UNAVAILABLE: u32 = 3;

/// Last-known-good state published to observers.
#[derive(Debug, Clone)]
pub struct FanHealth {
    /// Retained across failed polls; `None` until the first success.
    pub snapshot: Option<Arc<Snapshot>>,
    pub available: bool,
    pub consecutive_failures: u32,
}

/// Drives periodic refreshes of one [`Fan`] and fans the resulting
/// snapshots out to any number of observers. Observers hold the handle
/// they subscribed on; there is no ambient registry.
pub struct FanController {
    fan: Fan,
    health_tx: Arc<watch::Sender<FanHealth>>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl FanController {
    pub fn new(fan: Fan) -> FanController {
        let (health_tx, _) = watch::channel(FanHealth {
            snapshot: fan.snapshot(),
            available: true,
            consecutive_failures: 0,
        });

        FanController {
            fan,
            health_tx: Arc::new(health_tx),
            poller: Mutex::new(None),
        }
    }

    pub fn fan(&self) -> &Fan {
        &self.fan
    }

    pub fn subscribe(&self) -> watch::Receiver<FanHealth> {
        self.health_tx.subscribe()
    }

    /// Starts the poll loop, replacing any previous one. Ticks that would
    /// overlap a still-running refresh are skipped, not queued.
    pub fn start(&self, poll_interval: Duration) {
        let fan = self.fan.clone();
        let health_tx = self.health_tx.clone();

        info!("polling {} every {poll_interval:?}", fan.id());

        let handle = tokio::task::spawn(async move {
            let mut timer = interval(poll_interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            timer.tick().await; // first tick completes immediately

            loop {
                timer.tick().await;

                let result = fan.refresh().await;
                publish(&health_tx, &result);
            }
        });

        if let Some(previous) = self.poller().replace(handle) {
            previous.abort();
        }
    }

    /// Refreshes outside the regular schedule and publishes the outcome.
    /// Coalesces with any in-flight poll via the session's single-flight
    /// guarantee.
    pub async fn force_refresh(&self) -> Result<Arc<Snapshot>> {
        let result = self.fan.refresh().await;
        publish(&self.health_tx, &result);
        result
    }

    /// Stops the poll loop. An in-flight network wait is not preempted;
    /// it runs to completion or timeout on its own.
    pub fn stop(&self) {
        if let Some(handle) = self.poller().take() {
            handle.abort();
            info!("stopped polling {}", self.fan.id());
        }
    }

    fn poller(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.poller.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for FanController {
    fn drop(&mut self) {
        self.stop();
    }
}

fn publish(health_tx: &watch::Sender<FanHealth>, result: &Result<Arc<Snapshot>>) {
    health_tx.send_modify(|health| match result {
        Ok(snapshot) => {
            health.snapshot = Some(snapshot.clone());
            health.available = true;
            health.consecutive_failures = 0;
        }
        Err(err) => {
            health.consecutive_failures += 1;

            if health.consecutive_failures >= FAILURES_BEFORE_UNAVAILABLE && health.available {
                error!("marking unavailable after {} failures: {err}", health.consecutive_failures);
                health.available = false;
            }
        }
    });
}
