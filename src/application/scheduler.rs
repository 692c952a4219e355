//! Fixed-cadence scheduling of collection cycles.
//!
//! One loop stamps a shared timestamp each tick and dispatches one task
//! per engine onto the tokio worker pool. Engines never overlap with
//! themselves: a tick that arrives while an engine's previous cycle is
//! still running is skipped for that engine with an overrun diagnostic.

use crate::application::collector::Collector;
use anyhow::{bail, Result};
use chrono::Local;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{info, warn};

/// Format of the sample timestamp shared by all rows of one tick.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

const DEFAULT_DRAIN_GRACE: Duration = Duration::from_secs(30);

struct EngineSlot {
    name: String,
    collector: Arc<Mutex<Collector>>,
}

/// Drives all collectors on a fixed polling interval until shut down.
pub struct Scheduler {
    slots: Vec<EngineSlot>,
    poll_interval: Duration,
    drain_grace: Duration,
}

impl Scheduler {
    pub fn new(collectors: Vec<Collector>, poll_interval: Duration) -> Self {
        let slots = collectors
            .into_iter()
            .map(|collector| EngineSlot {
                name: collector.endpoint().name.clone(),
                collector: Arc::new(Mutex::new(collector)),
            })
            .collect();
        Self {
            slots,
            poll_interval,
            drain_grace: DEFAULT_DRAIN_GRACE,
        }
    }

    /// Override the per-phase drain grace period.
    pub fn with_drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }

    /// Tick until `shutdown` resolves, then drain. The wait between ticks
    /// is interruptible: the shutdown signal skips any remaining wait.
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send) -> Result<()> {
        info!(
            "Start monitoring {} engine(s) every {:?}",
            self.slots.len(),
            self.poll_interval
        );

        tokio::pin!(shutdown);
        let mut tick = interval(self.poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tasks: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    // One timestamp per tick, shared by every engine and
                    // category written during it.
                    let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
                    self.dispatch(&mut tasks, &timestamp);
                    // Reap whatever finished since the last tick.
                    while tasks.try_join_next().is_some() {}
                }
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.drain(tasks).await
    }

    fn dispatch(&self, tasks: &mut JoinSet<()>, timestamp: &str) {
        for slot in &self.slots {
            match slot.collector.clone().try_lock_owned() {
                Ok(mut guard) => {
                    let timestamp = timestamp.to_string();
                    tasks.spawn(async move {
                        guard.collect_all(&timestamp).await;
                    });
                }
                Err(_) => {
                    // Previous cycle for this engine still in flight.
                    warn!(
                        "Cycle overrun on engine {}: previous collection still running, skipping tick",
                        slot.name
                    );
                }
            }
        }
    }

    /// Wait for in-flight cycles, cancel stragglers after the grace
    /// period, and release every collector's resources. Failing to stop
    /// within both grace periods is the one fatal condition of the core.
    async fn drain(&self, mut tasks: JoinSet<()>) -> Result<()> {
        info!("Shutting down ...");

        let all_done = timeout(self.drain_grace, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        if all_done.is_err() {
            warn!(
                "Force shutdown after {:?}, cancelling in-flight cycles ...",
                self.drain_grace
            );
            tasks.abort_all();
            let cancelled = timeout(self.drain_grace, async {
                while tasks.join_next().await.is_some() {}
            })
            .await;
            if cancelled.is_err() {
                bail!(
                    "collection tasks failed to stop within {:?} shutdown grace periods",
                    self.drain_grace
                );
            }
        }

        for slot in &self.slots {
            slot.collector.lock().await.release();
        }
        info!("All collectors released");
        Ok(())
    }
}
