//! Scheduled rule reload - background task for periodic reloading.
//!
//! The scheduler runs as a single tokio task. Each tick reloads the rule set
//! from storage on the blocking pool and waits for it to finish before the
//! next tick is considered, so two reloads never run at the same time. Ticks
//! missed while a slow reload is running are skipped, not queued.
//!
//! A failed reload is logged and counted by the manager; the next tick runs
//! as usual. The task holds only a weak reference to the manager and stops
//! when the manager is dropped, when [`SchedulerHandle::shutdown`] is called,
//! or when the handle is dropped.

use log::{error, info};
use parking_lot::RwLock;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::manager::RedirectManager;
use crate::types::now_ms;

/// Configuration for the scheduled reload.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between reloads; the first reload runs one interval after start
    pub refresh_interval: Duration,
    /// Whether the scheduler is enabled
    pub enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(5 * 60),
            enabled: true,
        }
    }
}

/// Statistics from a reload.
#[derive(Debug, Clone)]
pub struct RefreshStats {
    /// Number of rules in the published snapshot
    pub rules_refreshed: usize,
    /// Stored entries dropped as invalid
    pub rules_skipped: usize,
    /// Duration of the reload in milliseconds
    pub duration_ms: u64,
    /// Timestamp of the reload
    pub timestamp: u64,
}

/// Periodic reload driver for one manager.
pub struct RefreshScheduler {
    manager: Weak<RedirectManager>,
    config: SchedulerConfig,
    /// Timestamp of the last successful scheduled reload
    last_refresh_at: RwLock<u64>,
    /// Scheduled reloads attempted so far
    runs: RwLock<u64>,
}

impl RefreshScheduler {
    pub fn new(manager: Weak<RedirectManager>, config: SchedulerConfig) -> Self {
        Self {
            manager,
            config,
            last_refresh_at: RwLock::new(now_ms()),
            runs: RwLock::new(0),
        }
    }

    /// Returns the timestamp of the last successful scheduled reload, or the
    /// creation time if none has run yet.
    pub fn last_refresh(&self) -> u64 {
        *self.last_refresh_at.read()
    }

    pub fn runs(&self) -> u64 {
        *self.runs.read()
    }

    /// Spawns the reload loop on the current tokio runtime.
    ///
    /// Returns `None` if the scheduler is disabled, the interval is zero, or
    /// there is no runtime to spawn on.
    pub fn spawn(self) -> Option<SchedulerHandle> {
        if !self.config.enabled {
            info!("Scheduled reload is disabled, skipping");
            return None;
        }

        if self.config.refresh_interval.is_zero() {
            error!("Scheduled reload interval must be greater than zero");
            return None;
        }

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                error!("Cannot start scheduled reload without a tokio runtime: {}", e);
                return None;
            }
        };

        let scheduler = Arc::new(self);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let task = runtime.spawn(Arc::clone(&scheduler).run(cancel_rx));

        Some(SchedulerHandle {
            scheduler,
            cancel: cancel_tx,
            task,
        })
    }

    async fn run(self: Arc<Self>, mut cancel: watch::Receiver<bool>) {
        let period = self.config.refresh_interval;
        info!(
            "Scheduled reload for redirect mappings with interval of {} seconds",
            period.as_secs()
        );

        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                // Err means the handle was dropped
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        break;
                    }
                    continue;
                }
            }

            if *cancel.borrow() {
                break;
            }

            let manager = match self.manager.upgrade() {
                Some(manager) => manager,
                None => break,
            };
            self.do_refresh(manager).await;
        }

        info!("Scheduled reload stopped");
    }

    /// Executes one reload cycle. Errors are logged and never stop the loop.
    async fn do_refresh(&self, manager: Arc<RedirectManager>) {
        *self.runs.write() += 1;
        let resource_id = manager.resource_id().to_string();

        match tokio::task::spawn_blocking(move || manager.reload_from_storage()).await {
            Ok(Ok(stats)) => {
                info!(
                    "Scheduled reload of {} completed: {} rules loaded, {} skipped in {}ms",
                    resource_id, stats.rules_refreshed, stats.rules_skipped, stats.duration_ms
                );
                *self.last_refresh_at.write() = now_ms();
            }
            Ok(Err(e)) => {
                error!("Scheduled reload of {} failed: {}", resource_id, e);
            }
            Err(e) => {
                error!("Scheduled reload task of {} panicked: {}", resource_id, e);
            }
        }
    }
}

/// Handle to a running scheduler task.
pub struct SchedulerHandle {
    scheduler: Arc<RefreshScheduler>,
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn last_refresh(&self) -> u64 {
        self.scheduler.last_refresh()
    }

    pub fn runs(&self) -> u64 {
        self.scheduler.runs()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Requests cancellation and waits for the task to exit. A reload that is
    /// already running finishes first.
    pub async fn shutdown(self) {
        let _ = self.cancel.send(true);
        if let Err(e) = self.task.await {
            error!("Scheduled reload task ended abnormally: {}", e);
        }
    }
}
