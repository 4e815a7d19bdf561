//! Periodic scheduler driver
//!
//! Fires the materializer on a fixed cadence. Runs never overlap: each tick
//! tries to take the run lock and a tick that finds a run still in flight is
//! skipped outright, not queued, so a slow run cannot build a backlog.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;

use crate::materializer::{MaterializeReport, Materializer};

/// Snapshot of driver counters
#[derive(Debug, Clone, Default)]
pub struct DriverStatus {
    pub runs_completed: u64,
    pub ticks_skipped: u64,
    pub last_report: Option<MaterializeReport>,
}

/// Drives [`Materializer`] runs on a tokio interval
pub struct SchedulerDriver {
    materializer: Arc<Materializer>,
    interval: Duration,
    run_lock: Arc<tokio::sync::Mutex<()>>,
    stopping: AtomicBool,
    stop_signal: Notify,
    runs_completed: AtomicU64,
    ticks_skipped: AtomicU64,
    last_report: Mutex<Option<MaterializeReport>>,
}

impl SchedulerDriver {
    pub fn new(materializer: Arc<Materializer>, interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            materializer,
            interval,
            run_lock: Arc::new(tokio::sync::Mutex::new(())),
            stopping: AtomicBool::new(false),
            stop_signal: Notify::new(),
            runs_completed: AtomicU64::new(0),
            ticks_skipped: AtomicU64::new(0),
            last_report: Mutex::new(None),
        })
    }

    /// Run until [`stop`](Self::stop) is called. The first run fires
    /// immediately, then once per interval.
    pub async fn run(self: &Arc<Self>) {
        tracing::info!(interval_secs = self.interval.as_secs(), "scheduler driver started");
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            if self.stopping.load(Ordering::SeqCst) {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => self.tick(),
                _ = self.stop_signal.notified() => break,
            }
        }

        // Let an in-flight run finish before reporting shutdown
        let _ = self.run_lock.lock().await;
        tracing::info!("scheduler driver stopped");
    }

    /// Request a graceful stop; an in-flight run completes first
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.stop_signal.notify_waiters();
    }

    /// One tick: start a run unless one is already in flight
    pub fn tick(self: &Arc<Self>) {
        let guard = match self.run_lock.clone().try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                self.ticks_skipped.fetch_add(1, Ordering::SeqCst);
                tracing::warn!("materialization still in flight, skipping tick");
                return;
            }
        };

        let driver = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            match driver.materializer.run().await {
                Ok(report) => {
                    driver.runs_completed.fetch_add(1, Ordering::SeqCst);
                    *driver.last_report.lock().unwrap() = Some(report);
                }
                Err(e) => {
                    tracing::error!(error = %e, "materialization run failed");
                }
            }
        });
    }

    pub fn status(&self) -> DriverStatus {
        DriverStatus {
            runs_completed: self.runs_completed.load(Ordering::SeqCst),
            ticks_skipped: self.ticks_skipped.load(Ordering::SeqCst),
            last_report: self.last_report.lock().unwrap().clone(),
        }
    }
}
