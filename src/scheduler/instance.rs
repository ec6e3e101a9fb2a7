//! One entity's recurring poll schedule.
//!
//! The first cycle runs inline in [`ScheduleInstance::start`]; afterwards a
//! spawned task sleeps `interval` from the *completion* of the previous cycle,
//! so two cycles of the same entity can never overlap.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, WatchError};
use crate::monitor::{CycleReport, EntityMonitor};

/// Result of the most recent cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Succeeded {
        new_sets: usize,
        failed_downloads: usize,
    },
    Failed {
        error: String,
    },
}

/// Running counters for one instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceStatus {
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub last_outcome: Option<CycleOutcome>,
    pub last_finished_at: Option<DateTime<Local>>,
}

impl InstanceStatus {
    fn record(&mut self, result: &Result<CycleReport>) {
        self.last_outcome = Some(match result {
            Ok(report) => {
                self.cycles_completed += 1;
                CycleOutcome::Succeeded {
                    new_sets: report.new_set_count(),
                    failed_downloads: report.failed_downloads,
                }
            }
            Err(e) => {
                self.cycles_failed += 1;
                CycleOutcome::Failed {
                    error: e.to_string(),
                }
            }
        });
        self.last_finished_at = Some(Local::now());
    }
}

/// Wraps one [`EntityMonitor`] with its timer task and cancellation token.
pub struct ScheduleInstance {
    entity: String,
    interval: Duration,
    cycle_timeout: Option<Duration>,
    /// Present until [`start`](Self::start) hands it to the timer task.
    monitor: Option<EntityMonitor>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    status: Arc<Mutex<InstanceStatus>>,
}

impl ScheduleInstance {
    /// Create an idle instance. `cancel` should be a child of the owner's token.
    pub fn new(
        monitor: EntityMonitor,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            entity: monitor.entity().to_owned(),
            interval,
            cycle_timeout: None,
            monitor: Some(monitor),
            cancel,
            task: None,
            status: Arc::new(Mutex::new(InstanceStatus::default())),
        }
    }

    /// Bound every cycle by `limit`.
    pub fn with_cycle_timeout(mut self, limit: Option<Duration>) -> Self {
        self.cycle_timeout = limit;
        self
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run the first cycle, then arm the recurring timer.
    ///
    /// The timer is armed whatever the first cycle's outcome; the caller
    /// decides whether a failure is fatal and cancels if so.
    pub async fn start(&mut self) -> Result<CycleReport> {
        if self.cancel.is_cancelled() {
            return Err(WatchError::Cancelled {
                entity: self.entity.clone(),
            });
        }
        let Some(mut monitor) = self.monitor.take() else {
            return Err(WatchError::Config(format!(
                "schedule for {} already started",
                self.entity
            )));
        };

        let first = execute_cycle(&mut monitor, self.cycle_timeout, &self.status).await;

        self.task = Some(tokio::spawn(run_and_reschedule(
            monitor,
            self.interval,
            self.cycle_timeout,
            self.cancel.clone(),
            Arc::clone(&self.status),
        )));
        info!(
            entity = %self.entity,
            interval_secs = self.interval.as_secs(),
            "schedule armed"
        );
        first
    }

    /// Prevent further cycles. An in-flight cycle is allowed to finish.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the timer task is alive.
    pub fn is_armed(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Wait for the timer task to exit. Only returns after [`cancel`](Self::cancel).
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(entity = %self.entity, error = %e, "schedule task ended abnormally");
            }
        }
    }

    pub fn status(&self) -> InstanceStatus {
        self.status
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Drop for ScheduleInstance {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn execute_cycle(
    monitor: &mut EntityMonitor,
    cycle_timeout: Option<Duration>,
    status: &Mutex<InstanceStatus>,
) -> Result<CycleReport> {
    let result = match cycle_timeout {
        Some(limit) => {
            let outcome = tokio::time::timeout(limit, monitor.run_once()).await;
            match outcome {
                Ok(result) => result,
                Err(_) => {
                    monitor.mark_failed();
                    Err(WatchError::CycleTimeout {
                        entity: monitor.entity().to_owned(),
                        secs: limit.as_secs(),
                    })
                }
            }
        }
        None => monitor.run_once().await,
    };
    status
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .record(&result);
    result
}

async fn run_and_reschedule(
    mut monitor: EntityMonitor,
    interval: Duration,
    cycle_timeout: Option<Duration>,
    cancel: CancellationToken,
    status: Arc<Mutex<InstanceStatus>>,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
        if cancel.is_cancelled() {
            break;
        }

        match execute_cycle(&mut monitor, cycle_timeout, &status).await {
            Ok(report) => info!(
                entity = %monitor.entity(),
                new_sets = report.new_set_count(),
                failed_downloads = report.failed_downloads,
                "cycle complete"
            ),
            Err(e) => warn!(
                entity = %monitor.entity(),
                error = %e,
                "cycle failed, schedule continues"
            ),
        }
    }
    debug!(entity = %monitor.entity(), "schedule stopped");
}
