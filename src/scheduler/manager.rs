use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::instance::{InstanceStatus, ScheduleInstance};
use crate::config::validate_entity_id;
use crate::error::{FetchError, Result, WatchError};
use crate::monitor::{CycleReport, EntityMonitor, MonitorContext};

/// Owns every entity's [`ScheduleInstance`], in registration order.
pub struct ScheduleManager {
    context: MonitorContext,
    instances: Vec<ScheduleInstance>,
    cursor: usize,
    root: CancellationToken,
    cycle_timeout: Option<Duration>,
}

impl ScheduleManager {
    pub fn new(context: MonitorContext) -> Self {
        Self {
            context,
            instances: Vec::new(),
            cursor: 0,
            root: CancellationToken::new(),
            cycle_timeout: None,
        }
    }

    /// Apply a watchdog to every cycle of instances added afterwards.
    pub fn with_cycle_timeout(mut self, limit: Option<Duration>) -> Self {
        self.cycle_timeout = limit;
        self
    }

    /// Register `entity` and run its first cycle.
    ///
    /// Returns the first cycle's report, or `None` when that cycle failed in
    /// a way the schedule survives. An authentication failure on the first
    /// cycle drops the schedule and returns [`WatchError::NoSession`].
    pub async fn add_and_start(
        &mut self,
        entity: &str,
        interval: Duration,
    ) -> Result<Option<CycleReport>> {
        validate_entity_id(entity)?;
        if interval.is_zero() {
            return Err(WatchError::Config(format!(
                "interval for {entity} must be greater than zero"
            )));
        }
        if self.position(entity).is_some() {
            return Err(WatchError::Config(format!(
                "{entity} is already scheduled"
            )));
        }

        let monitor = EntityMonitor::new(entity, self.context.clone());
        let mut instance = ScheduleInstance::new(monitor, interval, self.root.child_token())
            .with_cycle_timeout(self.cycle_timeout);

        match instance.start().await {
            Ok(report) => {
                self.instances.push(instance);
                Ok(Some(report))
            }
            Err(WatchError::Fetch(FetchError::Auth(message))) => {
                instance.cancel();
                instance.join().await;
                Err(WatchError::NoSession {
                    entity: entity.to_owned(),
                    source: FetchError::Auth(message),
                })
            }
            Err(e @ WatchError::Cancelled { .. }) => Err(e),
            Err(e) => {
                warn!(entity, error = %e, "first cycle failed, keeping schedule");
                self.instances.push(instance);
                Ok(None)
            }
        }
    }

    /// Advance the round-robin pointer. Every instance runs on its own timer,
    /// so this only selects which entity [`current`](Self::current) reports.
    pub fn rotate_next(&mut self) -> Option<&str> {
        if self.instances.is_empty() {
            return None;
        }
        self.cursor = (self.cursor + 1) % self.instances.len();
        self.current()
    }

    pub fn current(&self) -> Option<&str> {
        self.instances.get(self.cursor).map(ScheduleInstance::entity)
    }

    pub fn entities(&self) -> Vec<&str> {
        self.instances.iter().map(ScheduleInstance::entity).collect()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn status_all(&self) -> Vec<(String, InstanceStatus)> {
        self.instances
            .iter()
            .map(|instance| (instance.entity().to_owned(), instance.status()))
            .collect()
    }

    /// Cancel and drop one entity's schedule. Returns `false` if unknown.
    pub async fn remove(&mut self, entity: &str) -> bool {
        let Some(index) = self.position(entity) else {
            return false;
        };
        let mut instance = self.instances.remove(index);
        instance.cancel();
        instance.join().await;

        if index < self.cursor {
            self.cursor -= 1;
        }
        if self.cursor >= self.instances.len() {
            self.cursor = 0;
        }
        info!(entity, "schedule removed");
        true
    }

    /// Cancel every schedule. Safe while cycles are in flight; those finish
    /// but nothing new is armed.
    pub fn stop_all(&self) {
        self.root.cancel();
        for instance in &self.instances {
            instance.cancel();
        }
        info!(count = self.instances.len(), "all schedules cancelled");
    }

    /// [`stop_all`](Self::stop_all), then wait for every timer task to exit.
    pub async fn shutdown(&mut self) {
        self.stop_all();
        for instance in &mut self.instances {
            instance.join().await;
        }
        info!("scheduler shut down");
    }

    fn position(&self, entity: &str) -> Option<usize> {
        self.instances
            .iter()
            .position(|instance| instance.entity() == entity)
    }
}
