//! Per-trigger polling loops.
//!
//! Every watched trigger gets its own task. A cycle reloads the trigger,
//! fetches the watched entity, compares it with the persisted snapshot and,
//! when the trigger's conditions hold, dispatches an execution on a separate
//! task. Executions are bounded by a per-trigger semaphore sized from
//! `max_concurrent_workspaces` and by one scheduler-wide semaphore.

use blueprint_core::{
    SnapshotStore, TriggerExecutionResult, TriggerStatus, TriggerStore, WorkspaceTrigger,
};
use chrono::Utc;
use events::{AuditLog, Event};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::conditions::evaluate_all;
use crate::error::Result;
use crate::snapshot::SnapshotSource;
use crate::trigger_executor::TriggerExecutor;

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);
const FALLBACK_POLL_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Applications in flight across all triggers
    pub max_concurrent_applications: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_applications: 4,
        }
    }
}

/// What one polling cycle did.
#[derive(Debug)]
pub enum CycleOutcome {
    /// The trigger no longer exists
    Missing,
    /// The trigger is paused or disabled; nothing was fetched
    Inactive(TriggerStatus),
    /// First observation, stored as the baseline
    Baseline,
    NotSatisfied,
    /// Conditions held but the trigger needs a person to deploy
    ApprovalRequired,
    /// Conditions held inside `min_trigger_interval_ms` of the last firing
    RateLimited { retry_in: Duration },
    /// Conditions held but no execution slot was free
    AtCapacity,
    /// An execution was dispatched
    Fired(JoinHandle<TriggerExecutionResult>),
}

impl CycleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Inactive(_) => "inactive",
            Self::Baseline => "baseline",
            Self::NotSatisfied => "not_satisfied",
            Self::ApprovalRequired => "approval_required",
            Self::RateLimited { .. } => "rate_limited",
            Self::AtCapacity => "at_capacity",
            Self::Fired(_) => "fired",
        }
    }
}

struct Slot {
    capacity: u32,
    permits: Arc<Semaphore>,
    /// Permits still owed after a shrink while executions were in flight
    debt: usize,
    last_fired: Option<Instant>,
    poll_interval: Duration,
}

fn slot_size(capacity: u32) -> usize {
    capacity.max(1) as usize
}

impl Slot {
    fn new(capacity: u32) -> Self {
        Self {
            capacity,
            permits: Arc::new(Semaphore::new(slot_size(capacity))),
            debt: 0,
            last_fired: None,
            poll_interval: FALLBACK_POLL_INTERVAL,
        }
    }

    /// Change the capacity in place so permits held by running executions
    /// keep counting against the new limit.
    fn resize(&mut self, capacity: u32) {
        let old = slot_size(self.capacity);
        let new = slot_size(capacity);
        self.capacity = capacity;

        if new > old {
            let mut extra = new - old;
            let repaid = extra.min(self.debt);
            self.debt -= repaid;
            extra -= repaid;
            self.permits.add_permits(extra);
        } else if new < old {
            let excess = old - new;
            let forgotten = self.permits.forget_permits(excess);
            self.debt += excess - forgotten;
        }
    }

    fn try_acquire(&mut self) -> Option<OwnedSemaphorePermit> {
        while self.debt > 0 {
            let permit = self.permits.clone().try_acquire_owned().ok()?;
            permit.forget();
            self.debt -= 1;
        }
        self.permits.clone().try_acquire_owned().ok()
    }

    fn is_idle(&self) -> bool {
        self.debt == 0 && self.permits.available_permits() == slot_size(self.capacity)
    }
}

struct PollLoop {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct TriggerScheduler {
    triggers: Arc<dyn TriggerStore>,
    snapshots: Arc<dyn SnapshotStore>,
    source: Arc<dyn SnapshotSource>,
    executor: Arc<TriggerExecutor>,
    audit: Option<Arc<dyn AuditLog>>,
    global_permits: Arc<Semaphore>,
    slots: Mutex<HashMap<String, Slot>>,
    loops: Mutex<HashMap<String, PollLoop>>,
}

impl TriggerScheduler {
    pub fn new(
        triggers: Arc<dyn TriggerStore>,
        snapshots: Arc<dyn SnapshotStore>,
        source: Arc<dyn SnapshotSource>,
        executor: Arc<TriggerExecutor>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            triggers,
            snapshots,
            source,
            executor,
            audit: None,
            global_permits: Arc::new(Semaphore::new(config.max_concurrent_applications.max(1))),
            slots: Mutex::new(HashMap::new()),
            loops: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_audit_log(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    fn record(&self, event: Event) {
        if let Some(audit) = &self.audit {
            audit.record(event);
        }
    }

    /// Run one polling cycle for a trigger.
    pub async fn poll_once(&self, trigger_id: &str) -> Result<CycleOutcome> {
        let Some(trigger) = self.triggers.get(trigger_id).await? else {
            return Ok(CycleOutcome::Missing);
        };
        self.remember_interval(&trigger).await;

        if !trigger.is_active() {
            return Ok(CycleOutcome::Inactive(trigger.status));
        }

        let current = self.source.fetch(&trigger.context_listener.entity_id).await?;
        let Some(previous) = self.snapshots.load(trigger_id).await? else {
            self.snapshots.save(trigger_id, &current).await?;
            debug!(trigger_id = %trigger_id, "Recorded baseline snapshot");
            return Ok(CycleOutcome::Baseline);
        };

        if !evaluate_all(&trigger.context_listener.trigger_conditions, &current, &previous) {
            self.snapshots.save(trigger_id, &current).await?;
            return Ok(CycleOutcome::NotSatisfied);
        }

        if !trigger.fires_automatically() {
            self.snapshots.save(trigger_id, &current).await?;
            self.record(Event::TriggerApprovalRequired {
                trigger_id: trigger.id.clone(),
                template_id: trigger.template_id.clone(),
            });
            return Ok(CycleOutcome::ApprovalRequired);
        }

        // Held-back firings keep the old snapshot so the change fires once allowed
        if let Some(retry_in) = self.interval_remaining(&trigger).await {
            let reason = format!("min trigger interval, retry in {}ms", retry_in.as_millis());
            self.skip(&trigger, reason);
            return Ok(CycleOutcome::RateLimited { retry_in });
        }

        let Some(permits) = self.acquire(&trigger).await else {
            self.skip(&trigger, "no free execution slot".to_string());
            return Ok(CycleOutcome::AtCapacity);
        };

        self.snapshots.save(trigger_id, &current).await?;
        Ok(CycleOutcome::Fired(self.dispatch(trigger, current, permits)))
    }

    fn dispatch(
        &self,
        trigger: WorkspaceTrigger,
        context: Value,
        permits: (OwnedSemaphorePermit, OwnedSemaphorePermit),
    ) -> JoinHandle<TriggerExecutionResult> {
        let executor = self.executor.clone();
        tokio::spawn(async move {
            let _permits = permits;
            executor.execute_trigger(&trigger, Some(context)).await
        })
    }

    fn skip(&self, trigger: &WorkspaceTrigger, reason: String) {
        self.record(Event::TriggerSkipped {
            trigger_id: trigger.id.clone(),
            reason,
        });
    }

    async fn remember_interval(&self, trigger: &WorkspaceTrigger) {
        let interval = Duration::from_millis(trigger.context_listener.polling_interval_ms)
            .max(MIN_POLL_INTERVAL);
        let mut slots = self.slots.lock().await;
        slots
            .entry(trigger.id.clone())
            .or_insert_with(|| Slot::new(trigger.resource_limits.max_concurrent_workspaces))
            .poll_interval = interval;
    }

    /// Time left before the trigger may fire again, from both the in-memory
    /// dispatch time and the persisted `last_triggered`.
    async fn interval_remaining(&self, trigger: &WorkspaceTrigger) -> Option<Duration> {
        let min = Duration::from_millis(trigger.resource_limits.min_trigger_interval_ms);
        if min.is_zero() {
            return None;
        }

        let since_dispatch = {
            let slots = self.slots.lock().await;
            slots
                .get(&trigger.id)
                .and_then(|slot| slot.last_fired)
                .map(|at| at.elapsed())
        };
        let since_persisted = trigger
            .last_triggered
            .and_then(|at| (Utc::now() - at).to_std().ok());

        let elapsed = match (since_dispatch, since_persisted) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }?;

        (elapsed < min).then(|| min - elapsed)
    }

    async fn acquire(
        &self,
        trigger: &WorkspaceTrigger,
    ) -> Option<(OwnedSemaphorePermit, OwnedSemaphorePermit)> {
        let capacity = trigger.resource_limits.max_concurrent_workspaces;
        let mut slots = self.slots.lock().await;
        let slot = slots
            .entry(trigger.id.clone())
            .or_insert_with(|| Slot::new(capacity));

        if slot.capacity != capacity {
            debug!(trigger_id = %trigger.id, capacity, "Resizing trigger execution slots");
            slot.resize(capacity);
        }

        let local = slot.try_acquire()?;
        let global = self.global_permits.clone().try_acquire_owned().ok()?;
        slot.last_fired = Some(Instant::now());
        Some((local, global))
    }

    async fn poll_interval(&self, trigger_id: &str) -> Duration {
        self.slots
            .lock()
            .await
            .get(trigger_id)
            .map_or(FALLBACK_POLL_INTERVAL, |slot| slot.poll_interval)
    }

    /// One cycle of a polling loop. `None` ends the loop.
    async fn cycle(&self, trigger_id: &str) -> Option<Duration> {
        match self.poll_once(trigger_id).await {
            Ok(CycleOutcome::Missing) => {
                info!(trigger_id = %trigger_id, "Trigger removed, stopping poll loop");
                None
            }
            Ok(CycleOutcome::Inactive(TriggerStatus::Disabled)) => {
                info!(trigger_id = %trigger_id, "Trigger disabled, stopping poll loop");
                None
            }
            Ok(outcome) => {
                debug!(trigger_id = %trigger_id, outcome = outcome.as_str(), "Poll cycle finished");
                Some(self.poll_interval(trigger_id).await)
            }
            Err(e) => {
                warn!(trigger_id = %trigger_id, error = %e, "Poll cycle failed");
                Some(self.poll_interval(trigger_id).await)
            }
        }
    }

    /// Start a polling loop for a trigger. Returns false if one is already
    /// running.
    pub async fn watch(self: &Arc<Self>, trigger_id: &str) -> bool {
        let mut loops = self.loops.lock().await;
        if loops.get(trigger_id).is_some_and(|l| !l.task.is_finished()) {
            return false;
        }

        let (stop, mut stop_rx) = watch::channel(false);
        let scheduler = Arc::clone(self);
        let id = trigger_id.to_string();

        let task = tokio::spawn(async move {
            info!(trigger_id = %id, "Poll loop started");
            while let Some(wait) = scheduler.cycle(&id).await {
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = stop_rx.changed() => break,
                }
            }
            info!(trigger_id = %id, "Poll loop stopped");
        });

        loops.insert(trigger_id.to_string(), PollLoop { stop, task });
        true
    }

    /// Stop a trigger's polling loop. Executions already dispatched run to
    /// completion.
    pub async fn unwatch(&self, trigger_id: &str) -> bool {
        let poll_loop = self.loops.lock().await.remove(trigger_id);
        self.release_slot(trigger_id).await;
        match poll_loop {
            Some(poll_loop) => {
                let _ = poll_loop.stop.send(true);
                true
            }
            None => false,
        }
    }

    /// Drop every trace of a deleted trigger: its loop, its slot and its
    /// stored snapshot. A trigger later created under the same id starts
    /// from a fresh baseline.
    pub async fn forget(&self, trigger_id: &str) -> Result<()> {
        let poll_loop = self.loops.lock().await.remove(trigger_id);
        if let Some(poll_loop) = poll_loop {
            let _ = poll_loop.stop.send(true);
            // A cycle caught mid-flight must not save a snapshot after the delete
            poll_loop.task.abort();
            let _ = poll_loop.task.await;
        }
        self.release_slot(trigger_id).await;
        self.snapshots.delete(trigger_id).await?;
        debug!(trigger_id = %trigger_id, "Forgot trigger state");
        Ok(())
    }

    /// Slots with executions still in flight are kept so they stay bounded.
    async fn release_slot(&self, trigger_id: &str) {
        let mut slots = self.slots.lock().await;
        if slots.get(trigger_id).is_some_and(Slot::is_idle) {
            slots.remove(trigger_id);
        }
    }

    /// Watch every active trigger in the store.
    pub async fn start(self: &Arc<Self>) -> Result<usize> {
        let triggers = self.triggers.list_active().await?;
        let mut started = 0;
        for trigger in &triggers {
            if self.watch(&trigger.id).await {
                started += 1;
            }
        }
        info!(count = started, "Trigger scheduler started");
        Ok(started)
    }

    pub async fn shutdown(&self) {
        let loops: Vec<PollLoop> = self.loops.lock().await.drain().map(|(_, l)| l).collect();
        for poll_loop in &loops {
            let _ = poll_loop.stop.send(true);
        }
        info!(count = loops.len(), "Trigger scheduler stopped");
    }

    pub async fn watched(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .loops
            .lock()
            .await
            .iter()
            .filter(|(_, l)| !l.task.is_finished())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}
