//! Usage and trigger counters.
//!
//! Both updates are read-modify-write cycles against the definition store.
//! They are serialized per record id so concurrent attempts never lose an
//! increment. Deletes take the same lock so a late counter update cannot
//! write a deleted record back.

use blueprint_core::{TemplateStore, TriggerStore, UsageMode, UsageStats, WorkspaceTrigger};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::Result;

#[derive(Default)]
struct RecordLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RecordLocks {
    async fn for_id(&self, id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the entry once no other task holds or waits on it.
    async fn release(&self, id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        // One reference in the map, one in `lock`
        if Arc::strong_count(&lock) == 2 {
            locks.remove(id);
        }
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}

pub struct StatsTracker {
    templates: Arc<dyn TemplateStore>,
    triggers: Arc<dyn TriggerStore>,
    template_locks: RecordLocks,
    trigger_locks: RecordLocks,
}

impl StatsTracker {
    pub fn new(templates: Arc<dyn TemplateStore>, triggers: Arc<dyn TriggerStore>) -> Self {
        Self {
            templates,
            triggers,
            template_locks: RecordLocks::default(),
            trigger_locks: RecordLocks::default(),
        }
    }

    /// Fold one application attempt into the template's usage stats.
    ///
    /// Returns the updated stats, or `None` if the template no longer exists.
    pub async fn record_template_attempt(
        &self,
        template_id: &str,
        mode: UsageMode,
        success: bool,
        duration_ms: u64,
    ) -> Result<Option<UsageStats>> {
        let lock = self.template_locks.for_id(template_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.fold_template_attempt(template_id, mode, success, duration_ms)
                .await
        };
        self.template_locks.release(template_id, lock).await;
        result
    }

    async fn fold_template_attempt(
        &self,
        template_id: &str,
        mode: UsageMode,
        success: bool,
        duration_ms: u64,
    ) -> Result<Option<UsageStats>> {
        let Some(mut template) = self.templates.get(template_id).await? else {
            warn!(template_id = %template_id, "Template vanished before stats update");
            return Ok(None);
        };

        template
            .usage_stats
            .record_attempt(mode, success, duration_ms, Utc::now());
        self.templates.put(&template).await?;

        debug!(
            template_id = %template_id,
            total_uses = template.usage_stats.total_uses,
            success_rate = template.usage_stats.success_rate(),
            "Updated usage stats"
        );
        Ok(Some(template.usage_stats))
    }

    /// Fold one execution into the trigger's running totals.
    pub async fn record_trigger_execution(
        &self,
        trigger_id: &str,
        success: bool,
    ) -> Result<Option<WorkspaceTrigger>> {
        let updated = self
            .update_trigger(trigger_id, |trigger| {
                trigger.record_execution(success, Utc::now())
            })
            .await?;

        if let Some(trigger) = &updated {
            debug!(
                trigger_id = %trigger_id,
                execution_count = trigger.execution_count,
                "Updated trigger counters"
            );
        }
        Ok(updated)
    }

    /// Locked read-modify-write of a stored trigger, serialized with counter
    /// updates for the same id.
    pub async fn update_trigger<F>(
        &self,
        trigger_id: &str,
        update: F,
    ) -> Result<Option<WorkspaceTrigger>>
    where
        F: FnOnce(&mut WorkspaceTrigger) + Send,
    {
        let lock = self.trigger_locks.for_id(trigger_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.rewrite_trigger(trigger_id, update).await
        };
        self.trigger_locks.release(trigger_id, lock).await;
        result
    }

    async fn rewrite_trigger<F>(
        &self,
        trigger_id: &str,
        update: F,
    ) -> Result<Option<WorkspaceTrigger>>
    where
        F: FnOnce(&mut WorkspaceTrigger) + Send,
    {
        let Some(mut trigger) = self.triggers.get(trigger_id).await? else {
            warn!(trigger_id = %trigger_id, "Trigger vanished before update");
            return Ok(None);
        };

        update(&mut trigger);
        self.triggers.put(&trigger).await?;
        Ok(Some(trigger))
    }

    /// Delete a template, serialized with its stats updates.
    pub async fn delete_template(&self, template_id: &str) -> Result<bool> {
        let lock = self.template_locks.for_id(template_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.templates.delete(template_id).await
        };
        self.template_locks.release(template_id, lock).await;
        Ok(result?)
    }

    /// Delete a trigger, serialized with its counter updates.
    pub async fn delete_trigger(&self, trigger_id: &str) -> Result<bool> {
        let lock = self.trigger_locks.for_id(trigger_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.triggers.delete(trigger_id).await
        };
        self.trigger_locks.release(trigger_id, lock).await;
        Ok(result?)
    }
}
