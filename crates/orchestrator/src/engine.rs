//! Object graph of the engine, built once and shared by `Arc`.

use blueprint_core::{
    CoreError, SnapshotStore, TemplateApplicationResult, TemplateStore, TriggerExecutionResult,
    TriggerStatus, TriggerStore, WorkspaceTrigger,
};
use chrono::Utc;
use events::{AuditLog, Event};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::application::{ApplyOptions, TemplateApplicator};
use crate::catalog::ContextCatalog;
use crate::context_resolver::{CandidateRanker, ContextRequirementResolver, FirstMatch};
use crate::error::{OrchestratorError, Result};
use crate::provisioner::WorkspaceProvisioner;
use crate::scheduler::{SchedulerConfig, TriggerScheduler};
use crate::snapshot::SnapshotSource;
use crate::stats::StatsTracker;
use crate::trigger_executor::TriggerExecutor;

pub struct EngineBuilder {
    templates: Arc<dyn TemplateStore>,
    triggers: Arc<dyn TriggerStore>,
    catalog: Arc<dyn ContextCatalog>,
    provisioner: Arc<dyn WorkspaceProvisioner>,
    ranker: Arc<dyn CandidateRanker>,
    audit: Option<Arc<dyn AuditLog>>,
}

impl EngineBuilder {
    pub fn with_ranker(mut self, ranker: Arc<dyn CandidateRanker>) -> Self {
        self.ranker = ranker;
        self
    }

    pub fn with_audit_log(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn build(self) -> Engine {
        let stats = Arc::new(StatsTracker::new(
            self.templates.clone(),
            self.triggers.clone(),
        ));
        let ranker_name = self.ranker.name();

        let mut resolver =
            ContextRequirementResolver::new(self.catalog.clone()).with_ranker(self.ranker);
        let mut applicator_audit = None;
        if let Some(audit) = &self.audit {
            resolver = resolver.with_audit_log(audit.clone());
            applicator_audit = Some(audit.clone());
        }

        let mut applicator = TemplateApplicator::new(
            self.templates.clone(),
            resolver,
            self.provisioner,
            stats.clone(),
        );
        if let Some(audit) = applicator_audit {
            applicator = applicator.with_audit_log(audit);
        }
        let applicator = Arc::new(applicator);

        let mut executor =
            TriggerExecutor::new(self.triggers.clone(), applicator.clone(), stats.clone());
        if let Some(audit) = &self.audit {
            executor = executor.with_audit_log(audit.clone());
        }

        info!(ranker = ranker_name, "Engine assembled");

        Engine {
            templates: self.templates,
            triggers: self.triggers,
            catalog: self.catalog,
            applicator,
            executor: Arc::new(executor),
            stats,
            audit: self.audit,
        }
    }
}

/// Entry point for everything that applies templates or runs triggers.
#[derive(Clone)]
pub struct Engine {
    templates: Arc<dyn TemplateStore>,
    triggers: Arc<dyn TriggerStore>,
    catalog: Arc<dyn ContextCatalog>,
    applicator: Arc<TemplateApplicator>,
    executor: Arc<TriggerExecutor>,
    stats: Arc<StatsTracker>,
    audit: Option<Arc<dyn AuditLog>>,
}

impl Engine {
    pub fn builder(
        templates: Arc<dyn TemplateStore>,
        triggers: Arc<dyn TriggerStore>,
        catalog: Arc<dyn ContextCatalog>,
        provisioner: Arc<dyn WorkspaceProvisioner>,
    ) -> EngineBuilder {
        EngineBuilder {
            templates,
            triggers,
            catalog,
            provisioner,
            ranker: Arc::new(FirstMatch),
            audit: None,
        }
    }

    pub fn templates(&self) -> &Arc<dyn TemplateStore> {
        &self.templates
    }

    pub fn triggers(&self) -> &Arc<dyn TriggerStore> {
        &self.triggers
    }

    pub fn catalog(&self) -> &Arc<dyn ContextCatalog> {
        &self.catalog
    }

    pub async fn apply(
        &self,
        template_id: &str,
        options: ApplyOptions,
    ) -> TemplateApplicationResult {
        self.applicator.apply(template_id, options).await
    }

    pub async fn execute_trigger(
        &self,
        trigger_id: &str,
        trigger_context: Option<Value>,
    ) -> TriggerExecutionResult {
        self.executor.execute(trigger_id, trigger_context).await
    }

    /// Change a trigger's status. Serialized with counter updates.
    pub async fn set_trigger_status(
        &self,
        trigger_id: &str,
        status: TriggerStatus,
    ) -> Result<WorkspaceTrigger> {
        let mut from = TriggerStatus::Active;
        let updated = self
            .stats
            .update_trigger(trigger_id, |trigger| {
                from = trigger.status;
                trigger.status = status;
                trigger.updated_at = Utc::now();
            })
            .await?
            .ok_or_else(|| OrchestratorError::TriggerNotFound(trigger_id.to_string()))?;

        if let Some(audit) = &self.audit {
            audit.record(Event::TriggerStatusChanged {
                trigger_id: trigger_id.to_string(),
                from_status: from.as_str().to_string(),
                to_status: status.as_str().to_string(),
            });
        }
        Ok(updated)
    }

    /// Returns false if the template did not exist.
    pub async fn delete_template(&self, template_id: &str) -> Result<bool> {
        self.stats.delete_template(template_id).await
    }

    /// Returns false if the trigger did not exist.
    pub async fn delete_trigger(&self, trigger_id: &str) -> Result<bool> {
        self.stats.delete_trigger(trigger_id).await
    }

    /// Check a trigger definition against the stored templates before it is
    /// saved.
    pub async fn validate_trigger(&self, trigger: &WorkspaceTrigger) -> Result<()> {
        if trigger.context_listener.entity_id.trim().is_empty() {
            return Err(CoreError::Validation("context_listener.entity_id is empty".into()).into());
        }
        if self.templates.get(&trigger.template_id).await?.is_none() {
            return Err(OrchestratorError::TemplateNotFound(trigger.template_id.clone()));
        }
        Ok(())
    }

    pub fn scheduler(
        &self,
        snapshots: Arc<dyn SnapshotStore>,
        source: Arc<dyn SnapshotSource>,
        config: SchedulerConfig,
    ) -> Arc<TriggerScheduler> {
        let mut scheduler = TriggerScheduler::new(
            self.triggers.clone(),
            snapshots,
            source,
            self.executor.clone(),
            config,
        );
        if let Some(audit) = &self.audit {
            scheduler = scheduler.with_audit_log(audit.clone());
        }
        Arc::new(scheduler)
    }
}
