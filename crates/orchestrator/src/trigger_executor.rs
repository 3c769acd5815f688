//! Running a trigger's template with the trigger's overrides and mapped
//! variables.

use blueprint_core::{TriggerExecutionResult, TriggerStore, WorkspaceTrigger};
use events::{AuditLog, Event};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::{ApplyOptions, TemplateApplicator};
use crate::stats::StatsTracker;
use crate::variables;

pub struct TriggerExecutor {
    triggers: Arc<dyn TriggerStore>,
    applicator: Arc<TemplateApplicator>,
    stats: Arc<StatsTracker>,
    audit: Option<Arc<dyn AuditLog>>,
}

impl TriggerExecutor {
    pub fn new(
        triggers: Arc<dyn TriggerStore>,
        applicator: Arc<TemplateApplicator>,
        stats: Arc<StatsTracker>,
    ) -> Self {
        Self {
            triggers,
            applicator,
            stats,
            audit: None,
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

    /// Execute a trigger by id.
    pub async fn execute(
        &self,
        trigger_id: &str,
        trigger_context: Option<Value>,
    ) -> TriggerExecutionResult {
        let trigger = match self.triggers.get(trigger_id).await {
            Ok(Some(trigger)) => trigger,
            Ok(None) => {
                let error = format!("Trigger not found: {}", trigger_id);
                self.record(Event::TriggerFailed {
                    trigger_id: trigger_id.to_string(),
                    template_id: None,
                    error: error.clone(),
                });
                return TriggerExecutionResult::failed(error);
            }
            Err(e) => {
                let error = format!("Failed to load trigger {}: {}", trigger_id, e);
                self.record(Event::TriggerFailed {
                    trigger_id: trigger_id.to_string(),
                    template_id: None,
                    error: error.clone(),
                });
                return TriggerExecutionResult::failed(error);
            }
        };

        self.execute_trigger(&trigger, trigger_context).await
    }

    /// Execute an already loaded trigger. Counters are updated on every
    /// outcome.
    pub async fn execute_trigger(
        &self,
        trigger: &WorkspaceTrigger,
        trigger_context: Option<Value>,
    ) -> TriggerExecutionResult {
        info!(trigger_id = %trigger.id, template_id = %trigger.template_id, "Trigger fired");
        self.record(Event::TriggerFired {
            trigger_id: trigger.id.clone(),
            template_id: trigger.template_id.clone(),
        });

        let options = match build_options(trigger, trigger_context) {
            Ok(options) => options,
            Err(error) => {
                self.finish_failed(trigger, &error).await;
                return TriggerExecutionResult::failed(error);
            }
        };

        let application = self.applicator.apply(&trigger.template_id, options).await;
        let result = TriggerExecutionResult::from_application(application);

        if result.success {
            if let Err(e) = self.stats.record_trigger_execution(&trigger.id, true).await {
                warn!(trigger_id = %trigger.id, error = %e, "Failed to update trigger counters");
            }
            self.record(Event::TriggerCompleted {
                trigger_id: trigger.id.clone(),
                template_id: trigger.template_id.clone(),
                workspace_id: result.workspace_id.clone().unwrap_or_default(),
            });
        } else {
            let error = result
                .error
                .clone()
                .unwrap_or_else(|| "Template application failed".to_string());
            self.finish_failed(trigger, &error).await;
        }

        result
    }

    async fn finish_failed(&self, trigger: &WorkspaceTrigger, error: &str) {
        warn!(trigger_id = %trigger.id, error = %error, "Trigger execution failed");
        if let Err(e) = self.stats.record_trigger_execution(&trigger.id, false).await {
            warn!(trigger_id = %trigger.id, error = %e, "Failed to update trigger counters");
        }
        self.record(Event::TriggerFailed {
            trigger_id: trigger.id.clone(),
            template_id: Some(trigger.template_id.clone()),
            error: error.to_string(),
        });
    }
}

/// Mapped variables first, then the trigger's fixed values on top.
fn build_options(
    trigger: &WorkspaceTrigger,
    trigger_context: Option<Value>,
) -> Result<ApplyOptions, String> {
    let overrides = &trigger.template_overrides;

    let mut variable_values =
        variables::resolve_mapped(&trigger.variable_mapping, trigger_context.as_ref())
            .map_err(|e| format!("Variable mapping failed: {}", e))?;
    variable_values.extend(
        overrides
            .variable_values
            .iter()
            .map(|(name, value)| (name.clone(), value.clone())),
    );

    Ok(ApplyOptions {
        trigger_id: Some(trigger.id.clone()),
        context_overrides: overrides.context_overrides.clone(),
        variable_values,
        trigger_context,
        timeout_ms: Some(trigger.resource_limits.timeout_ms),
        workspace_name_pattern: overrides.workspace_name_pattern.clone(),
    })
}
