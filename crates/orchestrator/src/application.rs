//! Template application: context, then variables, then provisioning, then
//! stats.

use blueprint_core::{
    ApplicationError, TemplateApplicationResult, TemplateStore, UsageMode, WorkspaceTemplate,
};
use events::{AuditLog, Event};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::context_resolver::ContextRequirementResolver;
use crate::provisioner::WorkspaceProvisioner;
use crate::stats::StatsTracker;
use crate::variables::{self, VariableError};

/// Per-call inputs to [`TemplateApplicator::apply`].
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Set when a trigger started the application; counts as automated use
    pub trigger_id: Option<String>,
    /// Keyed by requirement id or wildcard type
    pub context_overrides: HashMap<String, String>,
    pub variable_values: HashMap<String, Value>,
    /// Snapshot of the entity that fired the trigger
    pub trigger_context: Option<Value>,
    /// Upper bound on workspace creation
    pub timeout_ms: Option<u64>,
    /// Replaces the template's naming pattern for this call
    pub workspace_name_pattern: Option<String>,
}

impl ApplyOptions {
    pub fn manual() -> Self {
        Self::default()
    }

    pub fn for_trigger(trigger_id: impl Into<String>) -> Self {
        Self {
            trigger_id: Some(trigger_id.into()),
            ..Self::default()
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variable_values.insert(name.into(), value.into());
        self
    }

    pub fn with_override(mut self, key: impl Into<String>, item_id: impl Into<String>) -> Self {
        self.context_overrides.insert(key.into(), item_id.into());
        self
    }

    pub fn with_trigger_context(mut self, context: Value) -> Self {
        self.trigger_context = Some(context);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    fn mode(&self) -> UsageMode {
        if self.trigger_id.is_some() {
            UsageMode::Automated
        } else {
            UsageMode::Manual
        }
    }
}

pub struct TemplateApplicator {
    templates: Arc<dyn TemplateStore>,
    resolver: ContextRequirementResolver,
    provisioner: Arc<dyn WorkspaceProvisioner>,
    stats: Arc<StatsTracker>,
    audit: Option<Arc<dyn AuditLog>>,
}

impl TemplateApplicator {
    pub fn new(
        templates: Arc<dyn TemplateStore>,
        resolver: ContextRequirementResolver,
        provisioner: Arc<dyn WorkspaceProvisioner>,
        stats: Arc<StatsTracker>,
    ) -> Self {
        Self {
            templates,
            resolver,
            provisioner,
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

    /// Apply a template. Never fails: every outcome is described by the
    /// returned result.
    pub async fn apply(
        &self,
        template_id: &str,
        options: ApplyOptions,
    ) -> TemplateApplicationResult {
        let started = Instant::now();
        self.record(Event::ResolutionStarted {
            template_id: template_id.to_string(),
            trigger_id: options.trigger_id.clone(),
        });

        let template = match self.templates.get(template_id).await {
            Ok(Some(template)) => template,
            Ok(None) => {
                let result = TemplateApplicationResult {
                    errors: vec![ApplicationError::validation(format!(
                        "Template not found: {}",
                        template_id
                    ))],
                    ..Default::default()
                };
                return self.finish(template_id, &options, result, started, false).await;
            }
            Err(e) => {
                error!(template_id = %template_id, error = %e, "Failed to load template");
                let result = TemplateApplicationResult {
                    errors: vec![ApplicationError::validation(format!(
                        "Failed to load template {}: {}",
                        template_id, e
                    ))],
                    ..Default::default()
                };
                return self.finish(template_id, &options, result, started, false).await;
            }
        };

        let result = self.run(&template, &options).await;
        self.finish(template_id, &options, result, started, true).await
    }

    async fn run(
        &self,
        template: &WorkspaceTemplate,
        options: &ApplyOptions,
    ) -> TemplateApplicationResult {
        let mut result = TemplateApplicationResult::default();

        let resolution = self
            .resolver
            .resolve_all(
                &template.id,
                &template.context_requirements,
                &options.context_overrides,
            )
            .await;
        let has_context_errors = resolution.has_errors();
        result.applied_context_items = resolution.items;
        result.errors = resolution.errors;
        result.warnings = resolution.warnings;

        if has_context_errors {
            return result;
        }

        let resolved = variables::resolve_all_with(
            &template.variables,
            &options.variable_values,
            options.trigger_context.as_ref(),
            |name, origin| {
                self.record(Event::VariableResolved {
                    template_id: template.id.clone(),
                    name: name.to_string(),
                    source: origin.as_str().to_string(),
                })
            },
        );

        result.resolved_variables = match resolved {
            Ok(values) => values,
            Err(e) => {
                self.record_variable_failure(&template.id, &e);
                result
                    .errors
                    .push(ApplicationError::variable(e.variable(), e.to_string()));
                return result;
            }
        };

        match self.provision(template, options, &result).await {
            Ok(workspace_id) => {
                result.workspace_id = Some(workspace_id);
                result.success = true;
            }
            Err(message) => result.errors.push(ApplicationError::workspace(message)),
        }

        result
    }

    async fn provision(
        &self,
        template: &WorkspaceTemplate,
        options: &ApplyOptions,
        result: &TemplateApplicationResult,
    ) -> Result<String, String> {
        let mut config = template.workspace_config.clone();
        if let Some(pattern) = &options.workspace_name_pattern {
            config.naming_pattern = pattern.clone();
        }

        let mut scope = result.resolved_variables.clone();
        scope
            .entry("template_id".to_string())
            .or_insert_with(|| json!(template.id));
        scope
            .entry("template_name".to_string())
            .or_insert_with(|| json!(template.name));

        let create = self
            .provisioner
            .create(&config, &result.applied_context_items, &scope);

        let outcome = match options.timeout_ms {
            Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), create).await {
                Ok(outcome) => outcome,
                Err(_) => return Err(format!("Workspace creation timed out after {}ms", ms)),
            },
            None => create.await,
        };

        outcome.map_err(|e| format!("Workspace creation failed: {}", e))
    }

    fn record_variable_failure(&self, template_id: &str, error: &VariableError) {
        self.record(Event::VariableFailed {
            template_id: template_id.to_string(),
            name: error.variable().to_string(),
            reason: error.to_string(),
        });
    }

    async fn finish(
        &self,
        template_id: &str,
        options: &ApplyOptions,
        mut result: TemplateApplicationResult,
        started: Instant,
        template_found: bool,
    ) -> TemplateApplicationResult {
        result.execution_time_ms = started.elapsed().as_millis() as u64;

        if template_found {
            if let Err(e) = self
                .stats
                .record_template_attempt(
                    template_id,
                    options.mode(),
                    result.success,
                    result.execution_time_ms,
                )
                .await
            {
                warn!(template_id = %template_id, error = %e, "Failed to update usage stats");
            }
        }

        match (&result.workspace_id, result.success) {
            (Some(workspace_id), true) => {
                info!(
                    template_id = %template_id,
                    workspace_id = %workspace_id,
                    execution_time_ms = result.execution_time_ms,
                    "Template applied"
                );
                self.record(Event::ApplicationCompleted {
                    template_id: template_id.to_string(),
                    trigger_id: options.trigger_id.clone(),
                    workspace_id: workspace_id.clone(),
                    execution_time_ms: result.execution_time_ms,
                });
            }
            _ => {
                warn!(
                    template_id = %template_id,
                    errors = result.errors.len(),
                    "Template application failed"
                );
                self.record(Event::ApplicationFailed {
                    template_id: template_id.to_string(),
                    trigger_id: options.trigger_id.clone(),
                    errors: result.errors.iter().map(ToString::to_string).collect(),
                    execution_time_ms: result.execution_time_ms,
                });
            }
        }

        result
    }
}
