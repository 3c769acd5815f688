//! Event types for the Blueprint audit trail

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping all events with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event ID
    pub id: Uuid,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// The actual event
    pub event: Event,
}

impl EventEnvelope {
    /// Create a new event envelope with auto-generated ID and timestamp
    pub fn new(event: Event) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl AuditLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Resolution,
    Context,
    Variable,
    Application,
    Trigger,
}

impl AuditCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resolution => "resolution",
            Self::Context => "context",
            Self::Variable => "variable",
            Self::Application => "application",
            Self::Trigger => "trigger",
        }
    }
}

/// The fields every audit event is keyed by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditKey {
    pub template_id: Option<String>,
    pub trigger_id: Option<String>,
    pub workspace_id: Option<String>,
    pub category: AuditCategory,
    pub level: AuditLevel,
}

/// One event per pipeline-stage transition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Template application began
    #[serde(rename = "resolution.started")]
    ResolutionStarted {
        template_id: String,
        trigger_id: Option<String>,
    },

    /// An explicit requirement was bound to its item
    #[serde(rename = "context.resolved")]
    ContextResolved {
        template_id: String,
        requirement_id: String,
        context_item_id: String,
    },

    /// An explicit requirement's item is missing from the catalog
    #[serde(rename = "context.failed")]
    ContextFailed {
        template_id: String,
        requirement_id: String,
        required: bool,
        reason: String,
    },

    /// A wildcard requirement was bound, either from an override or by matching
    #[serde(rename = "wildcard.resolved")]
    WildcardResolved {
        template_id: String,
        requirement_id: String,
        wildcard_type: String,
        context_item_id: String,
        from_override: bool,
    },

    /// No catalog item could be bound to a wildcard requirement
    #[serde(rename = "wildcard.failed")]
    WildcardFailed {
        template_id: String,
        requirement_id: String,
        wildcard_type: String,
        required: bool,
        reason: String,
    },

    #[serde(rename = "variable.resolved")]
    VariableResolved {
        template_id: String,
        name: String,
        source: String,
    },

    #[serde(rename = "variable.failed")]
    VariableFailed {
        template_id: String,
        name: String,
        reason: String,
    },

    #[serde(rename = "application.completed")]
    ApplicationCompleted {
        template_id: String,
        trigger_id: Option<String>,
        workspace_id: String,
        execution_time_ms: u64,
    },

    #[serde(rename = "application.failed")]
    ApplicationFailed {
        template_id: String,
        trigger_id: Option<String>,
        errors: Vec<String>,
        execution_time_ms: u64,
    },

    /// A trigger's conditions held and its template is being applied
    #[serde(rename = "trigger.fired")]
    TriggerFired {
        trigger_id: String,
        template_id: String,
    },

    #[serde(rename = "trigger.completed")]
    TriggerCompleted {
        trigger_id: String,
        template_id: String,
        workspace_id: String,
    },

    #[serde(rename = "trigger.failed")]
    TriggerFailed {
        trigger_id: String,
        template_id: Option<String>,
        error: String,
    },

    /// Conditions held but the firing was held back (interval, capacity)
    #[serde(rename = "trigger.skipped")]
    TriggerSkipped { trigger_id: String, reason: String },

    /// Conditions held on a trigger that needs a person to deploy
    #[serde(rename = "trigger.approval_required")]
    TriggerApprovalRequired {
        trigger_id: String,
        template_id: String,
    },

    #[serde(rename = "trigger.status_changed")]
    TriggerStatusChanged {
        trigger_id: String,
        from_status: String,
        to_status: String,
    },
}

impl Event {
    pub fn key(&self) -> AuditKey {
        use AuditCategory as C;
        use AuditLevel as L;

        let (template_id, trigger_id, workspace_id, category, level) = match self {
            Event::ResolutionStarted {
                template_id,
                trigger_id,
            } => (Some(template_id), trigger_id.as_ref(), None, C::Resolution, L::Info),
            Event::ContextResolved { template_id, .. } => {
                (Some(template_id), None, None, C::Context, L::Debug)
            }
            Event::ContextFailed {
                template_id,
                required,
                ..
            }
            | Event::WildcardFailed {
                template_id,
                required,
                ..
            } => {
                let level = if *required { L::Error } else { L::Warn };
                (Some(template_id), None, None, C::Context, level)
            }
            Event::WildcardResolved { template_id, .. } => {
                (Some(template_id), None, None, C::Context, L::Info)
            }
            Event::VariableResolved { template_id, .. } => {
                (Some(template_id), None, None, C::Variable, L::Debug)
            }
            Event::VariableFailed { template_id, .. } => {
                (Some(template_id), None, None, C::Variable, L::Error)
            }
            Event::ApplicationCompleted {
                template_id,
                trigger_id,
                workspace_id,
                ..
            } => (
                Some(template_id),
                trigger_id.as_ref(),
                Some(workspace_id),
                C::Application,
                L::Info,
            ),
            Event::ApplicationFailed {
                template_id,
                trigger_id,
                ..
            } => (Some(template_id), trigger_id.as_ref(), None, C::Application, L::Error),
            Event::TriggerFired {
                trigger_id,
                template_id,
            }
            | Event::TriggerApprovalRequired {
                trigger_id,
                template_id,
            } => (Some(template_id), Some(trigger_id), None, C::Trigger, L::Info),
            Event::TriggerCompleted {
                trigger_id,
                template_id,
                workspace_id,
            } => (
                Some(template_id),
                Some(trigger_id),
                Some(workspace_id),
                C::Trigger,
                L::Info,
            ),
            Event::TriggerFailed {
                trigger_id,
                template_id,
                ..
            } => (template_id.as_ref(), Some(trigger_id), None, C::Trigger, L::Error),
            Event::TriggerSkipped { trigger_id, .. } => {
                (None, Some(trigger_id), None, C::Trigger, L::Debug)
            }
            Event::TriggerStatusChanged { trigger_id, .. } => {
                (None, Some(trigger_id), None, C::Trigger, L::Info)
            }
        };

        AuditKey {
            template_id: template_id.cloned(),
            trigger_id: trigger_id.cloned(),
            workspace_id: workspace_id.cloned(),
            category,
            level,
        }
    }

    /// Human-readable one-liner for logs and the audit table
    pub fn message(&self) -> String {
        match self {
            Event::ResolutionStarted { template_id, .. } => {
                format!("Resolution started for template {}", template_id)
            }
            Event::ContextResolved {
                requirement_id,
                context_item_id,
                ..
            } => format!("Requirement {} bound to {}", requirement_id, context_item_id),
            Event::ContextFailed {
                requirement_id,
                reason,
                ..
            } => format!("Requirement {} unresolved: {}", requirement_id, reason),
            Event::WildcardResolved {
                requirement_id,
                wildcard_type,
                context_item_id,
                from_override,
                ..
            } => format!(
                "Wildcard {} ({}) resolved to {}{}",
                requirement_id,
                wildcard_type,
                context_item_id,
                if *from_override { " via override" } else { "" }
            ),
            Event::WildcardFailed {
                requirement_id,
                wildcard_type,
                reason,
                ..
            } => format!("Wildcard {} ({}) unresolved: {}", requirement_id, wildcard_type, reason),
            Event::VariableResolved { name, source, .. } => {
                format!("Variable {} resolved from {}", name, source)
            }
            Event::VariableFailed { name, reason, .. } => {
                format!("Variable {} failed: {}", name, reason)
            }
            Event::ApplicationCompleted {
                workspace_id,
                execution_time_ms,
                ..
            } => format!(
                "Workspace {} created in {}ms",
                workspace_id, execution_time_ms
            ),
            Event::ApplicationFailed { errors, .. } => {
                format!("Application failed: {}", errors.join("; "))
            }
            Event::TriggerFired { trigger_id, .. } => format!("Trigger {} fired", trigger_id),
            Event::TriggerCompleted {
                trigger_id,
                workspace_id,
                ..
            } => format!("Trigger {} created workspace {}", trigger_id, workspace_id),
            Event::TriggerFailed {
                trigger_id, error, ..
            } => format!("Trigger {} failed: {}", trigger_id, error),
            Event::TriggerSkipped { trigger_id, reason } => {
                format!("Trigger {} skipped: {}", trigger_id, reason)
            }
            Event::TriggerApprovalRequired { trigger_id, .. } => {
                format!("Trigger {} awaiting approval", trigger_id)
            }
            Event::TriggerStatusChanged {
                trigger_id,
                from_status,
                to_status,
            } => format!("Trigger {} {} -> {}", trigger_id, from_status, to_status),
        }
    }
}
