use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use utoipa::ToSchema;

use super::context::AppliedContextItem;

/// Failure taxonomy of the application pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Template or trigger missing, or a malformed definition
    Validation,
    /// A required context requirement could not be bound
    ContextResolution,
    /// A required variable was missing or a value failed validation
    VariableResolution,
    /// The provisioner failed or timed out
    WorkspaceCreation,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::ContextResolution => "context_resolution",
            Self::VariableResolution => "variable_resolution",
            Self::WorkspaceCreation => "workspace_creation",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ApplicationError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirement_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,
}

impl ApplicationError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            requirement_id: None,
            variable: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn context(requirement_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            requirement_id: Some(requirement_id.into()),
            ..Self::new(ErrorKind::ContextResolution, message)
        }
    }

    pub fn variable(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            variable: Some(name.into()),
            ..Self::new(ErrorKind::VariableResolution, message)
        }
    }

    pub fn workspace(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::WorkspaceCreation, message)
    }
}

impl std::fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind.as_str(), self.message)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ApplicationWarning {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirement_id: Option<String>,
}

impl ApplicationWarning {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            requirement_id: None,
        }
    }

    pub fn for_requirement(requirement_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            requirement_id: Some(requirement_id.into()),
        }
    }
}

/// Outcome of one template application. Produced on every path, success or
/// failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct TemplateApplicationResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    #[serde(default)]
    pub errors: Vec<ApplicationError>,
    #[serde(default)]
    pub warnings: Vec<ApplicationWarning>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub resolved_variables: HashMap<String, Value>,
    #[serde(default)]
    pub applied_context_items: Vec<AppliedContextItem>,
    pub execution_time_ms: u64,
}

impl TemplateApplicationResult {
    pub fn has_error(&self, kind: ErrorKind) -> bool {
        self.errors.iter().any(|e| e.kind == kind)
    }

    /// First error message, used as the one-line summary of a failed run.
    pub fn first_error(&self) -> Option<String> {
        self.errors.first().map(ToString::to_string)
    }
}

/// Outcome handed back to whoever executed a trigger.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TriggerExecutionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application: Option<TemplateApplicationResult>,
}

impl TriggerExecutionResult {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            workspace_id: None,
            error: Some(error.into()),
            application: None,
        }
    }

    pub fn from_application(result: TemplateApplicationResult) -> Self {
        Self {
            success: result.success,
            workspace_id: result.workspace_id.clone(),
            error: if result.success {
                None
            } else {
                result.first_error()
            },
            application: Some(result),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_serialization() {
        let error = ApplicationError::context("req_1", "Context item not found: lib_9");
        let json = serde_json::to_value(&error).unwrap();

        assert_eq!(json["kind"], "context_resolution");
        assert_eq!(json["requirement_id"], "req_1");
        assert!(json.get("variable").is_none());
    }

    #[test]
    fn test_trigger_result_from_failed_application() {
        let application = TemplateApplicationResult {
            success: false,
            errors: vec![ApplicationError::workspace("disk full")],
            ..Default::default()
        };

        let result = TriggerExecutionResult::from_application(application);
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("[workspace_creation] disk full"));
    }

    #[test]
    fn test_has_error() {
        let result = TemplateApplicationResult {
            errors: vec![ApplicationError::variable("env", "missing")],
            ..Default::default()
        };
        assert!(result.has_error(ErrorKind::VariableResolution));
        assert!(!result.has_error(ErrorKind::ContextResolution));
    }
}
