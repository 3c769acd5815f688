use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use super::context::{WildcardFilters, WildcardType};

const DEFAULT_NAMING_PATTERN: &str = "{{template_name}}-{{timestamp}}";

/// A reusable, parameterized description of a workspace to create.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WorkspaceTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: String,
    #[serde(default)]
    pub context_requirements: Vec<ContextRequirement>,
    #[serde(default)]
    pub variables: Vec<TemplateVariable>,
    #[serde(default)]
    pub workspace_config: WorkspaceConfig,
    #[serde(default)]
    pub agent_templates: Vec<AgentTemplate>,
    #[serde(default)]
    pub usage_stats: UsageStats,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl WorkspaceTemplate {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            category: category.into(),
            context_requirements: Vec::new(),
            variables: Vec::new(),
            workspace_config: WorkspaceConfig::default(),
            agent_templates: Vec::new(),
            usage_stats: UsageStats::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_requirement(mut self, requirement: ContextRequirement) -> Self {
        self.context_requirements.push(requirement);
        self
    }

    pub fn with_variable(mut self, variable: TemplateVariable) -> Self {
        self.variables.push(variable);
        self
    }

    pub fn with_workspace_config(mut self, config: WorkspaceConfig) -> Self {
        self.workspace_config = config;
        self
    }

    /// Take over the history of the stored definition this one replaces.
    pub fn replacing(mut self, stored: &WorkspaceTemplate) -> Self {
        self.usage_stats = stored.usage_stats.clone();
        self.created_at = stored.created_at;
        self.updated_at = Utc::now();
        self
    }
}

/// A slot in a template that must be bound to a concrete context item.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ContextRequirement {
    pub id: String,
    #[serde(default)]
    pub required: bool,
    #[serde(flatten)]
    pub kind: RequirementKind,
}

/// The two requirement shapes. Exactly one is populated per requirement type.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequirementKind {
    Explicit {
        context_item_id: String,
    },
    Wildcard {
        wildcard_type: WildcardType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        wildcard_filters: Option<WildcardFilters>,
    },
}

impl ContextRequirement {
    pub fn explicit(id: impl Into<String>, context_item_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            required: true,
            kind: RequirementKind::Explicit {
                context_item_id: context_item_id.into(),
            },
        }
    }

    pub fn wildcard(id: impl Into<String>, wildcard_type: WildcardType) -> Self {
        Self {
            id: id.into(),
            required: true,
            kind: RequirementKind::Wildcard {
                wildcard_type,
                wildcard_filters: None,
            },
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_filters(mut self, filters: WildcardFilters) -> Self {
        if let RequirementKind::Wildcard {
            wildcard_filters, ..
        } = &mut self.kind
        {
            *wildcard_filters = Some(filters);
        }
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VariableType {
    #[default]
    String,
    Number,
    Boolean,
    Date,
}

impl VariableType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Date => "date",
        }
    }
}

/// A named parameter of a template.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TemplateVariable {
    pub name: String,
    #[serde(rename = "type", default)]
    pub var_type: VariableType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub default_value: Option<Value>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<VariableValidation>,
}

impl TemplateVariable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            var_type: VariableType::String,
            description: None,
            default_value: None,
            required: false,
            validation: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_type(mut self, var_type: VariableType) -> Self {
        self.var_type = var_type;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn with_validation(mut self, validation: VariableValidation) -> Self {
        self.validation = Some(validation);
        self
    }
}

/// Declared constraints checked after a variable value has been chosen.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct VariableValidation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

/// How the provisioned workspace is laid out.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WorkspaceConfig {
    /// Directory name pattern, `{{variable}}` placeholders are substituted.
    #[serde(default = "default_naming_pattern")]
    pub naming_pattern: String,
    #[serde(default)]
    pub file_templates: Vec<FileTemplate>,
}

fn default_naming_pattern() -> String {
    DEFAULT_NAMING_PATTERN.to_string()
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            naming_pattern: default_naming_pattern(),
            file_templates: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FileTemplate {
    /// Path relative to the workspace root
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AgentTemplate {
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub auto_start: bool,
}

/// Whether an application attempt was started by a person or by a trigger.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UsageMode {
    Manual,
    Automated,
}

/// Running usage counters for a template.
///
/// `success_rate` is derived from the raw counters on read rather than stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct UsageStats {
    #[serde(default)]
    pub total_uses: u64,
    #[serde(default)]
    pub manual_uses: u64,
    #[serde(default)]
    pub automated_uses: u64,
    #[serde(default)]
    pub success_count: u64,
    #[serde(default)]
    pub failure_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,
    #[serde(default)]
    pub average_creation_time_ms: f64,
}

impl UsageStats {
    pub fn success_rate(&self) -> f64 {
        if self.total_uses == 0 {
            return 0.0;
        }
        self.success_count as f64 / self.total_uses as f64
    }

    /// Fold one application attempt into the counters.
    ///
    /// The creation time average is a two-sample blend `(old + new) / 2`,
    /// seeded by the first successful sample.
    pub fn record_attempt(
        &mut self,
        mode: UsageMode,
        success: bool,
        duration_ms: u64,
        at: DateTime<Utc>,
    ) {
        self.total_uses += 1;
        match mode {
            UsageMode::Manual => self.manual_uses += 1,
            UsageMode::Automated => self.automated_uses += 1,
        }

        if !success {
            self.failure_count += 1;
            return;
        }

        let duration = duration_ms as f64;
        self.average_creation_time_ms = if self.success_count == 0 {
            duration
        } else {
            (self.average_creation_time_ms + duration) / 2.0
        };
        self.success_count += 1;
        self.last_used = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_replacing_keeps_stored_history() {
        let created = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let mut stored = WorkspaceTemplate::new("tpl_1", "Bugfix", "development");
        stored.created_at = created;
        stored.updated_at = created;
        stored
            .usage_stats
            .record_attempt(UsageMode::Manual, true, 40, created);

        let incoming = WorkspaceTemplate::new("tpl_1", "Bugfix v2", "development");
        let merged = incoming.replacing(&stored);

        assert_eq!(merged.name, "Bugfix v2");
        assert_eq!(merged.usage_stats, stored.usage_stats);
        assert_eq!(merged.usage_stats.total_uses, 1);
        assert_eq!(merged.created_at, created);
        assert!(merged.updated_at > created);
    }

    #[test]
    fn test_requirement_shapes_deserialize() {
        let explicit: ContextRequirement = serde_json::from_value(json!({
            "id": "req_1",
            "required": true,
            "type": "explicit",
            "context_item_id": "lib_1"
        }))
        .unwrap();
        assert_eq!(
            explicit.kind,
            RequirementKind::Explicit {
                context_item_id: "lib_1".to_string()
            }
        );

        let wildcard: ContextRequirement = serde_json::from_value(json!({
            "id": "req_2",
            "type": "wildcard",
            "wildcard_type": "generic_ticket",
            "wildcard_filters": { "tags": ["backend"] }
        }))
        .unwrap();
        assert!(!wildcard.required);
        match wildcard.kind {
            RequirementKind::Wildcard {
                wildcard_type,
                wildcard_filters,
            } => {
                assert_eq!(wildcard_type, WildcardType::GenericTicket);
                assert_eq!(wildcard_filters.unwrap().tags, vec!["backend"]);
            }
            _ => panic!("Wrong requirement kind"),
        }
    }

    #[test]
    fn test_explicit_requirement_without_item_id_is_rejected() {
        let result: Result<ContextRequirement, _> = serde_json::from_value(json!({
            "id": "req_1",
            "type": "explicit",
            "wildcard_type": "generic_ticket"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_template_defaults() {
        let template: WorkspaceTemplate = serde_json::from_value(json!({
            "id": "tpl_1",
            "name": "Bugfix",
            "category": "development"
        }))
        .unwrap();

        assert!(template.context_requirements.is_empty());
        assert_eq!(template.workspace_config.naming_pattern, DEFAULT_NAMING_PATTERN);
        assert_eq!(template.usage_stats, UsageStats::default());
    }

    #[test]
    fn test_variable_type_field_name() {
        let variable: TemplateVariable = serde_json::from_value(json!({
            "name": "count",
            "type": "number",
            "default_value": 3
        }))
        .unwrap();
        assert_eq!(variable.var_type, VariableType::Number);
        assert_eq!(variable.default_value, Some(json!(3)));
    }

    #[test]
    fn test_usage_stats_counts_every_attempt() {
        let mut stats = UsageStats::default();
        let now = Utc::now();

        stats.record_attempt(UsageMode::Manual, true, 100, now);
        stats.record_attempt(UsageMode::Automated, false, 50, now);
        stats.record_attempt(UsageMode::Automated, true, 300, now);

        assert_eq!(stats.total_uses, 3);
        assert_eq!(stats.manual_uses, 1);
        assert_eq!(stats.automated_uses, 2);
        assert_eq!(stats.success_count, 2);
        assert_eq!(stats.failure_count, 1);
        assert!((stats.success_rate() - 2.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_average_creation_time_blends_two_samples() {
        let mut stats = UsageStats::default();
        let now = Utc::now();

        stats.record_attempt(UsageMode::Manual, true, 100, now);
        assert_eq!(stats.average_creation_time_ms, 100.0);

        stats.record_attempt(UsageMode::Manual, true, 300, now);
        assert_eq!(stats.average_creation_time_ms, 200.0);

        stats.record_attempt(UsageMode::Manual, true, 400, now);
        assert_eq!(stats.average_creation_time_ms, 300.0);
    }

    #[test]
    fn test_failure_leaves_last_used_untouched() {
        let mut stats = UsageStats::default();
        stats.record_attempt(UsageMode::Manual, false, 10, Utc::now());

        assert!(stats.last_used.is_none());
        assert_eq!(stats.average_creation_time_ms, 0.0);
        assert_eq!(stats.success_rate(), 0.0);
    }
}
