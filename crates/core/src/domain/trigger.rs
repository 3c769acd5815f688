use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use utoipa::ToSchema;

const DEFAULT_POLLING_INTERVAL_MS: u64 = 60_000;
const DEFAULT_MIN_TRIGGER_INTERVAL_MS: u64 = 60_000;
const DEFAULT_TIMEOUT_MS: u64 = 300_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TriggerStatus {
    #[default]
    Active,
    Paused,
    Disabled,
}

impl TriggerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Disabled => "disabled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "disabled" => Some(Self::Disabled),
            _ => None,
        }
    }
}

/// A rule binding a template to an external-event condition and a
/// variable-source mapping.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WorkspaceTrigger {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub template_id: String,
    #[serde(default)]
    pub template_overrides: TemplateOverrides,
    pub context_listener: ContextListener,
    #[serde(default)]
    pub variable_mapping: HashMap<String, VariableMapping>,
    #[serde(default)]
    pub status: TriggerStatus,
    #[serde(default = "default_true")]
    pub auto_deploy: bool,
    #[serde(default)]
    pub requires_approval: bool,
    #[serde(default)]
    pub resource_limits: ResourceLimits,
    #[serde(default)]
    pub execution_count: u64,
    #[serde(default)]
    pub success_count: u64,
    #[serde(default)]
    pub failure_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_triggered: Option<DateTime<Utc>>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl WorkspaceTrigger {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        template_id: impl Into<String>,
        listener: ContextListener,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            template_id: template_id.into(),
            template_overrides: TemplateOverrides::default(),
            context_listener: listener,
            variable_mapping: HashMap::new(),
            status: TriggerStatus::Active,
            auto_deploy: true,
            requires_approval: false,
            resource_limits: ResourceLimits::default(),
            execution_count: 0,
            success_count: 0,
            failure_count: 0,
            last_triggered: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_mapping(mut self, name: impl Into<String>, mapping: VariableMapping) -> Self {
        self.variable_mapping.insert(name.into(), mapping);
        self
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.resource_limits = limits;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == TriggerStatus::Active
    }

    /// Whether a satisfied condition may fire the template without a person
    /// signing off first.
    pub fn fires_automatically(&self) -> bool {
        self.auto_deploy && !self.requires_approval
    }

    pub fn record_execution(&mut self, success: bool, at: DateTime<Utc>) {
        self.execution_count += 1;
        if success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        self.last_triggered = Some(at);
    }
}

/// Per-trigger adjustments layered over the template on every firing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct TemplateOverrides {
    /// Keyed by requirement id or wildcard type
    #[serde(default)]
    pub context_overrides: HashMap<String, String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub variable_values: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_name_pattern: Option<String>,
}

/// Which external entity a trigger watches and what change fires it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ContextListener {
    pub entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub trigger_conditions: Vec<TriggerCondition>,
    #[serde(default = "default_polling_interval_ms")]
    pub polling_interval_ms: u64,
}

fn default_polling_interval_ms() -> u64 {
    DEFAULT_POLLING_INTERVAL_MS
}

impl ContextListener {
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            entity_type: None,
            trigger_conditions: Vec::new(),
            polling_interval_ms: DEFAULT_POLLING_INTERVAL_MS,
        }
    }

    pub fn with_condition(mut self, condition: TriggerCondition) -> Self {
        self.trigger_conditions.push(condition);
        self
    }

    pub fn with_polling_interval(mut self, interval_ms: u64) -> Self {
        self.polling_interval_ms = interval_ms;
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConditionType {
    StatusChange,
    NewComment,
    AssigneeChange,
    PriorityChange,
    StringMatch,
}

impl ConditionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StatusChange => "status_change",
            Self::NewComment => "new_comment",
            Self::AssigneeChange => "assignee_change",
            Self::PriorityChange => "priority_change",
            Self::StringMatch => "string_match",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TriggerCondition {
    pub id: String,
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    #[serde(default)]
    pub config: ConditionConfig,
}

impl TriggerCondition {
    pub fn new(id: impl Into<String>, condition_type: ConditionType) -> Self {
        Self {
            id: id.into(),
            condition_type,
            config: ConditionConfig::default(),
        }
    }

    pub fn status_change(from: Option<&str>, to: Option<&str>) -> Self {
        let mut condition = Self::new("status_change", ConditionType::StatusChange);
        condition.config.from_status = from.map(str::to_string);
        condition.config.to_status = to.map(str::to_string);
        condition
    }

    pub fn string_match(field_path: Option<&str>, search: &str, case_sensitive: bool) -> Self {
        let mut condition = Self::new("string_match", ConditionType::StringMatch);
        condition.config.field_path = field_path.map(str::to_string);
        condition.config.search_string = Some(search.to_string());
        condition.config.case_sensitive = case_sensitive;
        condition
    }
}

/// Type-specific settings. Only the fields relevant to the condition type
/// are read.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ConditionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_string: Option<String>,
    #[serde(default)]
    pub case_sensitive: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VariableSource {
    /// Path into the snapshot as-is
    TriggerContext,
    /// Jira-shaped snapshot (`jira.*` then `fields.*`)
    Jira,
    /// Git-shaped snapshot (`git.*`)
    Git,
    /// Only the mapping's default value
    Static,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VariableTransform {
    Uppercase,
    Lowercase,
    Trim,
    DateFormat { format: String },
}

/// Where a trigger takes a template variable's value from.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VariableMapping {
    pub source: VariableSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub default_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<VariableTransform>,
}

impl VariableMapping {
    pub fn new(source: VariableSource) -> Self {
        Self {
            source,
            field_path: None,
            default_value: None,
            transform: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn with_transform(mut self, transform: VariableTransform) -> Self {
        self.transform = Some(transform);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
#[serde(default)]
pub struct ResourceLimits {
    pub max_concurrent_workspaces: u32,
    pub max_concurrent_agents: u32,
    pub min_trigger_interval_ms: u64,
    pub timeout_ms: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_concurrent_workspaces: 1,
            max_concurrent_agents: 1,
            min_trigger_interval_ms: DEFAULT_MIN_TRIGGER_INTERVAL_MS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}
