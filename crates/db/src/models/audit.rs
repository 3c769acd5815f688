use chrono::{DateTime, Utc};
use serde_json::Value;

use super::millis_to_datetime;

/// An audit entry ready to be appended.
#[derive(Debug, Clone)]
pub struct NewAuditRecord {
    pub id: String,
    pub template_id: Option<String>,
    pub trigger_id: Option<String>,
    pub workspace_id: Option<String>,
    pub category: String,
    pub level: String,
    pub message: String,
    pub data: Option<Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub id: String,
    pub template_id: Option<String>,
    pub trigger_id: Option<String>,
    pub workspace_id: Option<String>,
    pub category: String,
    pub level: String,
    pub message: String,
    pub data: Option<Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuditRow {
    pub id: String,
    pub template_id: Option<String>,
    pub trigger_id: Option<String>,
    pub workspace_id: Option<String>,
    pub category: String,
    pub level: String,
    pub message: String,
    pub data: Option<String>,
    pub created_at: i64,
}

impl AuditRow {
    pub fn into_domain(self) -> AuditRecord {
        AuditRecord {
            id: self.id,
            template_id: self.template_id,
            trigger_id: self.trigger_id,
            workspace_id: self.workspace_id,
            category: self.category,
            level: self.level,
            message: self.message,
            data: self.data.and_then(|d| serde_json::from_str(&d).ok()),
            created_at: millis_to_datetime(self.created_at),
        }
    }
}
