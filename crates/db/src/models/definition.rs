use blueprint_core::{
    TemplateIndexEntry, TriggerIndexEntry, TriggerStatus, WorkspaceTemplate, WorkspaceTrigger,
};

use super::{datetime_to_millis, millis_to_datetime};
use crate::error::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TemplateRow {
    pub id: String,
    pub name: String,
    pub category: String,
    pub document: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TemplateRow {
    pub fn into_domain(self) -> Result<WorkspaceTemplate, DbError> {
        serde_json::from_str(&self.document).map_err(|source| DbError::CorruptDocument {
            id: self.id,
            source,
        })
    }
}

impl TryFrom<&WorkspaceTemplate> for TemplateRow {
    type Error = DbError;

    fn try_from(template: &WorkspaceTemplate) -> Result<Self, Self::Error> {
        Ok(Self {
            id: template.id.clone(),
            name: template.name.clone(),
            category: template.category.clone(),
            document: serde_json::to_string(template)?,
            created_at: datetime_to_millis(template.created_at),
            updated_at: datetime_to_millis(template.updated_at),
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TemplateIndexRow {
    pub id: String,
    pub name: String,
    pub category: String,
    pub updated_at: i64,
}

impl TemplateIndexRow {
    pub fn into_domain(self) -> TemplateIndexEntry {
        TemplateIndexEntry {
            id: self.id,
            name: self.name,
            category: self.category,
            updated_at: millis_to_datetime(self.updated_at),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TriggerRow {
    pub id: String,
    pub name: String,
    pub template_id: String,
    pub status: String,
    pub document: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TriggerRow {
    pub fn into_domain(self) -> Result<WorkspaceTrigger, DbError> {
        serde_json::from_str(&self.document).map_err(|source| DbError::CorruptDocument {
            id: self.id,
            source,
        })
    }
}

impl TryFrom<&WorkspaceTrigger> for TriggerRow {
    type Error = DbError;

    fn try_from(trigger: &WorkspaceTrigger) -> Result<Self, Self::Error> {
        Ok(Self {
            id: trigger.id.clone(),
            name: trigger.name.clone(),
            template_id: trigger.template_id.clone(),
            status: trigger.status.as_str().to_string(),
            document: serde_json::to_string(trigger)?,
            created_at: datetime_to_millis(trigger.created_at),
            updated_at: datetime_to_millis(trigger.updated_at),
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TriggerIndexRow {
    pub id: String,
    pub name: String,
    pub template_id: String,
    pub status: String,
    pub updated_at: i64,
}

impl TriggerIndexRow {
    pub fn into_domain(self) -> TriggerIndexEntry {
        TriggerIndexEntry {
            id: self.id,
            name: self.name,
            template_id: self.template_id,
            status: TriggerStatus::parse(&self.status).unwrap_or_default(),
            updated_at: millis_to_datetime(self.updated_at),
        }
    }
}
