//! Persistence ports for definitions and scheduler state.
//!
//! Index entries are projections of the stored records. Implementations
//! derive them from the records on read and never maintain them separately.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use utoipa::ToSchema;

use crate::domain::{TriggerStatus, WorkspaceTemplate, WorkspaceTrigger};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct TemplateIndexEntry {
    pub id: String,
    pub name: String,
    pub category: String,
    pub updated_at: DateTime<Utc>,
}

impl From<&WorkspaceTemplate> for TemplateIndexEntry {
    fn from(template: &WorkspaceTemplate) -> Self {
        Self {
            id: template.id.clone(),
            name: template.name.clone(),
            category: template.category.clone(),
            updated_at: template.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct TriggerIndexEntry {
    pub id: String,
    pub name: String,
    pub template_id: String,
    pub status: TriggerStatus,
    pub updated_at: DateTime<Utc>,
}

impl From<&WorkspaceTrigger> for TriggerIndexEntry {
    fn from(trigger: &WorkspaceTrigger) -> Self {
        Self {
            id: trigger.id.clone(),
            name: trigger.name.clone(),
            template_id: trigger.template_id.clone(),
            status: trigger.status,
            updated_at: trigger.updated_at,
        }
    }
}

#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn get(&self, id: &str) -> StoreResult<Option<WorkspaceTemplate>>;

    async fn list(&self) -> StoreResult<Vec<WorkspaceTemplate>>;

    /// Insert or replace the record with the same id
    async fn put(&self, template: &WorkspaceTemplate) -> StoreResult<()>;

    /// Returns whether a record was removed
    async fn delete(&self, id: &str) -> StoreResult<bool>;

    async fn index(&self) -> StoreResult<Vec<TemplateIndexEntry>>;
}

#[async_trait]
pub trait TriggerStore: Send + Sync {
    async fn get(&self, id: &str) -> StoreResult<Option<WorkspaceTrigger>>;

    async fn list(&self) -> StoreResult<Vec<WorkspaceTrigger>>;

    async fn put(&self, trigger: &WorkspaceTrigger) -> StoreResult<()>;

    async fn delete(&self, id: &str) -> StoreResult<bool>;

    async fn index(&self) -> StoreResult<Vec<TriggerIndexEntry>>;

    async fn list_active(&self) -> StoreResult<Vec<WorkspaceTrigger>> {
        let triggers = self.list().await?;
        Ok(triggers.into_iter().filter(|t| t.is_active()).collect())
    }
}

/// Last observed state of each trigger's watched entity.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn load(&self, trigger_id: &str) -> StoreResult<Option<Value>>;

    async fn save(&self, trigger_id: &str, snapshot: &Value) -> StoreResult<()>;

    /// Returns false if nothing was stored for the trigger.
    async fn delete(&self, trigger_id: &str) -> StoreResult<bool>;
}
