use blueprint_core::{CoreError, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Trigger not found: {0}")]
    TriggerNotFound(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Snapshot fetch failed for {entity_id}: {reason}")]
    SnapshotFetch { entity_id: String, reason: String },

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OrchestratorError {
    pub fn snapshot_failed(entity_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SnapshotFetch {
            entity_id: entity_id.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
