use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use db::AuditRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};

use crate::error::AppError;
use crate::state::AppState;

const DEFAULT_LIMIT: i64 = 100;

#[derive(Debug, Deserialize, IntoParams)]
pub struct AuditQuery {
    pub template_id: Option<String>,
    pub trigger_id: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuditEntry {
    pub id: String,
    pub template_id: Option<String>,
    pub trigger_id: Option<String>,
    pub workspace_id: Option<String>,
    pub category: String,
    pub level: String,
    pub message: String,
    #[schema(value_type = Option<Object>)]
    pub data: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl From<AuditRecord> for AuditEntry {
    fn from(record: AuditRecord) -> Self {
        Self {
            id: record.id,
            template_id: record.template_id,
            trigger_id: record.trigger_id,
            workspace_id: record.workspace_id,
            category: record.category,
            level: record.level,
            message: record.message,
            data: record.data,
            created_at: record.created_at,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/audit",
    params(AuditQuery),
    responses(
        (status = 200, description = "Audit entries, newest first", body = Vec<AuditEntry>)
    ),
    tag = "audit"
)]
pub async fn list_audit(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditEntry>>, AppError> {
    let repository = &state.audit_repository;
    let mut records = match (&query.template_id, &query.trigger_id) {
        (_, Some(trigger_id)) => repository.find_by_trigger(trigger_id).await?,
        (Some(template_id), None) => repository.find_by_template(template_id).await?,
        (None, None) => repository.find_recent(query.limit.unwrap_or(DEFAULT_LIMIT)).await?,
    };

    if let (Some(template_id), Some(_)) = (&query.template_id, &query.trigger_id) {
        records.retain(|r| r.template_id.as_ref() == Some(template_id));
    }
    if let Some(limit) = query.limit {
        records.truncate(limit.max(0) as usize);
    }
    Ok(Json(records.into_iter().map(AuditEntry::from).collect()))
}
