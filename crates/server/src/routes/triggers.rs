use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use blueprint_core::{
    SnapshotStore, TriggerExecutionResult, TriggerIndexEntry, TriggerStatus, WorkspaceTrigger,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::error::AppError;
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/api/triggers",
    responses(
        (status = 200, description = "Trigger index", body = Vec<TriggerIndexEntry>)
    ),
    tag = "triggers"
)]
pub async fn list_triggers(
    State(state): State<AppState>,
) -> Result<Json<Vec<TriggerIndexEntry>>, AppError> {
    let index = state.engine.triggers().index().await?;
    Ok(Json(index))
}

#[utoipa::path(
    post,
    path = "/api/triggers",
    request_body = WorkspaceTrigger,
    responses(
        (status = 201, description = "Trigger created", body = WorkspaceTrigger),
        (status = 400, description = "Invalid trigger"),
        (status = 404, description = "Referenced template not found"),
        (status = 409, description = "Trigger id already in use")
    ),
    tag = "triggers"
)]
pub async fn create_trigger(
    State(state): State<AppState>,
    Json(mut trigger): Json<WorkspaceTrigger>,
) -> Result<(StatusCode, Json<WorkspaceTrigger>), AppError> {
    if trigger.id.trim().is_empty() {
        return Err(AppError::BadRequest("Trigger id cannot be empty".to_string()));
    }
    state.engine.validate_trigger(&trigger).await?;

    let triggers = state.engine.triggers();
    if triggers.get(&trigger.id).await?.is_some() {
        return Err(AppError::Conflict(format!(
            "Trigger already exists: {}",
            trigger.id
        )));
    }

    let now = Utc::now();
    trigger.execution_count = 0;
    trigger.success_count = 0;
    trigger.failure_count = 0;
    trigger.last_triggered = None;
    trigger.created_at = now;
    trigger.updated_at = now;
    triggers.put(&trigger).await?;

    if let (Some(scheduler), true) = (&state.scheduler, trigger.is_active()) {
        scheduler.watch(&trigger.id).await;
    }

    tracing::info!(trigger_id = %trigger.id, template_id = %trigger.template_id, "Trigger created");
    Ok((StatusCode::CREATED, Json(trigger)))
}

#[utoipa::path(
    get,
    path = "/api/triggers/{id}",
    params(("id" = String, Path, description = "Trigger id")),
    responses(
        (status = 200, description = "Trigger", body = WorkspaceTrigger),
        (status = 404, description = "Trigger not found")
    ),
    tag = "triggers"
)]
pub async fn get_trigger(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<WorkspaceTrigger>, AppError> {
    match state.engine.triggers().get(&id).await? {
        Some(trigger) => Ok(Json(trigger)),
        None => Err(AppError::NotFound(format!("Trigger not found: {}", id))),
    }
}

#[utoipa::path(
    delete,
    path = "/api/triggers/{id}",
    params(("id" = String, Path, description = "Trigger id")),
    responses(
        (status = 204, description = "Trigger deleted"),
        (status = 404, description = "Trigger not found")
    ),
    tag = "triggers"
)]
pub async fn delete_trigger(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    match &state.scheduler {
        Some(scheduler) => scheduler.forget(&id).await?,
        None => {
            SnapshotStore::delete(&state.snapshots, &id).await?;
        }
    }
    if state.engine.delete_trigger(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Trigger not found: {}", id)))
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetStatusRequest {
    pub status: TriggerStatus,
}

#[utoipa::path(
    post,
    path = "/api/triggers/{id}/status",
    params(("id" = String, Path, description = "Trigger id")),
    request_body = SetStatusRequest,
    responses(
        (status = 200, description = "Updated trigger", body = WorkspaceTrigger),
        (status = 404, description = "Trigger not found")
    ),
    tag = "triggers"
)]
pub async fn set_trigger_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<SetStatusRequest>,
) -> Result<Json<WorkspaceTrigger>, AppError> {
    let trigger = state.engine.set_trigger_status(&id, payload.status).await?;

    // Paused triggers keep their loop; it skips polling until resumed.
    if let Some(scheduler) = &state.scheduler {
        match trigger.status {
            TriggerStatus::Active => {
                scheduler.watch(&id).await;
            }
            TriggerStatus::Disabled => {
                scheduler.unwatch(&id).await;
            }
            TriggerStatus::Paused => {}
        }
    }

    Ok(Json(trigger))
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct ExecuteTriggerRequest {
    #[schema(value_type = Option<Object>)]
    pub trigger_context: Option<Value>,
}

#[utoipa::path(
    post,
    path = "/api/triggers/{id}/execute",
    params(("id" = String, Path, description = "Trigger id")),
    request_body = ExecuteTriggerRequest,
    responses(
        (status = 200, description = "Execution result, successful or not", body = TriggerExecutionResult),
        (status = 404, description = "Trigger not found")
    ),
    tag = "triggers"
)]
pub async fn execute_trigger(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<ExecuteTriggerRequest>,
) -> Result<Json<TriggerExecutionResult>, AppError> {
    if state.engine.triggers().get(&id).await?.is_none() {
        return Err(AppError::NotFound(format!("Trigger not found: {}", id)));
    }

    let result = state
        .engine
        .execute_trigger(&id, payload.trigger_context)
        .await;
    Ok(Json(result))
}
