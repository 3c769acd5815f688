use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use blueprint_core::{
    TemplateApplicationResult, TemplateIndexEntry, UsageStats, WorkspaceTemplate,
};
use chrono::Utc;
use orchestrator::ApplyOptions;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use utoipa::ToSchema;

use crate::error::AppError;
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/api/templates",
    responses(
        (status = 200, description = "Template index", body = Vec<TemplateIndexEntry>)
    ),
    tag = "templates"
)]
pub async fn list_templates(
    State(state): State<AppState>,
) -> Result<Json<Vec<TemplateIndexEntry>>, AppError> {
    let index = state.engine.templates().index().await?;
    Ok(Json(index))
}

#[utoipa::path(
    post,
    path = "/api/templates",
    request_body = WorkspaceTemplate,
    responses(
        (status = 201, description = "Template created", body = WorkspaceTemplate),
        (status = 400, description = "Invalid template"),
        (status = 409, description = "Template id already in use")
    ),
    tag = "templates"
)]
pub async fn create_template(
    State(state): State<AppState>,
    Json(mut template): Json<WorkspaceTemplate>,
) -> Result<(StatusCode, Json<WorkspaceTemplate>), AppError> {
    if template.id.trim().is_empty() {
        return Err(AppError::BadRequest("Template id cannot be empty".to_string()));
    }
    if template.name.trim().is_empty() {
        return Err(AppError::BadRequest("Template name cannot be empty".to_string()));
    }

    let templates = state.engine.templates();
    if templates.get(&template.id).await?.is_some() {
        return Err(AppError::Conflict(format!(
            "Template already exists: {}",
            template.id
        )));
    }

    let now = Utc::now();
    template.usage_stats = UsageStats::default();
    template.created_at = now;
    template.updated_at = now;
    templates.put(&template).await?;

    tracing::info!(template_id = %template.id, "Template created");
    Ok((StatusCode::CREATED, Json(template)))
}

#[utoipa::path(
    get,
    path = "/api/templates/{id}",
    params(("id" = String, Path, description = "Template id")),
    responses(
        (status = 200, description = "Template", body = WorkspaceTemplate),
        (status = 404, description = "Template not found")
    ),
    tag = "templates"
)]
pub async fn get_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<WorkspaceTemplate>, AppError> {
    match state.engine.templates().get(&id).await? {
        Some(template) => Ok(Json(template)),
        None => Err(AppError::NotFound(format!("Template not found: {}", id))),
    }
}

#[utoipa::path(
    delete,
    path = "/api/templates/{id}",
    params(("id" = String, Path, description = "Template id")),
    responses(
        (status = 204, description = "Template deleted"),
        (status = 404, description = "Template not found")
    ),
    tag = "templates"
)]
pub async fn delete_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if state.engine.delete_template(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Template not found: {}", id)))
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct ApplyTemplateRequest {
    /// Keyed by requirement id or wildcard type
    pub context_overrides: HashMap<String, String>,
    #[schema(value_type = Object)]
    pub variable_values: HashMap<String, Value>,
    pub workspace_name_pattern: Option<String>,
    pub timeout_ms: Option<u64>,
}

#[utoipa::path(
    post,
    path = "/api/templates/{id}/apply",
    params(("id" = String, Path, description = "Template id")),
    request_body = ApplyTemplateRequest,
    responses(
        (status = 200, description = "Application result, successful or not", body = TemplateApplicationResult),
        (status = 404, description = "Template not found")
    ),
    tag = "templates"
)]
pub async fn apply_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<ApplyTemplateRequest>,
) -> Result<Json<TemplateApplicationResult>, AppError> {
    if state.engine.templates().get(&id).await?.is_none() {
        return Err(AppError::NotFound(format!("Template not found: {}", id)));
    }

    let options = ApplyOptions {
        context_overrides: payload.context_overrides,
        variable_values: payload.variable_values,
        workspace_name_pattern: payload.workspace_name_pattern,
        timeout_ms: payload.timeout_ms,
        ..ApplyOptions::manual()
    };

    let result = state.engine.apply(&id, options).await;
    Ok(Json(result))
}
