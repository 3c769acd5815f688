use axum::extract::{Query, State};
use axum::Json;
use blueprint_core::{ContextItem, WildcardType};
use orchestrator::ContextCatalog;
use serde::Deserialize;
use utoipa::IntoParams;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize, IntoParams)]
pub struct CatalogQuery {
    /// `generic_ticket`, `generic_repository` or `generic_document`
    pub category: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/catalog",
    params(CatalogQuery),
    responses(
        (status = 200, description = "Context items", body = Vec<ContextItem>),
        (status = 400, description = "Unknown category")
    ),
    tag = "catalog"
)]
pub async fn list_catalog(
    State(state): State<AppState>,
    Query(query): Query<CatalogQuery>,
) -> Result<Json<Vec<ContextItem>>, AppError> {
    let items = match query.category.as_deref() {
        Some(category) => {
            let category = WildcardType::parse(category)
                .ok_or_else(|| AppError::BadRequest(format!("Unknown category: {}", category)))?;
            state.catalog.query_by_category(category).await?
        }
        None => state.catalog.list().await?,
    };
    Ok(Json(items))
}
