pub mod audit;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Blueprint API",
        version = "0.1.0",
        description = "Workspace templates, context resolution and triggers"
    ),
    paths(
        routes::health_check,
        routes::list_templates,
        routes::create_template,
        routes::get_template,
        routes::delete_template,
        routes::apply_template,
        routes::list_triggers,
        routes::create_trigger,
        routes::get_trigger,
        routes::delete_trigger,
        routes::set_trigger_status,
        routes::execute_trigger,
        routes::list_catalog,
        routes::list_audit,
    ),
    components(schemas(
        routes::HealthResponse,
        routes::ApplyTemplateRequest,
        routes::SetStatusRequest,
        routes::ExecuteTriggerRequest,
        routes::AuditEntry,
        blueprint_core::WorkspaceTemplate,
        blueprint_core::TemplateIndexEntry,
        blueprint_core::WorkspaceTrigger,
        blueprint_core::TriggerIndexEntry,
        blueprint_core::TriggerStatus,
        blueprint_core::ContextItem,
        blueprint_core::WildcardType,
        blueprint_core::TemplateApplicationResult,
        blueprint_core::TriggerExecutionResult,
    )),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "templates", description = "Template management and application"),
        (name = "triggers", description = "Trigger management and execution"),
        (name = "catalog", description = "Context catalog browsing"),
        (name = "audit", description = "Resolution audit trail"),
    )
)]
pub struct ApiDoc;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api/openapi.json", ApiDoc::openapi()))
        .route("/health", get(routes::health_check))
        .route(
            "/api/templates",
            get(routes::list_templates).post(routes::create_template),
        )
        .route(
            "/api/templates/{id}",
            get(routes::get_template).delete(routes::delete_template),
        )
        .route("/api/templates/{id}/apply", post(routes::apply_template))
        .route(
            "/api/triggers",
            get(routes::list_triggers).post(routes::create_trigger),
        )
        .route(
            "/api/triggers/{id}",
            get(routes::get_trigger).delete(routes::delete_trigger),
        )
        .route("/api/triggers/{id}/status", post(routes::set_trigger_status))
        .route("/api/triggers/{id}/execute", post(routes::execute_trigger))
        .route("/api/catalog", get(routes::list_catalog))
        .route("/api/audit", get(routes::list_audit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
