use axum::http::StatusCode;
use axum_test::TestServer;
use blueprint_core::{ContextItem, SnapshotStore};
use orchestrator::{HttpSnapshotSource, InMemoryCatalog, LocalProvisioner, SchedulerConfig};
use serde_json::{json, Value};
use server::{create_router, state::AppState};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_catalog() -> InMemoryCatalog {
    InMemoryCatalog::with_items(vec![
        ContextItem::new("lib_1", "Shared library", "library").with_tags(["rust"]),
        ContextItem::new("repo_1", "Backend", "repository").with_source("github"),
        ContextItem::new("PROJ-1", "Login is broken", "jira_issue").with_source("jira"),
    ])
}

async fn test_state(temp_dir: &TempDir) -> AppState {
    let db_path = temp_dir.path().join("test.db");
    let db_url = format!("sqlite:{}", db_path.display());
    let pool = db::connect(&db_url).await.expect("Failed to open database");

    AppState::new(
        pool,
        test_catalog(),
        LocalProvisioner::new(temp_dir.path().join("workspaces")),
    )
}

async fn setup_test_server() -> (TestServer, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let state = test_state(&temp_dir).await;
    let server = TestServer::new(create_router(state)).expect("Failed to create test server");
    (server, temp_dir)
}

fn service_template() -> Value {
    json!({
        "id": "tpl_1",
        "name": "Service",
        "category": "backend",
        "context_requirements": [
            { "id": "lib", "required": true, "type": "explicit", "context_item_id": "lib_1" }
        ],
        "variables": [
            { "name": "env", "type": "string", "required": true }
        ]
    })
}

fn env_trigger() -> Value {
    json!({
        "id": "trg_1",
        "name": "On ticket change",
        "template_id": "tpl_1",
        "context_listener": {
            "entity_id": "PROJ-1",
            "trigger_conditions": [
                { "id": "c1", "type": "status_change", "config": { "to_status": "In Progress" } }
            ]
        },
        "variable_mapping": {
            "env": { "source": "jira", "field_path": "env" }
        }
    })
}

mod health {
    use super::*;

    #[tokio::test]
    async fn test_health_endpoint() {
        let (server, _temp_dir) = setup_test_server().await;

        let response = server.get("/health").await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["watched_triggers"], 0);
    }

    #[tokio::test]
    async fn test_openapi_document_lists_routes() {
        let (server, _temp_dir) = setup_test_server().await;

        let response = server.get("/api/openapi.json").await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert!(body["paths"]["/api/templates/{id}/apply"].is_object());
        assert!(body["paths"]["/api/triggers/{id}/execute"].is_object());
    }
}

mod templates {
    use super::*;

    #[tokio::test]
    async fn test_create_template_returns_201() {
        let (server, _temp_dir) = setup_test_server().await;

        let response = server.post("/api/templates").json(&service_template()).await;

        response.assert_status(StatusCode::CREATED);
        let body: Value = response.json();
        assert_eq!(body["id"], "tpl_1");
        assert_eq!(body["usage_stats"]["total_uses"], 0);
    }

    #[tokio::test]
    async fn test_create_template_resets_usage_stats() {
        let (server, _temp_dir) = setup_test_server().await;

        let mut template = service_template();
        template["usage_stats"] = json!({ "total_uses": 42, "success_count": 42 });
        let response = server.post("/api/templates").json(&template).await;

        response.assert_status(StatusCode::CREATED);
        let body: Value = response.json();
        assert_eq!(body["usage_stats"]["total_uses"], 0);
        assert_eq!(body["usage_stats"]["success_count"], 0);
    }

    #[tokio::test]
    async fn test_create_duplicate_template_conflicts() {
        let (server, _temp_dir) = setup_test_server().await;

        server.post("/api/templates").json(&service_template()).await;
        let response = server.post("/api/templates").json(&service_template()).await;

        response.assert_status(StatusCode::CONFLICT);
        let body: Value = response.json();
        assert_eq!(body["error"], "conflict");
    }

    #[tokio::test]
    async fn test_create_template_with_blank_name_is_rejected() {
        let (server, _temp_dir) = setup_test_server().await;

        let mut template = service_template();
        template["name"] = json!("  ");
        let response = server.post("/api/templates").json(&template).await;

        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_and_get_templates() {
        let (server, _temp_dir) = setup_test_server().await;
        server.post("/api/templates").json(&service_template()).await;

        let list = server.get("/api/templates").await;
        list.assert_status_ok();
        let entries: Vec<Value> = list.json();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["id"], "tpl_1");
        assert_eq!(entries[0]["category"], "backend");

        let single = server.get("/api/templates/tpl_1").await;
        single.assert_status_ok();
        let body: Value = single.json();
        assert_eq!(body["variables"][0]["name"], "env");
    }

    #[tokio::test]
    async fn test_get_missing_template_returns_404() {
        let (server, _temp_dir) = setup_test_server().await;

        let response = server.get("/api/templates/nope").await;

        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_template() {
        let (server, _temp_dir) = setup_test_server().await;
        server.post("/api/templates").json(&service_template()).await;

        server
            .delete("/api/templates/tpl_1")
            .await
            .assert_status(StatusCode::NO_CONTENT);
        server
            .delete("/api/templates/tpl_1")
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}

mod apply {
    use super::*;

    #[tokio::test]
    async fn test_apply_creates_workspace_directory() {
        let (server, temp_dir) = setup_test_server().await;
        server.post("/api/templates").json(&service_template()).await;

        let response = server
            .post("/api/templates/tpl_1/apply")
            .json(&json!({ "variable_values": { "env": "staging" } }))
            .await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["success"], true);
        assert_eq!(body["resolved_variables"]["env"], "staging");
        assert_eq!(body["applied_context_items"][0]["context_item_id"], "lib_1");

        let workspace_id = body["workspace_id"].as_str().expect("workspace id");
        assert!(temp_dir.path().join("workspaces").join(workspace_id).is_dir());
    }

    #[tokio::test]
    async fn test_apply_updates_usage_stats() {
        let (server, _temp_dir) = setup_test_server().await;
        server.post("/api/templates").json(&service_template()).await;

        for _ in 0..2 {
            server
                .post("/api/templates/tpl_1/apply")
                .json(&json!({ "variable_values": { "env": "dev" } }))
                .await
                .assert_status_ok();
        }
        server
            .post("/api/templates/tpl_1/apply")
            .json(&json!({}))
            .await
            .assert_status_ok();

        let body: Value = server.get("/api/templates/tpl_1").await.json();
        assert_eq!(body["usage_stats"]["total_uses"], 3);
        assert_eq!(body["usage_stats"]["manual_uses"], 3);
        assert_eq!(body["usage_stats"]["success_count"], 2);
        assert_eq!(body["usage_stats"]["failure_count"], 1);
    }

    #[tokio::test]
    async fn test_apply_missing_variable_reports_error() {
        let (server, _temp_dir) = setup_test_server().await;
        server.post("/api/templates").json(&service_template()).await;

        let response = server
            .post("/api/templates/tpl_1/apply")
            .json(&json!({}))
            .await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["success"], false);
        assert_eq!(body["errors"][0]["kind"], "variable_resolution");
        assert_eq!(body["errors"][0]["variable"], "env");
        assert!(body.get("workspace_id").is_none());
    }

    #[tokio::test]
    async fn test_apply_with_unknown_context_item_fails_resolution() {
        let (server, _temp_dir) = setup_test_server().await;
        let mut template = service_template();
        template["context_requirements"][0]["context_item_id"] = json!("missing");
        server.post("/api/templates").json(&template).await;

        let response = server
            .post("/api/templates/tpl_1/apply")
            .json(&json!({ "variable_values": { "env": "dev" } }))
            .await;

        let body: Value = response.json();
        assert_eq!(body["success"], false);
        assert_eq!(body["errors"][0]["kind"], "context_resolution");
        assert_eq!(body["errors"][0]["requirement_id"], "lib");
    }

    #[tokio::test]
    async fn test_apply_wildcard_override() {
        let (server, _temp_dir) = setup_test_server().await;
        server
            .post("/api/templates")
            .json(&json!({
                "id": "tpl_ticket",
                "name": "Ticket",
                "category": "support",
                "context_requirements": [
                    {
                        "id": "ticket",
                        "required": true,
                        "type": "wildcard",
                        "wildcard_type": "generic_ticket"
                    }
                ]
            }))
            .await;

        let response = server
            .post("/api/templates/tpl_ticket/apply")
            .json(&json!({ "context_overrides": { "generic_ticket": "PROJ-1" } }))
            .await;

        let body: Value = response.json();
        assert_eq!(body["success"], true);
        let applied = &body["applied_context_items"][0];
        assert_eq!(applied["context_item_id"], "PROJ-1");
        assert_eq!(applied["resolution_type"], "wildcard_resolved");
        assert_eq!(applied["metadata"]["from_override"], true);
    }

    #[tokio::test]
    async fn test_apply_missing_template_returns_404() {
        let (server, _temp_dir) = setup_test_server().await;

        let response = server
            .post("/api/templates/nope/apply")
            .json(&json!({}))
            .await;

        response.assert_status(StatusCode::NOT_FOUND);
    }
}

mod triggers {
    use super::*;

    #[tokio::test]
    async fn test_create_trigger_requires_existing_template() {
        let (server, _temp_dir) = setup_test_server().await;

        let response = server.post("/api/triggers").json(&env_trigger()).await;

        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_trigger_rejects_empty_entity() {
        let (server, _temp_dir) = setup_test_server().await;
        server.post("/api/templates").json(&service_template()).await;

        let mut trigger = env_trigger();
        trigger["context_listener"]["entity_id"] = json!("");
        let response = server.post("/api/triggers").json(&trigger).await;

        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_and_list_triggers() {
        let (server, _temp_dir) = setup_test_server().await;
        server.post("/api/templates").json(&service_template()).await;

        let created = server.post("/api/triggers").json(&env_trigger()).await;
        created.assert_status(StatusCode::CREATED);

        server
            .post("/api/triggers")
            .json(&env_trigger())
            .await
            .assert_status(StatusCode::CONFLICT);

        let entries: Vec<Value> = server.get("/api/triggers").await.json();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["status"], "active");
        assert_eq!(entries[0]["template_id"], "tpl_1");
    }

    #[tokio::test]
    async fn test_set_status() {
        let (server, _temp_dir) = setup_test_server().await;
        server.post("/api/templates").json(&service_template()).await;
        server.post("/api/triggers").json(&env_trigger()).await;

        let response = server
            .post("/api/triggers/trg_1/status")
            .json(&json!({ "status": "paused" }))
            .await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["status"], "paused");

        let missing = server
            .post("/api/triggers/nope/status")
            .json(&json!({ "status": "paused" }))
            .await;
        missing.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_execute_maps_variables_from_context() {
        let (server, _temp_dir) = setup_test_server().await;
        server.post("/api/templates").json(&service_template()).await;
        server.post("/api/triggers").json(&env_trigger()).await;

        let response = server
            .post("/api/triggers/trg_1/execute")
            .json(&json!({
                "trigger_context": { "key": "PROJ-1", "fields": { "env": "staging" } }
            }))
            .await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["success"], true);
        assert_eq!(body["application"]["resolved_variables"]["env"], "staging");

        let trigger: Value = server.get("/api/triggers/trg_1").await.json();
        assert_eq!(trigger["execution_count"], 1);
        assert_eq!(trigger["success_count"], 1);
        assert!(trigger["last_triggered"].is_string());

        let template: Value = server.get("/api/templates/tpl_1").await.json();
        assert_eq!(template["usage_stats"]["automated_uses"], 1);
    }

    #[tokio::test]
    async fn test_failed_execution_counts_failure() {
        let (server, _temp_dir) = setup_test_server().await;
        server.post("/api/templates").json(&service_template()).await;
        server.post("/api/triggers").json(&env_trigger()).await;

        let response = server
            .post("/api/triggers/trg_1/execute")
            .json(&json!({}))
            .await;

        let body: Value = response.json();
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("env"));

        let trigger: Value = server.get("/api/triggers/trg_1").await.json();
        assert_eq!(trigger["execution_count"], 1);
        assert_eq!(trigger["failure_count"], 1);
    }

    #[tokio::test]
    async fn test_execute_missing_trigger_returns_404() {
        let (server, _temp_dir) = setup_test_server().await;

        let response = server
            .post("/api/triggers/nope/execute")
            .json(&json!({}))
            .await;

        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_trigger() {
        let (server, _temp_dir) = setup_test_server().await;
        server.post("/api/templates").json(&service_template()).await;
        server.post("/api/triggers").json(&env_trigger()).await;

        server
            .delete("/api/triggers/trg_1")
            .await
            .assert_status(StatusCode::NO_CONTENT);
        server
            .get("/api/triggers/trg_1")
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_trigger_drops_stored_snapshot() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let state = test_state(&temp_dir).await;
        let snapshots = state.snapshots.clone();
        let server = TestServer::new(create_router(state)).expect("Failed to create test server");
        server.post("/api/templates").json(&service_template()).await;
        server.post("/api/triggers").json(&env_trigger()).await;
        snapshots
            .save("trg_1", &json!({ "status": "To Do" }))
            .await
            .unwrap();

        server
            .delete("/api/triggers/trg_1")
            .await
            .assert_status(StatusCode::NO_CONTENT);

        assert!(snapshots.load("trg_1").await.unwrap().is_none());
    }
}

mod scheduling {
    use super::*;

    async fn setup_scheduled_server() -> (TestServer, TempDir, MockServer) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/PROJ-1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "key": "PROJ-1", "fields": { "status": "To Do" } })),
            )
            .mount(&mock)
            .await;

        let state = test_state(&temp_dir).await;
        let scheduler = state.engine.scheduler(
            Arc::new(state.snapshots.clone()),
            Arc::new(HttpSnapshotSource::new(mock.uri())),
            SchedulerConfig::default(),
        );
        let state = state.with_scheduler(scheduler);

        let server = TestServer::new(create_router(state)).expect("Failed to create test server");
        (server, temp_dir, mock)
    }

    #[tokio::test]
    async fn test_created_trigger_is_watched_until_disabled() {
        let (server, _temp_dir, _mock) = setup_scheduled_server().await;
        server.post("/api/templates").json(&service_template()).await;
        server.post("/api/triggers").json(&env_trigger()).await;

        let health: Value = server.get("/health").await.json();
        assert_eq!(health["watched_triggers"], 1);

        server
            .post("/api/triggers/trg_1/status")
            .json(&json!({ "status": "disabled" }))
            .await
            .assert_status_ok();

        let health: Value = server.get("/health").await.json();
        assert_eq!(health["watched_triggers"], 0);
    }

    #[tokio::test]
    async fn test_pause_keeps_loop_registered() {
        let (server, _temp_dir, _mock) = setup_scheduled_server().await;
        server.post("/api/templates").json(&service_template()).await;
        server.post("/api/triggers").json(&env_trigger()).await;

        server
            .post("/api/triggers/trg_1/status")
            .json(&json!({ "status": "paused" }))
            .await
            .assert_status_ok();

        let health: Value = server.get("/health").await.json();
        assert_eq!(health["watched_triggers"], 1);
    }
}

mod catalog {
    use super::*;

    #[tokio::test]
    async fn test_list_catalog() {
        let (server, _temp_dir) = setup_test_server().await;

        let items: Vec<Value> = server.get("/api/catalog").await.json();

        assert_eq!(items.len(), 3);
        assert_eq!(items[0]["id"], "lib_1");
    }

    #[tokio::test]
    async fn test_list_catalog_by_category() {
        let (server, _temp_dir) = setup_test_server().await;

        let response = server
            .get("/api/catalog")
            .add_query_param("category", "generic_repository")
            .await;

        response.assert_status_ok();
        let items: Vec<Value> = response.json();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["id"], "repo_1");
    }

    #[tokio::test]
    async fn test_unknown_category_is_rejected() {
        let (server, _temp_dir) = setup_test_server().await;

        let response = server
            .get("/api/catalog")
            .add_query_param("category", "spaceship")
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
    }
}

mod audit {
    use super::*;

    #[tokio::test]
    async fn test_application_is_recorded_in_audit_log() {
        let (server, _temp_dir) = setup_test_server().await;
        server.post("/api/templates").json(&service_template()).await;
        server
            .post("/api/templates/tpl_1/apply")
            .json(&json!({ "variable_values": { "env": "dev" } }))
            .await;

        // The persister runs on its own task
        let mut entries: Vec<Value> = Vec::new();
        for _ in 0..50 {
            entries = server
                .get("/api/audit")
                .add_query_param("template_id", "tpl_1")
                .await
                .json();
            if entries.iter().any(|e| e["category"] == "application") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert_eq!(entries[0]["category"], "application");
        assert_eq!(entries.last().unwrap()["category"], "resolution");
        let completed = entries
            .iter()
            .find(|e| e["category"] == "application")
            .expect("application event persisted");
        assert_eq!(completed["level"], "info");
        assert!(completed["workspace_id"].is_string());

        let newest: Vec<Value> = server
            .get("/api/audit")
            .add_query_param("template_id", "tpl_1")
            .add_query_param("limit", 1)
            .await
            .json();
        assert_eq!(newest.len(), 1);
        assert_eq!(newest[0]["category"], "application");
    }
}
