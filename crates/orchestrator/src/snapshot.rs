//! Access to external entity state.
//!
//! Snapshots are arbitrary JSON documents describing a watched entity (a
//! ticket, a repository). Two shapes are common: flat (`{"status": "Open"}`)
//! and Jira-style nested (`{"fields": {"status": {"name": "Open"}}}`). The
//! helpers here read either.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::error::{OrchestratorError, Result};

const DISPLAY_KEYS: &[&str] = &["name", "displayName", "value", "emailAddress"];
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Follow a dotted path (`fields.status.name`, `comments.0.body`).
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }

    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Read a field from either snapshot shape: `<field>` first, then
/// `fields.<field>`. Nulls count as absent.
pub fn lookup_field<'a>(state: &'a Value, field: &str) -> Option<&'a Value> {
    lookup_path(state, field)
        .filter(|v| !v.is_null())
        .or_else(|| lookup_path(state, &format!("fields.{}", field)).filter(|v| !v.is_null()))
}

/// Reduce a field value to the string a person would see.
///
/// Objects are reduced through their `name`, `displayName`, `value` or
/// `emailAddress` key, whichever comes first.
pub fn display_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(map) => DISPLAY_KEYS
            .iter()
            .find_map(|key| map.get(*key))
            .and_then(display_string),
        Value::Array(_) => None,
    }
}

/// Field of a snapshot as a display string
pub fn field_string(state: &Value, field: &str) -> Option<String> {
    lookup_field(state, field).and_then(display_string)
}

/// Source of the latest state of a watched entity.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self, entity_id: &str) -> Result<Value>;
}

/// Fetches `GET {base_url}/{entity_id}` and expects a JSON body.
#[derive(Debug, Clone)]
pub struct HttpSnapshotSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSnapshotSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn entity_url(&self, entity_id: &str) -> String {
        format!("{}/{}", self.base_url, urlencoding::encode(entity_id))
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn fetch(&self, entity_id: &str) -> Result<Value> {
        let url = self.entity_url(entity_id);
        debug!(url = %url, "Fetching entity snapshot");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| OrchestratorError::snapshot_failed(entity_id, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OrchestratorError::snapshot_failed(
                entity_id,
                format!("HTTP {}", status),
            ));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| OrchestratorError::snapshot_failed(entity_id, e.to_string()))
    }
}
