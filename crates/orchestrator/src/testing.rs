//! Collaborator doubles shared by the unit tests.

use async_trait::async_trait;
use blueprint_core::{AppliedContextItem, WorkspaceConfig};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::{OrchestratorError, Result};
use crate::provisioner::{ProvisionError, WorkspaceProvisioner};
use crate::snapshot::SnapshotSource;

#[derive(Debug, Clone)]
pub struct ProvisionCall {
    pub naming_pattern: String,
    pub context_items: Vec<AppliedContextItem>,
    pub variables: HashMap<String, Value>,
}

/// Succeeds with `ws-1`, `ws-2`, ... and remembers every call.
#[derive(Debug, Default)]
pub struct RecordingProvisioner {
    calls: Mutex<Vec<ProvisionCall>>,
}

impl RecordingProvisioner {
    pub fn calls(&self) -> Vec<ProvisionCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkspaceProvisioner for RecordingProvisioner {
    async fn create(
        &self,
        config: &WorkspaceConfig,
        context_items: &[AppliedContextItem],
        variables: &HashMap<String, Value>,
    ) -> std::result::Result<String, ProvisionError> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(ProvisionCall {
            naming_pattern: config.naming_pattern.clone(),
            context_items: context_items.to_vec(),
            variables: variables.clone(),
        });
        Ok(format!("ws-{}", calls.len()))
    }
}

pub struct FailingProvisioner;

#[async_trait]
impl WorkspaceProvisioner for FailingProvisioner {
    async fn create(
        &self,
        _config: &WorkspaceConfig,
        _context_items: &[AppliedContextItem],
        _variables: &HashMap<String, Value>,
    ) -> std::result::Result<String, ProvisionError> {
        Err(ProvisionError::Failed("disk full".into()))
    }
}

/// Never finishes.
pub struct StalledProvisioner;

#[async_trait]
impl WorkspaceProvisioner for StalledProvisioner {
    async fn create(
        &self,
        _config: &WorkspaceConfig,
        _context_items: &[AppliedContextItem],
        _variables: &HashMap<String, Value>,
    ) -> std::result::Result<String, ProvisionError> {
        std::future::pending().await
    }
}

/// Serves whatever snapshot was last set for an entity.
#[derive(Debug, Default)]
pub struct StaticSnapshotSource {
    snapshots: Mutex<HashMap<String, Value>>,
    fetches: AtomicUsize,
}

impl StaticSnapshotSource {
    pub fn set(&self, entity_id: &str, snapshot: Value) {
        self.snapshots
            .lock()
            .unwrap()
            .insert(entity_id.to_string(), snapshot);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotSource for StaticSnapshotSource {
    async fn fetch(&self, entity_id: &str) -> Result<Value> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.snapshots
            .lock()
            .unwrap()
            .get(entity_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::snapshot_failed(entity_id, "no snapshot"))
    }
}
