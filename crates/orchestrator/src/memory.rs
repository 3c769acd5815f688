//! In-memory definition and snapshot stores.

use async_trait::async_trait;
use blueprint_core::{
    SnapshotStore, StoreResult, TemplateIndexEntry, TemplateStore, TriggerIndexEntry,
    TriggerStore, WorkspaceTemplate, WorkspaceTrigger,
};
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct InMemoryTemplateStore {
    records: RwLock<BTreeMap<String, WorkspaceTemplate>>,
}

impl InMemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TemplateStore for InMemoryTemplateStore {
    async fn get(&self, id: &str) -> StoreResult<Option<WorkspaceTemplate>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn list(&self) -> StoreResult<Vec<WorkspaceTemplate>> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn put(&self, template: &WorkspaceTemplate) -> StoreResult<()> {
        self.records
            .write()
            .await
            .insert(template.id.clone(), template.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> StoreResult<bool> {
        Ok(self.records.write().await.remove(id).is_some())
    }

    async fn index(&self) -> StoreResult<Vec<TemplateIndexEntry>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .map(TemplateIndexEntry::from)
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryTriggerStore {
    records: RwLock<BTreeMap<String, WorkspaceTrigger>>,
}

impl InMemoryTriggerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TriggerStore for InMemoryTriggerStore {
    async fn get(&self, id: &str) -> StoreResult<Option<WorkspaceTrigger>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn list(&self) -> StoreResult<Vec<WorkspaceTrigger>> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn put(&self, trigger: &WorkspaceTrigger) -> StoreResult<()> {
        self.records
            .write()
            .await
            .insert(trigger.id.clone(), trigger.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> StoreResult<bool> {
        Ok(self.records.write().await.remove(id).is_some())
    }

    async fn index(&self) -> StoreResult<Vec<TriggerIndexEntry>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .map(TriggerIndexEntry::from)
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    snapshots: RwLock<BTreeMap<String, Value>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn load(&self, trigger_id: &str) -> StoreResult<Option<Value>> {
        Ok(self.snapshots.read().await.get(trigger_id).cloned())
    }

    async fn save(&self, trigger_id: &str, snapshot: &Value) -> StoreResult<()> {
        self.snapshots
            .write()
            .await
            .insert(trigger_id.to_string(), snapshot.clone());
        Ok(())
    }

    async fn delete(&self, trigger_id: &str) -> StoreResult<bool> {
        Ok(self.snapshots.write().await.remove(trigger_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blueprint_core::{ContextListener, TriggerStatus};

    #[tokio::test]
    async fn test_template_index_reflects_writes() {
        let store = InMemoryTemplateStore::new();
        store
            .put(&WorkspaceTemplate::new("b", "Beta", "ops"))
            .await
            .unwrap();
        store
            .put(&WorkspaceTemplate::new("a", "Alpha", "engineering"))
            .await
            .unwrap();

        let index = store.index().await.unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index[0].id, "a");
        assert_eq!(index[0].category, "engineering");

        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
        assert_eq!(store.index().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_active_triggers() {
        let store = InMemoryTriggerStore::new();
        let active = WorkspaceTrigger::new("t1", "One", "tpl", ContextListener::new("E-1"));
        let mut paused = WorkspaceTrigger::new("t2", "Two", "tpl", ContextListener::new("E-2"));
        paused.status = TriggerStatus::Paused;

        store.put(&active).await.unwrap();
        store.put(&paused).await.unwrap();

        let ids: Vec<_> = store
            .list_active()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec!["t1"]);
    }
}
