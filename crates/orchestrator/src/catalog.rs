//! Context catalog adapters.

use async_trait::async_trait;
use blueprint_core::{ContextItem, WildcardType};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{OrchestratorError, Result};

/// The pool of importable reference material a template can bind to.
#[async_trait]
pub trait ContextCatalog: Send + Sync {
    async fn lookup(&self, id: &str) -> Result<Option<ContextItem>>;

    /// Items whose type, source or tags place them in `category`, in catalog
    /// order.
    async fn query_by_category(&self, category: WildcardType) -> Result<Vec<ContextItem>>;

    async fn list(&self) -> Result<Vec<ContextItem>>;
}

/// Catalog held in memory, preserving insertion order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    inner: Arc<RwLock<CatalogState>>,
}

#[derive(Debug, Default)]
struct CatalogState {
    items: Vec<ContextItem>,
    by_id: HashMap<String, usize>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: impl IntoIterator<Item = ContextItem>) -> Self {
        let mut state = CatalogState::default();
        for item in items {
            state.insert(item);
        }
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    /// Load a JSON array of context items from disk.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await?;
        let items: Vec<ContextItem> = serde_json::from_str(&raw)
            .map_err(|e| OrchestratorError::Catalog(format!("{}: {}", path.display(), e)))?;

        info!(path = %path.display(), count = items.len(), "Loaded context catalog");
        Ok(Self::with_items(items))
    }

    /// Insert or replace an item. Replacement keeps the original position.
    pub async fn insert(&self, item: ContextItem) {
        self.inner.write().await.insert(item);
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl CatalogState {
    fn insert(&mut self, item: ContextItem) {
        match self.by_id.get(&item.id) {
            Some(&index) => self.items[index] = item,
            None => {
                self.by_id.insert(item.id.clone(), self.items.len());
                self.items.push(item);
            }
        }
    }
}

#[async_trait]
impl ContextCatalog for InMemoryCatalog {
    async fn lookup(&self, id: &str) -> Result<Option<ContextItem>> {
        let state = self.inner.read().await;
        Ok(state.by_id.get(id).map(|&i| state.items[i].clone()))
    }

    async fn query_by_category(&self, category: WildcardType) -> Result<Vec<ContextItem>> {
        let state = self.inner.read().await;
        let matches: Vec<ContextItem> = state
            .items
            .iter()
            .filter(|item| category.matches(item))
            .cloned()
            .collect();

        debug!(category = %category, count = matches.len(), "Catalog category query");
        Ok(matches)
    }

    async fn list(&self) -> Result<Vec<ContextItem>> {
        Ok(self.inner.read().await.items.clone())
    }
}
