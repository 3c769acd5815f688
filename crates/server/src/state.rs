use anyhow::Context;
use db::{AuditRepository, SnapshotRepository, TemplateRepository, TriggerRepository};
use events::EventBus;
use orchestrator::{
    ranker_by_name, CandidateRanker, Engine, FirstMatch, HttpSnapshotSource, InMemoryCatalog,
    LocalProvisioner, SchedulerConfig, TriggerScheduler,
};
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::audit::spawn_audit_persister;
use crate::config::BlueprintConfig;

#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    pub catalog: InMemoryCatalog,
    pub event_bus: EventBus,
    pub audit_repository: AuditRepository,
    pub snapshots: SnapshotRepository,
    pub scheduler: Option<Arc<TriggerScheduler>>,
}

impl AppState {
    /// Wire the engine over an existing pool. Spawns the audit persister, so
    /// it must be called inside a tokio runtime.
    pub fn new(pool: SqlitePool, catalog: InMemoryCatalog, provisioner: LocalProvisioner) -> Self {
        Self::assemble(pool, catalog, provisioner, Arc::new(FirstMatch))
    }

    fn assemble(
        pool: SqlitePool,
        catalog: InMemoryCatalog,
        provisioner: LocalProvisioner,
        ranker: Arc<dyn CandidateRanker>,
    ) -> Self {
        let event_bus = EventBus::new();
        let audit_repository = AuditRepository::new(pool.clone());
        let snapshots = SnapshotRepository::new(pool.clone());
        spawn_audit_persister(&event_bus, audit_repository.clone());

        let engine = Engine::builder(
            Arc::new(TemplateRepository::new(pool.clone())),
            Arc::new(TriggerRepository::new(pool)),
            Arc::new(catalog.clone()),
            Arc::new(provisioner),
        )
        .with_ranker(ranker)
        .with_audit_log(Arc::new(event_bus.clone()))
        .build();

        Self {
            engine,
            catalog,
            event_bus,
            audit_repository,
            snapshots,
            scheduler: None,
        }
    }

    pub fn with_scheduler(mut self, scheduler: Arc<TriggerScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Build the full state for a project directory: database, catalog,
    /// provisioner, audit persistence and, when a snapshot source is
    /// configured, the trigger scheduler.
    pub async fn from_config(
        config: &BlueprintConfig,
        project_root: &Path,
    ) -> anyhow::Result<Self> {
        let database_url = config.database_url(project_root);
        if let Some(parent) = project_root.join(&config.database.path).parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let pool = db::connect(&database_url)
            .await
            .with_context(|| format!("Failed to open database {}", database_url))?;

        let catalog_path = config.catalog_path(project_root);
        let catalog = if catalog_path.exists() {
            InMemoryCatalog::load(&catalog_path)
                .await
                .with_context(|| format!("Failed to load catalog {}", catalog_path.display()))?
        } else {
            warn!(path = %catalog_path.display(), "Catalog file not found, starting empty");
            InMemoryCatalog::new()
        };

        let ranker = ranker_by_name(&config.catalog.ranker).unwrap_or_else(|| {
            warn!(ranker = %config.catalog.ranker, "Unknown ranker, using first_match");
            Arc::new(FirstMatch)
        });

        let provisioner = LocalProvisioner::new(config.workspace_root(project_root));
        let mut state = Self::assemble(pool, catalog, provisioner, ranker);

        match (&config.scheduler.snapshot_base_url, config.scheduler.enabled) {
            (Some(base_url), true) => {
                let scheduler = state.engine.scheduler(
                    Arc::new(state.snapshots.clone()),
                    Arc::new(HttpSnapshotSource::new(base_url.clone())),
                    SchedulerConfig {
                        max_concurrent_applications: config.scheduler.max_concurrent_applications,
                    },
                );
                state = state.with_scheduler(scheduler);
            }
            (None, true) => {
                info!("No snapshot_base_url configured, trigger scheduler disabled");
            }
            (_, false) => info!("Trigger scheduler disabled by config"),
        }

        Ok(state)
    }

    /// Start polling every active trigger.
    pub async fn start_scheduler(&self) -> anyhow::Result<usize> {
        match &self.scheduler {
            Some(scheduler) => Ok(scheduler.start().await?),
            None => Ok(0),
        }
    }
}
