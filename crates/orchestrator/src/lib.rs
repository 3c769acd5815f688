//! Template resolution and trigger execution.
//!
//! [`Engine`] wires the pieces together: the context requirement resolver,
//! the variable resolver, the template applicator, the stats tracker and the
//! trigger executor. [`TriggerScheduler`] drives triggers from polled entity
//! snapshots.

pub mod application;
pub mod catalog;
pub mod conditions;
pub mod context_resolver;
pub mod engine;
pub mod error;
pub mod memory;
pub mod provisioner;
pub mod scheduler;
pub mod snapshot;
pub mod stats;
pub mod trigger_executor;
pub mod variables;

#[cfg(test)]
mod testing;

pub use application::{ApplyOptions, TemplateApplicator};
pub use catalog::{ContextCatalog, InMemoryCatalog};
pub use context_resolver::{
    ranker_by_name, CandidateRanker, ContextRequirementResolver, ContextResolution, FirstMatch,
    MostRecentlyUpdated, ResolutionFailure,
};
pub use engine::{Engine, EngineBuilder};
pub use error::{OrchestratorError, Result};
pub use memory::{InMemorySnapshotStore, InMemoryTemplateStore, InMemoryTriggerStore};
pub use provisioner::{LocalProvisioner, ProvisionError, WorkspaceProvisioner};
pub use scheduler::{CycleOutcome, SchedulerConfig, TriggerScheduler};
pub use snapshot::{HttpSnapshotSource, SnapshotSource};
pub use stats::StatsTracker;
pub use trigger_executor::TriggerExecutor;
pub use variables::{ValueOrigin, VariableError};
