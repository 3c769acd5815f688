//! Audit events for Blueprint
//!
//! This crate provides the audit event types, the broadcast event bus and the
//! [`AuditLog`] seam the engine records pipeline-stage transitions through.

mod audit;
mod bus;
mod types;

pub use audit::AuditLog;
pub use bus::EventBus;
pub use types::*;
