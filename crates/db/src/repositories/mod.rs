mod audit_repository;
mod snapshot_repository;
mod template_repository;
mod trigger_repository;

pub use audit_repository::*;
pub use snapshot_repository::*;
pub use template_repository::*;
pub use trigger_repository::*;
