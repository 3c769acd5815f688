mod error;
pub mod models;
mod pool;
pub mod repositories;

pub use error::*;
pub use models::{AuditRecord, NewAuditRecord};
pub use pool::*;
pub use repositories::*;
