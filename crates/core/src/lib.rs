//! Core domain for Blueprint
//!
//! Workspace templates, triggers, context items and the application result
//! types shared by the store, the engine and the HTTP API. The storage and
//! catalog ports live in [`store`] so the engine can be tested against fakes.

pub mod domain;
mod error;
pub mod store;

pub use domain::*;
pub use error::*;
pub use store::*;
