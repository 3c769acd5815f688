mod audit;
mod catalog;
mod health;
mod templates;
mod triggers;

pub use audit::*;
pub use catalog::*;
pub use health::*;
pub use templates::*;
pub use triggers::*;
