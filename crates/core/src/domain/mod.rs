mod application;
mod context;
mod template;
mod trigger;

pub use application::*;
pub use context::*;
pub use template::*;
pub use trigger::*;
