pub mod browser;
pub mod core;
pub mod diagnostics;
pub mod engine;
pub mod errors;
#[cfg(test)]
pub mod testing;
pub mod types;

pub use crate::core::Config;
pub use engine::EstimateEngine;
pub use errors::EngineError;
pub use types::*;
