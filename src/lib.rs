pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod logging;
pub mod store;
pub mod types;

pub use config::EngineConfig;
pub use engine::AnalyticsEngine;
pub use error::{EngineError, EngineResult, StoreError};
pub use store::{AttemptStore, MemoryStore, PerformanceStore};
