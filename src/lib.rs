// Core modules
pub mod analysis;
pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod risk;
pub mod strategy;

// Re-export commonly used types
pub use api::{HttpSampler, MarketSampler};
pub use config::Settings;
pub use engine::{CycleOutcome, Engine, EngineConfig, Trigger};
pub use models::*;

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
