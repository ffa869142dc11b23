//! # Core Module
//!
//! Engine configuration and shared text utilities.

pub mod config;
pub mod template;

// Re-export commonly used items
pub use config::EngineConfig;
pub use template::render;
