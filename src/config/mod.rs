//! Configuration management for the dungeon-finder service
//!
//! This module handles configuration loading from files and environment
//! variables, validation, and default values for the service and the engine.

pub mod app;
pub mod lfg;

// Re-export commonly used types
pub use app::{validate_config, AmqpSettings, AppConfig, ServiceSettings};
pub use lfg::LfgConfig;
