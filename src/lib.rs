//! Dungeon Finder - role-based group matchmaking for dungeons
//!
//! This crate provides the LFG queue engine (role checks, proposals, vote
//! kicks and dungeon locks) together with the AMQP service that drives it.

pub mod amqp;
pub mod clock;
pub mod config;
pub mod dungeon;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod notify;
pub mod persistence;
pub mod queue;
pub mod service;
pub mod types;
pub mod utils;
pub mod world;

// Re-export commonly used types and traits
pub use error::{LfgError, Result};
pub use types::*;

// Re-export key components
pub use amqp::publisher::NotificationPublisher;
pub use dungeon::DungeonCatalog;
pub use manager::{GroupEvents, LfgManager, LfgManagerStats, TickReport};
pub use notify::{ChannelNotifier, LfgNotifier, Notification, OutboundNotification};
pub use world::{InMemoryWorld, PlayerProfile, World};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
