//! Service layer for the dungeon finder
//!
//! Application state, request dispatch, background tasks and health checks
//! of the production service.

pub mod app;
pub mod dispatch;
pub mod health;

pub use app::{
    build_engine, run_tick, spawn_notification_pump, AppState, EngineParts,
    ProductionMessageHandler, ServiceError,
};
pub use dispatch::RequestDispatcher;
pub use health::{HealthCheck, HealthStatus, ServiceProbe};
