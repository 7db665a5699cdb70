//! Health checks for the dungeon finder service
//!
//! Checks run against a [`ServiceProbe`], a cheap handle onto the shared
//! parts of the running service, so the HTTP server never needs the whole
//! application state.

use crate::amqp::AmqpConnection;
use crate::manager::LfgManager;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::debug;

/// Health check status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Gauge value exported to Prometheus
    pub fn as_gauge(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 2,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 0,
        }
    }

    fn merge(self, other: &HealthStatus) -> HealthStatus {
        match (self, other) {
            (HealthStatus::Unhealthy, _) | (_, HealthStatus::Unhealthy) => HealthStatus::Unhealthy,
            (HealthStatus::Degraded, _) | (_, HealthStatus::Degraded) => HealthStatus::Degraded,
            _ => HealthStatus::Healthy,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "✅ healthy"),
            HealthStatus::Degraded => write!(f, "⚠️  degraded"),
            HealthStatus::Unhealthy => write!(f, "❌ unhealthy"),
        }
    }
}

/// Shared handles a health check needs
#[derive(Clone)]
pub struct ServiceProbe {
    pub service_name: String,
    pub manager: Arc<RwLock<LfgManager>>,
    pub is_running: Arc<RwLock<bool>>,
    pub amqp: Option<Arc<AmqpConnection>>,
    pub started_at: Instant,
}

impl ServiceProbe {
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    /// Service name
    pub service: String,
    pub version: String,
    /// Current timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    /// Service statistics
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    /// Component name
    pub name: String,
    /// Component status
    pub status: HealthStatus,
    /// Optional error message if unhealthy
    pub message: Option<String>,
    /// Check duration in milliseconds
    pub duration_ms: u64,
}

/// Engine figures included in health reports
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceStats {
    pub queued_players: usize,
    pub queued_entries: usize,
    pub active_proposals: usize,
    pub active_role_checks: usize,
    pub active_boots: usize,
    pub groups_formed: u64,
    pub dungeons_finished: u64,
    pub uptime_seconds: u64,
}

impl HealthCheck {
    /// Perform a comprehensive health check of the service
    pub async fn check(probe: &ServiceProbe) -> Result<Self> {
        let checks = vec![
            Self::check_service_running(probe).await,
            Self::check_engine(probe).await,
            Self::check_amqp_health(probe),
        ];
        let status = checks
            .iter()
            .fold(HealthStatus::Healthy, |acc, c| acc.merge(&c.status));

        let stats = Self::gather_service_stats(probe).await;

        Ok(HealthCheck {
            status,
            service: probe.service_name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now(),
            checks,
            stats,
        })
    }

    /// Simple liveness check - just verify service is running
    pub async fn liveness_check(probe: &ServiceProbe) -> Result<HealthStatus> {
        if probe.is_running().await {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }

    /// Readiness check - verify service can handle requests
    pub async fn readiness_check(probe: &ServiceProbe) -> Result<HealthStatus> {
        if !probe.is_running().await {
            return Ok(HealthStatus::Unhealthy);
        }

        let engine = Self::check_engine(probe).await.status;
        Ok(engine.merge(&Self::check_amqp_health(probe).status))
    }

    async fn check_service_running(probe: &ServiceProbe) -> ComponentCheck {
        let start = Instant::now();

        let (status, message) = if probe.is_running().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "service_running".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// The engine lock is held briefly on every tick, so a busy engine only
    /// degrades the report
    async fn check_engine(probe: &ServiceProbe) -> ComponentCheck {
        let start = Instant::now();

        let (status, message) = match probe.manager.try_read() {
            Ok(manager) if manager.config().is_enabled() => (HealthStatus::Healthy, None),
            Ok(_) => (
                HealthStatus::Degraded,
                Some("Dungeon finder is disabled".to_string()),
            ),
            Err(_) => (
                HealthStatus::Degraded,
                Some("Engine busy".to_string()),
            ),
        };

        ComponentCheck {
            name: "lfg_manager".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn check_amqp_health(probe: &ServiceProbe) -> ComponentCheck {
        let start = Instant::now();

        let (status, message) = match &probe.amqp {
            Some(connection) if connection.is_alive() => (HealthStatus::Healthy, None),
            Some(_) => (
                HealthStatus::Unhealthy,
                Some("Broker connection closed".to_string()),
            ),
            None => (
                HealthStatus::Degraded,
                Some("No broker connection".to_string()),
            ),
        };

        ComponentCheck {
            name: "amqp_connection".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn gather_service_stats(probe: &ServiceProbe) -> ServiceStats {
        let uptime_seconds = probe.started_at.elapsed().as_secs();
        match probe.manager.try_read() {
            Ok(manager) => {
                let stats = manager.stats();
                ServiceStats {
                    queued_players: stats.queued_players,
                    queued_entries: stats.queued_entries,
                    active_proposals: stats.active_proposals,
                    active_role_checks: stats.active_role_checks,
                    active_boots: stats.active_boots,
                    groups_formed: stats.groups_formed,
                    dungeons_finished: stats.dungeons_finished,
                    uptime_seconds,
                }
            }
            Err(_) => {
                debug!("Engine busy, reporting empty stats");
                ServiceStats {
                    uptime_seconds,
                    ..ServiceStats::default()
                }
            }
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LfgConfig;
    use crate::dungeon::DungeonCatalog;
    use crate::notify::RecordingNotifier;
    use crate::world::InMemoryWorld;

    fn create_test_probe(enabled: bool) -> ServiceProbe {
        let config = LfgConfig {
            enable_dungeon_finder: enabled,
            ..LfgConfig::default()
        };
        let manager = LfgManager::new(
            config,
            Arc::new(DungeonCatalog::sample().unwrap()),
            Arc::new(InMemoryWorld::new()),
            Arc::new(RecordingNotifier::new()),
        );
        ServiceProbe {
            service_name: "dungeon-finder".to_string(),
            manager: Arc::new(RwLock::new(manager)),
            is_running: Arc::new(RwLock::new(true)),
            amqp: None,
            started_at: Instant::now(),
        }
    }

    #[tokio::test]
    async fn test_without_broker_is_degraded() {
        let probe = create_test_probe(true);
        let health = HealthCheck::check(&probe).await.unwrap();

        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.checks.len(), 3);
        assert_eq!(
            HealthCheck::liveness_check(&probe).await.unwrap(),
            HealthStatus::Healthy
        );
    }

    #[tokio::test]
    async fn test_stopped_service_is_unhealthy() {
        let probe = create_test_probe(true);
        *probe.is_running.write().await = false;

        assert_eq!(
            HealthCheck::readiness_check(&probe).await.unwrap(),
            HealthStatus::Unhealthy
        );
        assert_eq!(
            HealthCheck::check(&probe).await.unwrap().status,
            HealthStatus::Unhealthy
        );
    }

    #[tokio::test]
    async fn test_disabled_engine_is_reported() {
        let probe = create_test_probe(false);
        let health = HealthCheck::check(&probe).await.unwrap();
        let engine = health
            .checks
            .iter()
            .find(|c| c.name == "lfg_manager")
            .unwrap();
        assert_eq!(engine.status, HealthStatus::Degraded);
        assert!(health.to_json().unwrap().contains("lfg_manager"));
    }

    #[test]
    fn test_status_merge() {
        assert_eq!(HealthStatus::Healthy.as_gauge(), 2);
        assert_eq!(
            HealthStatus::Healthy.merge(&HealthStatus::Degraded),
            HealthStatus::Degraded
        );
        assert_eq!(
            HealthStatus::Degraded.merge(&HealthStatus::Unhealthy),
            HealthStatus::Unhealthy
        );
    }
}
