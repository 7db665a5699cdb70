//! Main application state and service coordination
//!
//! [`AppState`] owns the engine behind a lock and wires it to the outside:
//! an AMQP consumer feeding requests in, a pump publishing the engine's
//! notifications, the scheduler tick and the monitoring tasks.

use crate::amqp::connection::{AmqpConfig, AmqpConnection};
use crate::amqp::handlers::{MessageHandler, RequestConsumer};
use crate::amqp::messages::LfgRequest;
use crate::amqp::publisher::{AmqpNotificationPublisher, NotificationPublisher, PublisherConfig};
use crate::config::{AppConfig, LfgConfig};
use crate::dungeon::DungeonCatalog;
use crate::error::{LfgError, Result as LfgResult};
use crate::manager::{LfgManager, TickReport};
use crate::metrics::health::HealthServerConfig;
use crate::metrics::{HealthServer, MetricsCollector, MetricsService};
use crate::notify::{ChannelNotifier, OutboundNotification};
use crate::persistence::InMemoryGroupStore;
use crate::service::dispatch::RequestDispatcher;
use crate::service::health::{HealthCheck, HealthStatus, ServiceProbe};
use crate::world::InMemoryWorld;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("AMQP connection error: {message}")]
    AmqpConnection { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Message handler that applies requests to the shared engine
pub struct ProductionMessageHandler {
    manager: Arc<RwLock<LfgManager>>,
    dispatcher: RequestDispatcher,
    metrics: Arc<MetricsCollector>,
}

impl ProductionMessageHandler {
    pub fn new(
        manager: Arc<RwLock<LfgManager>>,
        dispatcher: RequestDispatcher,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            manager,
            dispatcher,
            metrics,
        }
    }
}

#[async_trait]
impl MessageHandler for ProductionMessageHandler {
    async fn handle_request(&self, request: LfgRequest) -> LfgResult<()> {
        let start_time = Instant::now();
        let kind = request.kind();

        let result = {
            let mut manager = self.manager.write().await;
            self.dispatcher.apply(&mut manager, request)
        };

        let elapsed = start_time.elapsed();
        self.metrics.record_request(kind, result.is_ok(), elapsed);
        match &result {
            Ok(()) => debug!(
                "Request {} handled in {:.2}ms",
                kind,
                elapsed.as_secs_f64() * 1000.0
            ),
            Err(e) => warn!(
                "Request {} failed after {:.2}ms: {}",
                kind,
                elapsed.as_secs_f64() * 1000.0,
                e
            ),
        }
        result
    }

    async fn handle_error(&self, error: LfgError, message_data: &[u8]) {
        error!(
            "Dropping undeliverable request - error: '{}', message_size: {} bytes",
            error,
            message_data.len()
        );

        if !message_data.is_empty() {
            let preview_len = std::cmp::min(100, message_data.len());
            let preview = String::from_utf8_lossy(&message_data[..preview_len]);
            error!("Message preview: {:?}", preview);
        }

        self.metrics
            .record_amqp_operation("consume", false, Duration::ZERO);
    }
}

/// Engine with everything it reads from, before any I/O is attached
pub struct EngineParts {
    pub manager: LfgManager,
    pub world: Arc<InMemoryWorld>,
    pub notifications: UnboundedReceiver<OutboundNotification>,
}

/// Build the engine from configuration and restore persisted groups
pub fn build_engine(config: &LfgConfig) -> Result<EngineParts> {
    let catalog = match &config.catalog_path {
        Some(path) => {
            info!("Loading dungeon catalog from {}", path);
            DungeonCatalog::from_file(path)?
        }
        None => {
            info!("Using built-in dungeon catalog");
            DungeonCatalog::sample()?
        }
    };
    info!("Dungeon catalog holds {} dungeons", catalog.len());

    let world = Arc::new(InMemoryWorld::new());
    let (notifier, notifications) = ChannelNotifier::new();
    let mut manager = LfgManager::new(
        config.clone(),
        Arc::new(catalog),
        world.clone(),
        Arc::new(notifier),
    )
    .with_group_store(Arc::new(InMemoryGroupStore::new()));
    manager.load_persisted_groups()?;

    Ok(EngineParts {
        manager,
        world,
        notifications,
    })
}

/// Run one scheduler tick and export the engine's counters
pub async fn run_tick(
    manager: &RwLock<LfgManager>,
    metrics: &MetricsCollector,
    diff: Duration,
) -> TickReport {
    let timer = metrics.start_timer();
    let (report, stats) = {
        let mut manager = manager.write().await;
        let report = manager.update(diff);
        (report, manager.stats())
    };
    metrics.record_tick(&report, timer.stop());
    metrics.update_from_lfg_stats(&stats);

    if report.new_proposals > 0 || report.expired_proposals > 0 {
        debug!(
            "Tick: {} new proposals, {} expired, {} role checks expired",
            report.new_proposals, report.expired_proposals, report.expired_role_checks
        );
    }
    report
}

/// Forward engine notifications to a publisher until the engine goes away
pub fn spawn_notification_pump(
    notifications: UnboundedReceiver<OutboundNotification>,
    publisher: Arc<dyn NotificationPublisher>,
    metrics: Arc<MetricsCollector>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut stream = UnboundedReceiverStream::new(notifications);
        info!("Notification pump started");

        while let Some(outbound) = stream.next().await {
            let kind = outbound.notification.kind();
            let recipient = outbound.recipient;
            let start = Instant::now();
            match publisher.publish(outbound).await {
                Ok(()) => {
                    metrics.record_notification(kind);
                    metrics.record_amqp_operation("publish", true, start.elapsed());
                }
                Err(e) => {
                    warn!("Failed to publish {} for player {}: {}", kind, recipient, e);
                    metrics.record_amqp_operation("publish", false, start.elapsed());
                }
            }
        }

        info!("Notification pump stopped");
    })
}

/// Main application state containing all service components
pub struct AppState {
    config: AppConfig,

    /// The matching engine
    manager: Arc<RwLock<LfgManager>>,

    dispatcher: RequestDispatcher,

    /// Engine notifications waiting for the publisher task
    notifications: Option<UnboundedReceiver<OutboundNotification>>,

    amqp_connection: Arc<AmqpConnection>,

    /// Metrics service for monitoring and health checks
    metrics_service: Arc<MetricsService>,

    /// Background task handles
    background_tasks: Vec<JoinHandle<()>>,

    request_consumer: Option<RequestConsumer>,

    /// Service status
    is_running: Arc<RwLock<bool>>,

    started_at: Instant,
}

impl AppState {
    /// Initialize the application with all dependencies
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing dungeon finder service");
        info!(
            "Configuration: service={}, amqp_url={}",
            config.service.name, config.amqp.url
        );

        let engine = build_engine(&config.lfg).map_err(|e| ServiceError::Initialization {
            message: format!("Failed to build engine: {}", e),
        })?;
        let manager = Arc::new(RwLock::new(engine.manager));
        let is_running = Arc::new(RwLock::new(false));
        let started_at = Instant::now();

        let amqp_connection = Self::initialize_amqp(&config).await?;

        let probe = ServiceProbe {
            service_name: config.service.name.clone(),
            manager: manager.clone(),
            is_running: is_running.clone(),
            amqp: Some(amqp_connection.clone()),
            started_at,
        };
        let metrics_service = Self::initialize_metrics(&config, probe)?;

        Ok(Self {
            config,
            manager,
            dispatcher: RequestDispatcher::new(engine.world),
            notifications: Some(engine.notifications),
            amqp_connection,
            metrics_service,
            background_tasks: Vec::new(),
            request_consumer: None,
            is_running,
            started_at,
        })
    }

    /// Start all background services and message consumption
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        info!("Starting dungeon finder service");

        *self.is_running.write().await = true;

        self.start_metrics_service().await?;
        self.start_notification_publishing().await?;
        self.start_amqp_consumption().await?;
        self.start_background_tasks();

        info!("✅ Dungeon finder service started successfully");
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&mut self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of dungeon finder service");

        *self.is_running.write().await = false;

        if let Some(consumer) = &self.request_consumer {
            if let Err(e) = consumer.stop_consuming().await {
                warn!("Failed to stop AMQP consumer: {}", e);
            } else {
                info!("✅ AMQP message consumption stopped");
            }
        }

        self.stop_background_tasks().await;

        if let Err(e) = self.metrics_service.stop().await {
            warn!("Failed to stop metrics service: {}", e);
        } else {
            info!("✅ Metrics service stopped");
        }

        let final_stats = self.manager.read().await.stats();
        info!("Final engine statistics: {:?}", final_stats);
        info!("✅ Dungeon finder service shutdown completed");

        Ok(())
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub fn manager(&self) -> Arc<RwLock<LfgManager>> {
        self.manager.clone()
    }

    pub fn metrics_service(&self) -> Arc<MetricsService> {
        self.metrics_service.clone()
    }

    pub fn amqp_connection(&self) -> Arc<AmqpConnection> {
        self.amqp_connection.clone()
    }

    /// Handle for health checks
    pub fn probe(&self) -> ServiceProbe {
        ServiceProbe {
            service_name: self.config.service.name.clone(),
            manager: self.manager.clone(),
            is_running: self.is_running.clone(),
            amqp: Some(self.amqp_connection.clone()),
            started_at: self.started_at,
        }
    }

    fn initialize_metrics(
        config: &AppConfig,
        probe: ServiceProbe,
    ) -> Result<Arc<MetricsService>, ServiceError> {
        info!(
            "Initializing metrics service on port {}",
            config.service.health_port
        );

        let metrics_collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        let health_config = HealthServerConfig {
            port: config.service.health_port,
            host: "0.0.0.0".to_string(),
        };
        let health_server = Arc::new(
            HealthServer::new(health_config, metrics_collector.clone()).with_probe(probe),
        );

        Ok(Arc::new(MetricsService::new(metrics_collector, health_server)))
    }

    async fn start_metrics_service(&mut self) -> Result<(), ServiceError> {
        let metrics_service = self.metrics_service.clone();
        let port = self.config.service.health_port;

        let metrics_handle = tokio::spawn(async move {
            if let Err(e) = metrics_service.start().await {
                error!("Metrics service failed: {}", e);
            }
        });
        self.background_tasks.push(metrics_handle);

        // Give the server a moment to bind
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        info!("✅ Metrics service started on port {}", port);
        Ok(())
    }

    async fn initialize_amqp(config: &AppConfig) -> Result<Arc<AmqpConnection>, ServiceError> {
        info!("Connecting to AMQP broker: {}", config.amqp.url);

        let amqp_config =
            AmqpConfig::from_settings(&config.amqp).map_err(|e| ServiceError::Configuration {
                message: format!("Failed to parse AMQP URL: {}", e),
            })?;

        let connection =
            AmqpConnection::new(amqp_config)
                .await
                .map_err(|e| ServiceError::AmqpConnection {
                    message: format!("Failed to connect to AMQP: {}", e),
                })?;

        Ok(Arc::new(connection))
    }

    async fn start_notification_publishing(&mut self) -> Result<(), ServiceError> {
        let Some(notifications) = self.notifications.take() else {
            return Err(ServiceError::Initialization {
                message: "Notification publishing already started".to_string(),
            });
        };

        let channel = self
            .amqp_connection
            .connection()
            .open_channel(None)
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to open publisher channel: {}", e),
            })?;

        let publisher_config = PublisherConfig {
            exchange: self.config.amqp.exchange_name.clone(),
            max_retries: self.config.amqp.max_retry_attempts,
            retry_delay_ms: self.config.amqp.retry_delay_ms,
            ..PublisherConfig::default()
        };
        let publisher = AmqpNotificationPublisher::new(channel, publisher_config)
            .await
            .map_err(|e| ServiceError::Initialization {
                message: format!("Failed to initialize notification publisher: {}", e),
            })?;

        let pump = spawn_notification_pump(
            notifications,
            Arc::new(publisher),
            self.metrics_service.collector(),
        );
        self.background_tasks.push(pump);

        info!(
            "✅ Publishing notifications to exchange '{}'",
            self.config.amqp.exchange_name
        );
        Ok(())
    }

    async fn start_amqp_consumption(&mut self) -> Result<(), ServiceError> {
        let queue_name = self.config.amqp.queue_name.clone();

        let channel = self
            .amqp_connection
            .connection()
            .open_channel(None)
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to open consumer channel: {}", e),
            })?;

        let queue_declare_args = amqprs::channel::QueueDeclareArguments::new(&queue_name)
            .durable(true)
            .auto_delete(false)
            .finish();

        channel
            .queue_declare(queue_declare_args)
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to declare queue {}: {}", queue_name, e),
            })?;
        info!("Queue '{}' declared", queue_name);

        let message_handler = Arc::new(ProductionMessageHandler::new(
            self.manager.clone(),
            self.dispatcher.clone(),
            self.metrics_service.collector(),
        ));
        let consumer = RequestConsumer::new(message_handler, channel);

        consumer
            .start_consuming(&queue_name)
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to start consuming messages: {}", e),
            })?;

        self.request_consumer = Some(consumer);

        info!(
            "AMQP message consumption started on queue: '{}'",
            queue_name
        );
        Ok(())
    }

    fn start_background_tasks(&mut self) {
        let tick_interval = self.config.tick_interval();
        info!(
            "Starting scheduler tick ({}ms interval)...",
            tick_interval.as_millis()
        );
        let tick_task = {
            let manager = self.manager.clone();
            let metrics_collector = self.metrics_service.collector();
            let is_running = self.is_running.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(tick_interval);
                let mut last_tick = Instant::now();

                while *is_running.read().await {
                    interval.tick().await;
                    let now = Instant::now();
                    let diff = now.duration_since(last_tick);
                    last_tick = now;
                    run_tick(&manager, &metrics_collector, diff).await;
                }

                info!("Scheduler tick stopped");
            })
        };

        let health_metrics_task = {
            let metrics_collector = self.metrics_service.collector();
            let probe = self.probe();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(30));

                while probe.is_running().await {
                    interval.tick().await;

                    metrics_collector.update_uptime(probe.started_at.elapsed());
                    match HealthCheck::check(&probe).await {
                        Ok(health) => {
                            metrics_collector.update_health_status(health.status.as_gauge());
                            for check in &health.checks {
                                metrics_collector.update_component_health(
                                    &check.name,
                                    check.status != HealthStatus::Unhealthy,
                                );
                            }
                            debug!(
                                "Health: {} - {} players queued, {} proposals",
                                health.status,
                                health.stats.queued_players,
                                health.stats.active_proposals
                            );
                        }
                        Err(e) => warn!("Health check failed: {}", e),
                    }
                }

                info!("Health metrics task stopped");
            })
        };

        self.background_tasks.push(tick_task);
        self.background_tasks.push(health_metrics_task);
        info!("Background tasks started");
    }

    async fn stop_background_tasks(&mut self) {
        let task_count = self.background_tasks.len();
        if task_count == 0 {
            return;
        }

        info!("Stopping {} background tasks...", task_count);
        for task in self.background_tasks.drain(..) {
            task.abort();
        }

        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        info!("✅ All {} background tasks stopped", task_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amqp::publisher::MockNotificationPublisher;
    use crate::notify::Notification;
    use crate::types::{roles, EntityRef, LfgState, Team};
    use crate::world::PlayerProfile;

    fn seeded_config() -> LfgConfig {
        LfgConfig {
            rng_seed: Some(11),
            ..LfgConfig::default()
        }
    }

    #[tokio::test]
    async fn test_build_engine_uses_sample_catalog() {
        let engine = build_engine(&seeded_config()).unwrap();
        assert!(engine.manager.catalog().get(261).is_some());
        assert_eq!(engine.world.player_count(), 0);
    }

    #[tokio::test]
    async fn test_build_engine_rejects_missing_catalog() {
        let config = LfgConfig {
            catalog_path: Some("/nonexistent/dungeons.toml".to_string()),
            ..seeded_config()
        };
        assert!(build_engine(&config).is_err());
    }

    #[tokio::test]
    async fn test_handler_applies_requests_and_pump_publishes() {
        let engine = build_engine(&seeded_config()).unwrap();
        let manager = Arc::new(RwLock::new(engine.manager));
        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let handler = ProductionMessageHandler::new(
            manager.clone(),
            RequestDispatcher::new(engine.world.clone()),
            metrics.clone(),
        );
        let publisher = Arc::new(MockNotificationPublisher::new());
        let pump = spawn_notification_pump(engine.notifications, publisher.clone(), metrics.clone());

        handler
            .handle_request(LfgRequest::PlayerProfile {
                profile: PlayerProfile::new(3, "Tank", 80, Team::Alliance),
            })
            .await
            .unwrap();
        handler
            .handle_request(LfgRequest::JoinLfg {
                player_id: 3,
                roles: roles::TANK,
                dungeons: vec![202],
            })
            .await
            .unwrap();

        assert_eq!(
            manager.read().await.get_state(EntityRef::Player(3)),
            LfgState::Queued
        );

        let report = run_tick(&manager, &metrics, Duration::from_secs(1)).await;
        assert_eq!(report.new_proposals, 0);
        assert_eq!(metrics.queue().queued_players.get(), 1);

        for _ in 0..50 {
            if !publisher.published().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let published = publisher.published();
        assert!(published.iter().all(|n| n.recipient == 3));
        assert!(published
            .iter()
            .any(|n| matches!(n.notification, Notification::JoinResult { .. })));

        drop(handler);
        drop(manager);
        pump.await.unwrap();
    }
}
