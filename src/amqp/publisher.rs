//! AMQP publisher for client notifications

use crate::amqp::messages::{MessageEnvelope, MessageUtils};
use crate::error::{LfgError, Result};
use crate::notify::OutboundNotification;
use amqprs::{
    channel::{BasicPublishArguments, Channel, ExchangeDeclareArguments},
    BasicProperties,
};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Trait for publishing dungeon finder notifications
#[async_trait]
pub trait NotificationPublisher: Send + Sync {
    /// Publish one notification to its recipient's routing key
    async fn publish(&self, notification: OutboundNotification) -> Result<()>;
}

/// Configuration for notification publishing
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub exchange: String,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub enable_deduplication: bool,
    /// Deduplication entries kept before the cache is reset
    pub deduplication_capacity: usize,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            exchange: crate::amqp::messages::LFG_NOTIFICATIONS_EXCHANGE.to_string(),
            max_retries: 3,
            retry_delay_ms: 500,
            enable_deduplication: true,
            deduplication_capacity: 100_000,
        }
    }
}

/// AMQP-based notification publisher
pub struct AmqpNotificationPublisher {
    channel: Channel,
    config: PublisherConfig,
    published_messages: std::sync::Mutex<std::collections::HashSet<String>>,
}

impl AmqpNotificationPublisher {
    /// Create a publisher and declare its exchange
    pub async fn new(channel: Channel, config: PublisherConfig) -> Result<Self> {
        let publisher = Self {
            channel,
            config,
            published_messages: std::sync::Mutex::new(std::collections::HashSet::new()),
        };

        publisher.setup_exchange().await?;

        Ok(publisher)
    }

    async fn setup_exchange(&self) -> Result<()> {
        let args = ExchangeDeclareArguments::new(&self.config.exchange, "topic");
        self.channel
            .exchange_declare(args)
            .await
            .map_err(|e| LfgError::AmqpConnectionFailed {
                message: format!("Failed to declare notification exchange: {}", e),
            })?;

        info!("Declared notification exchange {}", self.config.exchange);
        Ok(())
    }

    /// Publish with retry and exponential backoff
    async fn publish_envelope(&self, envelope: &MessageEnvelope<OutboundNotification>) -> Result<()> {
        if self.config.enable_deduplication {
            let published_messages =
                self.published_messages
                    .lock()
                    .map_err(|_| LfgError::InternalError {
                        message: "Failed to acquire published messages lock".to_string(),
                    })?;
            if published_messages.contains(&envelope.correlation_id) {
                debug!(
                    "Message {} already published, skipping",
                    envelope.correlation_id
                );
                return Ok(());
            }
        }

        let mut retry_count = 0;
        let mut delay = Duration::from_millis(self.config.retry_delay_ms);

        loop {
            match self.try_publish(envelope).await {
                Ok(_) => {
                    if self.config.enable_deduplication {
                        let mut published_messages =
                            self.published_messages.lock().map_err(|_| {
                                LfgError::InternalError {
                                    message: "Failed to acquire published messages lock"
                                        .to_string(),
                                }
                            })?;
                        if published_messages.len() >= self.config.deduplication_capacity {
                            published_messages.clear();
                        }
                        published_messages.insert(envelope.correlation_id.clone());
                    }

                    debug!(
                        "Published {} to {}",
                        envelope.correlation_id, envelope.routing_key
                    );
                    return Ok(());
                }
                Err(e) => {
                    retry_count += 1;
                    if retry_count > self.config.max_retries {
                        error!(
                            "Failed to publish message {} after {} retries: {}",
                            envelope.correlation_id, self.config.max_retries, e
                        );
                        return Err(e);
                    }

                    warn!(
                        "Publish attempt {} failed for message {}: {}. Retrying in {:?}",
                        retry_count, envelope.correlation_id, e, delay
                    );

                    sleep(delay).await;
                    delay = Duration::from_millis((delay.as_millis() as u64 * 2).min(5000));
                }
            }
        }
    }

    async fn try_publish(&self, envelope: &MessageEnvelope<OutboundNotification>) -> Result<()> {
        let payload = envelope.to_bytes()?;

        let args = BasicPublishArguments::new(&self.config.exchange, &envelope.routing_key);
        let mut properties = BasicProperties::default();
        properties
            .with_message_id(&envelope.correlation_id)
            .with_timestamp(envelope.timestamp.timestamp() as u64)
            .with_content_type("application/json");

        self.channel
            .basic_publish(properties, payload, args)
            .await
            .map_err(|e| LfgError::AmqpConnectionFailed {
                message: format!("Failed to publish message: {}", e),
            })?;

        Ok(())
    }

    /// Get number of cached message IDs
    pub fn cached_message_count(&self) -> usize {
        self.published_messages
            .lock()
            .map(|cache| cache.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl NotificationPublisher for AmqpNotificationPublisher {
    async fn publish(&self, notification: OutboundNotification) -> Result<()> {
        let routing_key = MessageUtils::routing_key(&notification.notification);
        let envelope = MessageEnvelope::new(notification, routing_key);
        self.publish_envelope(&envelope).await
    }
}

/// Publisher that records routing keys in memory
#[derive(Debug, Default)]
pub struct MockNotificationPublisher {
    published: std::sync::Mutex<Vec<(String, OutboundNotification)>>,
}

impl MockNotificationPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routing keys published so far, in order
    pub fn routing_keys(&self) -> Vec<String> {
        self.published
            .lock()
            .map(|p| p.iter().map(|(key, _)| key.clone()).collect())
            .unwrap_or_default()
    }

    pub fn published(&self) -> Vec<OutboundNotification> {
        self.published
            .lock()
            .map(|p| p.iter().map(|(_, n)| n.clone()).collect())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut published) = self.published.lock() {
            published.clear();
        }
    }
}

#[async_trait]
impl NotificationPublisher for MockNotificationPublisher {
    async fn publish(&self, notification: OutboundNotification) -> Result<()> {
        let routing_key = MessageUtils::routing_key(&notification.notification);
        if let Ok(mut published) = self.published.lock() {
            published.push((routing_key, notification));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::Notification;

    #[test]
    fn test_publisher_config_default() {
        let config = PublisherConfig::default();
        assert_eq!(config.exchange, "lfg.notifications");
        assert_eq!(config.max_retries, 3);
        assert!(config.enable_deduplication);
    }

    #[tokio::test]
    async fn test_mock_publisher_routes_by_kind() {
        let publisher = MockNotificationPublisher::new();
        publisher
            .publish(OutboundNotification {
                recipient: 9,
                notification: Notification::OfferContinue { dungeon_entry: 1 },
            })
            .await
            .unwrap();

        assert_eq!(publisher.routing_keys(), vec!["lfg.notify.offer_continue"]);
        assert_eq!(publisher.published()[0].recipient, 9);

        publisher.clear();
        assert!(publisher.published().is_empty());
    }
}
