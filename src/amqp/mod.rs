//! AMQP integration for the dungeon finder service
//!
//! Requests arrive on a durable queue and are decoded into [`LfgRequest`]s;
//! client notifications leave through a topic exchange, one routing key per
//! notification kind.

pub mod connection;
pub mod handlers;
pub mod messages;
pub mod publisher;

// Re-export commonly used types
pub use connection::{AmqpConfig, AmqpConnection};
pub use handlers::{MessageHandler, RequestConsumer};
pub use messages::*;
pub use publisher::{AmqpNotificationPublisher, NotificationPublisher};
