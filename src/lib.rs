//! RabbitMQ consumer that prints South Park chat messages from a durable queue.

pub mod config;
pub mod error;
pub mod message;
pub mod rabbitmq;
pub mod shutdown;
