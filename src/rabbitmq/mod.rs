pub mod consumer;
pub mod error;
pub mod session;

pub use consumer::RabbitMQConsumer;
pub use session::{RabbitMQSession, RetryPolicy};
