use thiserror::Error;

pub type Result<T> = std::result::Result<T, ErrorConfig>;

#[derive(Error, Debug)]
pub enum ErrorConfig {
    #[error("RABBITMQ_PORT is not a valid port number")]
    InvalidPort(#[from] std::num::ParseIntError),
    #[error("queue name must not be empty")]
    EmptyQueueName,
}
