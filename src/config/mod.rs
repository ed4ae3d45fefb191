pub mod error;
pub mod rabbit;

use crate::config::{error::Result, rabbit::RabbitMQConfig};
use dotenv::dotenv;

pub async fn init() -> Result<RabbitMQConfig> {
    dotenv().ok();

    tracing_subscriber::fmt::init();

    RabbitMQConfig::from_env().await
}
