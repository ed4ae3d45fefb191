use std::sync::Arc;

use southpark_consumer::config;
use southpark_consumer::error::Result;
use southpark_consumer::message::{ConsoleRenderer, MessageHandler};
use southpark_consumer::rabbitmq::{RabbitMQConsumer, RabbitMQSession, RetryPolicy};
use southpark_consumer::shutdown::{ShutdownCoordinator, shutdown_channel};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::init().await?;
    config.log_summary();

    let session = match RabbitMQSession::connect(&config, RetryPolicy::default()).await {
        Ok(session) => Arc::new(session),
        Err(err) => {
            error!("Failed to connect to RabbitMQ. Exiting.");
            return Err(err.into());
        }
    };

    let (trigger, token) = shutdown_channel();
    // detached; it either exits the process on a signal or dies with it
    let _signal_task = ShutdownCoordinator::new(Arc::clone(&session), trigger).spawn();

    let handler = MessageHandler::new(ConsoleRenderer);
    let consumer = RabbitMQConsumer::new(Arc::clone(&session), handler);

    // Channel faults stop the loop but leave the exit code alone; only a
    // failed initial connect is a startup failure.
    if let Err(err) = consumer.run(token).await {
        error!("Consumer stopped: {err}");
    }

    session.close().await;
    info!("Consumer stopped. Goodbye!");
    Ok(())
}
