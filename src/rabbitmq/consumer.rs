use futures::StreamExt;
use lapin::{
    message::Delivery,
    options::{BasicConsumeOptions, BasicQosOptions},
    types::FieldTable,
};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::message::handler::{Disposition, MessageHandler};
use crate::message::render::MessageRenderer;
use crate::rabbitmq::error::ConsumeError;
use crate::rabbitmq::session::RabbitMQSession;
use crate::shutdown::ShutdownToken;

const CONSUMER_TAG: &str = "southpark_consumer";

pub struct RabbitMQConsumer<R> {
    session: Arc<RabbitMQSession>,
    handler: MessageHandler<R>,
}

impl<R: MessageRenderer> RabbitMQConsumer<R> {
    pub fn new(session: Arc<RabbitMQSession>, handler: MessageHandler<R>) -> Self {
        Self { session, handler }
    }

    /// Block on the queue, dispatching each delivery to the handler and
    /// issuing exactly one acknowledgement per delivery tag.
    ///
    /// Returns Ok when the shutdown token is set; a broker-initiated channel
    /// closure closes the session and returns the fault to the caller.
    pub async fn run(&self, shutdown: ShutdownToken) -> Result<(), ConsumeError> {
        let channel = self.session.channel();
        let queue = self.session.queue_name();

        // Fair dispatch: the broker holds back further messages until the
        // one in flight is acknowledged or rejected.
        channel
            .basic_qos(1, BasicQosOptions::default())
            .await
            .map_err(ConsumeError::Qos)?;

        // default options leave no_ack false; every delivery waits for an
        // explicit ack or nack from the handler's disposition
        let mut consumer = channel
            .basic_consume(
                queue,
                CONSUMER_TAG,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|source| ConsumeError::Subscribe {
                queue: queue.to_string(),
                source,
            })?;

        info!("Consumer is ready! Waiting for messages on queue: {queue}");
        info!("(Press Ctrl+C to exit)");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, no longer accepting deliveries");
                    return Ok(());
                }
                delivery = consumer.next() => match delivery {
                    Some(Ok(delivery)) => self.dispatch(delivery).await,
                    Some(Err(err)) => {
                        error!("Channel error while receiving deliveries: {err}");
                        self.session.close().await;
                        return Err(ConsumeError::Receive(err));
                    }
                    None => {
                        warn!("Consume stream ended, channel closed by broker");
                        self.session.close().await;
                        return Err(ConsumeError::ChannelClosed);
                    }
                }
            }
        }
    }

    async fn dispatch(&self, delivery: Delivery) {
        let (disposition, log_event) = self.handler.handle(&delivery.data);

        if let Some(event) = log_event {
            event.emit();
        }

        match disposition {
            Disposition::Acknowledge => self.session.acknowledge(delivery.delivery_tag).await,
            Disposition::RejectNoRequeue => self.session.reject(delivery.delivery_tag, false).await,
        }
    }
}
