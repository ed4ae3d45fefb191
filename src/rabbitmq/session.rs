use lapin::{
    Channel, Connection, ConnectionProperties,
    options::{BasicAckOptions, BasicNackOptions, QueueDeclareOptions},
    types::FieldTable,
};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::rabbit::RabbitMQConfig;
use crate::rabbitmq::error::ConnectError;

/// Connection attempt budget and the fixed delay between attempts. The
/// defaults cover a broker that is still starting up alongside the consumer.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            retry_delay: Duration::from_secs(5),
        }
    }
}

/// One connection and one channel to RabbitMQ. The session is the only owner
/// of both; everything else goes through its methods.
pub struct RabbitMQSession {
    connection: Connection,
    channel: Channel,
    queue_name: String,
    closed: CloseLatch,
}

impl RabbitMQSession {
    /// Connect, open a channel and declare the durable queue.
    ///
    /// Transport-level failures are retried up to the policy budget with a
    /// fixed delay between attempts; any other failure (bad credentials,
    /// unknown vhost, mismatched queue properties) aborts immediately.
    pub async fn connect(
        config: &RabbitMQConfig,
        policy: RetryPolicy,
    ) -> Result<Self, ConnectError> {
        let url = config.amqp_url();
        let connection = connect_with_retries(policy, || {
            Connection::connect(&url, ConnectionProperties::default())
        })
        .await?;

        info!("Connected to RabbitMQ at {}:{}", config.host, config.port);

        let channel = connection
            .create_channel()
            .await
            .map_err(ConnectError::Channel)?;

        declare_queue(&channel, &config.queue_name).await?;

        info!("Listening to queue: {}", config.queue_name);

        Ok(Self {
            connection,
            channel,
            queue_name: config.queue_name.clone(),
            closed: CloseLatch::default(),
        })
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    /// Acknowledge one delivery. Failure is logged, not escalated: the
    /// message is already processed and cannot be un-processed.
    pub async fn acknowledge(&self, delivery_tag: u64) {
        if let Err(err) = self
            .channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
        {
            error!("Failed to acknowledge message {delivery_tag}: {err}");
        }
    }

    /// Reject one delivery, optionally asking the broker to requeue it.
    pub async fn reject(&self, delivery_tag: u64, requeue: bool) {
        if let Err(err) = self
            .channel
            .basic_nack(
                delivery_tag,
                BasicNackOptions {
                    requeue,
                    ..Default::default()
                },
            )
            .await
        {
            error!("Failed to reject message {delivery_tag}: {err}");
        }
    }

    /// Close channel then connection. Only the first caller performs the
    /// teardown; the normal exit path and the signal path may both get here.
    pub async fn close(&self) {
        if !self.closed.begin() {
            debug!("RabbitMQ session already closed");
            return;
        }

        if let Err(err) = self.channel.close(200, "Normal shutdown").await {
            warn!("Failed to close channel: {err}");
        } else {
            info!("Channel closed");
        }

        if let Err(err) = self.connection.close(200, "Normal shutdown").await {
            warn!("Failed to close connection: {err}");
        } else {
            info!("Connection to RabbitMQ closed");
        }
    }
}

async fn declare_queue(channel: &Channel, queue: &str) -> Result<(), ConnectError> {
    // idempotent as long as the declared properties match
    channel
        .queue_declare(
            queue,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|source| ConnectError::DeclareQueue {
            queue: queue.to_string(),
            source,
        })?;

    debug!("Declared durable queue: {queue}");
    Ok(())
}

async fn connect_with_retries<T, F, Fut>(
    policy: RetryPolicy,
    mut connect: F,
) -> Result<T, ConnectError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = lapin::Result<T>>,
{
    let mut attempt = 1u32;
    loop {
        info!(
            "Attempting to connect to RabbitMQ (attempt {}/{})...",
            attempt, policy.max_attempts
        );
        match connect().await {
            Ok(value) => return Ok(value),
            Err(err) if !is_retryable(&err) => {
                error!("Connection failed with a non-retryable error: {err}");
                return Err(ConnectError::Rejected(err));
            }
            Err(err) => {
                if attempt >= policy.max_attempts {
                    error!("Max connection attempts reached, giving up");
                    return Err(ConnectError::RetriesExhausted {
                        attempts: attempt,
                        source: err,
                    });
                }
                warn!(
                    "Connection attempt {attempt} failed: {err}. Retrying in {}s...",
                    policy.retry_delay.as_secs()
                );
                sleep(policy.retry_delay).await;
                attempt += 1;
            }
        }
    }
}

fn is_retryable(err: &lapin::Error) -> bool {
    matches!(
        err.kind(),
        lapin::ErrorKind::IOError(_) | lapin::ErrorKind::MissingHeartbeatError
    )
}

/// Single-execution latch guarding teardown against racing callers.
#[derive(Debug, Default)]
struct CloseLatch(AtomicBool);

impl CloseLatch {
    /// Returns true for exactly one caller.
    fn begin(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Arc;

    fn transport_error() -> lapin::Error {
        lapin::ErrorKind::IOError(Arc::new(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "connection refused",
        )))
        .into()
    }

    #[tokio::test(start_paused = true)]
    async fn connect_succeeds_after_transient_failures() {
        let policy = RetryPolicy {
            max_attempts: 10,
            retry_delay: Duration::from_secs(5),
        };
        let started = tokio::time::Instant::now();
        let mut attempts = 0u32;

        let result = connect_with_retries(policy, || {
            attempts += 1;
            let outcome = if attempts <= 3 {
                Err(transport_error())
            } else {
                Ok(attempts)
            };
            async move { outcome }
        })
        .await;

        assert_eq!(result.unwrap(), 4);
        // three failed attempts, so exactly three delays were slept
        assert_eq!(started.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn connect_gives_up_after_max_attempts() {
        let policy = RetryPolicy {
            max_attempts: 4,
            retry_delay: Duration::from_secs(1),
        };
        let mut attempts = 0u32;

        let result: Result<(), ConnectError> = connect_with_retries(policy, || {
            attempts += 1;
            async { Err(transport_error()) }
        })
        .await;

        match result {
            Err(ConnectError::RetriesExhausted { attempts: seen, .. }) => assert_eq!(seen, 4),
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
        assert_eq!(attempts, 4);
    }

    #[tokio::test]
    async fn non_retryable_error_aborts_immediately() {
        let mut attempts = 0u32;

        let result: Result<(), ConnectError> = connect_with_retries(RetryPolicy::default(), || {
            attempts += 1;
            async {
                Err(lapin::ErrorKind::InvalidConnectionState(
                    lapin::ConnectionState::Error,
                )
                .into())
            }
        })
        .await;

        assert!(matches!(result, Err(ConnectError::Rejected(_))));
        assert_eq!(attempts, 1);
    }

    #[test]
    fn transport_errors_are_retryable() {
        assert!(is_retryable(&transport_error()));
        assert!(!is_retryable(
            &lapin::ErrorKind::InvalidConnectionState(lapin::ConnectionState::Error,).into()
        ));
    }

    #[test]
    fn close_latch_arms_exactly_once() {
        let latch = CloseLatch::default();
        assert!(latch.begin());
        assert!(!latch.begin());
        assert!(!latch.begin());
    }
}
