use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("broker unreachable after {attempts} connection attempts")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: lapin::Error,
    },
    #[error("connection attempt failed with a non-retryable error")]
    Rejected(#[source] lapin::Error),
    #[error("failed to create channel")]
    Channel(#[source] lapin::Error),
    #[error("failed to declare queue {queue}")]
    DeclareQueue {
        queue: String,
        #[source]
        source: lapin::Error,
    },
}

#[derive(Error, Debug)]
pub enum ConsumeError {
    #[error("failed to configure prefetch on channel")]
    Qos(#[source] lapin::Error),
    #[error("failed to start consuming from queue {queue}")]
    Subscribe {
        queue: String,
        #[source]
        source: lapin::Error,
    },
    #[error("channel error while receiving deliveries")]
    Receive(#[source] lapin::Error),
    #[error("consume stream closed by broker")]
    ChannelClosed,
}
