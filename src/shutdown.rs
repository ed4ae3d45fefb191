use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::rabbitmq::RabbitMQSession;

/// Create the trigger/token pair shared between the signal handler and the
/// consume loop. The flag starts false and is set true at most once.
pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, ShutdownToken { rx })
}

/// Observed by the consume loop before each new receive to decide whether to
/// keep blocking for deliveries.
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    /// Resolves once shutdown has been requested. A dropped trigger counts
    /// as a request.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        let _ = rx.wait_for(|stop| *stop).await;
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}

pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    /// Request shutdown. Repeat calls have no further effect.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

/// Listens for termination signals and drives teardown: the first signal
/// sets the shutdown flag, closes the session and exits the process with a
/// success code. Later signals hit a task that is no longer listening, and
/// the session close is latched, so they cannot tear anything down twice.
pub struct ShutdownCoordinator {
    session: Arc<RabbitMQSession>,
    trigger: ShutdownTrigger,
}

impl ShutdownCoordinator {
    pub fn new(session: Arc<RabbitMQSession>, trigger: ShutdownTrigger) -> Self {
        Self { session, trigger }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            wait_for_signal().await;
            info!("Received termination signal. Shutting down...");
            self.trigger.trigger();
            self.session.close().await;
            info!("Consumer stopped. Goodbye!");
            std::process::exit(0);
        })
    }
}

/// Wait for SIGINT or SIGTERM.
async fn wait_for_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        },
    }
}
