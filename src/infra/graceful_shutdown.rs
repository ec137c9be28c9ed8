//! Graceful shutdown handling
//!
//! Signal handling for the HTTP server and the background expiry sweeper.

use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

/// Shutdown signal that can be cloned and shared
#[derive(Clone)]
pub struct ShutdownSignal {
    watch_rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Check if shutdown has been initiated
    pub fn is_shutdown(&self) -> bool {
        *self.watch_rx.borrow()
    }

    /// Wait for shutdown signal
    pub async fn wait(&self) {
        let mut rx = self.watch_rx.clone();
        // A dropped coordinator counts as shutdown.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

/// Owns the shutdown state and hands out [`ShutdownSignal`]s
pub struct ShutdownCoordinator {
    watch_tx: watch::Sender<bool>,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator
    pub fn new() -> Self {
        let (watch_tx, _) = watch::channel(false);
        Self { watch_tx }
    }

    /// Get a shutdown signal that can be cloned
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            watch_rx: self.watch_tx.subscribe(),
        }
    }

    /// Initiate shutdown
    pub fn shutdown(&self) {
        if self.watch_tx.send_replace(true) {
            // Already shutting down
            return;
        }
        info!("Initiating graceful shutdown...");
    }

    /// Check if shutdown has been initiated
    pub fn is_shutdown(&self) -> bool {
        *self.watch_tx.borrow()
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Future that completes on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}

/// Create a shutdown-aware task that stops when shutdown is signaled
pub fn spawn_until_shutdown<F>(signal: ShutdownSignal, task: F) -> tokio::task::JoinHandle<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        tokio::select! {
            _ = signal.wait() => {
                info!("Task stopped due to shutdown signal");
            }
            _ = task => {
                // Task completed normally
            }
        }
    })
}
