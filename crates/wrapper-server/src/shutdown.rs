//! Graceful shutdown coordination.
//!
//! Watch streams subscribe to a [`ShutdownController`] and end when it fires;
//! each open watch holds an [`OperationGuard`] so shutdown can wait for them
//! to drain, bounded by a grace period.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use wrapper_server::shutdown::ShutdownController;
//!
//! let controller = ShutdownController::new();
//! let signal = controller.shutdown_signal();
//!
//! // In a watch stream
//! let _guard = controller.register_operation();
//! signal.wait().await;
//!
//! // On SIGTERM
//! controller.shutdown(Duration::from_secs(10)).await;
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{info, warn};

/// Controller for coordinating graceful shutdown.
#[derive(Debug, Clone)]
pub struct ShutdownController {
    inner: Arc<ShutdownInner>,
}

#[derive(Debug)]
struct ShutdownInner {
    initiated: AtomicBool,
    tx: watch::Sender<bool>,
    active_ops: AtomicUsize,
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownController {
    /// Create a new shutdown controller.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(ShutdownInner {
                initiated: AtomicBool::new(false),
                tx,
                active_ops: AtomicUsize::new(0),
            }),
        }
    }

    /// Check if shutdown has been initiated.
    pub fn is_shutdown(&self) -> bool {
        self.inner.initiated.load(Ordering::SeqCst)
    }

    /// A future-like handle that resolves once shutdown is initiated.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.inner.tx.subscribe(),
        }
    }

    /// Initiate graceful shutdown and wait for registered operations.
    ///
    /// Returns `true` if every operation finished within `grace_period`.
    pub async fn shutdown(&self, grace_period: Duration) -> bool {
        if self
            .inner
            .initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return true;
        }

        info!(grace_period = ?grace_period, "initiating graceful shutdown");
        self.inner.tx.send_replace(true);

        match timeout(grace_period, self.wait_for_completion()).await {
            Ok(()) => {
                info!("graceful shutdown completed");
                true
            }
            Err(_) => {
                warn!(
                    remaining_ops = self.active_operations(),
                    "graceful shutdown timed out, forcing shutdown"
                );
                false
            }
        }
    }

    async fn wait_for_completion(&self) {
        while self.active_operations() > 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Register an active operation. The returned guard unregisters on drop.
    pub fn register_operation(&self) -> OperationGuard {
        self.inner.active_ops.fetch_add(1, Ordering::SeqCst);
        OperationGuard {
            controller: self.clone(),
        }
    }

    /// Number of registered operations.
    pub fn active_operations(&self) -> usize {
        self.inner.active_ops.load(Ordering::SeqCst)
    }
}

/// Guard for an active operation.
#[derive(Debug)]
pub struct OperationGuard {
    controller: ShutdownController,
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.controller
            .inner
            .active_ops
            .fetch_sub(1, Ordering::SeqCst);
    }
}

/// Resolves when shutdown is initiated.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Wait for the shutdown signal.
    pub async fn wait(mut self) {
        self.changed().await;
    }

    /// Wait for the shutdown signal without consuming the handle.
    pub async fn changed(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                // Controller dropped, treat as shutdown
                return;
            }
        }
    }
}

/// Wait for SIGTERM or SIGINT.
pub async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "failed to install signal handlers, falling back to ctrl-c");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "failed to listen for ctrl-c");
                }
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        info!("received Ctrl+C");
    }
}
