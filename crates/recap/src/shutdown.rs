//! Cooperative shutdown
//!
//! Signal handlers only flip the token; the agent checks it before each
//! cycle, between files, and while sleeping.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Clonable cancellation flag that can also be awaited
#[derive(Debug, Clone)]
pub struct ShutdownToken {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request shutdown; idempotent
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once shutdown has been requested
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close under us
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancel `token` on SIGINT/SIGTERM. A second signal exits immediately.
pub fn listen_for_signals(token: ShutdownToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received, finishing current work");
        token.cancel();

        wait_for_signal().await;
        warn!("Second signal received, exiting immediately");
        std::process::exit(130);
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {},
                _ = term.recv() => {},
            }
        }
        Err(e) => {
            warn!(error = %e, "Could not install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
