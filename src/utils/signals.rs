//! Termination signals that end a run early.

use tracing::warn;

/// Handlers for SIGTERM and SIGINT, registered when this is created rather
/// than when it is first awaited.
#[cfg(unix)]
pub struct ShutdownSignal {
    sigterm: Option<tokio::signal::unix::Signal>,
    sigint: Option<tokio::signal::unix::Signal>,
}

#[cfg(unix)]
impl ShutdownSignal {
    pub fn register() -> Self {
        use tokio::signal::unix::{SignalKind, signal};

        // Registration can fail in restricted environments (containers, tests).
        let sigterm = signal(SignalKind::terminate())
            .map_err(|e| warn!("⚠️ Could not register SIGTERM handler: {}", e))
            .ok();
        let sigint = signal(SignalKind::interrupt())
            .map_err(|e| warn!("⚠️ Could not register SIGINT handler: {}", e))
            .ok();
        ShutdownSignal { sigterm, sigint }
    }

    /// Resolves with the name of the first signal received.
    pub async fn recv(mut self) -> &'static str {
        match (self.sigterm.as_mut(), self.sigint.as_mut()) {
            (Some(sigterm), Some(sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => "SIGTERM",
                    _ = sigint.recv() => "SIGINT",
                }
            }
            (Some(sigterm), None) => {
                sigterm.recv().await;
                "SIGTERM"
            }
            (None, Some(sigint)) => {
                sigint.recv().await;
                "SIGINT"
            }
            (None, None) => ctrl_c().await,
        }
    }
}

#[cfg(not(unix))]
pub struct ShutdownSignal;

#[cfg(not(unix))]
impl ShutdownSignal {
    pub fn register() -> Self {
        ShutdownSignal
    }

    pub async fn recv(self) -> &'static str {
        ctrl_c().await
    }
}

/// Fallback listener. If even Ctrl+C cannot be watched, never resolves
/// instead of reporting a signal that did not happen.
async fn ctrl_c() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("⚠️ Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    "Ctrl+C"
}
