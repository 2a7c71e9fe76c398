//! Process shutdown signals.
//!
//! Handlers are installed before the board starts so a signal that arrives during
//! the initial fetch and render is not lost; [`ShutdownSignal::recv`] then
//! completes as soon as one has been delivered.
//!
//! On Unix `SIGINT`, `SIGTERM` (what systemd sends on stop) and `SIGQUIT` are
//! handled. Elsewhere only Ctrl-C is.

use std::io;
use tracing::info;

#[cfg(unix)]
pub struct ShutdownSignal {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    quit: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl ShutdownSignal {
    /// Register the handlers. Must be called from within a tokio runtime.
    pub fn install() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            quit: signal(SignalKind::quit())?,
        })
    }

    /// Wait for the first shutdown signal and return its name.
    pub async fn recv(mut self) -> &'static str {
        let name = tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
            _ = self.quit.recv() => "SIGQUIT",
        };
        info!(signal = name, "shutdown signal received");
        name
    }
}

#[cfg(not(unix))]
pub struct ShutdownSignal;

#[cfg(not(unix))]
impl ShutdownSignal {
    pub fn install() -> io::Result<Self> {
        Ok(Self)
    }

    pub async fn recv(self) -> &'static str {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(%err, "failed to listen for Ctrl-C, shutting down");
            return "error";
        }
        info!(signal = "ctrl-c", "shutdown signal received");
        "ctrl-c"
    }
}
