//! Process signals the daemon reacts to.

use anyhow::Context;

/// What a received signal asks the daemon to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// SIGHUP: reload configuration.
    Rehash,
    /// SIGINT / SIGTERM: unload everything and exit.
    Shutdown,
}

#[cfg(unix)]
pub struct Signals {
    hangup: tokio::signal::unix::Signal,
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    /// Register the handlers.
    pub fn new() -> anyhow::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};
        Ok(Self {
            hangup: signal(SignalKind::hangup()).context("Failed to register SIGHUP handler")?,
            interrupt: signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?,
            terminate: signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?,
        })
    }

    /// Wait for the next signal.
    pub async fn recv(&mut self) -> Request {
        tokio::select! {
            _ = self.hangup.recv() => {
                tracing::info!("Received SIGHUP");
                Request::Rehash
            }
            _ = self.interrupt.recv() => {
                tracing::info!("Received SIGINT");
                Request::Shutdown
            }
            _ = self.terminate.recv() => {
                tracing::info!("Received SIGTERM");
                Request::Shutdown
            }
        }
    }
}

#[cfg(not(unix))]
pub struct Signals;

#[cfg(not(unix))]
impl Signals {
    /// Register the handlers.
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self)
    }

    /// Wait for the next signal. Only Ctrl+C is available here.
    pub async fn recv(&mut self) -> Request {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to wait for Ctrl+C");
        } else {
            tracing::info!("Received Ctrl+C");
        }
        Request::Shutdown
    }
}
