//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT)
//! - Translate signals to [`ShutdownSignal`] messages for the control loop
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - The watcher keeps forwarding after the first signal so a repeat can force the stop

use std::fmt;

use tokio::task::JoinHandle;

use crate::lifecycle::shutdown::Shutdown;

/// Why shutdown was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGINT / Ctrl+C.
    Interrupt,
    /// SIGTERM.
    Terminate,
    /// Triggered in-process through a [`Shutdown`] handle.
    Requested,
}

impl ShutdownSignal {
    pub fn name(&self) -> &'static str {
        match self {
            ShutdownSignal::Interrupt => "SIGINT",
            ShutdownSignal::Terminate => "SIGTERM",
            ShutdownSignal::Requested => "requested",
        }
    }
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(unix)]
async fn forward_signals(shutdown: Shutdown) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    loop {
        let received = tokio::select! {
            _ = interrupt.recv() => ShutdownSignal::Interrupt,
            _ = terminate.recv() => ShutdownSignal::Terminate,
        };
        if !shutdown.trigger(received) {
            return Ok(());
        }
    }
}

#[cfg(not(unix))]
async fn forward_signals(shutdown: Shutdown) -> std::io::Result<()> {
    loop {
        tokio::signal::ctrl_c().await?;
        if !shutdown.trigger(ShutdownSignal::Interrupt) {
            return Ok(());
        }
    }
}

/// Spawn the task that turns OS signals into shutdown messages.
pub fn spawn_signal_watcher(shutdown: Shutdown) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = forward_signals(shutdown).await {
            tracing::error!(error = %e, "Failed to install signal handlers");
        }
    })
}
