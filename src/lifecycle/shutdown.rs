//! Shutdown trigger handle.

use tokio::sync::mpsc;

use crate::lifecycle::signals::ShutdownSignal;

/// Room for the first signal plus one repeat that forces the stop.
const SIGNAL_QUEUE: usize = 2;

/// Cloneable handle that asks the lifecycle control loop to shut down.
///
/// The control loop owns the receiving half; this handle only ever sends.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: mpsc::Sender<ShutdownSignal>,
}

impl Shutdown {
    /// Create a handle and the receiver the control loop listens on.
    pub fn channel() -> (Self, mpsc::Receiver<ShutdownSignal>) {
        let (tx, rx) = mpsc::channel(SIGNAL_QUEUE);
        (Self { tx }, rx)
    }

    /// Deliver `signal` to the control loop.
    ///
    /// Returns `false` once the control loop has gone away. A full queue
    /// drops the signal, since a stop is already in progress.
    pub fn trigger(&self, signal: ShutdownSignal) -> bool {
        match self.tx.try_send(signal) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!(signal = %signal, "Shutdown already pending, signal dropped");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Request shutdown from inside the process.
    pub fn request(&self) -> bool {
        self.trigger(ShutdownSignal::Requested)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
