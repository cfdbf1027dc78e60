//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (manager.rs):
//!     Bind socket → attach router → Serving
//!
//! Signals (signals.rs → shutdown.rs):
//!     SIGTERM/SIGINT → ShutdownSignal sent over channel → control loop
//!
//! Shutdown (manager.rs):
//!     Draining: stop accepting → drain connections → wait background tasks
//!     Stopped: clean (drained within grace) or forced (grace elapsed / second signal)
//!
//! Background work (background.rs):
//!     handler → BackgroundTasks::spawn → tracked until complete
//! ```
//!
//! # Design Decisions
//! - The control loop is the only writer of lifecycle state
//! - Shutdown has timeout: forced exit after the grace period
//! - A second termination signal during drain forces the stop
//! - Background tasks are accepted until Stopped, rejected after

pub mod background;
pub mod manager;
pub mod shutdown;
pub mod signals;
pub mod state;

pub use background::{BackgroundTasks, TaskRejected};
pub use manager::{LifecycleError, LifecycleManager};
pub use shutdown::Shutdown;
pub use signals::ShutdownSignal;
pub use state::LifecycleState;
