//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (lifecycle manager)
//!     → server.rs (request ID, trace span, metrics, timeout, body limit)
//!     → pipeline.rs (recover → rate limit → authenticate)
//!     → handlers (request.rs decodes input)
//!     → response.rs (JSON envelope or ApiError)
//!     → Send to client
//! ```

pub mod pipeline;
pub mod request;
pub mod response;
pub mod server;

pub use request::{MakeRequestUuid, ReadJson};
pub use response::{ApiError, Envelope};
pub use server::{AppState, HttpServer};
