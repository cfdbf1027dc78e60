//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → recover.rs (panics become 500 + Connection: close)
//!     → rate_limit.rs (per-client token bucket, keyed by source IP)
//!     → auth (identity resolution)
//!     → handlers
//! ```
//!
//! # Design Decisions
//! - Over-quota clients are rejected before any authentication work
//! - Fail closed: a request without a resolvable client address is an error
//! - Limiter state is process-local

pub mod rate_limit;
pub mod recover;

pub use rate_limit::{rate_limit_middleware, LimiterError, RateLimiter};
pub use recover::recover_panic;
