//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! Issue (register / login):
//!     token.rs generate → plaintext to caller, CredentialRecord (hash) → store
//!
//! Verify (every request with Authorization: Bearer):
//!     authenticate.rs → token.rs check shape → SHA-256 → store lookup
//!     → Identity extension (identity.rs) → capability gate extractor
//! ```
//!
//! # Design Decisions
//! - Only the SHA-256 digest of a credential is ever stored
//! - Unknown, expired and wrong-scope credentials fail identically
//! - Passwords are Argon2id hashed off the async runtime

pub mod authenticate;
pub mod identity;
pub mod password;
pub mod token;

pub use authenticate::authenticate_middleware;
pub use identity::{ActivatedUser, AuthenticatedUser, Identity};
pub use token::{Credential, CredentialEngine, CredentialError, CredentialRecord, Scope, TokenHash};
