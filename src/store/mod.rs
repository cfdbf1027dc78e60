//! Persistence subsystem.
//!
//! # Data Flow
//! ```text
//! handlers / auth
//!     → with_deadline (per-call timeout, independent of the client's request timeout)
//!     → CredentialStore | UserStore | MovieStore (trait objects)
//!     → memory.rs (in-process implementation)
//! ```
//!
//! # Design Decisions
//! - Store contracts are traits so the relational backend stays swappable
//! - Every call from the request path carries its own deadline
//! - Not-found is a value (`Option`) for lookups, an error only for mutations

pub mod memory;
pub mod types;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::auth::token::{CredentialRecord, Scope, TokenHash};

pub use memory::MemoryStore;
pub use types::{Movie, MovieId, Runtime, User, UserId};

/// Errors surfaced by store implementations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("duplicate email")]
    DuplicateEmail,
    #[error("edit conflict")]
    EditConflict,
    #[error("store call exceeded {0:?} deadline")]
    Timeout(Duration),
    #[error("store backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    /// Failures where repeating an idempotent call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Timeout(_) | StoreError::Backend(_))
    }
}

/// Bound a store call by `deadline`.
pub async fn with_deadline<T, F>(deadline: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(deadline)),
    }
}

/// Hashed credential persistence.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn insert_credential(&self, record: CredentialRecord) -> Result<(), StoreError>;

    /// Principal owning a credential with this hash and scope that is still
    /// valid at `now`.
    async fn lookup_principal(
        &self,
        hash: &TokenHash,
        scope: Scope,
        now: DateTime<Utc>,
    ) -> Result<Option<UserId>, StoreError>;

    /// Remove every credential of `scope` owned by `user_id`. Returns the
    /// number removed.
    async fn delete_credentials(&self, scope: Scope, user_id: UserId) -> Result<u64, StoreError>;
}

/// New account fields; id, timestamps and version are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError>;
    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn user_by_id(&self, id: UserId) -> Result<Option<User>, StoreError>;
    /// Persist `user` if its version still matches; returns the stored copy
    /// with the bumped version.
    async fn update_user(&self, user: User) -> Result<User, StoreError>;
}

/// New catalogue entry fields.
#[derive(Debug, Clone)]
pub struct NewMovie {
    pub title: String,
    pub year: i32,
    pub runtime: Option<Runtime>,
    pub genres: Vec<String>,
}

/// Listing filter for [`MovieStore::list_movies`].
#[derive(Debug, Clone)]
pub struct MovieFilter {
    pub title: String,
    pub genres: Vec<String>,
    pub page: u32,
    pub page_size: u32,
    /// Sort column, optionally prefixed with `-` for descending.
    pub sort: String,
}

impl Default for MovieFilter {
    fn default() -> Self {
        Self {
            title: String::new(),
            genres: Vec::new(),
            page: 1,
            page_size: 10,
            sort: "id".to_string(),
        }
    }
}

impl MovieFilter {
    pub const SORT_SAFELIST: [&'static str; 8] =
        ["id", "title", "year", "runtime", "-id", "-title", "-year", "-runtime"];

    pub fn sort_column(&self) -> &str {
        self.sort.trim_start_matches('-')
    }

    pub fn descending(&self) -> bool {
        self.sort.starts_with('-')
    }

    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize) * self.page_size as usize
    }
}

/// Pagination details returned alongside a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct PageMetadata {
    #[serde(skip_serializing_if = "is_zero")]
    pub current_page: u32,
    #[serde(skip_serializing_if = "is_zero")]
    pub page_size: u32,
    #[serde(skip_serializing_if = "is_zero")]
    pub first_page: u32,
    #[serde(skip_serializing_if = "is_zero")]
    pub last_page: u32,
    #[serde(skip_serializing_if = "is_zero")]
    pub total_records: u32,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

impl PageMetadata {
    pub fn new(total_records: u32, page: u32, page_size: u32) -> Self {
        if total_records == 0 {
            return Self::default();
        }
        Self {
            current_page: page,
            page_size,
            first_page: 1,
            last_page: total_records.div_ceil(page_size),
            total_records,
        }
    }
}

#[async_trait]
pub trait MovieStore: Send + Sync {
    async fn insert_movie(&self, movie: NewMovie) -> Result<Movie, StoreError>;
    async fn movie_by_id(&self, id: MovieId) -> Result<Option<Movie>, StoreError>;
    async fn list_movies(&self, filter: &MovieFilter) -> Result<(Vec<Movie>, PageMetadata), StoreError>;
    /// Persist `movie` if its version still matches; returns the stored copy
    /// with the bumped version.
    async fn update_movie(&self, movie: Movie) -> Result<Movie, StoreError>;
    async fn delete_movie(&self, id: MovieId) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deadline_maps_to_timeout() {
        let deadline = Duration::from_millis(20);
        let result: Result<(), StoreError> = with_deadline(deadline, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert_eq!(result, Err(StoreError::Timeout(deadline)));
    }

    #[tokio::test]
    async fn deadline_passes_through_results() {
        let ok = with_deadline(Duration::from_secs(1), async { Ok::<_, StoreError>(7) }).await;
        assert_eq!(ok, Ok(7));

        let err = with_deadline(Duration::from_secs(1), async { Err::<(), _>(StoreError::NotFound) }).await;
        assert_eq!(err, Err(StoreError::NotFound));
    }

    #[test]
    fn page_metadata_rounds_up() {
        let meta = PageMetadata::new(21, 2, 10);
        assert_eq!(meta.last_page, 3);
        assert_eq!(meta.first_page, 1);
        assert_eq!(PageMetadata::new(0, 1, 10), PageMetadata::default());
    }
}
