//! In-process store backed by concurrent maps.

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::auth::token::{CredentialRecord, Scope, TokenHash};
use crate::store::{
    CredentialStore, Movie, MovieFilter, MovieId, MovieStore, NewMovie, NewUser, PageMetadata,
    StoreError, User, UserId, UserStore,
};

/// Implements every store contract over `DashMap`s.
#[derive(Debug, Default)]
pub struct MemoryStore {
    credentials: DashMap<TokenHash, CredentialRecord>,
    users: DashMap<UserId, User>,
    /// email -> id, enforces uniqueness.
    emails: DashMap<String, UserId>,
    movies: DashMap<MovieId, Movie>,
    user_seq: AtomicI64,
    movie_seq: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn credential_count(&self) -> usize {
        self.credentials.len()
    }

    fn replace_user(&self, expected_email: &str, mut user: User) -> Result<User, StoreError> {
        let mut current = self.users.get_mut(&user.id).ok_or(StoreError::EditConflict)?;
        if current.version != user.version || current.email != expected_email {
            return Err(StoreError::EditConflict);
        }
        user.version += 1;
        *current = user.clone();
        Ok(user)
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn insert_credential(&self, record: CredentialRecord) -> Result<(), StoreError> {
        self.credentials.insert(record.hash, record);
        Ok(())
    }

    async fn lookup_principal(
        &self,
        hash: &TokenHash,
        scope: Scope,
        now: DateTime<Utc>,
    ) -> Result<Option<UserId>, StoreError> {
        Ok(self
            .credentials
            .get(hash)
            .filter(|record| record.scope == scope && record.expiry > now)
            .map(|record| record.user_id))
    }

    async fn delete_credentials(&self, scope: Scope, user_id: UserId) -> Result<u64, StoreError> {
        let before = self.credentials.len();
        self.credentials
            .retain(|_, record| !(record.scope == scope && record.user_id == user_id));
        Ok(before.saturating_sub(self.credentials.len()) as u64)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        match self.emails.entry(user.email.clone()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateEmail),
            Entry::Vacant(slot) => {
                let id = self.user_seq.fetch_add(1, Ordering::SeqCst) + 1;
                let stored = User {
                    id,
                    created_at: Utc::now(),
                    name: user.name,
                    email: user.email,
                    password_hash: user.password_hash,
                    activated: false,
                    version: 1,
                };
                self.users.insert(id, stored.clone());
                slot.insert(id);
                Ok(stored)
            }
        }
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let Some(id) = self.emails.get(email).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn user_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn update_user(&self, user: User) -> Result<User, StoreError> {
        let previous_email = self
            .users
            .get(&user.id)
            .map(|current| current.email.clone())
            .ok_or(StoreError::EditConflict)?;
        if previous_email == user.email {
            return self.replace_user(&previous_email, user);
        }

        // email shards are locked before user shards, as in insert_user
        let Entry::Vacant(slot) = self.emails.entry(user.email.clone()) else {
            return Err(StoreError::DuplicateEmail);
        };
        let updated = self.replace_user(&previous_email, user)?;
        slot.insert(updated.id);
        self.emails.remove(&previous_email);
        Ok(updated)
    }
}

#[async_trait]
impl MovieStore for MemoryStore {
    async fn insert_movie(&self, movie: NewMovie) -> Result<Movie, StoreError> {
        let id = self.movie_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let stored = Movie {
            id,
            created_at: Utc::now(),
            title: movie.title,
            year: movie.year,
            runtime: movie.runtime,
            genres: movie.genres,
            version: 1,
        };
        self.movies.insert(id, stored.clone());
        Ok(stored)
    }

    async fn movie_by_id(&self, id: MovieId) -> Result<Option<Movie>, StoreError> {
        Ok(self.movies.get(&id).map(|m| m.clone()))
    }

    async fn list_movies(&self, filter: &MovieFilter) -> Result<(Vec<Movie>, PageMetadata), StoreError> {
        let title = filter.title.to_lowercase();
        let mut matched: Vec<Movie> = self
            .movies
            .iter()
            .filter(|m| title.is_empty() || m.title.to_lowercase().contains(&title))
            .filter(|m| filter.genres.iter().all(|g| m.genres.contains(g)))
            .map(|m| m.clone())
            .collect();

        matched.sort_by(|a, b| {
            let primary = match filter.sort_column() {
                "title" => a.title.cmp(&b.title),
                "year" => a.year.cmp(&b.year),
                "runtime" => a.runtime.cmp(&b.runtime),
                _ => CmpOrdering::Equal,
            };
            let primary = if filter.descending() { primary.reverse() } else { primary };
            // id is the tiebreaker so paging is stable
            primary.then_with(|| {
                if filter.sort_column() == "id" && filter.descending() {
                    b.id.cmp(&a.id)
                } else {
                    a.id.cmp(&b.id)
                }
            })
        });

        let total = matched.len() as u32;
        let page = matched
            .into_iter()
            .skip(filter.offset())
            .take(filter.page_size as usize)
            .collect();
        Ok((page, PageMetadata::new(total, filter.page, filter.page_size)))
    }

    async fn update_movie(&self, mut movie: Movie) -> Result<Movie, StoreError> {
        let mut current = self.movies.get_mut(&movie.id).ok_or(StoreError::EditConflict)?;
        if current.version != movie.version {
            return Err(StoreError::EditConflict);
        }
        movie.version += 1;
        *current = movie.clone();
        Ok(movie)
    }

    async fn delete_movie(&self, id: MovieId) -> Result<(), StoreError> {
        self.movies.remove(&id).map(|_| ()).ok_or(StoreError::NotFound)
    }
}
