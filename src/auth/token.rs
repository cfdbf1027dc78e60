//! Bearer credential generation, hashing and verification.
//!
//! A credential is `secret_bytes` of OS randomness encoded as unpadded
//! URL-safe base64. Only the SHA-256 digest of that text is persisted; the
//! plaintext goes back to the caller once and is never stored or logged.
//!
//! Verification hashes the presented text and asks the store for an
//! unexpired credential with that digest and scope. Unknown, expired and
//! wrong-scope credentials all come back as [`CredentialError::NotFound`].
//! The digest comparison itself happens inside the store lookup; it does not
//! need to be constant-time because a digest prefix reveals nothing about
//! the preimage.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::store::{with_deadline, CredentialStore, StoreError, UserId};

/// Lower bound on raw secret length.
pub const MIN_SECRET_BYTES: usize = 16;

/// SHA-256 digest of a plaintext credential.
pub type TokenHash = [u8; 32];

/// What a credential may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Activation,
    Authentication,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Activation => "activation",
            Scope::Authentication => "authentication",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The persisted half of a credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub hash: TokenHash,
    pub user_id: UserId,
    pub expiry: DateTime<Utc>,
    pub scope: Scope,
}

/// A freshly issued credential. Serialises as `{"token", "expiry"}`.
#[derive(Clone, Serialize)]
pub struct Credential {
    #[serde(rename = "token")]
    pub plaintext: String,
    #[serde(skip)]
    pub hash: TokenHash,
    #[serde(skip)]
    pub user_id: UserId,
    pub expiry: DateTime<Utc>,
    #[serde(skip)]
    pub scope: Scope,
}

impl Credential {
    pub fn record(&self) -> CredentialRecord {
        CredentialRecord {
            hash: self.hash,
            user_id: self.user_id,
            expiry: self.expiry,
            scope: self.scope,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("plaintext", &"<redacted>")
            .field("user_id", &self.user_id)
            .field("expiry", &self.expiry)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Credential engine failures.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Presented text is not a well-formed credential.
    #[error("malformed credential")]
    Malformed,
    /// No valid credential matches (unknown, expired or other scope).
    #[error("credential not found")]
    NotFound,
    #[error("failed to gather randomness: {0}")]
    Entropy(#[from] rand::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Length of the encoded plaintext for `secret_bytes` of randomness.
pub fn encoded_len(secret_bytes: usize) -> usize {
    (secret_bytes * 4).div_ceil(3)
}

/// SHA-256 of the plaintext text.
pub fn hash_plaintext(plaintext: &str) -> TokenHash {
    Sha256::digest(plaintext.as_bytes()).into()
}

/// Build a credential without persisting it.
pub fn generate(
    user_id: UserId,
    ttl: Duration,
    scope: Scope,
    secret_bytes: usize,
) -> Result<Credential, CredentialError> {
    let mut secret = vec![0u8; secret_bytes.max(MIN_SECRET_BYTES)];
    OsRng.try_fill_bytes(&mut secret)?;

    let plaintext = URL_SAFE_NO_PAD.encode(&secret);
    let hash = hash_plaintext(&plaintext);
    let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);

    Ok(Credential {
        plaintext,
        hash,
        user_id,
        expiry: Utc::now().checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        scope,
    })
}

/// Reject text that cannot possibly be a credential before any lookup.
pub fn check_plaintext(plaintext: &str, expected_len: usize) -> Result<(), CredentialError> {
    let well_formed = !plaintext.is_empty()
        && plaintext.len() == expected_len
        && plaintext
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if well_formed {
        Ok(())
    } else {
        Err(CredentialError::Malformed)
    }
}

/// Issues, verifies and revokes credentials against a [`CredentialStore`].
#[derive(Clone)]
pub struct CredentialEngine {
    store: Arc<dyn CredentialStore>,
    secret_bytes: usize,
    deadline: Duration,
}

impl CredentialEngine {
    pub fn new(store: Arc<dyn CredentialStore>, secret_bytes: usize, deadline: Duration) -> Self {
        Self {
            store,
            secret_bytes: secret_bytes.max(MIN_SECRET_BYTES),
            deadline,
        }
    }

    /// Expected plaintext length for credentials issued by this engine.
    pub fn plaintext_len(&self) -> usize {
        encoded_len(self.secret_bytes)
    }

    /// Generate and persist a credential for `user_id`.
    ///
    /// Inserts are not retried: a timed-out insert may still have landed.
    pub async fn issue(
        &self,
        user_id: UserId,
        ttl: Duration,
        scope: Scope,
    ) -> Result<Credential, CredentialError> {
        let credential = generate(user_id, ttl, scope, self.secret_bytes)?;
        with_deadline(self.deadline, self.store.insert_credential(credential.record())).await?;
        tracing::debug!(user_id, scope = %scope, expiry = %credential.expiry, "Credential issued");
        Ok(credential)
    }

    /// Resolve `plaintext` to its owning principal.
    pub async fn verify(&self, scope: Scope, plaintext: &str) -> Result<UserId, CredentialError> {
        check_plaintext(plaintext, self.plaintext_len())?;
        let hash = hash_plaintext(plaintext);

        let found = match self.lookup(&hash, scope).await {
            Err(e) if e.is_transient() => {
                tracing::warn!(scope = %scope, error = %e, "Credential lookup failed, retrying once");
                self.lookup(&hash, scope).await?
            }
            other => other?,
        };

        found.ok_or(CredentialError::NotFound)
    }

    async fn lookup(&self, hash: &TokenHash, scope: Scope) -> Result<Option<UserId>, StoreError> {
        with_deadline(self.deadline, self.store.lookup_principal(hash, scope, Utc::now())).await
    }

    /// Delete every `scope` credential owned by `user_id`.
    pub async fn revoke_all(&self, scope: Scope, user_id: UserId) -> Result<u64, CredentialError> {
        let removed =
            with_deadline(self.deadline, self.store.delete_credentials(scope, user_id)).await?;
        tracing::debug!(user_id, scope = %scope, removed, "Credentials revoked");
        Ok(removed)
    }
}
