//! Credential storage.
//!
//! The authentication core only consumes this contract: it never writes
//! credentials itself except through [`CredentialStore::seed_founder`]
//! during bootstrap.

mod memory;
mod sled_store;

pub use memory::MemoryCredentialStore;
pub use sled_store::SledCredentialStore;

use std::fmt;

use zeroize::{Zeroize, Zeroizing};

use crate::error::StoreResult;
use crate::identity::Identity;

/// A stored user credential.
///
/// The hash bytes are zeroed when the credential is dropped.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: Identity,
    pub password_hash: Vec<u8>,
    pub hashing_scheme: String,
}

impl Credential {
    /// Create a credential.
    pub fn new(username: Identity, password_hash: Vec<u8>, hashing_scheme: impl Into<String>) -> Self {
        Self {
            username,
            password_hash,
            hashing_scheme: hashing_scheme.into(),
        }
    }

    /// Move the hash out, leaving an empty buffer behind.
    pub fn take_hash(&mut self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(std::mem::take(&mut self.password_hash))
    }
}

impl Drop for Credential {
    fn drop(&mut self) {
        self.password_hash.zeroize();
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password_hash", &"<redacted>")
            .field("hashing_scheme", &self.hashing_scheme)
            .finish()
    }
}

/// Transactional credential storage for one database.
pub trait CredentialStore: Send + Sync {
    /// Look up a user's credential.
    fn lookup(&self, user: &Identity) -> StoreResult<Option<Credential>>;

    /// Add a credential. Fails with `Duplicate` if the user exists.
    fn insert(&self, credential: Credential) -> StoreResult<()>;

    /// Replace the hash of an existing credential.
    fn update(&self, credential: Credential) -> StoreResult<()>;

    /// Remove a user. The founding administrator can never be dropped.
    fn drop_user(&self, user: &Identity) -> StoreResult<()>;

    /// The founding administrator, once bootstrap has committed.
    fn founder(&self) -> StoreResult<Option<Identity>>;

    /// Atomically store the founding credential, record it as founder and
    /// persist the provider property.
    ///
    /// Fails with `FounderExists` if a founder was already recorded, or
    /// `Duplicate` if the user already has a credential. Nothing is written
    /// in either case.
    fn seed_founder(&self, credential: Credential, provider: &str) -> StoreResult<()>;

    /// The provider property persisted in this database.
    fn stored_provider(&self) -> StoreResult<Option<String>>;

    /// Persist (or clear) the provider property.
    fn set_stored_provider(&self, provider: Option<&str>) -> StoreResult<()>;

    /// Number of stored credentials.
    fn user_count(&self) -> StoreResult<usize>;
}
