//! Verification against the local credential store.

use std::sync::Arc;

use subtle::ConstantTimeEq;
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::{AuthError, AuthResult};
use crate::hasher::{HashingScheme, PasswordHasher};
use crate::identity::{normalize_user, Identity};
use crate::store::CredentialStore;

/// Verifies passwords against the credentials stored in this database.
pub struct LocalVerifier {
    store: Arc<dyn CredentialStore>,
    hasher: Arc<dyn PasswordHasher>,
    /// Scheme hashed against when the user is unknown, so that path costs
    /// the same as a wrong password.
    decoy_scheme: HashingScheme,
}

impl LocalVerifier {
    /// Create a verifier over a store.
    pub fn new(store: Arc<dyn CredentialStore>, hasher: Arc<dyn PasswordHasher>) -> Self {
        let decoy_scheme = hasher.new_scheme();
        Self {
            store,
            hasher,
            decoy_scheme,
        }
    }

    /// The hasher used for new credentials.
    pub fn hasher(&self) -> &Arc<dyn PasswordHasher> {
        &self.hasher
    }

    /// Verify a raw user name and password.
    ///
    /// Unknown users and malformed names are an ordinary `false`.
    pub fn verify(&self, username: &str, password: &str) -> AuthResult<bool> {
        match normalize_user(username) {
            Ok(user) => self.verify_identity(&user, password),
            Err(_) => {
                debug!("rejecting malformed user name");
                Ok(false)
            }
        }
    }

    /// Verify an already-normalised user.
    pub fn verify_identity(&self, user: &Identity, password: &str) -> AuthResult<bool> {
        let Some(mut credential) = self.store.lookup(user)? else {
            let _ = self.hasher.hash(&self.decoy_scheme, user, password);
            debug!(user = %user, "no stored credential");
            return Ok(false);
        };

        let scheme: HashingScheme = credential
            .hashing_scheme
            .parse()
            .map_err(AuthError::StoreUnavailable)?;
        let candidate = self.hasher.hash(&scheme, user, password);
        let stored = credential.take_hash();

        Ok(hashes_match(&candidate, &stored))
    }
}

/// Constant-time equality of both length and content. Both buffers are
/// zeroed when the caller's `Zeroizing` wrappers drop.
fn hashes_match(candidate: &Zeroizing<Vec<u8>>, stored: &Zeroizing<Vec<u8>>) -> bool {
    if candidate.is_empty() || stored.is_empty() {
        return false;
    }
    bool::from(candidate.as_slice().ct_eq(stored.as_slice()))
}
