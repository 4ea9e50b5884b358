//! First-connection bootstrap of a credentials database.
//!
//! When a database that authenticates its own connections is created, the
//! first principal to connect becomes its founding administrator. The
//! founding credential and the `NATIVE::LOCAL` provider are committed in a
//! single transaction, so the database stays self-authoritative forever.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{AuthResult, StoreError};
use crate::hasher::{hash_credential, PasswordHasher};
use crate::identity::normalize_user;
use crate::provider::LOCAL_ONLY_PROVIDER;
use crate::store::CredentialStore;

/// Result of a bootstrap attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// This call seeded the founding credential.
    Seeded,
    /// A founder already existed; nothing was written.
    AlreadyBootstrapped,
}

/// Seeds the founding administrator of a database.
pub struct BootstrapCoordinator {
    store: Arc<dyn CredentialStore>,
    hasher: Arc<dyn PasswordHasher>,
    gate: Mutex<()>,
}

impl BootstrapCoordinator {
    /// Create a coordinator over a store.
    pub fn new(store: Arc<dyn CredentialStore>, hasher: Arc<dyn PasswordHasher>) -> Self {
        Self {
            store,
            hasher,
            gate: Mutex::new(()),
        }
    }

    /// Store the founding credential and fix the provider to `NATIVE::LOCAL`.
    ///
    /// Performs no retry. On failure nothing has been committed and a later
    /// call may try again. A user that already holds a credential without
    /// being the founder is a `Duplicate` fault, never a completed bootstrap.
    pub fn bootstrap(&self, username: &str, password: &str) -> AuthResult<BootstrapOutcome> {
        let user = normalize_user(username)?;
        let _gate = self.gate.lock();

        if self.store.founder()?.is_some() {
            debug!(user = %user, "database already bootstrapped");
            return Ok(BootstrapOutcome::AlreadyBootstrapped);
        }

        let credential = hash_credential(self.hasher.as_ref(), user.clone(), password);
        match self.store.seed_founder(credential, LOCAL_ONLY_PROVIDER) {
            Ok(()) => {
                info!(user = %user, "seeded founding credential");
                Ok(BootstrapOutcome::Seeded)
            }
            Err(StoreError::FounderExists(founder)) => {
                debug!(user = %user, founder = %founder, "lost bootstrap race");
                Ok(BootstrapOutcome::AlreadyBootstrapped)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthError;
    use crate::hasher::{HashAlgorithm, NativeHasher};
    use crate::identity::Identity;
    use crate::store::{MemoryCredentialStore, SledCredentialStore};
    use crate::verifier::LocalVerifier;

    fn hasher() -> Arc<dyn PasswordHasher> {
        Arc::new(NativeHasher::new(HashAlgorithm::Sha256, 10))
    }

    #[test]
    fn test_bootstrap_seeds_founder_and_provider() {
        let store = Arc::new(MemoryCredentialStore::new());
        let coordinator = BootstrapCoordinator::new(store.clone(), hasher());

        assert!(store.founder().unwrap().is_none());
        assert_eq!(coordinator.bootstrap("dbo", "pw").unwrap(), BootstrapOutcome::Seeded);

        assert_eq!(store.founder().unwrap(), Some(Identity::from_canonical("DBO")));
        assert_eq!(store.stored_provider().unwrap().as_deref(), Some(LOCAL_ONLY_PROVIDER));

        let verifier = LocalVerifier::new(store, hasher());
        assert!(verifier.verify("dbo", "pw").unwrap());
    }

    #[test]
    fn test_second_bootstrap_is_noop() {
        let store = Arc::new(MemoryCredentialStore::new());
        let coordinator = BootstrapCoordinator::new(store.clone(), hasher());

        coordinator.bootstrap("dbo", "pw").unwrap();
        assert_eq!(
            coordinator.bootstrap("mallory", "pw").unwrap(),
            BootstrapOutcome::AlreadyBootstrapped
        );
        assert_eq!(store.user_count().unwrap(), 1);
    }

    #[test]
    fn test_invalid_user_name_fails() {
        let store = Arc::new(MemoryCredentialStore::new());
        let coordinator = BootstrapCoordinator::new(store.clone(), hasher());
        assert!(coordinator.bootstrap("", "pw").is_err());
        assert!(store.founder().unwrap().is_none());
    }

    #[test]
    fn test_existing_user_is_not_a_founder() {
        let store = Arc::new(MemoryCredentialStore::new());
        store
            .insert(hash_credential(hasher().as_ref(), Identity::from_canonical("ALICE"), "pw"))
            .unwrap();
        let coordinator = BootstrapCoordinator::new(store.clone(), hasher());

        let err = coordinator.bootstrap("alice", "pw").unwrap_err();
        assert!(matches!(err, AuthError::StoreUnavailable(StoreError::Duplicate(_))));
        assert!(store.founder().unwrap().is_none());
        assert!(store.stored_provider().unwrap().is_none());
    }

    #[test]
    fn test_concurrent_bootstraps_commit_one_founder() {
        let store: Arc<dyn CredentialStore> = Arc::new(SledCredentialStore::temporary().unwrap());
        // Separate coordinators share only the store, like separate requests
        // racing through separate service instances.
        let coordinators: Vec<_> = (0..8)
            .map(|_| BootstrapCoordinator::new(store.clone(), hasher()))
            .collect();

        let outcomes: Vec<BootstrapOutcome> = std::thread::scope(|s| {
            let handles: Vec<_> = coordinators
                .iter()
                .enumerate()
                .map(|(i, c)| s.spawn(move || c.bootstrap(&format!("user{}", i), "pw").unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let seeded = outcomes.iter().filter(|o| **o == BootstrapOutcome::Seeded).count();
        assert_eq!(seeded, 1);
        assert_eq!(outcomes.len() - seeded, 7);
        assert_eq!(store.user_count().unwrap(), 1);
        assert!(store.founder().unwrap().is_some());
    }
}
