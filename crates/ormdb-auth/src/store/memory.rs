//! In-memory credential store.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::{Credential, CredentialStore};
use crate::error::{StoreError, StoreResult};
use crate::identity::Identity;

#[derive(Default)]
struct State {
    credentials: HashMap<Identity, Credential>,
    founder: Option<Identity>,
    provider: Option<String>,
}

/// Credential store held entirely in memory.
///
/// Suitable for tests and for in-memory databases; one write lock covers
/// every mutation, so `seed_founder` is trivially atomic.
#[derive(Default)]
pub struct MemoryCredentialStore {
    state: RwLock<State>,
}

impl MemoryCredentialStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn lookup(&self, user: &Identity) -> StoreResult<Option<Credential>> {
        Ok(self.state.read().credentials.get(user).cloned())
    }

    fn insert(&self, credential: Credential) -> StoreResult<()> {
        let mut state = self.state.write();
        if state.credentials.contains_key(&credential.username) {
            return Err(StoreError::Duplicate(credential.username.to_string()));
        }
        state.credentials.insert(credential.username.clone(), credential);
        Ok(())
    }

    fn update(&self, credential: Credential) -> StoreResult<()> {
        let mut state = self.state.write();
        match state.credentials.get_mut(&credential.username) {
            Some(existing) => {
                *existing = credential;
                Ok(())
            }
            None => Err(StoreError::NotFound(credential.username.to_string())),
        }
    }

    fn drop_user(&self, user: &Identity) -> StoreResult<()> {
        let mut state = self.state.write();
        if state.founder.as_ref() == Some(user) {
            return Err(StoreError::FounderUndroppable(user.to_string()));
        }
        state
            .credentials
            .remove(user)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(user.to_string()))
    }

    fn founder(&self) -> StoreResult<Option<Identity>> {
        Ok(self.state.read().founder.clone())
    }

    fn seed_founder(&self, credential: Credential, provider: &str) -> StoreResult<()> {
        let mut state = self.state.write();
        if let Some(founder) = &state.founder {
            return Err(StoreError::FounderExists(founder.to_string()));
        }
        if state.credentials.contains_key(&credential.username) {
            return Err(StoreError::Duplicate(credential.username.to_string()));
        }
        state.founder = Some(credential.username.clone());
        state.provider = Some(provider.to_string());
        state.credentials.insert(credential.username.clone(), credential);
        Ok(())
    }

    fn stored_provider(&self) -> StoreResult<Option<String>> {
        Ok(self.state.read().provider.clone())
    }

    fn set_stored_provider(&self, provider: Option<&str>) -> StoreResult<()> {
        self.state.write().provider = provider.map(str::to_string);
        Ok(())
    }

    fn user_count(&self) -> StoreResult<usize> {
        Ok(self.state.read().credentials.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cred(name: &str) -> Credential {
        Credential::new(Identity::from_canonical(name), vec![1, 2, 3], "sha256:00:1")
    }

    #[test]
    fn test_insert_and_lookup() {
        let store = MemoryCredentialStore::new();
        store.insert(cred("ALICE")).unwrap();

        let found = store.lookup(&Identity::from_canonical("ALICE")).unwrap().unwrap();
        assert_eq!(found.password_hash, vec![1, 2, 3]);
        assert!(store.lookup(&Identity::from_canonical("BOB")).unwrap().is_none());
        assert!(matches!(store.insert(cred("ALICE")), Err(StoreError::Duplicate(_))));
    }

    #[test]
    fn test_founder_cannot_be_dropped() {
        let store = MemoryCredentialStore::new();
        store.seed_founder(cred("DBO"), "NATIVE::LOCAL").unwrap();
        store.insert(cred("ALICE")).unwrap();

        assert!(matches!(
            store.drop_user(&Identity::from_canonical("DBO")),
            Err(StoreError::FounderUndroppable(_))
        ));
        store.drop_user(&Identity::from_canonical("ALICE")).unwrap();
        assert_eq!(store.user_count().unwrap(), 1);
    }

    #[test]
    fn test_seed_founder_only_once() {
        let store = MemoryCredentialStore::new();
        store.seed_founder(cred("DBO"), "NATIVE::LOCAL").unwrap();
        assert!(matches!(
            store.seed_founder(cred("OTHER"), "NATIVE::LOCAL"),
            Err(StoreError::FounderExists(ref f)) if f == "DBO"
        ));
        assert_eq!(store.founder().unwrap(), Some(Identity::from_canonical("DBO")));
        assert_eq!(store.stored_provider().unwrap().as_deref(), Some("NATIVE::LOCAL"));
        assert!(store.lookup(&Identity::from_canonical("OTHER")).unwrap().is_none());
    }

    #[test]
    fn test_seed_founder_over_existing_user() {
        let store = MemoryCredentialStore::new();
        store.insert(cred("ALICE")).unwrap();
        assert!(matches!(
            store.seed_founder(cred("ALICE"), "NATIVE::LOCAL"),
            Err(StoreError::Duplicate(_))
        ));
        assert!(store.founder().unwrap().is_none());
        assert!(store.stored_provider().unwrap().is_none());
    }

    #[test]
    fn test_update_requires_existing_user() {
        let store = MemoryCredentialStore::new();
        assert!(matches!(store.update(cred("ALICE")), Err(StoreError::NotFound(_))));
        store.insert(cred("ALICE")).unwrap();

        let mut replacement = cred("ALICE");
        replacement.password_hash = vec![7];
        store.update(replacement).unwrap();
        let found = store.lookup(&Identity::from_canonical("ALICE")).unwrap().unwrap();
        assert_eq!(found.password_hash, vec![7]);
    }
}
