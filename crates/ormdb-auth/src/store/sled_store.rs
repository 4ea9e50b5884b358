//! Credential storage persisted with sled.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;
use zeroize::Zeroize;

use super::{Credential, CredentialStore};
use crate::error::{StoreError, StoreResult};
use crate::identity::Identity;

const CREDENTIALS_TREE_NAME: &[u8] = b"auth:credentials";
const PROPERTIES_TREE_NAME: &[u8] = b"auth:properties";

const FOUNDER_KEY: &[u8] = b"founder";
const PROVIDER_KEY: &[u8] = b"provider";

#[derive(Serialize, Deserialize)]
struct StoredCredential {
    hash: String,
    scheme: String,
}

impl Drop for StoredCredential {
    fn drop(&mut self) {
        self.hash.zeroize();
    }
}

/// Credential store backed by two sled trees: one for credentials keyed by
/// canonical user name, one for database properties (founder, provider).
pub struct SledCredentialStore {
    db: sled::Db,
    credentials: sled::Tree,
    properties: sled::Tree,
}

impl SledCredentialStore {
    /// Open the store inside an existing sled database.
    pub fn open(db: &sled::Db) -> StoreResult<Self> {
        let credentials = db.open_tree(CREDENTIALS_TREE_NAME)?;
        let properties = db.open_tree(PROPERTIES_TREE_NAME)?;
        Ok(Self {
            db: db.clone(),
            credentials,
            properties,
        })
    }

    /// Open (or create) a store at the given path.
    pub fn open_path(path: &Path) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::open(&db)
    }

    /// Open a temporary store that is removed on drop.
    pub fn temporary() -> StoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::open(&db)
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }

    fn serialize(credential: &Credential) -> StoreResult<Vec<u8>> {
        let stored = StoredCredential {
            hash: hex::encode(&credential.password_hash),
            scheme: credential.hashing_scheme.clone(),
        };
        serde_json::to_vec(&stored).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn deserialize(user: &Identity, bytes: &[u8]) -> StoreResult<Credential> {
        let stored: StoredCredential =
            serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let hash = hex::decode(&stored.hash)
            .map_err(|e| StoreError::Serialization(format!("bad password hash: {}", e)))?;
        Ok(Credential::new(user.clone(), hash, stored.scheme.clone()))
    }

    fn read_string(&self, key: &[u8]) -> StoreResult<Option<String>> {
        match self.properties.get(key)? {
            Some(value) => String::from_utf8(value.to_vec())
                .map(Some)
                .map_err(|e| StoreError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }
}

impl CredentialStore for SledCredentialStore {
    fn lookup(&self, user: &Identity) -> StoreResult<Option<Credential>> {
        match self.credentials.get(user.as_bytes())? {
            Some(bytes) => Self::deserialize(user, &bytes).map(Some),
            None => Ok(None),
        }
    }

    fn insert(&self, credential: Credential) -> StoreResult<()> {
        let value = Self::serialize(&credential)?;
        self.credentials
            .compare_and_swap(credential.username.as_bytes(), None as Option<&[u8]>, Some(value))?
            .map_err(|_| StoreError::Duplicate(credential.username.to_string()))?;
        self.flush()
    }

    fn update(&self, credential: Credential) -> StoreResult<()> {
        let value = Self::serialize(&credential)?;
        let key = credential.username.as_bytes();
        let Some(current) = self.credentials.get(key)? else {
            return Err(StoreError::NotFound(credential.username.to_string()));
        };
        self.credentials
            .compare_and_swap(key, Some(current), Some(value))?
            .map_err(|_| StoreError::Unavailable(format!("concurrent update of {}", credential.username)))?;
        self.flush()
    }

    fn drop_user(&self, user: &Identity) -> StoreResult<()> {
        if self.founder()?.as_ref() == Some(user) {
            return Err(StoreError::FounderUndroppable(user.to_string()));
        }
        match self.credentials.remove(user.as_bytes())? {
            Some(_) => self.flush(),
            None => Err(StoreError::NotFound(user.to_string())),
        }
    }

    fn founder(&self) -> StoreResult<Option<Identity>> {
        Ok(self.read_string(FOUNDER_KEY)?.map(Identity::from_canonical))
    }

    fn seed_founder(&self, credential: Credential, provider: &str) -> StoreResult<()> {
        let value = Self::serialize(&credential)?;
        let key = credential.username.as_bytes();

        let result: Result<(), TransactionError<StoreError>> = (&self.credentials, &self.properties)
            .transaction(|(creds_tx, props_tx)| {
                if let Some(founder) = props_tx.get(FOUNDER_KEY)? {
                    return Err(ConflictableTransactionError::Abort(StoreError::FounderExists(
                        String::from_utf8_lossy(&founder).into_owned(),
                    )));
                }
                if creds_tx.get(key)?.is_some() {
                    return Err(ConflictableTransactionError::Abort(StoreError::Duplicate(
                        credential.username.to_string(),
                    )));
                }
                creds_tx.insert(key, value.as_slice())?;
                props_tx.insert(FOUNDER_KEY, key)?;
                props_tx.insert(PROVIDER_KEY, provider.as_bytes())?;
                Ok(())
            });

        match result {
            Ok(()) => {
                self.flush()?;
                Ok(())
            }
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(StoreError::Storage(e)),
        }
    }

    fn stored_provider(&self) -> StoreResult<Option<String>> {
        self.read_string(PROVIDER_KEY)
    }

    fn set_stored_provider(&self, provider: Option<&str>) -> StoreResult<()> {
        match provider {
            Some(value) => {
                self.properties.insert(PROVIDER_KEY, value.as_bytes())?;
            }
            None => {
                self.properties.remove(PROVIDER_KEY)?;
            }
        }
        self.flush()
    }

    fn user_count(&self) -> StoreResult<usize> {
        Ok(self.credentials.len())
    }
}
