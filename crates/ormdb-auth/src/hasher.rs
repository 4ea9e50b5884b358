//! Password hashing schemes.
//!
//! Every stored credential carries the scheme it was hashed with, encoded
//! as `<algorithm>:<salt-hex>:<iterations>`. Verification always recomputes
//! with the stored scheme, so changing the default algorithm never
//! invalidates existing credentials.

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::StoreError;
use crate::identity::Identity;
use crate::store::Credential;

/// Default number of hashing rounds.
pub const DEFAULT_ITERATIONS: u32 = 1000;

/// Salt length in bytes.
pub const SALT_LEN: usize = 16;

/// Supported digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Sha256,
    Blake3,
}

impl HashAlgorithm {
    /// Token used in encoded schemes.
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Blake3 => "blake3",
        }
    }

    fn round(&self, prev: &[u8], salt: &[u8], user: &[u8], password: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha256 => {
                let mut h = Sha256::new();
                h.update(prev);
                h.update(salt);
                h.update(user);
                h.update(password);
                h.finalize().to_vec()
            }
            HashAlgorithm::Blake3 => {
                let mut h = blake3::Hasher::new();
                h.update(prev);
                h.update(salt);
                h.update(user);
                h.update(password);
                h.finalize().as_bytes().to_vec()
            }
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" => Ok(HashAlgorithm::Sha256),
            "blake3" => Ok(HashAlgorithm::Blake3),
            other => Err(StoreError::Serialization(format!(
                "unknown hashing algorithm {}",
                other
            ))),
        }
    }
}

/// Parameters a credential was hashed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashingScheme {
    pub algorithm: HashAlgorithm,
    pub salt: Vec<u8>,
    pub iterations: u32,
}

impl HashingScheme {
    /// Fresh scheme with a random salt.
    pub fn generate(algorithm: HashAlgorithm, iterations: u32) -> Self {
        let mut salt = vec![0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        Self {
            algorithm,
            salt,
            iterations: iterations.max(1),
        }
    }

    /// Encode as a stored token.
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for HashingScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.algorithm.as_str(),
            hex::encode(&self.salt),
            self.iterations
        )
    }
}

impl FromStr for HashingScheme {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let (Some(algorithm), Some(salt), Some(iterations), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(StoreError::Serialization(format!("malformed hashing scheme {}", s)));
        };

        let salt = hex::decode(salt)
            .map_err(|e| StoreError::Serialization(format!("bad salt: {}", e)))?;
        let iterations: u32 = iterations
            .parse()
            .map_err(|e| StoreError::Serialization(format!("bad iteration count: {}", e)))?;
        if iterations == 0 {
            return Err(StoreError::Serialization("zero iteration count".into()));
        }

        Ok(Self {
            algorithm: algorithm.parse()?,
            salt,
            iterations,
        })
    }
}

/// Pluggable password hasher.
pub trait PasswordHasher: Send + Sync {
    /// Scheme used for newly stored credentials.
    fn new_scheme(&self) -> HashingScheme;

    /// Hash a password for a user under the given scheme.
    fn hash(&self, scheme: &HashingScheme, user: &Identity, password: &str) -> Zeroizing<Vec<u8>>;
}

/// Iterated, salted digest over the user name and password.
#[derive(Debug, Clone, Copy)]
pub struct NativeHasher {
    algorithm: HashAlgorithm,
    iterations: u32,
}

impl NativeHasher {
    /// Create a hasher for new credentials.
    pub fn new(algorithm: HashAlgorithm, iterations: u32) -> Self {
        Self {
            algorithm,
            iterations: iterations.max(1),
        }
    }

    /// The algorithm used for new credentials.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }
}

impl Default for NativeHasher {
    fn default() -> Self {
        Self::new(HashAlgorithm::Sha256, DEFAULT_ITERATIONS)
    }
}

impl PasswordHasher for NativeHasher {
    fn new_scheme(&self) -> HashingScheme {
        HashingScheme::generate(self.algorithm, self.iterations)
    }

    fn hash(&self, scheme: &HashingScheme, user: &Identity, password: &str) -> Zeroizing<Vec<u8>> {
        let mut digest = Zeroizing::new(Vec::new());
        for _ in 0..scheme.iterations {
            let next = scheme
                .algorithm
                .round(&digest, &scheme.salt, user.as_bytes(), password.as_bytes());
            // Assigning drops (and zeroes) the previous round.
            digest = Zeroizing::new(next);
        }
        digest
    }
}

/// Hash a password under a fresh scheme and package it as a credential.
pub fn hash_credential(hasher: &dyn PasswordHasher, user: Identity, password: &str) -> Credential {
    let scheme = hasher.new_scheme();
    let mut hash = hasher.hash(&scheme, &user, password);
    Credential::new(user, std::mem::take(&mut *hash), scheme.encode())
}
