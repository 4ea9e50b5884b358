//! Authentication service configuration.

use std::time::Duration;

use crate::delegate::DEFAULT_DELEGATE_TIMEOUT;
use crate::error::ConfigError;
use crate::hasher::{HashAlgorithm, NativeHasher, DEFAULT_ITERATIONS};
use crate::provider::ProviderSpec;

/// Environment variable holding the provider property.
pub const PROVIDER_ENV: &str = "ORMDB_AUTH_PROVIDER";

/// Environment variable holding the delegation timeout in seconds.
pub const TIMEOUT_ENV: &str = "ORMDB_AUTH_TIMEOUT_SECS";

/// Environment variable selecting the hashing algorithm.
pub const HASHER_ENV: &str = "ORMDB_AUTH_HASHER";

/// Environment variable holding the hashing round count.
pub const ITERATIONS_ENV: &str = "ORMDB_AUTH_HASH_ITERATIONS";

/// Configuration for one database's authentication service.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Provider property, e.g. `NATIVE:credDB:LOCAL`. `None` disables
    /// native authentication unless the database persisted one.
    pub provider: Option<String>,

    /// User-visible name of the database this service runs in.
    pub database: String,

    /// Whether the database is being created by this boot.
    pub create: bool,

    /// Bound on a delegated connection attempt.
    pub delegate_timeout: Duration,

    /// Algorithm for newly stored credentials.
    pub hash_algorithm: HashAlgorithm,

    /// Hashing rounds for newly stored credentials.
    pub hash_iterations: u32,
}

impl AuthConfig {
    /// Create a configuration for the named database.
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            provider: None,
            database: database.into(),
            create: false,
            delegate_timeout: DEFAULT_DELEGATE_TIMEOUT,
            hash_algorithm: HashAlgorithm::Sha256,
            hash_iterations: DEFAULT_ITERATIONS,
        }
    }

    /// Set the provider property.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Mark the database as being created.
    pub fn creating(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    /// Set the delegation timeout.
    pub fn with_delegate_timeout(mut self, timeout: Duration) -> Self {
        self.delegate_timeout = timeout;
        self
    }

    /// Set the hashing algorithm and round count.
    pub fn with_hasher(mut self, algorithm: HashAlgorithm, iterations: u32) -> Self {
        self.hash_algorithm = algorithm;
        self.hash_iterations = iterations.max(1);
        self
    }

    /// Load settings for the named database from `ORMDB_AUTH_*` variables.
    pub fn from_env(database: impl Into<String>) -> Result<Self, ConfigError> {
        Self::from_lookup(database, |key| std::env::var(key).ok())
    }

    fn from_lookup(
        database: impl Into<String>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::new(database);
        config.provider = lookup(PROVIDER_ENV).filter(|p| !p.trim().is_empty());

        if let Some(secs) = lookup(TIMEOUT_ENV) {
            let secs: u64 = secs
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("{} must be a number of seconds", TIMEOUT_ENV)))?;
            config.delegate_timeout = Duration::from_secs(secs);
        }

        if let Some(name) = lookup(HASHER_ENV) {
            config.hash_algorithm = name
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("unknown {} value {}", HASHER_ENV, name)))?;
        }

        if let Some(rounds) = lookup(ITERATIONS_ENV) {
            config.hash_iterations = rounds
                .trim()
                .parse::<u32>()
                .map_err(|_| ConfigError::Invalid(format!("{} must be a positive integer", ITERATIONS_ENV)))?
                .max(1);
        }

        Ok(config)
    }

    /// Parse the configured provider property.
    pub fn provider_spec(&self) -> Result<ProviderSpec, ConfigError> {
        ProviderSpec::from_property(self.provider.as_deref())
    }

    /// Hasher for newly stored credentials.
    pub fn hasher(&self) -> NativeHasher {
        NativeHasher::new(self.hash_algorithm, self.hash_iterations)
    }
}
