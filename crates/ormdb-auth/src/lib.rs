//! ORMDB native authentication.
//!
//! Decides where authentication authority lives for a connection (this
//! database, a designated credentials database, or a one-time bootstrap of
//! a new credentials database) and verifies the credential accordingly.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use ormdb_auth::{AuthConfig, Deployment, MemoryCredentialStore, NativeAuthService};
//!
//! let deployment = Deployment::new();
//! let config = AuthConfig::new("credDB")
//!     .with_provider("NATIVE:credDB")
//!     .creating(true);
//! let service = NativeAuthService::boot(
//!     &config,
//!     Arc::new(MemoryCredentialStore::new()),
//!     deployment.opener(),
//! )?;
//! deployment.register(Arc::new(service));
//!
//! // The first connection to a new credentials database seeds its owner.
//! deployment.connect("credDB", "dbo", "secret").await?;
//! ```

pub mod bootstrap;
pub mod config;
pub mod delegate;
pub mod deployment;
pub mod error;
pub mod hasher;
pub mod identity;
pub mod provider;
pub mod resolver;
pub mod service;
pub mod store;
pub mod verifier;

pub use bootstrap::{BootstrapCoordinator, BootstrapOutcome};
pub use config::AuthConfig;
pub use delegate::{Connection, ConnectionOpener, OpenError, RemoteDelegate};
pub use deployment::{Deployment, EmbeddedConnection};
pub use error::{AdminError, AuthDecision, AuthError, AuthResult, ConfigError, StoreError, StoreResult};
pub use hasher::{HashAlgorithm, HashingScheme, NativeHasher, PasswordHasher};
pub use identity::{normalize_user, DefaultCanonicalizer, Identity, ServiceNameCanonicalizer};
pub use provider::{AuthMode, ProviderSpec};
pub use resolver::{AuthorityResolver, RoutingDecision};
pub use service::NativeAuthService;
pub use store::{Credential, CredentialStore, MemoryCredentialStore, SledCredentialStore};
pub use verifier::LocalVerifier;
