//! NATIVE authentication service for one database.
//!
//! The service is booted once per database with its provider property and
//! is immutable afterwards, apart from the one-shot bootstrap. Changing the
//! provider requires a restart.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::bootstrap::{BootstrapCoordinator, BootstrapOutcome};
use crate::config::AuthConfig;
use crate::delegate::{ConnectionOpener, RemoteDelegate};
use crate::error::{AdminError, AuthDecision, AuthError, AuthResult, ConfigError};
use crate::hasher::{hash_credential, PasswordHasher};
use crate::identity::{normalize_user, DefaultCanonicalizer, Identity, ServiceNameCanonicalizer};
use crate::provider::{is_native, validate_stored_provider, ProviderSpec, LOCAL_ONLY_PROVIDER};
use crate::resolver::{AuthorityResolver, BootstrapClaim, Routed};
use crate::store::CredentialStore;
use crate::verifier::LocalVerifier;

/// Authentication entry point consumed by the connection layer.
pub struct NativeAuthService {
    resolver: AuthorityResolver,
    verifier: LocalVerifier,
    delegate: RemoteDelegate,
    bootstrap: BootstrapCoordinator,
    store: Arc<dyn CredentialStore>,
    hasher: Arc<dyn PasswordHasher>,
}

impl NativeAuthService {
    /// Boot the service with the default database name canonicalization.
    pub fn boot(
        config: &AuthConfig,
        store: Arc<dyn CredentialStore>,
        opener: Arc<dyn ConnectionOpener>,
    ) -> AuthResult<Self> {
        Self::boot_with_canonicalizer(config, store, opener, Arc::new(DefaultCanonicalizer))
    }

    /// Boot the service.
    ///
    /// A NATIVE provider persisted in the database takes precedence over the
    /// configured one: a database that fixed itself as self-authoritative
    /// stays that way. A malformed provider fails the boot.
    pub fn boot_with_canonicalizer(
        config: &AuthConfig,
        store: Arc<dyn CredentialStore>,
        opener: Arc<dyn ConnectionOpener>,
        canonicalizer: Arc<dyn ServiceNameCanonicalizer>,
    ) -> AuthResult<Self> {
        let stored = store.stored_provider()?.filter(|p| is_native(p));
        let spec = match stored.as_deref() {
            Some(persisted) => ProviderSpec::parse(persisted)?,
            None => config.provider_spec()?,
        };

        let resolver = AuthorityResolver::new(spec, &config.database, canonicalizer);
        let armed = config.create
            && resolver.spec().is_enabled()
            && resolver.authenticates_locally(resolver.service())
            && store.founder()?.is_none()
            && store.user_count()? == 0;
        let resolver = resolver.with_bootstrap(armed);

        let hasher: Arc<dyn PasswordHasher> = Arc::new(config.hasher());
        let service = Self {
            verifier: LocalVerifier::new(store.clone(), hasher.clone()),
            delegate: RemoteDelegate::new(opener).with_timeout(config.delegate_timeout),
            bootstrap: BootstrapCoordinator::new(store.clone(), hasher.clone()),
            resolver,
            store,
            hasher,
        };

        info!(
            database = %service.resolver.service(),
            provider = %service.resolver.spec(),
            bootstrap = armed,
            "authentication service booted"
        );
        Ok(service)
    }

    /// The provider specification in force.
    pub fn spec(&self) -> &ProviderSpec {
        self.resolver.spec()
    }

    /// Canonical identity of this database.
    pub fn database(&self) -> &Identity {
        self.resolver.service()
    }

    /// The request router.
    pub fn resolver(&self) -> &AuthorityResolver {
        &self.resolver
    }

    /// Check if the first-connection bootstrap is still pending.
    pub fn bootstrap_pending(&self) -> bool {
        self.resolver.bootstrap_pending()
    }

    /// Authenticate a principal for `target` (or a system-wide operation
    /// when `target` is `None`).
    ///
    /// Runs to completion once started; only delegation is bounded by a
    /// timeout.
    pub async fn authenticate(
        &self,
        username: Option<&str>,
        password: &str,
        target: Option<&str>,
    ) -> AuthDecision {
        if !self.spec().is_enabled() {
            debug!("native authentication disabled, accepting");
            return AuthDecision::Accepted;
        }

        // No guest user.
        let Some(username) = username.filter(|u| !u.trim().is_empty()) else {
            return AuthDecision::Rejected;
        };

        let routed = match self.resolver.claim_route(target) {
            Ok(routed) => routed,
            Err(e) => {
                warn!(error = %e, "cannot route authentication");
                return AuthDecision::Fault(e);
            }
        };

        match routed {
            Routed::Bootstrap(claim) => self.run_bootstrap(claim, username, password),
            Routed::Local => self.verifier.verify(username, password).into(),
            Routed::Remote(authority) => self
                .delegate
                .delegate(&authority, username, password)
                .await
                .into(),
        }
    }

    /// Boolean form of [`NativeAuthService::authenticate`].
    pub async fn authenticate_user(
        &self,
        username: Option<&str>,
        password: &str,
        target: Option<&str>,
    ) -> AuthResult<bool> {
        self.authenticate(username, password, target).await.into_result()
    }

    fn run_bootstrap(&self, claim: BootstrapClaim<'_>, username: &str, password: &str) -> AuthDecision {
        match self.bootstrap.bootstrap(username, password) {
            Ok(BootstrapOutcome::Seeded) => {
                claim.commit();
                AuthDecision::Accepted
            }
            Ok(BootstrapOutcome::AlreadyBootstrapped) => {
                claim.commit();
                self.verifier.verify(username, password).into()
            }
            Err(AuthError::InvalidIdentifier(_)) => AuthDecision::Rejected,
            Err(e) => {
                warn!(error = %e, "bootstrap failed");
                AuthDecision::Fault(e)
            }
        }
    }

    /// Add a user to this database's credential store.
    ///
    /// Refused while the first-connection bootstrap is pending: the first
    /// principal to connect becomes the founder.
    pub fn add_user(&self, username: &str, password: &str) -> Result<(), AdminError> {
        let user = admin_identity(username)?;
        if self.bootstrap_pending() {
            return Err(AdminError::BootstrapPending(self.database().to_string()));
        }
        self.store
            .insert(hash_credential(self.hasher.as_ref(), user.clone(), password))?;
        info!(database = %self.database(), user = %user, "added user");
        Ok(())
    }

    /// Replace a user's password.
    pub fn change_password(&self, username: &str, password: &str) -> Result<(), AdminError> {
        let user = admin_identity(username)?;
        self.store
            .update(hash_credential(self.hasher.as_ref(), user.clone(), password))?;
        info!(database = %self.database(), user = %user, "changed password");
        Ok(())
    }

    /// Drop a user. The founding administrator can never be dropped.
    pub fn drop_user(&self, username: &str) -> Result<(), AdminError> {
        let user = admin_identity(username)?;
        self.store.drop_user(&user)?;
        info!(database = %self.database(), user = %user, "dropped user");
        Ok(())
    }

    /// Persist (or clear) this database's provider property.
    ///
    /// `NATIVE::LOCAL` is the only NATIVE value that may be stored, and only
    /// once the database owner has credentials. Once a NATIVE value is
    /// stored, or a founder was seeded, the property never changes again.
    /// Takes effect at next boot.
    pub fn set_database_provider(&self, provider: Option<&str>, owner: &str) -> Result<(), AdminError> {
        if let Some(current) = self.store.stored_provider()?.filter(|p| is_native(p)) {
            return Err(ConfigError::ProviderLocked(current).into());
        }
        if self.store.founder()?.is_some() {
            return Err(ConfigError::ProviderLocked(LOCAL_ONLY_PROVIDER.to_string()).into());
        }

        if let Some(value) = provider {
            if validate_stored_provider(value)? {
                let owner = admin_identity(owner)?;
                if self.store.lookup(&owner)?.is_none() {
                    return Err(AdminError::MissingOwnerCredentials(owner.to_string()));
                }
            }
        }
        self.store.set_stored_provider(provider)?;
        info!(database = %self.database(), provider = ?provider, "stored authentication provider");
        Ok(())
    }
}

fn admin_identity(username: &str) -> Result<Identity, AdminError> {
    normalize_user(username).map_err(|e| AdminError::InvalidIdentifier(e.to_string()))
}
