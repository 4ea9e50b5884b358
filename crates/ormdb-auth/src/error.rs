//! Authentication error types.

use thiserror::Error;

/// Boot-time configuration errors.
///
/// These are fatal: a service that fails to parse its provider property
/// never starts accepting connections.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The authentication provider property does not designate any
    /// database as the authentication authority.
    #[error("bad NATIVE authentication provider specification: {0:?}")]
    BadProviderSpec(String),

    /// A provider value that may not be persisted in a database.
    #[error("illegal stored authentication provider: {0:?}")]
    IllegalStoredProvider(String),

    /// The database fixed its provider at bootstrap; it can never change.
    #[error("authentication provider is fixed at {0:?} and cannot be changed")]
    ProviderLocked(String),

    /// Any other invalid setting.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Credential store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying sled failure.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Record encoding failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A credential already exists for this identity.
    #[error("credential already exists for {0}")]
    Duplicate(String),

    /// The database already has a founding administrator.
    #[error("founding administrator {0} already exists")]
    FounderExists(String),

    /// No credential exists for this identity.
    #[error("no credential for {0}")]
    NotFound(String),

    /// The founding administrator can never be dropped.
    #[error("cannot drop founding administrator {0}")]
    FounderUndroppable(String),

    /// The store cannot be reached.
    #[error("credential store unavailable: {0}")]
    Unavailable(String),
}

/// Request-level authentication faults.
///
/// A wrong password or unknown user is never an error; see
/// [`AuthDecision::Rejected`].
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid provider configuration discovered while routing.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The credential store could not be consulted.
    #[error("credential store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    /// The designated authority database does not exist.
    #[error("credentials database {0} does not exist")]
    AuthorityUnreachable(String),

    /// Delegated connection did not complete within the configured timeout.
    #[error("timed out connecting to credentials database {0}")]
    Timeout(String),

    /// Any other failure reported by the connection opener.
    #[error("transport error: {0}")]
    Transport(String),

    /// A principal name that cannot be normalised.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        AuthError::StoreUnavailable(err)
    }
}

/// Errors from administrative credential operations.
#[derive(Debug, Error)]
pub enum AdminError {
    /// The user name cannot be normalised.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// The provider value may not be stored.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The credential store rejected the change.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// NATIVE authentication needs stored credentials for the database owner.
    #[error("no stored credentials for database owner {0}")]
    MissingOwnerCredentials(String),

    /// Credentials cannot be added before the first connection seeds the
    /// founding administrator.
    #[error("database {0} has not been bootstrapped yet")]
    BootstrapPending(String),
}

/// Result type for authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;

/// Result type for credential store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of a single authentication request.
#[derive(Debug)]
pub enum AuthDecision {
    /// The principal is authenticated.
    Accepted,
    /// Unknown user, wrong password, or a remote login failure.
    Rejected,
    /// Infrastructure or configuration fault.
    Fault(AuthError),
}

impl AuthDecision {
    /// Map a boolean verification result.
    pub fn from_bool(accepted: bool) -> Self {
        if accepted {
            AuthDecision::Accepted
        } else {
            AuthDecision::Rejected
        }
    }

    /// Check if the principal was accepted.
    pub fn is_accepted(&self) -> bool {
        matches!(self, AuthDecision::Accepted)
    }

    /// Check if the request faulted.
    pub fn is_fault(&self) -> bool {
        matches!(self, AuthDecision::Fault(_))
    }

    /// Collapse into the boolean-or-error shape used by connection layers.
    pub fn into_result(self) -> AuthResult<bool> {
        match self {
            AuthDecision::Accepted => Ok(true),
            AuthDecision::Rejected => Ok(false),
            AuthDecision::Fault(e) => Err(e),
        }
    }
}

impl From<AuthResult<bool>> for AuthDecision {
    fn from(result: AuthResult<bool>) -> Self {
        match result {
            Ok(accepted) => AuthDecision::from_bool(accepted),
            Err(e) => AuthDecision::Fault(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthError::AuthorityUnreachable("credDB".to_string());
        assert!(err.to_string().contains("credDB"));

        let err: AuthError = ConfigError::BadProviderSpec("NATIVE:".into()).into();
        assert!(err.to_string().contains("NATIVE:"));

        let err: AuthError = StoreError::Unavailable("closed".into()).into();
        assert!(matches!(err, AuthError::StoreUnavailable(_)));
    }

    #[test]
    fn test_decision_into_result() {
        assert!(AuthDecision::Accepted.into_result().unwrap());
        assert!(!AuthDecision::Rejected.into_result().unwrap());

        let fault = AuthDecision::Fault(AuthError::Transport("reset".into()));
        assert!(fault.is_fault());
        assert!(fault.into_result().is_err());
    }

    #[test]
    fn test_decision_from_result() {
        assert!(AuthDecision::from(Ok(true)).is_accepted());
        assert!(matches!(AuthDecision::from(Ok(false)), AuthDecision::Rejected));
        assert!(AuthDecision::from(Err(AuthError::Timeout("db".into()))).is_fault());
    }
}
