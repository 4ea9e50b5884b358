//! Delegated authentication against the authority database.
//!
//! A delegated check opens a connection to the authority database with the
//! caller's credentials and closes it again. A successful open is a
//! successful login; the authority runs its own local verification.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::{AuthError, AuthResult};

/// Default bound on a delegated connection attempt.
pub const DEFAULT_DELEGATE_TIMEOUT: Duration = Duration::from_secs(30);

/// Failure reported by a [`ConnectionOpener`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpenError {
    /// The target rejected the credentials.
    #[error("login failed")]
    LoginFailed,

    /// The target database does not exist.
    #[error("database {0} not found")]
    NotFound(String),

    /// Any other transport or engine failure.
    #[error("{0}")]
    Other(String),
}

/// An open connection to a database.
pub trait Connection: Send {
    /// Close the connection and release its resources.
    fn close(self: Box<Self>);
}

/// Opens connections to databases on behalf of the authentication core.
///
/// Injected by the host engine. If the returned future is dropped before
/// completing (for example on timeout), the implementation must release
/// anything it had acquired.
#[async_trait]
pub trait ConnectionOpener: Send + Sync {
    /// Open a connection to `database`, presenting only these credentials.
    async fn open(
        &self,
        database: &str,
        username: &str,
        password: &str,
    ) -> Result<Box<dyn Connection>, OpenError>;
}

/// Closes the wrapped connection on every exit path.
struct ConnectionGuard(Option<Box<dyn Connection>>);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if let Some(conn) = self.0.take() {
            conn.close();
        }
    }
}

/// Verifies credentials by connecting to the authority database.
pub struct RemoteDelegate {
    opener: Arc<dyn ConnectionOpener>,
    timeout: Duration,
}

impl RemoteDelegate {
    /// Create a delegate with the default timeout.
    pub fn new(opener: Arc<dyn ConnectionOpener>) -> Self {
        Self {
            opener,
            timeout: DEFAULT_DELEGATE_TIMEOUT,
        }
    }

    /// Set the connection timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Authenticate by opening one connection to `authority`.
    ///
    /// A login failure is `Ok(false)`. A missing authority database is
    /// `AuthorityUnreachable`, distinct from a rejected login. No retries.
    pub async fn delegate(&self, authority: &str, username: &str, password: &str) -> AuthResult<bool> {
        let attempt = self.opener.open(authority, username, password);
        let result = match tokio::time::timeout(self.timeout, attempt).await {
            Ok(result) => result,
            Err(_) => {
                warn!(authority, timeout_ms = self.timeout.as_millis() as u64, "delegated login timed out");
                return Err(AuthError::Timeout(authority.to_string()));
            }
        };

        match result {
            Ok(conn) => {
                drop(ConnectionGuard(Some(conn)));
                debug!(authority, "delegated login succeeded");
                Ok(true)
            }
            Err(OpenError::LoginFailed) => {
                debug!(authority, "delegated login rejected");
                Ok(false)
            }
            Err(OpenError::NotFound(_)) => {
                warn!(authority, "credentials database does not exist");
                Err(AuthError::AuthorityUnreachable(authority.to_string()))
            }
            Err(OpenError::Other(msg)) => {
                warn!(authority, error = %msg, "delegated login failed");
                Err(AuthError::Transport(msg))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingConnection(Arc<AtomicUsize>);

    impl Connection for CountingConnection {
        fn close(self: Box<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct ScriptedOpener {
        outcome: Result<(), OpenError>,
        delay: Duration,
        attempts: AtomicUsize,
        closed: Arc<AtomicUsize>,
    }

    impl ScriptedOpener {
        fn new(outcome: Result<(), OpenError>) -> Self {
            Self {
                outcome,
                delay: Duration::ZERO,
                attempts: AtomicUsize::new(0),
                closed: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl ConnectionOpener for ScriptedOpener {
        async fn open(
            &self,
            _database: &str,
            _username: &str,
            _password: &str,
        ) -> Result<Box<dyn Connection>, OpenError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.outcome.clone()?;
            Ok(Box::new(CountingConnection(self.closed.clone())))
        }
    }

    #[tokio::test]
    async fn test_successful_open_accepts_and_closes() {
        let opener = Arc::new(ScriptedOpener::new(Ok(())));
        let delegate = RemoteDelegate::new(opener.clone());

        assert!(delegate.delegate("credDB", "alice", "pw").await.unwrap());
        assert_eq!(opener.closed.load(Ordering::SeqCst), 1);
        assert_eq!(opener.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_login_failure_is_rejection() {
        let opener = Arc::new(ScriptedOpener::new(Err(OpenError::LoginFailed)));
        let delegate = RemoteDelegate::new(opener.clone());

        assert!(!delegate.delegate("credDB", "alice", "bad").await.unwrap());
        assert_eq!(opener.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_authority_is_unreachable() {
        let opener = Arc::new(ScriptedOpener::new(Err(OpenError::NotFound("credDB".into()))));
        let delegate = RemoteDelegate::new(opener);

        let err = delegate.delegate("credDB", "nobody", "x").await.unwrap_err();
        assert!(matches!(err, AuthError::AuthorityUnreachable(ref db) if db == "credDB"));
    }

    #[tokio::test]
    async fn test_other_failures_propagate() {
        let opener = Arc::new(ScriptedOpener::new(Err(OpenError::Other("disk full".into()))));
        let delegate = RemoteDelegate::new(opener);

        let err = delegate.delegate("credDB", "alice", "pw").await.unwrap_err();
        assert!(matches!(err, AuthError::Transport(ref msg) if msg == "disk full"));
    }

    #[tokio::test]
    async fn test_slow_open_times_out() {
        let mut opener = ScriptedOpener::new(Ok(()));
        opener.delay = Duration::from_secs(5);
        let opener = Arc::new(opener);
        let delegate = RemoteDelegate::new(opener.clone()).with_timeout(Duration::from_millis(20));

        let err = delegate.delegate("credDB", "alice", "pw").await.unwrap_err();
        assert!(matches!(err, AuthError::Timeout(_)));
        assert_eq!(opener.closed.load(Ordering::SeqCst), 0);
    }
}
