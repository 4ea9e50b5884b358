//! In-process multi-database deployment.
//!
//! Embedded hosts run several databases in one process. The [`Deployment`]
//! registry maps canonical database identities to their authentication
//! services and implements [`ConnectionOpener`], so a delegated login is a
//! connection to a sibling database in the same process.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::delegate::{Connection, ConnectionOpener, OpenError};
use crate::error::AuthDecision;
use crate::identity::{DefaultCanonicalizer, Identity, ServiceNameCanonicalizer};
use crate::service::NativeAuthService;

/// Registry of the databases running in this process.
pub struct Deployment {
    databases: DashMap<Identity, Arc<NativeAuthService>>,
    canonicalizer: Arc<dyn ServiceNameCanonicalizer>,
    open_connections: Arc<AtomicUsize>,
}

impl Deployment {
    /// Create an empty deployment.
    pub fn new() -> Arc<Self> {
        Self::with_canonicalizer(Arc::new(DefaultCanonicalizer))
    }

    /// Create an empty deployment with custom database naming.
    pub fn with_canonicalizer(canonicalizer: Arc<dyn ServiceNameCanonicalizer>) -> Arc<Self> {
        Arc::new(Self {
            databases: DashMap::new(),
            canonicalizer,
            open_connections: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Connection opener backed by this registry.
    ///
    /// Holds a weak reference, so services that keep the opener do not keep
    /// the deployment alive.
    pub fn opener(self: &Arc<Self>) -> Arc<dyn ConnectionOpener> {
        Arc::new(DeploymentOpener {
            deployment: Arc::downgrade(self),
        })
    }

    /// Database name canonicalization shared with the services.
    pub fn canonicalizer(&self) -> Arc<dyn ServiceNameCanonicalizer> {
        self.canonicalizer.clone()
    }

    /// Register a booted database service under its canonical name.
    pub fn register(&self, service: Arc<NativeAuthService>) {
        let id = service.database().clone();
        debug!(database = %id, "registered database");
        self.databases.insert(id, service);
    }

    /// Remove a database. Returns the service if it was registered.
    pub fn deregister(&self, database: &str) -> Option<Arc<NativeAuthService>> {
        let id = self.canonicalizer.canonicalize(database);
        self.databases.remove(&id).map(|(_, service)| service)
    }

    /// Look up a database service.
    pub fn get(&self, database: &str) -> Option<Arc<NativeAuthService>> {
        let id = self.canonicalizer.canonicalize(database);
        self.databases.get(&id).map(|entry| entry.value().clone())
    }

    /// Number of registered databases.
    pub fn len(&self) -> usize {
        self.databases.len()
    }

    /// Check if no databases are registered.
    pub fn is_empty(&self) -> bool {
        self.databases.is_empty()
    }

    /// Connections currently open through this deployment.
    pub fn open_connections(&self) -> usize {
        self.open_connections.load(Ordering::SeqCst)
    }

    /// Open an authenticated connection to a database.
    pub async fn connect(
        &self,
        database: &str,
        username: &str,
        password: &str,
    ) -> Result<EmbeddedConnection, OpenError> {
        let service = self
            .get(database)
            .ok_or_else(|| OpenError::NotFound(database.to_string()))?;

        match service.authenticate(Some(username), password, Some(database)).await {
            AuthDecision::Accepted => Ok(EmbeddedConnection::open(
                service.database().clone(),
                self.open_connections.clone(),
            )),
            AuthDecision::Rejected => Err(OpenError::LoginFailed),
            AuthDecision::Fault(e) => Err(OpenError::Other(e.to_string())),
        }
    }
}

struct DeploymentOpener {
    deployment: Weak<Deployment>,
}

#[async_trait]
impl ConnectionOpener for DeploymentOpener {
    async fn open(
        &self,
        database: &str,
        username: &str,
        password: &str,
    ) -> Result<Box<dyn Connection>, OpenError> {
        let deployment = self
            .deployment
            .upgrade()
            .ok_or_else(|| OpenError::Other("deployment shut down".into()))?;
        let conn = deployment.connect(database, username, password).await?;
        Ok(Box::new(conn))
    }
}

/// A connection to a database in this process.
pub struct EmbeddedConnection {
    database: Identity,
    open: Arc<AtomicUsize>,
    closed: bool,
}

impl EmbeddedConnection {
    fn open(database: Identity, open: Arc<AtomicUsize>) -> Self {
        open.fetch_add(1, Ordering::SeqCst);
        Self {
            database,
            open,
            closed: false,
        }
    }

    /// The connected database.
    pub fn database(&self) -> &Identity {
        &self.database
    }

    fn release(&mut self) {
        if !self.closed {
            self.closed = true;
            self.open.fetch_sub(1, Ordering::SeqCst);
            debug!(database = %self.database, "closed connection");
        }
    }
}

impl Connection for EmbeddedConnection {
    fn close(mut self: Box<Self>) {
        self.release();
    }
}

impl Drop for EmbeddedConnection {
    fn drop(&mut self) {
        self.release();
    }
}
