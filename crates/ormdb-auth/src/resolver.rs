//! Decides where authentication authority lives for a request.
//!
//! Routing cases:
//!
//! 1. No target database: a system-wide operation (engine shutdown). It is
//!    authenticated by the authority database, or by the serving database
//!    when every database is its own authority.
//! 2. Every database authenticates locally: `Local`.
//! 3. The target is the authority database itself: `Local`, never a
//!    delegation to ourselves.
//! 4. Otherwise: `Remote(authority)`.
//!
//! Bootstrap overrides a `Local` decision for this database exactly once,
//! when it is being created and holds no credentials yet.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::error::{AuthResult, ConfigError};
use crate::identity::{Identity, ServiceNameCanonicalizer};
use crate::provider::{AuthMode, ProviderSpec};

/// Where a request is authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingDecision {
    /// Seed the founding credential in this database.
    Bootstrap,
    /// Verify against this database's credential store.
    Local,
    /// Delegate to the named authority database.
    Remote(String),
}

impl fmt::Display for RoutingDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingDecision::Bootstrap => write!(f, "bootstrap"),
            RoutingDecision::Local => write!(f, "local"),
            RoutingDecision::Remote(db) => write!(f, "remote({})", db),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BootstrapState {
    Armed,
    InProgress,
    Settled,
}

/// Routes requests for one database service.
pub struct AuthorityResolver {
    spec: ProviderSpec,
    service: Identity,
    authority: Option<Identity>,
    canonicalizer: Arc<dyn ServiceNameCanonicalizer>,
    bootstrap: Mutex<BootstrapState>,
    bootstrap_settled: Condvar,
}

impl AuthorityResolver {
    /// Create a resolver for the named database service.
    pub fn new(
        spec: ProviderSpec,
        service_name: &str,
        canonicalizer: Arc<dyn ServiceNameCanonicalizer>,
    ) -> Self {
        let service = canonicalizer.canonicalize(service_name);
        let authority = spec
            .authority_database()
            .map(|name| canonicalizer.canonicalize(name));
        Self {
            spec,
            service,
            authority,
            canonicalizer,
            bootstrap: Mutex::new(BootstrapState::Settled),
            bootstrap_settled: Condvar::new(),
        }
    }

    /// Arm the one-shot bootstrap. Only meaningful at boot.
    pub fn with_bootstrap(self, armed: bool) -> Self {
        *self.bootstrap.lock() = if armed {
            BootstrapState::Armed
        } else {
            BootstrapState::Settled
        };
        self
    }

    /// The provider specification.
    pub fn spec(&self) -> &ProviderSpec {
        &self.spec
    }

    /// Canonical identity of the database this resolver serves.
    pub fn service(&self) -> &Identity {
        &self.service
    }

    /// Canonicalize a user-visible database name.
    pub fn canonicalize(&self, raw: &str) -> Identity {
        self.canonicalizer.canonicalize(raw)
    }

    /// Check if connections to `database` are authenticated in `database`.
    pub fn authenticates_locally(&self, database: &Identity) -> bool {
        self.spec.mode().authenticates_locally() || self.is_authority(database)
    }

    /// Check if `database` is the designated authority database.
    pub fn is_authority(&self, database: &Identity) -> bool {
        self.authority.as_ref() == Some(database)
    }

    /// Check if the one-shot bootstrap has not yet committed.
    pub fn bootstrap_pending(&self) -> bool {
        *self.bootstrap.lock() != BootstrapState::Settled
    }

    /// Route a request without claiming anything.
    ///
    /// Reports `Bootstrap` while the one-shot bootstrap is still pending
    /// for this database. Only the service performs the bootstrap.
    pub fn route(&self, target: Option<&str>) -> AuthResult<RoutingDecision> {
        let decision = match self.classify(target)? {
            Target::Remote(db) => RoutingDecision::Remote(db),
            Target::Local { is_service: true } if self.bootstrap_pending() => {
                RoutingDecision::Bootstrap
            }
            Target::Local { .. } => RoutingDecision::Local,
        };
        Ok(decision)
    }

    /// Route a request, claiming the one-shot bootstrap when it applies.
    ///
    /// Concurrent requests for this database block until a claim settles.
    /// The claim re-arms the bootstrap when dropped without a commit.
    pub(crate) fn claim_route(&self, target: Option<&str>) -> AuthResult<Routed<'_>> {
        let routed = match self.classify(target)? {
            Target::Remote(db) => Routed::Remote(db),
            Target::Local { is_service } => {
                if is_service && self.claim_bootstrap() {
                    Routed::Bootstrap(BootstrapClaim {
                        resolver: self,
                        settled: false,
                    })
                } else {
                    Routed::Local
                }
            }
        };
        debug!(database = %self.service, route = %routed.decision(), "routed authentication");
        Ok(routed)
    }

    fn classify(&self, target: Option<&str>) -> AuthResult<Target> {
        let target = match target {
            Some(raw) => self.canonicalize(raw),
            None if self.spec.mode() == AuthMode::LocalOnly => self.service.clone(),
            None => return self.remote().map(Target::Remote),
        };

        if !self.authenticates_locally(&target) {
            return self.remote().map(Target::Remote);
        }
        Ok(Target::Local {
            is_service: target == self.service,
        })
    }

    /// Settle a claimed bootstrap. An uncommitted bootstrap re-arms, so the
    /// next request tries again.
    fn finish_bootstrap(&self, committed: bool) {
        let mut state = self.bootstrap.lock();
        if *state == BootstrapState::InProgress {
            *state = if committed {
                BootstrapState::Settled
            } else {
                BootstrapState::Armed
            };
        }
        self.bootstrap_settled.notify_all();
    }

    fn remote(&self) -> AuthResult<String> {
        match self.spec.authority_database() {
            Some(db) if self.spec.is_enabled() => Ok(db.to_string()),
            _ => Err(ConfigError::BadProviderSpec(self.spec.to_string()).into()),
        }
    }

    fn claim_bootstrap(&self) -> bool {
        let mut state = self.bootstrap.lock();
        loop {
            match *state {
                BootstrapState::Armed => {
                    *state = BootstrapState::InProgress;
                    return true;
                }
                BootstrapState::InProgress => self.bootstrap_settled.wait(&mut state),
                BootstrapState::Settled => return false,
            }
        }
    }
}

enum Target {
    Remote(String),
    Local { is_service: bool },
}

/// A routing decision that may own the one-shot bootstrap.
pub(crate) enum Routed<'a> {
    Bootstrap(BootstrapClaim<'a>),
    Local,
    Remote(String),
}

impl Routed<'_> {
    pub(crate) fn decision(&self) -> RoutingDecision {
        match self {
            Routed::Bootstrap(_) => RoutingDecision::Bootstrap,
            Routed::Local => RoutingDecision::Local,
            Routed::Remote(db) => RoutingDecision::Remote(db.clone()),
        }
    }
}

/// Scoped ownership of a claimed bootstrap.
///
/// Dropping the claim without committing re-arms the bootstrap and wakes
/// any waiting requests.
pub(crate) struct BootstrapClaim<'a> {
    resolver: &'a AuthorityResolver,
    settled: bool,
}

impl BootstrapClaim<'_> {
    /// Mark the bootstrap as committed.
    pub(crate) fn commit(mut self) {
        self.settled = true;
        self.resolver.finish_bootstrap(true);
    }
}

impl Drop for BootstrapClaim<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.resolver.finish_bootstrap(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::DefaultCanonicalizer;
    use std::time::Duration;

    fn resolver(spec: &str, service: &str) -> AuthorityResolver {
        AuthorityResolver::new(
            ProviderSpec::parse(spec).unwrap(),
            service,
            Arc::new(DefaultCanonicalizer),
        )
    }

    #[test]
    fn test_local_only_system_operation_routes_local() {
        let r = resolver("NATIVE::LOCAL", "db1");
        assert_eq!(r.route(None).unwrap(), RoutingDecision::Local);
        assert_eq!(r.route(Some("db1")).unwrap(), RoutingDecision::Local);
    }

    #[test]
    fn test_global_authority_routing() {
        let authority = resolver("NATIVE:credDB", "credDB");
        assert_eq!(authority.route(Some("credDB")).unwrap(), RoutingDecision::Local);
        assert_eq!(authority.route(Some("CREDDB")).unwrap(), RoutingDecision::Local);

        let other = resolver("NATIVE:credDB", "other");
        assert_eq!(
            other.route(Some("other")).unwrap(),
            RoutingDecision::Remote("credDB".into())
        );
    }

    #[test]
    fn test_system_operation_routes_to_authority() {
        let r = resolver("NATIVE:credDB:LOCAL", "credDB");
        assert_eq!(r.route(None).unwrap(), RoutingDecision::Remote("credDB".into()));

        let r = resolver("NATIVE:credDB", "credDB");
        assert_eq!(r.route(None).unwrap(), RoutingDecision::Remote("credDB".into()));
    }

    #[test]
    fn test_local_fallback_routes_local() {
        let r = resolver("NATIVE:credDB:LOCAL", "second");
        assert_eq!(r.route(Some("second")).unwrap(), RoutingDecision::Local);
    }

    #[test]
    fn test_disabled_spec_cannot_route_remotely() {
        let r = AuthorityResolver::new(ProviderSpec::disabled(), "db", Arc::new(DefaultCanonicalizer));
        assert!(r.route(None).is_err());
    }

    #[test]
    fn test_bootstrap_fires_once() {
        let r = resolver("NATIVE:credDB:LOCAL", "second").with_bootstrap(true);
        assert!(r.bootstrap_pending());
        assert_eq!(r.route(Some("second")).unwrap(), RoutingDecision::Bootstrap);

        match r.claim_route(Some("second")).unwrap() {
            Routed::Bootstrap(claim) => claim.commit(),
            other => panic!("unexpected route {}", other.decision()),
        }

        assert!(!r.bootstrap_pending());
        assert_eq!(r.route(Some("second")).unwrap(), RoutingDecision::Local);
        assert!(matches!(r.claim_route(Some("second")).unwrap(), Routed::Local));
    }

    #[test]
    fn test_route_does_not_claim() {
        let r = resolver("NATIVE::LOCAL", "db").with_bootstrap(true);
        assert_eq!(r.route(Some("db")).unwrap(), RoutingDecision::Bootstrap);
        assert_eq!(r.route(None).unwrap(), RoutingDecision::Bootstrap);

        // Nothing was claimed, so the next request still bootstraps without
        // waiting.
        assert!(matches!(r.claim_route(Some("db")).unwrap(), Routed::Bootstrap(_)));
    }

    #[test]
    fn test_bootstrap_never_overrides_remote() {
        let r = resolver("NATIVE:credDB", "other").with_bootstrap(true);
        assert_eq!(r.route(Some("other")).unwrap(), RoutingDecision::Remote("credDB".into()));
        assert!(matches!(r.claim_route(Some("other")).unwrap(), Routed::Remote(_)));
        assert!(r.bootstrap_pending());
    }

    #[test]
    fn test_dropped_claim_rearms() {
        let r = resolver("NATIVE::LOCAL", "db").with_bootstrap(true);
        {
            let routed = r.claim_route(Some("db")).unwrap();
            assert!(matches!(routed, Routed::Bootstrap(_)));
        }
        assert!(r.bootstrap_pending());

        let Routed::Bootstrap(claim) = r.claim_route(Some("db")).unwrap() else {
            panic!("bootstrap was not re-armed");
        };
        claim.commit();
        assert!(matches!(r.claim_route(Some("db")).unwrap(), Routed::Local));
    }

    #[test]
    fn test_concurrent_routes_claim_bootstrap_once() {
        let r = resolver("NATIVE:credDB:LOCAL", "credDB").with_bootstrap(true);

        let decisions: Vec<RoutingDecision> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| match r.claim_route(Some("credDB")).unwrap() {
                        Routed::Bootstrap(claim) => {
                            std::thread::sleep(Duration::from_millis(20));
                            claim.commit();
                            RoutingDecision::Bootstrap
                        }
                        other => other.decision(),
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let bootstraps = decisions
            .iter()
            .filter(|d| **d == RoutingDecision::Bootstrap)
            .count();
        assert_eq!(bootstraps, 1);
        assert_eq!(
            decisions.iter().filter(|d| **d == RoutingDecision::Local).count(),
            7
        );
    }
}
