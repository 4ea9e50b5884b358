//! Authentication provider specification.
//!
//! The provider property takes one of three NATIVE forms:
//!
//! ```text
//! NATIVE:credDB        all authentication happens in credDB
//! NATIVE:credDB:LOCAL  system-wide operations authenticate in credDB,
//!                      connections to a database authenticate in that database
//! NATIVE::LOCAL        every database authenticates its own connections
//! ```
//!
//! Any value that does not start with `NATIVE:` leaves native
//! authentication disabled.

use std::fmt;

use crate::error::ConfigError;

/// Provider prefix that enables native authentication.
pub const NATIVE_PREFIX: &str = "NATIVE:";

/// Suffix that enables local authentication of database connections.
pub const LOCAL_SUFFIX: &str = ":LOCAL";

/// The only NATIVE value a database may persist.
pub const LOCAL_ONLY_PROVIDER: &str = "NATIVE::LOCAL";

/// Where authentication authority lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMode {
    /// Native authentication is not active.
    Disabled,
    /// A single authority database verifies everything.
    GlobalAuthority,
    /// The authority database verifies system-wide operations only.
    GlobalAuthorityWithLocalFallback,
    /// Every database is its own authority.
    LocalOnly,
}

impl AuthMode {
    /// Check if database connections are verified by the database itself.
    pub fn authenticates_locally(&self) -> bool {
        matches!(
            self,
            AuthMode::GlobalAuthorityWithLocalFallback | AuthMode::LocalOnly
        )
    }
}

/// Parsed, immutable provider specification.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderSpec {
    mode: AuthMode,
    authority_database: Option<String>,
}

impl ProviderSpec {
    /// Specification with native authentication disabled.
    pub fn disabled() -> Self {
        Self {
            mode: AuthMode::Disabled,
            authority_database: None,
        }
    }

    /// Every database authenticates locally.
    pub fn local_only() -> Self {
        Self {
            mode: AuthMode::LocalOnly,
            authority_database: None,
        }
    }

    /// A global authority database, optionally with local fallback.
    pub fn global(authority: impl Into<String>, local_fallback: bool) -> Result<Self, ConfigError> {
        let authority = authority.into();
        if authority.is_empty() {
            return Err(ConfigError::BadProviderSpec(authority));
        }
        let mode = if local_fallback {
            AuthMode::GlobalAuthorityWithLocalFallback
        } else {
            AuthMode::GlobalAuthority
        };
        Ok(Self {
            mode,
            authority_database: Some(authority),
        })
    }

    /// Parse a NATIVE provider string.
    ///
    /// Everything between the first colon and the trailing `:LOCAL` (or the
    /// end of the string when `:LOCAL` is absent) names the authority
    /// database. An empty name counts as absent. A provider must name an
    /// authority or enable local authentication.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let upper = raw.to_ascii_uppercase();
        if !upper.starts_with(NATIVE_PREFIX) {
            return Err(ConfigError::BadProviderSpec(raw.to_string()));
        }

        let local = upper.ends_with(LOCAL_SUFFIX);
        let name_start = NATIVE_PREFIX.len();
        let name_end = if local {
            raw.rfind(':').unwrap_or(0)
        } else {
            raw.len()
        };

        let authority_database = if name_end > name_start {
            Some(raw[name_start..name_end].to_string())
        } else {
            None
        };

        let mode = match (&authority_database, local) {
            (Some(_), false) => AuthMode::GlobalAuthority,
            (Some(_), true) => AuthMode::GlobalAuthorityWithLocalFallback,
            (None, true) => AuthMode::LocalOnly,
            (None, false) => return Err(ConfigError::BadProviderSpec(raw.to_string())),
        };

        Ok(Self {
            mode,
            authority_database,
        })
    }

    /// Build a specification from an optional provider property.
    ///
    /// Missing or non-NATIVE values disable native authentication; a
    /// malformed NATIVE value is an error.
    pub fn from_property(raw: Option<&str>) -> Result<Self, ConfigError> {
        match raw {
            Some(value) if is_native(value) => Self::parse(value),
            _ => Ok(Self::disabled()),
        }
    }

    /// The routing mode.
    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    /// The authority database name, if one is designated.
    pub fn authority_database(&self) -> Option<&str> {
        self.authority_database.as_deref()
    }

    /// Check if native authentication is active.
    pub fn is_enabled(&self) -> bool {
        self.mode != AuthMode::Disabled
    }
}

impl fmt::Display for ProviderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.mode, &self.authority_database) {
            (AuthMode::Disabled, _) => write!(f, "disabled"),
            (AuthMode::LocalOnly, _) => write!(f, "{}", LOCAL_ONLY_PROVIDER),
            (AuthMode::GlobalAuthority, Some(db)) => write!(f, "{}{}", NATIVE_PREFIX, db),
            (AuthMode::GlobalAuthorityWithLocalFallback, Some(db)) => {
                write!(f, "{}{}{}", NATIVE_PREFIX, db, LOCAL_SUFFIX)
            }
            (_, None) => write!(f, "{}", NATIVE_PREFIX),
        }
    }
}

/// Check if a provider value enables native authentication.
pub fn is_native(raw: &str) -> bool {
    raw.to_ascii_uppercase().starts_with(NATIVE_PREFIX)
}

/// Validate a provider value before persisting it in a database.
///
/// `NATIVE::LOCAL` is the only NATIVE value a database may store. Returns
/// whether the value turns native authentication on.
pub fn validate_stored_provider(raw: &str) -> Result<bool, ConfigError> {
    if !is_native(raw) {
        return Ok(false);
    }
    if raw.to_ascii_uppercase() != LOCAL_ONLY_PROVIDER {
        return Err(ConfigError::IllegalStoredProvider(raw.to_string()));
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_global_authority() {
        let spec = ProviderSpec::parse("NATIVE:credDB").unwrap();
        assert_eq!(spec.mode(), AuthMode::GlobalAuthority);
        assert_eq!(spec.authority_database(), Some("credDB"));
        assert!(!spec.mode().authenticates_locally());
    }

    #[test]
    fn test_parse_local_fallback() {
        let spec = ProviderSpec::parse("NATIVE:credDB:LOCAL").unwrap();
        assert_eq!(spec.mode(), AuthMode::GlobalAuthorityWithLocalFallback);
        assert_eq!(spec.authority_database(), Some("credDB"));
        assert!(spec.mode().authenticates_locally());
    }

    #[test]
    fn test_parse_local_only() {
        let spec = ProviderSpec::parse("NATIVE::LOCAL").unwrap();
        assert_eq!(spec.mode(), AuthMode::LocalOnly);
        assert_eq!(spec.authority_database(), None);

        // The name between the colons is empty in both cases.
        let spec = ProviderSpec::parse("NATIVE:LOCAL").unwrap();
        assert_eq!(spec.mode(), AuthMode::LocalOnly);
    }

    #[test]
    fn test_parse_is_case_insensitive_for_tokens() {
        let spec = ProviderSpec::parse("native:MixedCase:local").unwrap();
        assert_eq!(spec.mode(), AuthMode::GlobalAuthorityWithLocalFallback);
        assert_eq!(spec.authority_database(), Some("MixedCase"));
    }

    #[test]
    fn test_parse_name_with_colons() {
        let spec = ProviderSpec::parse("NATIVE:a:b").unwrap();
        assert_eq!(spec.authority_database(), Some("a:b"));

        let spec = ProviderSpec::parse("NATIVE:a:b:LOCAL").unwrap();
        assert_eq!(spec.authority_database(), Some("a:b"));
    }

    #[test]
    fn test_parse_rejects_missing_authority() {
        assert_eq!(
            ProviderSpec::parse("NATIVE:"),
            Err(ConfigError::BadProviderSpec("NATIVE:".into()))
        );
        assert!(ProviderSpec::parse("BUILTIN").is_err());
        assert!(ProviderSpec::parse("").is_err());
    }

    #[test]
    fn test_parse_is_deterministic() {
        for raw in ["NATIVE:db", "NATIVE:db:LOCAL", "NATIVE::LOCAL"] {
            assert_eq!(ProviderSpec::parse(raw), ProviderSpec::parse(raw));
        }
    }

    #[test]
    fn test_from_property() {
        assert_eq!(ProviderSpec::from_property(None).unwrap().mode(), AuthMode::Disabled);
        assert_eq!(
            ProviderSpec::from_property(Some("LDAP")).unwrap().mode(),
            AuthMode::Disabled
        );
        assert!(ProviderSpec::from_property(Some("NATIVE:")).is_err());
        assert_eq!(
            ProviderSpec::from_property(Some("NATIVE:db")).unwrap().mode(),
            AuthMode::GlobalAuthority
        );
    }

    #[test]
    fn test_global_constructor() {
        assert!(ProviderSpec::global("", false).is_err());
        let spec = ProviderSpec::global("db", true).unwrap();
        assert_eq!(spec, ProviderSpec::parse("NATIVE:db:LOCAL").unwrap());
    }

    #[test]
    fn test_display_round_trips_canonical_forms() {
        for raw in ["NATIVE:db", "NATIVE:db:LOCAL", "NATIVE::LOCAL"] {
            assert_eq!(ProviderSpec::parse(raw).unwrap().to_string(), raw);
        }
    }

    #[test]
    fn test_validate_stored_provider() {
        assert_eq!(validate_stored_provider("NATIVE::LOCAL"), Ok(true));
        assert_eq!(validate_stored_provider("native::local"), Ok(true));
        assert_eq!(validate_stored_provider("com.acme.Authenticator"), Ok(false));
        assert!(validate_stored_provider("NATIVE:db:LOCAL").is_err());
        assert!(validate_stored_provider("NATIVE:LOCAL").is_err());
        assert!(validate_stored_provider("NATIVE:db").is_err());
    }
}
