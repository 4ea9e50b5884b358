//! Canonical identities for users and databases.

use std::fmt;

use crate::error::{AuthError, AuthResult};

/// Canonical form of a user or database identifier.
///
/// Two identities are equal iff their canonical forms are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(String);

impl Identity {
    /// Wrap an already-canonical string.
    pub fn from_canonical(canonical: impl Into<String>) -> Self {
        Self(canonical.into())
    }

    /// The canonical string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical bytes, used as storage keys.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Turns user-visible database names into canonical identities.
///
/// Hosts with their own naming rules (absolute paths, subprotocol
/// prefixes) inject an implementation at construction time.
pub trait ServiceNameCanonicalizer: Send + Sync {
    /// Canonicalize a raw database name.
    fn canonicalize(&self, raw: &str) -> Identity;
}

/// Default database name canonicalization.
///
/// Trims whitespace, normalizes path separators, drops trailing
/// separators and folds ASCII case.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCanonicalizer;

impl ServiceNameCanonicalizer for DefaultCanonicalizer {
    fn canonicalize(&self, raw: &str) -> Identity {
        let name = raw.trim().replace('\\', "/");
        let name = name.trim_end_matches('/');
        Identity(name.to_ascii_lowercase())
    }
}

/// Normalize a user name as an SQL authorization identifier.
///
/// Unquoted names are trimmed and upper-cased. Names wrapped in double
/// quotes keep their case, with doubled quotes collapsed to one.
pub fn normalize_user(raw: &str) -> AuthResult<Identity> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AuthError::InvalidIdentifier("empty user name".into()));
    }

    if let Some(body) = trimmed.strip_prefix('"') {
        let inner = body
            .strip_suffix('"')
            .ok_or_else(|| AuthError::InvalidIdentifier(format!("unterminated quoted name {}", raw)))?;
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '"' {
                if chars.peek() != Some(&'"') {
                    return Err(AuthError::InvalidIdentifier(format!(
                        "unescaped quote in {}",
                        raw
                    )));
                }
                chars.next();
            }
            out.push(c);
        }
        if out.is_empty() {
            return Err(AuthError::InvalidIdentifier("empty quoted name".into()));
        }
        return Ok(Identity(out));
    }

    Ok(Identity(trimmed.to_uppercase()))
}
