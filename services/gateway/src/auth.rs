//! Bearer-token validation against an in-memory credential store.
//!
//! Tokens have the shape `<key id>.<secret>`.  The store never holds secrets
//! in the clear; it keeps a sha256 digest and compares digests on validation,
//! the same way device tokens are stored hashed on the wire side.
//!
//! Validation is pure per call: two map lookups and one digest on the happy
//! path, comfortably inside a millisecond budget.

use crate::permissions::Role;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;
use thiserror::Error;

/// How a principal proved its identity.
///
/// Only bearer tokens today; the variant exists so session records stay
/// meaningful if another mechanism is added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    Bearer,
}

impl AuthMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthMethod::Bearer => "bearer",
        }
    }
}

/// An authenticated identity attached to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user: String,
    pub role: Role,
    pub auth_method: AuthMethod,
    /// `None` means the token never expires.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Principal {
    /// True while the backing token has not expired.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|exp| now < exp)
    }
}

/// Typed validation failures, most specific first.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("token is malformed")]
    Malformed,
    #[error("token subject is unknown")]
    UnknownSubject,
    #[error("token signature does not match")]
    SignatureInvalid,
    #[error("token has expired")]
    Expired,
}

struct TokenRecord {
    secret_digest: [u8; 32],
    user: String,
    role: Role,
    expires_at: Option<DateTime<Utc>>,
}

/// In-memory token store: key id -> hashed credential.
#[derive(Default)]
pub struct TokenStore {
    records: RwLock<HashMap<String, TokenRecord>>,
}

fn digest(secret: &str) -> [u8; 32] {
    Sha256::digest(secret.as_bytes()).into()
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a credential.  Replaces any prior record for the key id.
    pub fn insert(
        &self,
        key_id: &str,
        secret: &str,
        user: &str,
        role: Role,
        expires_at: Option<DateTime<Utc>>,
    ) {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.insert(
            key_id.to_owned(),
            TokenRecord {
                secret_digest: digest(secret),
                user: user.to_owned(),
                role,
                expires_at,
            },
        );
    }

    /// Validate a raw bearer token and produce the principal it names.
    pub fn validate(&self, token: &str) -> Result<Principal, CredentialError> {
        let (key_id, secret) = token.split_once('.').ok_or(CredentialError::Malformed)?;
        if key_id.is_empty() || secret.is_empty() {
            return Err(CredentialError::Malformed);
        }

        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        let record = records.get(key_id).ok_or(CredentialError::UnknownSubject)?;
        if record.secret_digest != digest(secret) {
            return Err(CredentialError::SignatureInvalid);
        }
        let principal = Principal {
            user: record.user.clone(),
            role: record.role,
            auth_method: AuthMethod::Bearer,
            expires_at: record.expires_at,
        };
        if !principal.is_valid_at(Utc::now()) {
            return Err(CredentialError::Expired);
        }
        Ok(principal)
    }

    /// Seed tokens from a file, one credential per line:
    ///
    /// ```text
    /// <key id>.<secret> <user> <viewer|operator|admin> [expires-at RFC3339]
    /// ```
    ///
    /// Blank lines and `#` comments are skipped.  Returns the number of
    /// tokens loaded.
    pub fn load_seed_file(&self, path: &Path) -> Result<usize, SeedFileError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SeedFileError::Io(format!("reading token file '{}': {e}", path.display())))?;
        let mut loaded = 0;
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split_whitespace();
            let token = fields.next().ok_or_else(|| bad_line(lineno))?;
            let (key_id, secret) = token.split_once('.').ok_or_else(|| bad_line(lineno))?;
            let user = fields.next().ok_or_else(|| bad_line(lineno))?;
            let role: Role = fields
                .next()
                .ok_or_else(|| bad_line(lineno))?
                .parse()
                .map_err(|_| bad_line(lineno))?;
            let expires_at = match fields.next() {
                Some(ts) => Some(
                    DateTime::parse_from_rfc3339(ts)
                        .map_err(|_| bad_line(lineno))?
                        .with_timezone(&Utc),
                ),
                None => None,
            };
            self.insert(key_id, secret, user, role, expires_at);
            loaded += 1;
        }
        Ok(loaded)
    }
}

fn bad_line(lineno: usize) -> SeedFileError {
    SeedFileError::Malformed {
        line: lineno + 1,
    }
}

#[derive(Debug, Error)]
pub enum SeedFileError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("malformed token seed on line {line}")]
    Malformed { line: usize },
}

/// Strip the `Bearer ` prefix from an Authorization header value.
pub fn extract_bearer(authorization: &str) -> Option<&str> {
    authorization.strip_prefix("Bearer ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::io::Write;

    fn store_with(key: &str, secret: &str, role: Role) -> TokenStore {
        let store = TokenStore::new();
        store.insert(key, secret, "alice", role, None);
        store
    }

    #[test]
    fn valid_token_yields_principal() {
        let store = store_with("op1", "s3cret", Role::Operator);
        let principal = store.validate("op1.s3cret").expect("token should validate");
        assert_eq!(principal.user, "alice");
        assert_eq!(principal.role, Role::Operator);
        assert_eq!(principal.auth_method, AuthMethod::Bearer);
        assert!(principal.is_valid_at(Utc::now()));
    }

    #[test]
    fn each_failure_mode_is_typed() {
        let store = store_with("op1", "s3cret", Role::Operator);

        assert_eq!(store.validate("no-separator"), Err(CredentialError::Malformed));
        assert_eq!(store.validate(".secret"), Err(CredentialError::Malformed));
        assert_eq!(store.validate("op1."), Err(CredentialError::Malformed));
        assert_eq!(store.validate("ghost.s3cret"), Err(CredentialError::UnknownSubject));
        assert_eq!(store.validate("op1.wrong"), Err(CredentialError::SignatureInvalid));

        store.insert(
            "old",
            "gone",
            "bob",
            Role::Viewer,
            Some(Utc::now() - Duration::hours(1)),
        );
        assert_eq!(store.validate("old.gone"), Err(CredentialError::Expired));
    }

    #[test]
    fn future_expiry_still_validates() {
        let store = TokenStore::new();
        store.insert(
            "k",
            "s",
            "carol",
            Role::Admin,
            Some(Utc::now() + Duration::hours(1)),
        );
        assert!(store.validate("k.s").is_ok());
    }

    #[test]
    fn seed_file_loads_tokens_and_skips_comments() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "# comment line").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "view1.abc alice viewer").unwrap();
        writeln!(file, "adm1.xyz root admin 2099-01-01T00:00:00Z").unwrap();

        let store = TokenStore::new();
        let loaded = store.load_seed_file(file.path()).expect("seed file loads");
        assert_eq!(loaded, 2);
        assert_eq!(store.validate("view1.abc").unwrap().role, Role::Viewer);
        let admin = store.validate("adm1.xyz").unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert!(admin.expires_at.is_some());
    }

    #[test]
    fn seed_file_reports_malformed_lines() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "not-a-token alice viewer").unwrap();
        let store = TokenStore::new();
        match store.load_seed_file(file.path()) {
            Err(SeedFileError::Malformed { line }) => assert_eq!(line, 1),
            other => panic!("expected malformed error, got {other:?}"),
        }
    }

    #[test]
    fn extract_bearer_strips_prefix_only() {
        assert_eq!(extract_bearer("Bearer abc"), Some("abc"));
        assert_eq!(extract_bearer("Basic abc"), None);
    }
}
