//! Worker credentials.
//!
//! Workers authenticate with an HS256 JWT carrying `role = "worker"` and the
//! worker instance id in `sub`. Tokens are signed with the keyring's active
//! key; retired keys stay accepted for verification so secrets can be
//! rotated without restarting the whole fleet at once.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::error::{CoordinatorError, CoordinatorResult};

/// Role claim every worker token must carry.
pub const WORKER_ROLE: &str = "worker";

/// Default worker kind written into issued tokens.
pub const DEFAULT_WORKER_KIND: &str = "video-processor";

/// Claims of a worker token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerClaims {
    /// Worker instance id
    pub sub: String,
    pub role: String,
    /// Worker kind, informational
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub exp: i64,
    #[serde(default)]
    pub iat: i64,
}

/// Verified worker identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerIdentity {
    pub worker_id: String,
    pub kind: Option<String>,
}

impl WorkerIdentity {
    /// On claim, an asserted worker id that disagrees with the token means
    /// the credential is being used by someone else.
    pub fn require_claimant(&self, asserted: Option<&str>) -> CoordinatorResult<()> {
        match asserted {
            Some(id) if id != self.worker_id => Err(CoordinatorError::unauthenticated(format!(
                "worker id header {} does not match credential",
                id
            ))),
            _ => Ok(()),
        }
    }

    /// On heartbeat and complete, a mismatch is an ownership failure.
    pub fn require_owner(&self, asserted: Option<&str>) -> CoordinatorResult<()> {
        match asserted {
            Some(id) if id != self.worker_id => Err(CoordinatorError::not_owner(format!(
                "worker id header {} does not match credential {}",
                id, self.worker_id
            ))),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Error)]
pub enum KeyringError {
    #[error("WORKER_JWT_SECRET is not set")]
    MissingSecret,

    #[error("Invalid retired key entry: {0}")]
    InvalidRetiredEntry(String),

    #[error("Token encoding failed: {0}")]
    Encode(#[from] jsonwebtoken::errors::Error),
}

#[derive(Clone)]
struct SigningKey {
    kid: String,
    secret: Vec<u8>,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Active signing key plus retired keys still accepted for verification.
#[derive(Debug, Clone)]
pub struct WorkerKeyring {
    active: SigningKey,
    retired: Vec<SigningKey>,
}

impl WorkerKeyring {
    pub fn new(kid: impl Into<String>, secret: impl AsRef<[u8]>) -> Self {
        Self {
            active: SigningKey {
                kid: kid.into(),
                secret: secret.as_ref().to_vec(),
            },
            retired: Vec::new(),
        }
    }

    /// Keep accepting tokens signed with an older key.
    pub fn with_retired(mut self, kid: impl Into<String>, secret: impl AsRef<[u8]>) -> Self {
        self.retired.push(SigningKey {
            kid: kid.into(),
            secret: secret.as_ref().to_vec(),
        });
        self
    }

    /// Build from `WORKER_JWT_SECRET`, `WORKER_JWT_KID` and
    /// `WORKER_JWT_RETIRED_SECRETS` (comma separated `kid:secret`).
    pub fn from_env() -> Result<Self, KeyringError> {
        let secret = std::env::var("WORKER_JWT_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or(KeyringError::MissingSecret)?;
        let kid = std::env::var("WORKER_JWT_KID").unwrap_or_else(|_| "primary".to_string());

        let mut keyring = Self::new(kid, secret);
        if let Ok(retired) = std::env::var("WORKER_JWT_RETIRED_SECRETS") {
            for entry in retired.split(',').map(str::trim).filter(|e| !e.is_empty()) {
                let (kid, secret) = entry
                    .split_once(':')
                    .filter(|(k, s)| !k.is_empty() && !s.is_empty())
                    .ok_or_else(|| KeyringError::InvalidRetiredEntry(redact_entry(entry)))?;
                keyring = keyring.with_retired(kid, secret);
            }
        }
        Ok(keyring)
    }

    pub fn active_kid(&self) -> &str {
        &self.active.kid
    }

    /// Number of keys accepted for verification.
    pub fn key_count(&self) -> usize {
        1 + self.retired.len()
    }

    fn keys(&self) -> impl Iterator<Item = &SigningKey> {
        std::iter::once(&self.active).chain(self.retired.iter())
    }

    /// Sign a worker token with the active key.
    pub fn issue(
        &self,
        worker_id: &str,
        kind: Option<&str>,
        ttl: Duration,
    ) -> Result<String, KeyringError> {
        let now = Utc::now().timestamp();
        let claims = WorkerClaims {
            sub: worker_id.to_string(),
            role: WORKER_ROLE.to_string(),
            kind: kind.map(str::to_string),
            exp: now + ttl.as_secs() as i64,
            iat: now,
        };

        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(self.active.kid.clone());

        Ok(encode(
            &header,
            &claims,
            &EncodingKey::from_secret(&self.active.secret),
        )?)
    }
}

fn redact_entry(entry: &str) -> String {
    match entry.split_once(':') {
        Some((kid, _)) => format!("{}:***", kid),
        None => "missing ':' separator".to_string(),
    }
}

/// Validates worker bearer tokens against a keyring.
#[derive(Debug, Clone)]
pub struct WorkerVerifier {
    keyring: Arc<WorkerKeyring>,
    validation: Validation,
}

impl WorkerVerifier {
    pub fn new(keyring: Arc<WorkerKeyring>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        validation.leeway = 30;
        Self {
            keyring,
            validation,
        }
    }

    pub fn keyring(&self) -> &WorkerKeyring {
        &self.keyring
    }

    /// Verify an `Authorization` header value of the form `Bearer <token>`.
    pub fn verify_header(&self, authorization: Option<&str>) -> CoordinatorResult<WorkerIdentity> {
        let value = authorization
            .ok_or_else(|| CoordinatorError::unauthenticated("missing authorization header"))?;
        let token = value
            .strip_prefix("Bearer ")
            .or_else(|| value.strip_prefix("bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| CoordinatorError::unauthenticated("expected a bearer token"))?;
        self.verify(token)
    }

    /// Verify a raw token.
    pub fn verify(&self, token: &str) -> CoordinatorResult<WorkerIdentity> {
        let header = decode_header(token)
            .map_err(|e| CoordinatorError::unauthenticated(format!("malformed token: {}", e)))?;

        // A token naming its key is checked against that key only.
        let candidates: Vec<&SigningKey> = match header.kid.as_deref() {
            Some(kid) => {
                let key = self
                    .keyring
                    .keys()
                    .find(|k| k.kid == kid)
                    .ok_or_else(|| CoordinatorError::unauthenticated(format!("unknown key id: {}", kid)))?;
                vec![key]
            }
            None => self.keyring.keys().collect(),
        };

        let mut last_error = None;
        for key in candidates {
            match decode::<WorkerClaims>(token, &DecodingKey::from_secret(&key.secret), &self.validation) {
                Ok(data) => {
                    debug!(kid = %key.kid, worker_id = %data.claims.sub, "Verified worker token");
                    return identity_from_claims(data.claims);
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(CoordinatorError::unauthenticated(match last_error {
            Some(e) => format!("invalid token: {}", e),
            None => "invalid token".to_string(),
        }))
    }
}

fn identity_from_claims(claims: WorkerClaims) -> CoordinatorResult<WorkerIdentity> {
    if claims.role != WORKER_ROLE {
        return Err(CoordinatorError::unauthenticated(format!(
            "role {} is not allowed",
            claims.role
        )));
    }
    if claims.sub.trim().is_empty() {
        return Err(CoordinatorError::unauthenticated("token has no worker id"));
    }
    Ok(WorkerIdentity {
        worker_id: claims.sub,
        kind: claims.kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    const DAY: Duration = Duration::from_secs(86_400);

    fn verifier(keyring: WorkerKeyring) -> WorkerVerifier {
        WorkerVerifier::new(Arc::new(keyring))
    }

    fn sign(secret: &str, kid: Option<&str>, claims: &WorkerClaims) -> String {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = kid.map(str::to_string);
        encode(&header, claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    fn claims(sub: &str, role: &str, exp_offset: i64) -> WorkerClaims {
        let now = Utc::now().timestamp();
        WorkerClaims {
            sub: sub.to_string(),
            role: role.to_string(),
            kind: None,
            exp: now + exp_offset,
            iat: now,
        }
    }

    #[test]
    fn test_issue_and_verify() {
        let keyring = WorkerKeyring::new("k1", "secret-one");
        let token = keyring.issue("worker-1", Some(DEFAULT_WORKER_KIND), DAY).unwrap();

        let identity = verifier(keyring).verify(&token).unwrap();
        assert_eq!(identity.worker_id, "worker-1");
        assert_eq!(identity.kind.as_deref(), Some(DEFAULT_WORKER_KIND));
    }

    #[test]
    fn test_bearer_header_parsing() {
        let keyring = WorkerKeyring::new("k1", "secret-one");
        let token = keyring.issue("worker-1", None, DAY).unwrap();
        let verifier = verifier(keyring);

        assert_ok!(verifier.verify_header(Some(&format!("Bearer {}", token))));
        assert!(matches!(
            verifier.verify_header(None),
            Err(CoordinatorError::Unauthenticated(_))
        ));
        assert_err!(verifier.verify_header(Some("Basic abc")));
        assert_err!(verifier.verify_header(Some("Bearer ")));
    }

    #[test]
    fn test_retired_key_still_accepted() {
        let old = WorkerKeyring::new("k1", "old-secret");
        let token = old.issue("worker-1", None, DAY).unwrap();

        let rotated = WorkerKeyring::new("k2", "new-secret").with_retired("k1", "old-secret");
        assert_eq!(rotated.key_count(), 2);
        let identity = verifier(rotated).verify(&token).unwrap();
        assert_eq!(identity.worker_id, "worker-1");
    }

    #[test]
    fn test_token_without_kid_tries_every_key() {
        let token = sign("old-secret", None, &claims("worker-2", WORKER_ROLE, 3600));
        let keyring = WorkerKeyring::new("k2", "new-secret").with_retired("k1", "old-secret");
        assert_ok!(verifier(keyring).verify(&token));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let token = sign("other-secret", Some("k9"), &claims("worker-1", WORKER_ROLE, 3600));
        let keyring = WorkerKeyring::new("k1", "secret-one");
        assert!(matches!(
            verifier(keyring).verify(&token),
            Err(CoordinatorError::Unauthenticated(_))
        ));

        let token = sign("other-secret", None, &claims("worker-1", WORKER_ROLE, 3600));
        let keyring = WorkerKeyring::new("k1", "secret-one");
        assert_err!(verifier(keyring).verify(&token));
    }

    #[test]
    fn test_wrong_role_rejected() {
        let token = sign("secret-one", Some("k1"), &claims("user-1", "user", 3600));
        let keyring = WorkerKeyring::new("k1", "secret-one");
        assert!(matches!(
            verifier(keyring).verify(&token),
            Err(CoordinatorError::Unauthenticated(_))
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = sign("secret-one", Some("k1"), &claims("worker-1", WORKER_ROLE, -3600));
        let keyring = WorkerKeyring::new("k1", "secret-one");
        assert_err!(verifier(keyring).verify(&token));
    }

    #[test]
    fn test_empty_subject_rejected() {
        let token = sign("secret-one", Some("k1"), &claims("", WORKER_ROLE, 3600));
        let keyring = WorkerKeyring::new("k1", "secret-one");
        assert_err!(verifier(keyring).verify(&token));
    }

    #[test]
    fn test_worker_id_header_checks() {
        let identity = WorkerIdentity {
            worker_id: "w1".to_string(),
            kind: None,
        };
        assert_ok!(identity.require_claimant(None));
        assert_ok!(identity.require_claimant(Some("w1")));
        assert!(matches!(
            identity.require_claimant(Some("w2")),
            Err(CoordinatorError::Unauthenticated(_))
        ));
        assert!(matches!(
            identity.require_owner(Some("w2")),
            Err(CoordinatorError::NotOwner(_))
        ));
    }
}
