//! Signing and verifying application tokens (HS256).

use crate::{Error, Result};

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Minimum HS256 secret length in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Kind of token. Encoded in the `category` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenCategory {
    /// Short-lived credential presented on API calls.
    Access,
    /// Long-lived credential used only to obtain new access tokens.
    Refresh,
}

impl TokenCategory {
    /// Wire name of the category.
    pub fn as_str(self) -> &'static str {
        match self {
            TokenCategory::Access => "access",
            TokenCategory::Refresh => "refresh",
        }
    }
}

impl fmt::Display for TokenCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Claims carried by every token this crate issues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Token category.
    pub category: TokenCategory,
    /// Subject identity.
    pub sub: String,
    /// Display name.
    pub name: String,
    /// Granted role.
    pub role: String,
    /// Issued at (seconds since epoch).
    pub iat: u64,
    /// Expiry (seconds since epoch).
    pub exp: u64,
    /// Unique token id.
    pub jti: String,
    /// Issuer, when configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

/// A freshly signed token and the instants it was minted for.
#[derive(Clone)]
pub struct IssuedToken {
    /// The signed compact JWT.
    pub token: String,
    /// Category the token was minted as.
    pub category: TokenCategory,
    /// Issue instant.
    pub issued_at: SystemTime,
    /// Expiry instant (`issued_at + ttl`).
    pub expires_at: SystemTime,
}

impl IssuedToken {
    /// Lifetime in whole seconds, for cookie `Max-Age`.
    pub fn ttl_seconds(&self) -> u64 {
        self.expires_at
            .duration_since(self.issued_at)
            .unwrap_or_default()
            .as_secs()
    }
}

impl fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedToken")
            .field("token", &"<redacted>")
            .field("category", &self.category)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

fn check_secret(secret: &[u8]) -> Result<()> {
    if secret.len() < MIN_SECRET_LEN {
        return Err(Error::Configuration(format!(
            "signing secret must be at least {MIN_SECRET_LEN} bytes, got {}",
            secret.len()
        )));
    }
    Ok(())
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Mints signed tokens with a process-wide secret.
///
/// Build one at startup and share it; signing only reads the key.
#[derive(Clone)]
pub struct TokenIssuer {
    key: EncodingKey,
    issuer: Option<String>,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("key", &"<redacted>")
            .field("issuer", &self.issuer)
            .finish()
    }
}

impl TokenIssuer {
    /// Create an issuer from a raw HS256 secret.
    pub fn new(secret: &[u8]) -> Result<Self> {
        check_secret(secret)?;
        Ok(Self {
            key: EncodingKey::from_secret(secret),
            issuer: None,
        })
    }

    /// Stamp an `iss` claim on every token.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Sign a token for `subject_id` valid for `ttl_ms` milliseconds from now.
    pub fn issue(
        &self,
        category: TokenCategory,
        subject_id: &str,
        display_name: &str,
        role: &str,
        ttl_ms: u64,
    ) -> Result<IssuedToken> {
        self.issue_at(SystemTime::now(), category, subject_id, display_name, role, ttl_ms)
    }

    fn issue_at(
        &self,
        now: SystemTime,
        category: TokenCategory,
        subject_id: &str,
        display_name: &str,
        role: &str,
        ttl_ms: u64,
    ) -> Result<IssuedToken> {
        require_non_empty("subject id", subject_id)?;
        require_non_empty("display name", display_name)?;
        require_non_empty("role", role)?;
        if ttl_ms == 0 {
            return Err(Error::Validation("ttl must be positive".to_string()));
        }

        let expires_at = now
            .checked_add(Duration::from_millis(ttl_ms))
            .ok_or_else(|| Error::Validation(format!("ttl {ttl_ms}ms overflows")))?;

        let claims = TokenClaims {
            category,
            sub: subject_id.to_string(),
            name: display_name.to_string(),
            role: role.to_string(),
            iat: epoch_secs(now),
            exp: epoch_secs(expires_at),
            jti: uuid::Uuid::new_v4().to_string(),
            iss: self.issuer.clone(),
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.key)?;

        Ok(IssuedToken {
            token,
            category,
            issued_at: now,
            expires_at,
        })
    }
}

/// Options for token verification.
#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    /// Expected issuer (`iss`).
    pub issuer: Option<String>,

    /// Clock skew/leeway in seconds.
    pub leeway_seconds: u64,
}

/// Checks signature, expiry, and issuer of tokens minted by [`TokenIssuer`].
#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("key", &"<redacted>")
            .field("leeway", &self.validation.leeway)
            .finish()
    }
}

impl TokenVerifier {
    /// Create a verifier for the same secret the issuer signs with.
    pub fn new(secret: &[u8], opts: &VerifyOptions) -> Result<Self> {
        check_secret(secret)?;

        // Only HS256 is accepted; `alg: none` and asymmetric algs are rejected.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = opts.leeway_seconds;
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "sub"]);
        if let Some(iss) = &opts.issuer {
            validation.set_issuer(&[iss.as_str()]);
        }

        Ok(Self {
            key: DecodingKey::from_secret(secret),
            validation,
        })
    }

    /// Verify a token and return its claims.
    pub fn verify(&self, token: &str) -> Result<TokenClaims> {
        match jsonwebtoken::decode::<TokenClaims>(token, &self.key, &self.validation) {
            Ok(data) => Ok(data.claims),
            Err(e) if matches!(e.kind(), ErrorKind::ExpiredSignature) => Err(Error::Expired),
            Err(e) => Err(Error::Jwt(e)),
        }
    }

    /// Verify a token and require a specific category.
    pub fn verify_category(&self, token: &str, expected: TokenCategory) -> Result<TokenClaims> {
        let claims = self.verify(token)?;
        if claims.category != expected {
            return Err(Error::WrongCategory {
                expected,
                found: claims.category,
            });
        }
        Ok(claims)
    }
}

fn epoch_secs(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs()
}
