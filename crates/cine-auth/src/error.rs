//! Error types.

use thiserror::Error;

use crate::TokenCategory;

/// Crate result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Signing key is missing or unusable. Raised while building an issuer or
    /// verifier, never per request.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Input or token claims failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Token signature is fine but its `exp` is in the past.
    #[error("token expired")]
    Expired,

    /// Token is valid but of the wrong category for this use.
    #[error("expected a {expected} token, got {found}")]
    WrongCategory {
        /// Category the caller asked for.
        expected: TokenCategory,
        /// Category encoded in the token.
        found: TokenCategory,
    },

    /// jsonwebtoken error.
    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
}
