//! cine-auth
//!
//! Token and cookie primitives for the cine login flow:
//!
//! - **Issuing tokens** (`TokenIssuer`): HS256-signed JWTs carrying category, subject,
//!   display name, role, issue/expiry times and a unique `jti`
//! - **Verifying tokens** (`TokenVerifier`): signature, expiry, issuer and category checks
//! - **Packaging credentials** into `Secure`, `HttpOnly` cookies
//!
//! The signing secret is supplied once at startup and never leaves the issuer or
//! verifier; their `Debug` output redacts it.
//!
//! ## Quick start
//! ```no_run
//! use cine_auth::{TokenCategory, TokenIssuer, TokenVerifier, VerifyOptions, package_credential};
//!
//! # fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let secret = std::env::var("CINE_JWT_SECRET")?;
//! let issuer = TokenIssuer::new(secret.as_bytes())?;
//! let verifier = TokenVerifier::new(secret.as_bytes(), &VerifyOptions::default())?;
//!
//! let issued = issuer.issue(TokenCategory::Refresh, "u1", "Alice", "USER", 86_400_000)?;
//! let claims = verifier.verify_category(&issued.token, TokenCategory::Refresh)?;
//! println!("sub={}", claims.sub);
//!
//! let cookie = package_credential("refresh", &issued.token, issued.ttl_seconds());
//! println!("Set-Cookie: {}", cookie.to_set_cookie()?);
//! # Ok(()) }
//! ```

#![forbid(unsafe_code)]

mod cookie;
mod error;
mod jwt;

pub use cookie::{
    CookieOptions, MAX_COOKIE_LIFETIME_SECS, SameSite, TransportCookie, build_clear_cookie,
    build_set_cookie, cookie_name, find_cookie, package_credential,
};
pub use error::{Error, Result};
pub use jwt::{
    IssuedToken, MIN_SECRET_LEN, TokenCategory, TokenClaims, TokenIssuer, TokenVerifier,
    VerifyOptions,
};
