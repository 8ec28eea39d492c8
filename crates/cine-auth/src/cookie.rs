//! Cookie helpers for carrying credentials to the browser.

use crate::{Error, Result};
use httpdate::fmt_http_date;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Longest cookie lifetime user agents honour (RFC 6265bis caps Max-Age at 400 days).
pub const MAX_COOKIE_LIFETIME_SECS: u64 = 400 * 24 * 60 * 60;

/// SameSite attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    /// SameSite=Strict
    Strict,
    /// SameSite=Lax
    Lax,
    /// SameSite=None
    None,
}

impl SameSite {
    fn as_str(self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// Options used to build a credential cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieOptions {
    /// Cookie name (without any prefix).
    pub name: String,

    /// Send on HTTPS only.
    pub secure: bool,

    /// Not accessible to JS.
    pub http_only: bool,

    /// SameSite attribute.
    pub same_site: SameSite,

    /// Max-Age in seconds.
    pub max_age_seconds: Option<u64>,

    /// If true the cookie name is prefixed with `__Host-`, which also requires `secure`.
    /// Credential cookies never carry `Domain` and always use `Path=/`.
    pub use_host_prefix: bool,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            name: "refresh".to_string(),
            secure: true,
            http_only: true,
            same_site: SameSite::Lax,
            max_age_seconds: None,
            use_host_prefix: false,
        }
    }
}

/// A credential ready to be attached to a response.
#[derive(Clone, PartialEq, Eq)]
pub struct TransportCookie {
    /// Cookie value (the signed token).
    pub value: String,
    /// Attributes.
    pub options: CookieOptions,
}

impl std::fmt::Debug for TransportCookie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportCookie")
            .field("value", &"<redacted>")
            .field("options", &self.options)
            .finish()
    }
}

impl TransportCookie {
    /// Effective cookie name, including any `__Host-` prefix.
    pub fn name(&self) -> Result<String> {
        cookie_name(&self.options)
    }

    /// Render as a `Set-Cookie` header value.
    pub fn to_set_cookie(&self) -> Result<String> {
        if !self.options.secure || !self.options.http_only {
            return Err(Error::Validation(
                "credential cookies must be Secure and HttpOnly".to_string(),
            ));
        }
        build_set_cookie(&self.value, &self.options)
    }
}

/// Wrap a credential into a cookie with `Path=/`, `Secure` and `HttpOnly`.
pub fn package_credential(name: &str, value: &str, max_age_seconds: u64) -> TransportCookie {
    TransportCookie {
        value: value.to_string(),
        options: CookieOptions {
            name: name.to_string(),
            max_age_seconds: Some(max_age_seconds),
            ..CookieOptions::default()
        },
    }
}

/// Effective cookie name, `__Host-` prefix included when requested.
pub fn cookie_name(opts: &CookieOptions) -> Result<String> {
    if opts.name.is_empty() || !opts.name.chars().all(is_token_char) {
        return Err(Error::Validation(format!(
            "invalid cookie name {:?}",
            opts.name
        )));
    }

    if opts.use_host_prefix {
        if !opts.secure {
            return Err(Error::Validation(
                "__Host- cookies must be Secure".to_string(),
            ));
        }
        Ok(format!(
            "__Host-{}",
            opts.name.trim_start_matches("__Host-")
        ))
    } else {
        Ok(opts.name.clone())
    }
}

// RFC 6265 token characters.
fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c)
}

// RFC 6265 cookie-octet.
fn is_cookie_octet(c: char) -> bool {
    matches!(c, '\x21' | '\x23'..='\x2B' | '\x2D'..='\x3A' | '\x3C'..='\x5B' | '\x5D'..='\x7E')
}

/// Build a `Set-Cookie` header value.
pub fn build_set_cookie(value: &str, opts: &CookieOptions) -> Result<String> {
    let name = cookie_name(opts)?;

    if !value.chars().all(is_cookie_octet) {
        return Err(Error::Validation(
            "cookie value contains characters outside cookie-octet".to_string(),
        ));
    }

    let mut parts: Vec<String> = Vec::new();
    parts.push(format!("{name}={value}"));

    if let Some(max_age) = opts.max_age_seconds {
        if max_age > MAX_COOKIE_LIFETIME_SECS {
            return Err(Error::Validation(format!(
                "max-age {max_age}s exceeds {MAX_COOKIE_LIFETIME_SECS}s"
            )));
        }
        parts.push(format!("Max-Age={max_age}"));
        // Expires for older clients.
        let expires = SystemTime::now()
            .checked_add(Duration::from_secs(max_age))
            .ok_or_else(|| Error::Validation(format!("max-age {max_age}s overflows")))?;
        parts.push(format!("Expires={}", fmt_http_date(expires)));
    }

    parts.push("Path=/".to_string());

    if opts.secure {
        parts.push("Secure".to_string());
    }
    if opts.http_only {
        parts.push("HttpOnly".to_string());
    }

    parts.push(format!("SameSite={}", opts.same_site.as_str()));

    Ok(parts.join("; "))
}

/// Find the value of cookie `name` in a request `Cookie` header.
pub fn find_cookie<'a>(cookie_header: &'a str, name: &str) -> Option<&'a str> {
    cookie_header.split(';').find_map(|pair| {
        let (k, v) = pair.trim().split_once('=')?;
        (k == name).then_some(v)
    })
}

/// Build a `Set-Cookie` header value that clears the cookie.
pub fn build_clear_cookie(opts: &CookieOptions) -> Result<String> {
    let name = cookie_name(opts)?;

    let mut parts: Vec<String> = Vec::new();
    parts.push(format!("{name}="));
    parts.push("Max-Age=0".to_string());
    parts.push(format!("Expires={}", fmt_http_date(UNIX_EPOCH)));
    parts.push("Path=/".to_string());

    if opts.secure {
        parts.push("Secure".to_string());
    }
    if opts.http_only {
        parts.push("HttpOnly".to_string());
    }

    parts.push(format!("SameSite={}", opts.same_site.as_str()));

    Ok(parts.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packaged_refresh_cookie() {
        let cookie = package_credential("refresh", "a.b.c", 86_400);
        let sc = cookie.to_set_cookie().unwrap();
        assert!(sc.starts_with("refresh=a.b.c; Max-Age=86400; Expires="));
        assert!(sc.contains("; Path=/"));
        assert!(sc.contains("; Secure"));
        assert!(sc.contains("; HttpOnly"));
        assert!(sc.contains("; SameSite=Lax"));
        assert!(!sc.contains("Domain="));
    }

    #[test]
    fn insecure_credential_cookie_is_refused() {
        let mut cookie = package_credential("refresh", "abc", 60);
        cookie.options.http_only = false;
        assert!(cookie.to_set_cookie().is_err());
    }

    #[test]
    fn host_cookie_name() {
        let mut cookie = package_credential("refresh", "abc", 60);
        cookie.options.use_host_prefix = true;
        assert_eq!(cookie.name().unwrap(), "__Host-refresh");
        assert!(cookie.to_set_cookie().unwrap().starts_with("__Host-refresh=abc"));
    }

    #[test]
    fn host_prefix_is_not_doubled() {
        let opts = CookieOptions {
            name: "__Host-refresh".to_string(),
            use_host_prefix: true,
            ..CookieOptions::default()
        };
        assert_eq!(cookie_name(&opts).unwrap(), "__Host-refresh");
    }

    #[test]
    fn names_outside_token_charset_are_rejected() {
        for name in ["my cookie", "a;b", "", "caf\u{e9}"] {
            let opts = CookieOptions {
                name: name.to_string(),
                ..CookieOptions::default()
            };
            assert!(cookie_name(&opts).is_err(), "{name:?}");
        }
    }

    #[test]
    fn oversized_max_age_is_an_error_not_a_panic() {
        for max_age in [MAX_COOKIE_LIFETIME_SECS + 1, 9_000_000_000_000_000_000] {
            assert!(package_credential("refresh", "abc", max_age).to_set_cookie().is_err());
        }
        let at_cap = package_credential("refresh", "abc", MAX_COOKIE_LIFETIME_SECS);
        assert!(at_cap.to_set_cookie().is_ok());
    }

    #[test]
    fn value_with_separator_is_rejected() {
        let opts = CookieOptions::default();
        assert!(build_set_cookie("abc; Domain=evil", &opts).is_err());
        assert!(build_set_cookie("has space", &opts).is_err());
    }

    #[test]
    fn finds_cookie_in_request_header() {
        let header = "theme=dark; refresh=a.b.c;  other=1";
        assert_eq!(find_cookie(header, "refresh"), Some("a.b.c"));
        assert_eq!(find_cookie(header, "other"), Some("1"));
        assert_eq!(find_cookie(header, "access"), None);
        assert_eq!(find_cookie("", "refresh"), None);
    }

    #[test]
    fn clear_cookie_has_max_age_zero() {
        let opts = CookieOptions::default();
        let sc = build_clear_cookie(&opts).unwrap();
        assert!(sc.starts_with("refresh=; Max-Age=0"));
        assert!(sc.contains("HttpOnly"));
    }
}
