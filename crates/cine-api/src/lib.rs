use std::fmt;

use serde::{Deserialize, Serialize};

pub type SubjectId = String;
pub type SecretRef = String;

/// Narrow view of an identity produced by an external login handshake.
///
/// Provider-specific principals implement this so the login path never
/// depends on a concrete provider type.
pub trait AuthenticatedPrincipal {
    fn subject_identity(&self) -> &str;
    fn display_name(&self) -> &str;
    /// Granted roles in provider order. Expected to be non-empty.
    fn roles(&self) -> &[String];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthPrincipal {
    pub subject_id: SubjectId,
    pub display_name: String,
    pub roles: Vec<String>,
}

impl OAuthPrincipal {
    pub fn new(
        subject_id: impl Into<String>,
        display_name: impl Into<String>,
        roles: Vec<String>,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            display_name: display_name.into(),
            roles,
        }
    }
}

impl AuthenticatedPrincipal for OAuthPrincipal {
    fn subject_identity(&self) -> &str {
        &self.subject_id
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn roles(&self) -> &[String] {
        &self.roles
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshRecord {
    pub subject_id: SubjectId,
    pub credential_value: String,
    pub expires_at: String,
}

impl fmt::Debug for RefreshRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshRecord")
            .field("subject_id", &self.subject_id)
            .field("credential_value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Framework-neutral response produced by the login and renewal handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
        }
    }

    pub fn redirect(location: &str) -> Self {
        Self::new(302).with_header("Location", location)
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// First header with this name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status) && self.header("Location").is_some()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CineError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("principal extraction failed: {0}")]
    Extraction(String),
    #[error("token error: {0}")]
    Token(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("authentication error: {0}")]
    Auth(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl CineError {
    /// HTTP status surfaced to the client. Only rejected credentials are 401;
    /// everything else is a generic server error.
    pub fn status_code(&self) -> u16 {
        match self {
            CineError::Auth(_) => 401,
            _ => 500,
        }
    }
}

pub trait SecretStore: Send + Sync {
    fn get(&self, secret_ref: &str) -> Result<String, CineError>;
}

/// Keeps one renewable credential per subject.
pub trait CredentialStore: Send + Sync {
    /// Insert or replace the record for `subject_id`. Atomic per subject.
    fn save(
        &self,
        subject_id: &str,
        credential_value: &str,
        expires_at: &str,
    ) -> Result<(), CineError>;

    fn find_by_subject_id(&self, subject_id: &str) -> Result<Option<RefreshRecord>, CineError>;

    /// Replace the record for `subject_id` only if its current value is `expected`.
    ///
    /// Returns `false`, leaving the store untouched, when there is no record or
    /// it holds a different value. The check and the write are one atomic step.
    fn replace_if_current(
        &self,
        subject_id: &str,
        expected: &str,
        credential_value: &str,
        expires_at: &str,
    ) -> Result<bool, CineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let resp = HttpResponse::redirect("/next").with_header("Set-Cookie", "refresh=abc");
        assert_eq!(resp.header("location"), Some("/next"));
        assert_eq!(resp.headers_named("set-cookie").count(), 1);
        assert!(resp.is_redirect());
    }

    #[test]
    fn server_error_is_not_a_redirect() {
        let resp = HttpResponse::new(500);
        assert!(!resp.is_redirect());
        assert_eq!(CineError::Storage("down".into()).status_code(), 500);
        assert_eq!(CineError::Auth("stale".into()).status_code(), 401);
    }

    #[test]
    fn record_debug_hides_credential() {
        let record = RefreshRecord {
            subject_id: "u1".into(),
            credential_value: "secret-token".into(),
            expires_at: "Thu, 01 Jan 1970 00:00:00 GMT".into(),
        };
        let dbg = format!("{record:?}");
        assert!(!dbg.contains("secret-token"));
        assert!(dbg.contains("u1"));
    }
}
