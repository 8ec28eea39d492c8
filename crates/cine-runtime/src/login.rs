use std::sync::Arc;

use cine_api::{AuthenticatedPrincipal, CineError, CredentialStore, HttpResponse};
use cine_auth::{TokenCategory, TokenIssuer, TransportCookie, package_credential};
use cine_core::{AuthConfig, CookiePolicy};
use httpdate::fmt_http_date;
use tracing::{debug, error, info, warn};

use crate::issue_error;

/// Runs once per successful external login: mints a refresh token, records it,
/// and redirects the client with the token in a cookie.
pub struct LoginSuccessHandler {
    issuer: Arc<TokenIssuer>,
    store: Arc<dyn CredentialStore>,
    refresh_ttl_ms: u64,
    cookie: CookiePolicy,
    redirect_url: String,
}

impl LoginSuccessHandler {
    pub fn new(
        issuer: Arc<TokenIssuer>,
        store: Arc<dyn CredentialStore>,
        config: &AuthConfig,
    ) -> Self {
        Self {
            issuer,
            store,
            refresh_ttl_ms: config.token.refresh_ttl_ms,
            cookie: config.cookie.clone(),
            redirect_url: config.login.redirect_url.clone(),
        }
    }

    /// Redirect with a `Set-Cookie`, or the error that aborted the login.
    ///
    /// Nothing is returned to the client unless the credential was persisted.
    pub fn on_authentication_success(
        &self,
        principal: &dyn AuthenticatedPrincipal,
    ) -> Result<HttpResponse, CineError> {
        let (subject_id, display_name, role) = extract(principal)?;
        debug!(subject_id, role, "login: principal extracted");

        let issued = self
            .issuer
            .issue(
                TokenCategory::Refresh,
                subject_id,
                display_name,
                role,
                self.refresh_ttl_ms,
            )
            .map_err(issue_error)?;
        debug!(subject_id, "login: refresh token issued");

        let expires_at = fmt_http_date(issued.expires_at);
        self.store
            .save(subject_id, &issued.token, &expires_at)
            .inspect_err(|e| error!(subject_id, "login: refresh credential not saved: {e}"))?;
        debug!(subject_id, %expires_at, "login: refresh credential saved");

        let max_age = self.cookie.max_age_for(issued.ttl_seconds());
        let set_cookie = self
            .package(&issued.token, max_age)
            .to_set_cookie()
            .map_err(|e| CineError::Transport(e.to_string()))?;

        info!(subject_id, max_age, "login succeeded");
        Ok(HttpResponse::redirect(&self.redirect_url).with_header("Set-Cookie", set_cookie))
    }

    /// Same as [`Self::on_authentication_success`], with failures rendered as a
    /// bare error response carrying no cookie and no redirect.
    pub fn handle(&self, principal: &dyn AuthenticatedPrincipal) -> HttpResponse {
        self.on_authentication_success(principal)
            .unwrap_or_else(|e| {
                warn!(subject_id = principal.subject_identity(), "login aborted: {e}");
                HttpResponse::new(e.status_code())
            })
    }

    fn package(&self, token: &str, max_age: u64) -> TransportCookie {
        let mut cookie = package_credential(&self.cookie.name, token, max_age);
        cookie.options.same_site = self.cookie.same_site;
        cookie.options.use_host_prefix = self.cookie.host_prefix;
        cookie
    }
}

fn extract(principal: &dyn AuthenticatedPrincipal) -> Result<(&str, &str, &str), CineError> {
    let subject_id = principal.subject_identity();
    if subject_id.trim().is_empty() {
        return Err(CineError::Extraction(
            "principal has no subject identity".to_string(),
        ));
    }
    let display_name = principal.display_name();
    if display_name.trim().is_empty() {
        return Err(CineError::Extraction(format!(
            "principal {subject_id} has no display name"
        )));
    }
    let role = principal
        .roles()
        .first()
        .filter(|r| !r.trim().is_empty())
        .ok_or_else(|| CineError::Extraction(format!("principal {subject_id} has no role")))?;
    Ok((subject_id, display_name, role.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cine_api::OAuthPrincipal;

    #[test]
    fn first_role_wins() {
        let p = OAuthPrincipal::new("u1", "Alice", vec!["USER".into(), "ADMIN".into()]);
        let (sub, name, role) = extract(&p).unwrap();
        assert_eq!((sub, name, role), ("u1", "Alice", "USER"));
    }

    #[test]
    fn missing_fields_are_extraction_errors() {
        for p in [
            OAuthPrincipal::new("u1", "Alice", vec![]),
            OAuthPrincipal::new("u1", "Alice", vec![String::new()]),
            OAuthPrincipal::new("", "Alice", vec!["USER".into()]),
            OAuthPrincipal::new("u1", " ", vec!["USER".into()]),
        ] {
            assert!(matches!(extract(&p), Err(CineError::Extraction(_))));
        }
    }
}
