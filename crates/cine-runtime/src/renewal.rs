use std::sync::Arc;

use cine_api::{CineError, CredentialStore, HttpResponse};
use cine_auth::{
    CookieOptions, TokenCategory, TokenIssuer, TokenVerifier, build_clear_cookie, cookie_name,
    find_cookie, package_credential,
};
use cine_core::{AuthConfig, CookiePolicy};
use httpdate::fmt_http_date;
use tracing::{debug, info, warn};

use crate::{issue_error, rejection};

/// Response header carrying the new access token.
pub const ACCESS_HEADER: &str = "access";

/// Trades a valid refresh cookie for a new access token and a rotated refresh token.
///
/// A refresh token is accepted only while it is the one on record for its
/// subject; a newer login or renewal supersedes it. Of several concurrent
/// renewals presenting the same token, exactly one succeeds.
pub struct RenewalHandler {
    issuer: Arc<TokenIssuer>,
    verifier: Arc<TokenVerifier>,
    store: Arc<dyn CredentialStore>,
    access_ttl_ms: u64,
    refresh_ttl_ms: u64,
    cookie: CookiePolicy,
    cookie_name: String,
}

impl RenewalHandler {
    pub fn new(
        issuer: Arc<TokenIssuer>,
        verifier: Arc<TokenVerifier>,
        store: Arc<dyn CredentialStore>,
        config: &AuthConfig,
    ) -> Result<Self, CineError> {
        let cookie = config.cookie.clone();
        let cookie_name = cookie_name(&cookie_options(&cookie))
            .map_err(|e| CineError::Configuration(format!("cookie.name: {e}")))?;
        Ok(Self {
            issuer,
            verifier,
            store,
            access_ttl_ms: config.token.access_ttl_ms,
            refresh_ttl_ms: config.token.refresh_ttl_ms,
            cookie,
            cookie_name,
        })
    }

    /// Name of the cookie this handler reads and writes, `__Host-` prefix included.
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Renew from a raw request `Cookie` header.
    pub fn renew_from_cookie_header(
        &self,
        cookie_header: Option<&str>,
    ) -> Result<HttpResponse, CineError> {
        let presented = cookie_header.and_then(|h| find_cookie(h, self.cookie_name()));
        self.renew(presented)
    }

    pub fn renew(&self, presented: Option<&str>) -> Result<HttpResponse, CineError> {
        let presented = presented
            .filter(|t| !t.is_empty())
            .ok_or_else(|| CineError::Auth("refresh token missing".to_string()))?;

        let claims = self
            .verifier
            .verify_category(presented, TokenCategory::Refresh)
            .map_err(rejection)?;
        let subject_id = claims.sub.as_str();

        let refresh = self
            .issuer
            .issue(
                TokenCategory::Refresh,
                subject_id,
                &claims.name,
                &claims.role,
                self.refresh_ttl_ms,
            )
            .map_err(issue_error)?;
        let rotated = self.store.replace_if_current(
            subject_id,
            presented,
            &refresh.token,
            &fmt_http_date(refresh.expires_at),
        )?;
        if !rotated {
            return Err(CineError::Auth(format!(
                "refresh token for {subject_id} is not the one on record"
            )));
        }
        debug!(subject_id, "renewal: refresh token rotated in store");

        let access = self
            .issuer
            .issue(
                TokenCategory::Access,
                subject_id,
                &claims.name,
                &claims.role,
                self.access_ttl_ms,
            )
            .map_err(issue_error)?;

        let mut cookie = package_credential(
            &self.cookie.name,
            &refresh.token,
            self.cookie.max_age_for(refresh.ttl_seconds()),
        );
        cookie.options.same_site = self.cookie.same_site;
        cookie.options.use_host_prefix = self.cookie.host_prefix;
        let set_cookie = cookie
            .to_set_cookie()
            .map_err(|e| CineError::Transport(e.to_string()))?;

        info!(subject_id, "refresh token rotated");
        Ok(HttpResponse::new(200)
            .with_header(ACCESS_HEADER, access.token)
            .with_header("Set-Cookie", set_cookie))
    }

    /// Like [`Self::renew_from_cookie_header`], with failures rendered as responses.
    /// A rejected refresh token is also cleared from the browser.
    pub fn handle(&self, cookie_header: Option<&str>) -> HttpResponse {
        match self.renew_from_cookie_header(cookie_header) {
            Ok(resp) => resp,
            Err(e @ CineError::Auth(_)) => {
                warn!("renewal rejected: {e}");
                let resp = HttpResponse::new(e.status_code());
                match build_clear_cookie(&cookie_options(&self.cookie)) {
                    Ok(clear) => resp.with_header("Set-Cookie", clear),
                    Err(_) => resp,
                }
            }
            Err(e) => {
                warn!("renewal failed: {e}");
                HttpResponse::new(e.status_code())
            }
        }
    }
}

fn cookie_options(cookie: &CookiePolicy) -> CookieOptions {
    CookieOptions {
        name: cookie.name.clone(),
        same_site: cookie.same_site,
        use_host_prefix: cookie.host_prefix,
        ..CookieOptions::default()
    }
}
