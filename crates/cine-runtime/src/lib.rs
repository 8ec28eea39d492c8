mod login;
mod renewal;

use std::sync::Arc;

use cine_api::{CineError, CredentialStore, SecretStore};
use cine_auth::{TokenIssuer, TokenVerifier, VerifyOptions};
use cine_connectors::{EnvSecretStore, InMemoryCredentialStore, JsonFileCredentialStore};
use cine_core::{AuthConfig, StoreConfig, validate_config};
use tracing::info;

pub use login::LoginSuccessHandler;
pub use renewal::{ACCESS_HEADER, RenewalHandler};

/// Everything the login and renewal paths need, built once at startup.
pub struct AuthRuntime {
    config: AuthConfig,
    store: Arc<dyn CredentialStore>,
    verifier: Arc<TokenVerifier>,
    login: LoginSuccessHandler,
    renewal: RenewalHandler,
}

impl AuthRuntime {
    /// Signing key from the environment, store from configuration.
    pub fn from_config(config: AuthConfig) -> Result<Self, CineError> {
        let store = store_from_config(&config.store);
        Self::from_config_with_store(config, &EnvSecretStore, store)
    }

    pub fn from_config_with_store(
        config: AuthConfig,
        secrets: &dyn SecretStore,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self, CineError> {
        validate_config(&config)?;

        let secret = secrets.get(&config.token.secret_ref)?;
        let mut issuer = TokenIssuer::new(secret.as_bytes()).map_err(issue_error)?;
        if let Some(iss) = &config.token.issuer {
            issuer = issuer.with_issuer(iss.clone());
        }
        let verifier = TokenVerifier::new(
            secret.as_bytes(),
            &VerifyOptions {
                issuer: config.token.issuer.clone(),
                leeway_seconds: config.token.leeway_seconds,
            },
        )
        .map_err(issue_error)?;

        let issuer = Arc::new(issuer);
        let verifier = Arc::new(verifier);
        let login = LoginSuccessHandler::new(Arc::clone(&issuer), Arc::clone(&store), &config);
        let renewal = RenewalHandler::new(
            issuer,
            Arc::clone(&verifier),
            Arc::clone(&store),
            &config,
        )?;

        info!(
            secret_ref = %config.token.secret_ref,
            refresh_ttl_ms = config.token.refresh_ttl_ms,
            "auth runtime ready"
        );

        Ok(Self {
            config,
            store,
            verifier,
            login,
            renewal,
        })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn login(&self) -> &LoginSuccessHandler {
        &self.login
    }

    pub fn renewal(&self) -> &RenewalHandler {
        &self.renewal
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }
}

pub fn store_from_config(cfg: &StoreConfig) -> Arc<dyn CredentialStore> {
    match cfg {
        StoreConfig::Memory => Arc::new(InMemoryCredentialStore::new()),
        StoreConfig::File { path } => Arc::new(JsonFileCredentialStore::new(path.clone())),
    }
}

/// Map a failure while minting a token.
pub(crate) fn issue_error(e: cine_auth::Error) -> CineError {
    match e {
        cine_auth::Error::Configuration(msg) => CineError::Configuration(msg),
        other => CineError::Token(other.to_string()),
    }
}

/// Map a failure while checking a presented token.
pub(crate) fn rejection(e: cine_auth::Error) -> CineError {
    match e {
        cine_auth::Error::Configuration(msg) => CineError::Configuration(msg),
        other => CineError::Auth(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cine_connectors::StaticSecretStore;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn missing_secret_fails_at_startup() {
        let err = AuthRuntime::from_config_with_store(
            AuthConfig::default(),
            &StaticSecretStore::default(),
            Arc::new(InMemoryCredentialStore::new()),
        )
        .err()
        .unwrap();
        assert!(matches!(err, CineError::Configuration(_)));
    }

    #[test]
    fn short_secret_fails_at_startup() {
        let secrets = StaticSecretStore::default().with("CINE_JWT_SECRET", "too-short");
        let err = AuthRuntime::from_config_with_store(
            AuthConfig::default(),
            &secrets,
            Arc::new(InMemoryCredentialStore::new()),
        )
        .err()
        .unwrap();
        assert!(matches!(err, CineError::Configuration(_)));
    }

    #[test]
    fn builds_with_valid_secret() {
        let secrets = StaticSecretStore::default().with("CINE_JWT_SECRET", SECRET);
        let runtime = AuthRuntime::from_config_with_store(
            AuthConfig::default(),
            &secrets,
            Arc::new(InMemoryCredentialStore::new()),
        )
        .unwrap();
        assert_eq!(runtime.renewal().cookie_name(), "refresh");
        assert_eq!(runtime.config().token.refresh_ttl_ms, 86_400_000);
    }

    #[test]
    fn rejections_map_to_auth() {
        assert!(matches!(
            rejection(cine_auth::Error::Expired),
            CineError::Auth(_)
        ));
        assert!(matches!(
            issue_error(cine_auth::Error::Validation("x".into())),
            CineError::Token(_)
        ));
    }
}
