use std::fs;
use std::path::{Path, PathBuf};

use cine_api::CineError;
use cine_auth::{CookieOptions, MAX_COOKIE_LIFETIME_SECS, SameSite, cookie_name};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "auth.toml";

const DAY_MS: u64 = 24 * 60 * 60 * 1000;
const TEN_MINUTES_MS: u64 = 10 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenPolicy {
    /// Name of the secret holding the HS256 key (an env var for the default store).
    pub secret_ref: String,
    pub issuer: Option<String>,
    pub refresh_ttl_ms: u64,
    pub access_ttl_ms: u64,
    pub leeway_seconds: u64,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            secret_ref: "CINE_JWT_SECRET".to_string(),
            issuer: None,
            refresh_ttl_ms: DAY_MS,
            access_ttl_ms: TEN_MINUTES_MS,
            leeway_seconds: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CookiePolicy {
    pub name: String,
    /// Fixed Max-Age. When absent the cookie lives exactly as long as the refresh token.
    pub max_age_seconds: Option<u64>,
    pub same_site: SameSite,
    pub host_prefix: bool,
}

impl Default for CookiePolicy {
    fn default() -> Self {
        Self {
            name: "refresh".to_string(),
            max_age_seconds: None,
            same_site: SameSite::Lax,
            host_prefix: false,
        }
    }
}

impl CookiePolicy {
    pub fn max_age_for(&self, token_ttl_seconds: u64) -> u64 {
        self.max_age_seconds.unwrap_or(token_ttl_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginPolicy {
    pub redirect_url: String,
}

impl Default for LoginPolicy {
    fn default() -> Self {
        Self {
            redirect_url: "http://localhost:3000/getAccess".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreConfig {
    #[default]
    Memory,
    File {
        path: PathBuf,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub token: TokenPolicy,
    pub cookie: CookiePolicy,
    pub login: LoginPolicy,
    pub store: StoreConfig,
}

pub fn validate_config(config: &AuthConfig) -> Result<(), CineError> {
    let token = &config.token;
    if token.secret_ref.trim().is_empty() {
        return Err(CineError::Validation(
            "token.secret_ref must not be empty".to_string(),
        ));
    }
    if token.refresh_ttl_ms == 0 || token.access_ttl_ms == 0 {
        return Err(CineError::Validation(
            "token TTLs must be positive".to_string(),
        ));
    }
    if token.refresh_ttl_ms > MAX_COOKIE_LIFETIME_SECS * 1000 {
        return Err(CineError::Validation(format!(
            "refresh_ttl_ms ({}) exceeds the {MAX_COOKIE_LIFETIME_SECS}s cookie lifetime cap",
            token.refresh_ttl_ms
        )));
    }
    if token.access_ttl_ms > token.refresh_ttl_ms {
        return Err(CineError::Validation(format!(
            "access_ttl_ms ({}) exceeds refresh_ttl_ms ({})",
            token.access_ttl_ms, token.refresh_ttl_ms
        )));
    }

    let cookie = &config.cookie;
    cookie_name(&CookieOptions {
        name: cookie.name.clone(),
        use_host_prefix: cookie.host_prefix,
        ..CookieOptions::default()
    })
    .map_err(|e| CineError::Validation(format!("cookie.name: {e}")))?;
    match cookie.max_age_seconds {
        Some(0) => {
            return Err(CineError::Validation(
                "cookie.max_age_seconds must be positive".to_string(),
            ));
        }
        Some(secs) if secs > MAX_COOKIE_LIFETIME_SECS => {
            return Err(CineError::Validation(format!(
                "cookie.max_age_seconds ({secs}) exceeds {MAX_COOKIE_LIFETIME_SECS}"
            )));
        }
        _ => {}
    }

    let url = config.login.redirect_url.as_str();
    if !(url.starts_with("https://") || url.starts_with("http://") || url.starts_with('/')) {
        return Err(CineError::Validation(format!(
            "login.redirect_url must be absolute http(s) or a path, got {url}"
        )));
    }

    if let StoreConfig::File { path } = &config.store {
        if path.as_os_str().is_empty() {
            return Err(CineError::Validation(
                "store.path must not be empty".to_string(),
            ));
        }
    }

    Ok(())
}

pub fn demo_config() -> AuthConfig {
    AuthConfig::default()
}

pub fn default_config_dir() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".config").join("cine")
    } else {
        PathBuf::from(".cine")
    }
}

/// Load `auth.toml` from `dir`. A relative file-store path is resolved against `dir`.
pub fn load_config_from_dir(dir: &Path) -> Result<AuthConfig, CineError> {
    let mut config = load_config_from_file(&dir.join(CONFIG_FILE))?;
    if let StoreConfig::File { path } = &mut config.store {
        if path.is_relative() {
            *path = dir.join(&*path);
        }
    }
    Ok(config)
}

pub fn load_config_from_file(path: &Path) -> Result<AuthConfig, CineError> {
    let content = fs::read_to_string(path)
        .map_err(|e| CineError::NotFound(format!("failed to read {}: {e}", path.display())))?;
    parse_config(&content).map_err(|e| match e {
        CineError::Validation(msg) => {
            CineError::Validation(format!("{}: {msg}", path.display()))
        }
        other => other,
    })
}

pub fn parse_config(content: &str) -> Result<AuthConfig, CineError> {
    let config: AuthConfig = toml::from_str(content)
        .map_err(|e| CineError::Validation(format!("invalid TOML: {e}")))?;
    validate_config(&config)?;
    Ok(config)
}

pub fn write_default_config_files(dir: &Path) -> Result<(), CineError> {
    fs::create_dir_all(dir)
        .map_err(|e| CineError::Internal(format!("failed to create {}: {e}", dir.display())))?;

    let files: [(&str, &str); 1] = [(
        CONFIG_FILE,
        include_str!("../../../docs/cine-cli/examples/auth.toml.example"),
    )];

    for (name, body) in files {
        let path = dir.join(name);
        if !path.exists() {
            fs::write(&path, body).map_err(|e| {
                CineError::Internal(format!("failed to write {}: {e}", path.display()))
            })?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config, AuthConfig::default());
        assert_eq!(config.token.refresh_ttl_ms, 86_400_000);
        assert_eq!(config.cookie.name, "refresh");
        assert_eq!(config.store, StoreConfig::Memory);
    }

    #[test]
    fn cookie_lifetime_follows_token_unless_fixed() {
        let mut cookie = CookiePolicy::default();
        assert_eq!(cookie.max_age_for(86_400), 86_400);
        cookie.max_age_seconds = Some(216_000);
        assert_eq!(cookie.max_age_for(86_400), 216_000);
    }

    #[test]
    fn parses_full_file() {
        let config = parse_config(
            r#"
            [token]
            secret_ref = "MY_SECRET"
            issuer = "cine-back"
            refresh_ttl_ms = 3600000
            access_ttl_ms = 60000

            [cookie]
            name = "rt"
            same_site = "strict"
            host_prefix = true

            [login]
            redirect_url = "https://cine.example/getAccess"

            [store]
            kind = "file"
            path = "creds.json"
            "#,
        )
        .unwrap();
        assert_eq!(config.token.secret_ref, "MY_SECRET");
        assert_eq!(config.token.issuer.as_deref(), Some("cine-back"));
        assert_eq!(config.cookie.same_site, SameSite::Strict);
        assert!(config.cookie.host_prefix);
        assert_eq!(
            config.store,
            StoreConfig::File {
                path: PathBuf::from("creds.json")
            }
        );
    }

    #[test]
    fn rejects_bad_values() {
        assert!(parse_config("[token]\nrefresh_ttl_ms = 0").is_err());
        assert!(parse_config("[token]\naccess_ttl_ms = 999999999999").is_err());
        assert!(parse_config("[login]\nredirect_url = \"javascript:alert(1)\"").is_err());
        assert!(parse_config("[cookie]\nmax_age_seconds = 0").is_err());
        assert!(parse_config("[store]\nkind = \"redis\"").is_err());
        assert!(parse_config("[token]\nrefresh_ttl_ms = 1000000000000000").is_err());
        assert!(parse_config("[cookie]\nmax_age_seconds = 9000000000000000000").is_err());
        assert!(parse_config("[cookie]\nname = \"my cookie\"").is_err());
        assert!(parse_config("[cookie]\nname = \"\"").is_err());
    }

    #[test]
    fn accepts_lifetimes_up_to_the_cookie_cap() {
        let mut config = AuthConfig::default();
        config.token.refresh_ttl_ms = MAX_COOKIE_LIFETIME_SECS * 1000;
        config.cookie.max_age_seconds = Some(MAX_COOKIE_LIFETIME_SECS);
        config.cookie.name = "__Host-rt".to_string();
        config.cookie.host_prefix = true;
        validate_config(&config).unwrap();
    }

    #[test]
    fn relative_store_path_resolves_against_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            "[store]\nkind = \"file\"\npath = \"creds.json\"\n",
        )
        .unwrap();
        let config = load_config_from_dir(dir.path()).unwrap();
        assert_eq!(
            config.store,
            StoreConfig::File {
                path: dir.path().join("creds.json")
            }
        );
    }

    #[test]
    fn default_files_are_valid() {
        let dir = tempfile::tempdir().unwrap();
        write_default_config_files(dir.path()).unwrap();
        let config = load_config_from_dir(dir.path()).unwrap();
        assert_eq!(config.login.redirect_url, "http://localhost:3000/getAccess");
    }
}
