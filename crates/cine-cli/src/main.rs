mod commands;

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use cine_api::{CineError, OAuthPrincipal};
use cine_core::{
    AuthConfig, CONFIG_FILE, StoreConfig, default_config_dir, demo_config, load_config_from_dir,
    write_default_config_files,
};
use cine_runtime::{ACCESS_HEADER, AuthRuntime};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::commands::credential;
use crate::commands::token;

#[derive(Debug, Parser)]
#[command(name = "cine", about = "cine auth: refresh-token lifecycle tooling")]
struct Cli {
    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Write a default auth.toml
    Init {
        #[arg(long)]
        force: bool,
    },
    /// Run the login-success flow for a principal, as the identity provider callback would
    Login {
        #[arg(long)]
        subject: String,
        #[arg(long)]
        name: String,
        /// Granted role; repeat for several. The first one is used.
        #[arg(long = "role")]
        roles: Vec<String>,
    },
    /// Exchange a refresh token for an access token and a rotated refresh token
    Renew {
        #[arg(long)]
        refresh: String,
    },
    /// Stored refresh credentials
    Credential {
        #[command(subcommand)]
        command: credential::CredentialCommands,
    },
    /// Token inspection
    Token {
        #[command(subcommand)]
        command: token::TokenCommands,
    },
}

fn main() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();
    let cfg_dir = cli.config_dir.clone().unwrap_or_else(default_config_dir);

    match cli.command {
        Commands::Init { force } => {
            let path = cfg_dir.join(CONFIG_FILE);
            if force && path.exists() {
                fs::remove_file(&path)?;
            }
            write_default_config_files(&cfg_dir)?;
            pout(
                cli.json,
                serde_json::json!({"message":"init complete","config_dir":cfg_dir}),
                "Init complete",
            )?;
        }
        Commands::Login {
            subject,
            name,
            roles,
        } => {
            let runtime = build_runtime(&cfg_dir)?;
            let principal = OAuthPrincipal::new(subject, name, roles);
            let resp = runtime.login().on_authentication_success(&principal)?;
            let location = resp.header("Location").unwrap_or_default().to_string();
            pout(
                cli.json,
                serde_json::to_value(&resp)?,
                &format!("Login succeeded; redirecting to {location}"),
            )?;
        }
        Commands::Renew { refresh } => {
            let runtime = build_runtime(&cfg_dir)?;
            let resp = runtime.renewal().renew(Some(&refresh))?;
            let access = resp.header(ACCESS_HEADER).unwrap_or_default().to_string();
            pout(
                cli.json,
                serde_json::to_value(&resp)?,
                &format!("Refresh token rotated\naccess: {access}"),
            )?;
        }
        Commands::Credential { command } => {
            let runtime = build_runtime(&cfg_dir)?;
            return credential::cmd_credential(&runtime, command, cli.json);
        }
        Commands::Token { command } => {
            let runtime = build_runtime(&cfg_dir)?;
            return token::cmd_token(&runtime, command, cli.json);
        }
    }

    Ok(())
}

fn build_runtime(cfg_dir: &Path) -> anyhow::Result<AuthRuntime> {
    let config = load_config(cfg_dir)?;
    Ok(AuthRuntime::from_config(config)?)
}

/// Credentials survive between runs even without an `auth.toml`.
const DEMO_STORE_FILE: &str = "credentials.json";

fn load_config(cfg_dir: &Path) -> anyhow::Result<AuthConfig> {
    match load_config_from_dir(cfg_dir) {
        Ok(c) => Ok(c),
        Err(CineError::NotFound(msg)) => {
            let mut config = demo_config();
            let path = cfg_dir.join(DEMO_STORE_FILE);
            warn!(store = %path.display(), "{msg}; using built-in defaults");
            config.store = StoreConfig::File { path };
            Ok(config)
        }
        Err(e) => Err(e.into()),
    }
}

pub fn pout(json_mode: bool, value: serde_json::Value, text: &str) -> anyhow::Result<()> {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{text}");
    }
    Ok(())
}
