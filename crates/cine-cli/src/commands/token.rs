use clap::{Subcommand, ValueEnum};
use cine_auth::TokenCategory;
use cine_runtime::AuthRuntime;

use crate::pout;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CategoryArg {
    Access,
    Refresh,
}

impl From<CategoryArg> for TokenCategory {
    fn from(arg: CategoryArg) -> Self {
        match arg {
            CategoryArg::Access => TokenCategory::Access,
            CategoryArg::Refresh => TokenCategory::Refresh,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum TokenCommands {
    /// Verify a token's signature and expiry and print its claims
    Verify {
        token: String,
        /// Also require this category
        #[arg(long, value_enum)]
        category: Option<CategoryArg>,
    },
}

pub fn cmd_token(runtime: &AuthRuntime, command: TokenCommands, json: bool) -> anyhow::Result<()> {
    match command {
        TokenCommands::Verify { token, category } => {
            let claims = match category {
                Some(c) => runtime.verifier().verify_category(&token, c.into())?,
                None => runtime.verifier().verify(&token)?,
            };
            pout(
                json,
                serde_json::to_value(&claims)?,
                &format!(
                    "valid {} token for {} ({}, role {}), expires at {}",
                    claims.category, claims.sub, claims.name, claims.role, claims.exp
                ),
            )
        }
    }
}
