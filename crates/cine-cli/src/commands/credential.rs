use anyhow::bail;
use cine_api::CredentialStore;
use clap::Subcommand;
use cine_runtime::AuthRuntime;

use crate::pout;

#[derive(Debug, Subcommand)]
pub enum CredentialCommands {
    /// Show the refresh credential on record for a subject
    Show {
        subject: String,
        /// Print the token itself (hidden by default)
        #[arg(long)]
        reveal: bool,
    },
}

pub fn cmd_credential(
    runtime: &AuthRuntime,
    command: CredentialCommands,
    json: bool,
) -> anyhow::Result<()> {
    match command {
        CredentialCommands::Show { subject, reveal } => {
            let Some(record) = runtime.store().find_by_subject_id(&subject)? else {
                bail!("no refresh credential on record for {subject}");
            };
            let value = if reveal {
                record.credential_value.clone()
            } else {
                mask(&record.credential_value)
            };
            pout(
                json,
                serde_json::json!({
                    "subject_id": &record.subject_id,
                    "credential_value": &value,
                    "expires_at": &record.expires_at,
                }),
                &format!(
                    "{}: expires {} ({value})",
                    record.subject_id, record.expires_at
                ),
            )
        }
    }
}

fn mask(token: &str) -> String {
    let head: String = token.chars().take(8).collect();
    format!("{head}…")
}
