use anyhow::Context;
use clap::Subcommand;
use serde_json::json;

use crate::auth::pin as pin_hash;
use crate::cli::utils::{output_success, read_pin};
use crate::cli::OutputFormat;
use crate::config;
use crate::services::PinService;
use crate::types::PinScope;

#[derive(Subcommand)]
pub enum PinCommands {
    #[command(about = "Set the PIN for a scope and revoke its live sessions")]
    Set {
        #[arg(long, help = "staff or manager")]
        scope: PinScope,
        #[arg(long, help = "New PIN (falls back to OPS_PIN or stdin)")]
        pin: Option<String>,
    },

    #[command(about = "Print the bcrypt hash of a PIN without touching the database")]
    Hash {
        #[arg(long, help = "PIN to hash (falls back to OPS_PIN or stdin)")]
        pin: Option<String>,
    },

    #[command(about = "Delete long-expired and revoked PIN sessions")]
    PurgeSessions,
}

pub async fn handle(cmd: PinCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        PinCommands::Set { scope, pin } => {
            let pin = read_pin(pin)?;
            let service = PinService::new().await.context("connecting to database")?;
            let revoked = service.set_pin(scope, &pin).await?;
            output_success(
                output_format,
                &format!("{} PIN updated, {} session(s) revoked", scope, revoked),
                Some(json!({ "scope": scope, "revoked_sessions": revoked })),
            )
        }
        PinCommands::Hash { pin } => {
            let pin = read_pin(pin)?;
            let hash = pin_hash::hash_pin_blocking(pin, config::config().security.bcrypt_cost).await?;
            match output_format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&json!({ "hash": hash }))?),
                OutputFormat::Text => println!("{}", hash),
            }
            Ok(())
        }
        PinCommands::PurgeSessions => {
            let service = PinService::new().await.context("connecting to database")?;
            let purged = service.purge_expired().await?;
            output_success(
                output_format,
                &format!("purged {} PIN session(s)", purged),
                Some(json!({ "purged": purged })),
            )
        }
    }
}
