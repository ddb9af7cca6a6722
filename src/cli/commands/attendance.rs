use anyhow::Context;
use clap::Subcommand;
use serde_json::json;

use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::services::{reconcile, AttendanceService};
use crate::types::PersonKind;

#[derive(Subcommand)]
pub enum AttendanceCommands {
    #[command(about = "Auto-checkout sessions left open past the stale timeout")]
    Reconcile,

    #[command(about = "List everyone currently checked in")]
    Open {
        #[arg(long, help = "student or staff (default: both)")]
        kind: Option<PersonKind>,
    },
}

pub async fn handle(cmd: AttendanceCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let service = AttendanceService::new().await.context("connecting to database")?;

    match cmd {
        AttendanceCommands::Reconcile => {
            let report = reconcile(&service, service.stale_after()).await;
            if report.all_failed() {
                anyhow::bail!("reconciliation failed for every person kind");
            }
            let message = if report.all_ok() {
                format!("auto-checked-out {} stale session(s)", report.total_closed())
            } else {
                format!("partially reconciled: {} stale session(s) closed", report.total_closed())
            };
            output_success(output_format, &message, Some(json!({ "report": report })))
        }
        AttendanceCommands::Open { kind } => {
            let kinds = kind.map(|k| vec![k]).unwrap_or_else(|| PersonKind::ALL.to_vec());
            for kind in kinds {
                let sessions = service.open_sessions(kind).await?;
                match output_format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&json!({ "kind": kind, "sessions": sessions }))?)
                    }
                    OutputFormat::Text => {
                        println!("{} ({} open)", kind, sessions.len());
                        println!("{:<38} {:<20} {}", "PERSON", "CHECKED IN", "KIOSK");
                        println!("{}", "-".repeat(72));
                        for s in &sessions {
                            println!(
                                "{:<38} {:<20} {}",
                                s.person_id,
                                s.checked_in_at.format("%Y-%m-%d %H:%M"),
                                s.kiosk.as_deref().unwrap_or("-")
                            );
                        }
                    }
                }
            }
            Ok(())
        }
    }
}
