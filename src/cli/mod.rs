pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "opsctl")]
#[command(about = "Operations CLI - PIN administration and attendance maintenance")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Manage shared PINs and PIN sessions")]
    Pin {
        #[command(subcommand)]
        cmd: commands::pin::PinCommands,
    },

    #[command(about = "Attendance maintenance")]
    Attendance {
        #[command(subcommand)]
        cmd: commands::attendance::AttendanceCommands,
    },

    #[command(about = "Apply database migrations")]
    Migrate,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Pin { cmd } => commands::pin::handle(cmd, output_format).await,
        Commands::Attendance { cmd } => commands::attendance::handle(cmd, output_format).await,
        Commands::Migrate => commands::migrate::handle(output_format).await,
    }
}
