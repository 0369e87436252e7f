// Promptlab CLI
//
// Design Decision: Use clap derive for ergonomic argument parsing.
// Design Decision: Run output goes to stdout as JSON by default; logs go to stderr.
// Design Decision: A run that ends in `error` status exits with code 1.

mod commands;
mod output;
mod run_file;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use promptlab_core::telemetry::{init_tracing, TelemetryConfig};

#[derive(Parser)]
#[command(name = "promptlab")]
#[command(about = "Promptlab CLI - Run simulated conversations against LLM backends")]
#[command(version)]
pub struct Cli {
    /// Output format
    #[arg(long, short, default_value = "json", value_parser = ["text", "json", "yaml"])]
    pub output: String,

    /// Log filter (overrides RUST_LOG)
    #[arg(long, env = "PROMPTLAB_LOG")]
    pub log: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one conversation from a run file
    Run {
        /// Run file (YAML or JSON)
        file: PathBuf,

        /// Use deterministic fakes instead of live providers
        #[arg(long)]
        mock: bool,

        /// Override the run file's turn limit
        #[arg(long)]
        max_turns: Option<u32>,

        /// Override the backend (chat, responses, assistants)
        #[arg(long)]
        backend: Option<String>,
    },

    /// List scorers eligible for a run file's mode and backend
    Scorers {
        /// Run file (YAML or JSON)
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut telemetry = TelemetryConfig::from_env();
    if let Some(filter) = &cli.log {
        telemetry = telemetry.with_log_filter(filter);
    }
    init_tracing(&telemetry);

    let output_format = output::OutputFormat::from_str(&cli.output);

    match cli.command {
        Commands::Run {
            file,
            mock,
            max_turns,
            backend,
        } => {
            let options = commands::run::RunOptions {
                mock,
                max_turns,
                backend,
            };
            let success = commands::run::run(&file, options, output_format).await?;
            if !success {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Scorers { file } => commands::scorers::run(&file, output_format),
    }
}
