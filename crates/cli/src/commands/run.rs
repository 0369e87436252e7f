// Conversation run command

use std::path::Path;

use promptlab_core::config::{ExecutionMode, RunConfig};
use promptlab_core::registry::BackendRegistry;
use promptlab_core::BackendKind;
use tracing::info;

use crate::output::{print_field, OutputFormat};
use crate::run_file::{resolve_credentials, RunFile};

/// Command-line overrides applied on top of the run file
#[derive(Debug, Default)]
pub struct RunOptions {
    pub mock: bool,
    pub max_turns: Option<u32>,
    pub backend: Option<String>,
}

impl RunOptions {
    fn apply(&self, config: &mut RunConfig) -> anyhow::Result<()> {
        if self.mock {
            config.backend.mode = ExecutionMode::Mock;
        }
        if let Some(max_turns) = self.max_turns {
            config.max_turns = max_turns;
        }
        if let Some(backend) = &self.backend {
            config.backend.backend = backend.parse::<BackendKind>()?;
        }
        Ok(())
    }
}

/// Registry with mock factories and every live provider
pub fn registry() -> BackendRegistry {
    let mut registry = BackendRegistry::with_mocks();
    promptlab_openai::register_backends(&mut registry);
    promptlab_anthropic::register_interlocutor(&mut registry);
    registry
}

/// Run the conversation and print its outcome; returns whether it completed
pub async fn run(file: &Path, options: RunOptions, format: OutputFormat) -> anyhow::Result<bool> {
    let mut config = RunFile::load(file)?.run;
    options.apply(&mut config)?;
    resolve_credentials(&mut config, |var| std::env::var(var).ok());

    info!(
        file = %file.display(),
        backend = %config.backend.backend,
        mode = %config.backend.mode,
        "Loaded run file"
    );

    let outcome = promptlab_core::run(&config, &registry()).await?;

    if format.is_text() {
        for message in &outcome.messages {
            println!("[{}] {}: {}", message.turn, message.role, message.content);
        }
        println!();
        print_field("Run", &outcome.run_id.to_string());
        print_field("Status", &outcome.status.to_string());
        if let Some(usage) = &outcome.usage {
            print_field("Tokens", &usage.total_tokens.to_string());
        }
        if let Some(error) = &outcome.error {
            print_field("Error", error);
        }
    } else {
        format.print_value(&outcome)?;
    }

    Ok(outcome.is_success())
}
