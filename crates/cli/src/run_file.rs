// Run file loading
//
// A run file is a RunConfig plus an optional list of scorers. Files ending in
// `.json` are read as JSON; everything else as YAML.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use promptlab_core::config::{InterlocutorProvider, RunConfig};
use promptlab_core::evaluators::ScorerDescriptor;

pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";

#[derive(Debug, Clone, Deserialize)]
pub struct RunFile {
    #[serde(flatten)]
    pub run: RunConfig,

    #[serde(default)]
    pub scorers: Vec<ScorerDescriptor>,
}

impl RunFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read run file {}", path.display()))?;
        Self::parse(&contents, path)
    }

    fn parse(contents: &str, path: &Path) -> anyhow::Result<Self> {
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            serde_json::from_str(contents)
                .with_context(|| format!("Invalid JSON run file {}", path.display()))
        } else {
            serde_yaml::from_str(contents)
                .with_context(|| format!("Invalid YAML run file {}", path.display()))
        }
    }
}

/// Fill missing API keys from the environment.
///
/// Keys already present in the run file win. The backend always uses the
/// OpenAI key; the interlocutor uses its provider's key.
pub fn resolve_credentials<F>(config: &mut RunConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if config.backend.api_key.is_none() {
        config.backend.api_key = lookup(OPENAI_API_KEY);
    }
    if config.interlocutor.api_key.is_none() {
        let var = match config.interlocutor.provider {
            InterlocutorProvider::Openai => OPENAI_API_KEY,
            InterlocutorProvider::Anthropic => ANTHROPIC_API_KEY,
        };
        config.interlocutor.api_key = lookup(var);
    }
}
