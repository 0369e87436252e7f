// Evaluator dispatch
//
// Scorers declare a single compatibility tag. Eligibility is a lookup in a
// small table keyed by (tag, run mode, backend), not a type hierarchy:
//
//   mode          backend        single-turn  conversational  assistants-only
//   single_turn   any            yes          no              no
//   conversational assistants    no           yes             yes
//   conversational other         no           yes             no
//
// `assistants-only` scorers need run-step detail (file-search hits) that only
// the thread/run backend produces.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::backends::BackendKind;
use crate::error::{EngineError, Result};

/// Compatibility tag declared by a scorer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApiTypeTag {
    SingleTurn,
    Conversational,
    AssistantsOnly,
}

impl ApiTypeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiTypeTag::SingleTurn => "single-turn",
            ApiTypeTag::Conversational => "conversational",
            ApiTypeTag::AssistantsOnly => "assistants-only",
        }
    }
}

impl std::fmt::Display for ApiTypeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiTypeTag {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "single-turn" => Ok(ApiTypeTag::SingleTurn),
            "conversational" => Ok(ApiTypeTag::Conversational),
            "assistants-only" => Ok(ApiTypeTag::AssistantsOnly),
            other => Err(EngineError::config(format!("unknown api type tag: {other}"))),
        }
    }
}

/// Whether a run is a one-shot prompt or a simulated conversation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Exactly one user message and one reply
    SingleTurn,
    #[default]
    Conversational,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::SingleTurn => write!(f, "single_turn"),
            RunMode::Conversational => write!(f, "conversational"),
        }
    }
}

/// Whether a scorer tagged `tag` applies to a run in `mode` on `backend`
pub fn is_eligible(tag: ApiTypeTag, mode: RunMode, backend: BackendKind) -> bool {
    match (mode, tag) {
        (RunMode::SingleTurn, ApiTypeTag::SingleTurn) => true,
        (RunMode::SingleTurn, _) => false,
        (RunMode::Conversational, ApiTypeTag::SingleTurn) => false,
        (RunMode::Conversational, ApiTypeTag::Conversational) => true,
        (RunMode::Conversational, ApiTypeTag::AssistantsOnly) => {
            backend == BackendKind::Assistants
        }
    }
}

/// A scoring implementation
pub trait Evaluator: Send + Sync {
    fn name(&self) -> &str;

    fn api_type(&self) -> ApiTypeTag;

    fn is_eligible(&self, mode: RunMode, backend: BackendKind) -> bool {
        is_eligible(self.api_type(), mode, backend)
    }
}

/// Name and tag of a scorer, as listed in run files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScorerDescriptor {
    pub name: String,
    pub api_type: ApiTypeTag,
}

impl ScorerDescriptor {
    pub fn new(name: impl Into<String>, api_type: ApiTypeTag) -> Self {
        Self {
            name: name.into(),
            api_type,
        }
    }
}

impl Evaluator for ScorerDescriptor {
    fn name(&self) -> &str {
        &self.name
    }

    fn api_type(&self) -> ApiTypeTag {
        self.api_type
    }
}

/// Registered scorers, in registration order
#[derive(Debug, Clone, Default)]
pub struct EvaluatorRegistry {
    scorers: Vec<ScorerDescriptor>,
}

impl EvaluatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a scorer; a later registration with the same name replaces
    /// the earlier one in place
    pub fn register(&mut self, evaluator: &dyn Evaluator) {
        let descriptor = ScorerDescriptor::new(evaluator.name(), evaluator.api_type());
        match self.scorers.iter_mut().find(|s| s.name == descriptor.name) {
            Some(existing) => *existing = descriptor,
            None => self.scorers.push(descriptor),
        }
    }

    pub fn len(&self) -> usize {
        self.scorers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scorers.is_empty()
    }

    /// Scorers applicable to a run
    pub fn eligible(&self, mode: RunMode, backend: BackendKind) -> Vec<&ScorerDescriptor> {
        self.scorers
            .iter()
            .filter(|s| s.is_eligible(mode, backend))
            .collect()
    }
}

impl FromIterator<ScorerDescriptor> for EvaluatorRegistry {
    fn from_iter<I: IntoIterator<Item = ScorerDescriptor>>(iter: I) -> Self {
        let mut registry = Self::new();
        for descriptor in iter {
            registry.register(&descriptor);
        }
        registry
    }
}
