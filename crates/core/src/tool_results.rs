// Tool result extraction
//
// Concatenates the typed side-channel results of a sequence of responses,
// preserving source order.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::normalized::{
    CodeInterpreterResult, FileSearchResult, NormalizedResponse, WebSearchResult,
};
use crate::normalizer::ResponseNormalizer;

/// Kind of typed tool result
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolResultKind {
    WebSearch,
    CodeInterpreter,
    FileSearch,
}

/// One typed result, tagged by kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolResultRecord {
    WebSearch(WebSearchResult),
    CodeInterpreter(CodeInterpreterResult),
    FileSearch(FileSearchResult),
}

/// Typed results collected across a turn or a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolResults {
    pub web_search: Vec<WebSearchResult>,
    pub code_interpreter: Vec<CodeInterpreterResult>,
    pub file_search: Vec<FileSearchResult>,
}

impl ToolResults {
    /// Collect results from normalized responses
    pub fn extract<'a>(responses: impl IntoIterator<Item = &'a NormalizedResponse>) -> Self {
        let mut results = ToolResults::default();
        for response in responses {
            results.append(response);
        }
        results
    }

    /// Normalize raw responses with `normalizer`, then collect their results
    pub fn extract_raw(normalizer: &dyn ResponseNormalizer, responses: &[Value]) -> Self {
        let normalized: Vec<NormalizedResponse> = responses
            .iter()
            .map(|raw| normalizer.normalize_single_response(raw))
            .collect();
        Self::extract(&normalized)
    }

    /// Append one response's results
    pub fn append(&mut self, response: &NormalizedResponse) {
        self.web_search
            .extend(response.web_search_results.iter().cloned());
        self.code_interpreter
            .extend(response.code_interpreter_results.iter().cloned());
        self.file_search
            .extend(response.file_search_results.iter().cloned());
    }

    pub fn is_empty(&self) -> bool {
        self.web_search.is_empty() && self.code_interpreter.is_empty() && self.file_search.is_empty()
    }

    /// Results keyed by kind; kinds without results are omitted
    pub fn combined(&self) -> BTreeMap<ToolResultKind, Vec<ToolResultRecord>> {
        let mut combined = BTreeMap::new();
        if !self.web_search.is_empty() {
            combined.insert(
                ToolResultKind::WebSearch,
                self.web_search
                    .iter()
                    .cloned()
                    .map(ToolResultRecord::WebSearch)
                    .collect(),
            );
        }
        if !self.code_interpreter.is_empty() {
            combined.insert(
                ToolResultKind::CodeInterpreter,
                self.code_interpreter
                    .iter()
                    .cloned()
                    .map(ToolResultRecord::CodeInterpreter)
                    .collect(),
            );
        }
        if !self.file_search.is_empty() {
            combined.insert(
                ToolResultKind::FileSearch,
                self.file_search
                    .iter()
                    .cloned()
                    .map(ToolResultRecord::FileSearch)
                    .collect(),
            );
        }
        combined
    }
}
