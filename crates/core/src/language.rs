// Language detection for executed code snippets
//
// Coarse substring heuristic. Misclassification is acceptable; scorers that
// need exact language information must not rely on this.

use serde::{Deserialize, Serialize};

/// Language of an executed code snippet
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CodeLanguage {
    Python,
    Javascript,
    Ruby,
    #[default]
    Unknown,
}

impl std::fmt::Display for CodeLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodeLanguage::Python => write!(f, "python"),
            CodeLanguage::Javascript => write!(f, "javascript"),
            CodeLanguage::Ruby => write!(f, "ruby"),
            CodeLanguage::Unknown => write!(f, "unknown"),
        }
    }
}

/// Classify a code snippet. Checks run in order: python, javascript, ruby.
pub fn detect_language(code: &str) -> CodeLanguage {
    if code.contains("import ") || code.contains("def ") || code.contains("print(") {
        CodeLanguage::Python
    } else if code.contains("const ") || code.contains("let ") || code.contains("function ") {
        CodeLanguage::Javascript
    } else if code.contains("require ") && (code.contains("def ") || code.contains("end")) {
        CodeLanguage::Ruby
    } else {
        CodeLanguage::Unknown
    }
}
