// Wire ingestion layer
//
// Raw backend payloads are parsed exactly once into the typed structs of this
// module. Field access after that point uses one canonical field name; the
// normalizers never look up keys on untyped JSON.
//
// Every field is optional or defaulted. Fields that arrive with the wrong JSON
// type degrade to their default (see `lenient`), and list items that cannot be
// parsed are dropped with a warning, so one malformed fragment never discards
// the rest of a payload.

pub mod assistants;
pub mod chat;
pub mod messages;
pub mod responses;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::normalized::UsageTotals;
use crate::tool_types::{arguments_from_value, parse_arguments};

/// Parse a raw payload into a typed wire struct, never failing.
///
/// An unusable top level (wrong JSON type, or a hard schema mismatch) yields
/// `T::default()` and a warning.
pub fn parse_lenient<T>(raw: &Value) -> T
where
    T: DeserializeOwned + Default,
{
    match T::deserialize(raw) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(
                target_type = %std::any::type_name::<T>(),
                error = %e,
                "Unusable backend payload, falling back to defaults"
            );
            T::default()
        }
    }
}

/// Lenient field deserializers
pub(crate) mod lenient {
    use super::*;

    /// Deserialize a field, degrading to its default on type mismatch or null
    pub fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned + Default,
    {
        let value = Value::deserialize(deserializer)?;
        if value.is_null() {
            return Ok(T::default());
        }
        Ok(T::deserialize(value).unwrap_or_default())
    }

    /// Deserialize a list, dropping items that fail to parse
    pub fn vec_skip_invalid<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(items_from_value(value))
    }

    pub(crate) fn items_from_value<T: DeserializeOwned>(value: Value) -> Vec<T> {
        match value {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| match T::deserialize(item) {
                    Ok(parsed) => Some(parsed),
                    Err(e) => {
                        warn!(
                            item_type = %std::any::type_name::<T>(),
                            error = %e,
                            "Dropping malformed payload item"
                        );
                        None
                    }
                })
                .collect(),
            Value::Null => Vec::new(),
            other => {
                warn!(
                    item_type = %std::any::type_name::<T>(),
                    found = %other,
                    "Expected a list in backend payload, ignoring"
                );
                Vec::new()
            }
        }
    }

    /// Accept a string, a number or null as an optional string
    pub fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    /// Accept a string, a number or null as a string (null → empty)
    pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(opt_string(deserializer)?.unwrap_or_default())
    }
}

/// Tool-call arguments as delivered on the wire: a JSON string or an object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawArguments {
    Text(String),
    Object(Map<String, Value>),
    Other(Value),
}

impl Default for RawArguments {
    fn default() -> Self {
        RawArguments::Text(String::new())
    }
}

impl RawArguments {
    /// Materialize into an argument map (never fails)
    pub fn to_map(&self, tool_name: &str) -> Map<String, Value> {
        match self {
            RawArguments::Text(s) => parse_arguments(tool_name, s),
            RawArguments::Object(map) => map.clone(),
            RawArguments::Other(value) => arguments_from_value(tool_name, value),
        }
    }
}

/// Usage counters under any of the field names the backends use
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WireUsage {
    #[serde(default, alias = "input_tokens", deserialize_with = "lenient::or_default")]
    pub prompt_tokens: Option<u64>,
    #[serde(
        default,
        alias = "output_tokens",
        deserialize_with = "lenient::or_default"
    )]
    pub completion_tokens: Option<u64>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub total_tokens: Option<u64>,
}

impl WireUsage {
    /// Zero-filled totals; total is derived when the backend omits it
    pub fn totals(&self) -> UsageTotals {
        let prompt = self.prompt_tokens.unwrap_or(0);
        let completion = self.completion_tokens.unwrap_or(0);
        let total = self
            .total_tokens
            .unwrap_or_else(|| prompt.saturating_add(completion));
        UsageTotals::new(prompt, completion, total)
    }
}

/// Only the usage-bearing parts of any raw response.
///
/// Chat, chained and messages payloads carry `usage` at the top level; the
/// thread/run bundle carries it on the run.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UsageEnvelope {
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub usage: Option<WireUsage>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub run: Option<RunUsageEnvelope>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunUsageEnvelope {
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub usage: Option<WireUsage>,
}

impl UsageEnvelope {
    /// Usage found on the payload, if any
    pub fn usage(&self) -> Option<UsageTotals> {
        self.usage
            .as_ref()
            .or_else(|| self.run.as_ref().and_then(|r| r.usage.as_ref()))
            .map(WireUsage::totals)
    }
}

/// Read a text value that may be a plain string or a list of text parts
pub(crate) fn text_from_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| match part {
                Value::String(s) => Some(s.clone()),
                Value::Object(obj) => obj.get("text").and_then(|t| match t {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(inner) => {
                        inner.get("value").and_then(Value::as_str).map(str::to_string)
                    }
                    _ => None,
                }),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Default, Deserialize)]
    struct Sample {
        #[serde(default, deserialize_with = "lenient::or_default")]
        count: u64,
        #[serde(default, deserialize_with = "lenient::vec_skip_invalid")]
        names: Vec<String>,
    }

    #[test]
    fn test_wrong_typed_field_degrades_to_default() {
        let sample: Sample = parse_lenient(&json!({"count": "many", "names": ["a", 1, "b"]}));
        assert_eq!(sample.count, 0);
        assert_eq!(sample.names, vec!["a", "b"]);
    }

    #[test]
    fn test_unusable_top_level_yields_default() {
        let sample: Sample = parse_lenient(&json!("not an object"));
        assert_eq!(sample.count, 0);
        assert!(sample.names.is_empty());
    }

    #[test]
    fn test_usage_aliases_and_derived_total() {
        let usage: WireUsage = serde_json::from_value(json!({
            "input_tokens": 12,
            "output_tokens": 8
        }))
        .unwrap();
        assert_eq!(usage.totals(), UsageTotals::new(12, 8, 20));

        let partial: WireUsage = serde_json::from_value(json!({"total_tokens": 5})).unwrap();
        assert_eq!(partial.totals(), UsageTotals::new(0, 0, 5));
    }

    #[test]
    fn test_usage_envelope_reads_run_usage() {
        let envelope: UsageEnvelope = parse_lenient(&json!({
            "run": {"usage": {"prompt_tokens": 3, "completion_tokens": 4, "total_tokens": 7}}
        }));
        assert_eq!(envelope.usage(), Some(UsageTotals::new(3, 4, 7)));

        let empty: UsageEnvelope = parse_lenient(&json!({"id": "x"}));
        assert_eq!(empty.usage(), None);
    }

    #[test]
    fn test_raw_arguments_variants() {
        let text: RawArguments = serde_json::from_value(json!("{\"a\": 1}")).unwrap();
        let object: RawArguments = serde_json::from_value(json!({"a": 1})).unwrap();
        assert_eq!(text.to_map("f"), object.to_map("f"));

        let broken: RawArguments = serde_json::from_value(json!("{oops")).unwrap();
        assert!(broken.to_map("f").is_empty());
    }
}
