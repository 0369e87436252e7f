// Token aggregation
//
// The two entry points have different "no data" conventions:
// - over normalized messages, no usage at all is absence (`None`);
// - over raw responses, the result is always a zero-filled total.

use serde_json::Value;

use crate::normalized::{NormalizedMessage, UsageTotals};
use crate::wire::{parse_lenient, UsageEnvelope};

/// Sum usage on assistant messages. `None` when no assistant message carries
/// usage.
pub fn aggregate_from_messages(messages: &[NormalizedMessage]) -> Option<UsageTotals> {
    messages
        .iter()
        .filter(|m| m.is_assistant())
        .filter_map(|m| m.usage)
        .fold(None, |acc, usage| Some(acc.unwrap_or_default() + usage))
}

/// Sum usage over raw backend responses (any payload shape)
pub fn aggregate_from_responses(responses: &[Value]) -> UsageTotals {
    responses
        .iter()
        .filter_map(|raw| parse_lenient::<UsageEnvelope>(raw).usage())
        .sum()
}
