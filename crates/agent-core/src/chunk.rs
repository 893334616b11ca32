//! Pipeline chunks
//!
//! A `PipelineChunk` is one incremental state delta produced by the agent
//! pipeline. It is an opaque field-name → JSON mapping; the well-known
//! field names live in [`keys`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Well-known chunk field names
pub mod keys {
    /// Ordered sequence of message objects
    pub const MESSAGES: &str = "messages";
    /// Tool invocations attached to a message
    pub const TOOL_CALLS: &str = "tool_calls";

    pub const MARKET_REPORT: &str = "market_report";
    pub const SENTIMENT_REPORT: &str = "sentiment_report";
    pub const NEWS_REPORT: &str = "news_report";
    pub const FUNDAMENTALS_REPORT: &str = "fundamentals_report";
    pub const INVESTMENT_PLAN: &str = "investment_plan";
    pub const TRADER_INVESTMENT_PLAN: &str = "trader_investment_plan";
    pub const FINAL_TRADE_DECISION: &str = "final_trade_decision";

    /// Composite state written by the research debate
    pub const INVESTMENT_DEBATE_STATE: &str = "investment_debate_state";
    /// Composite state written by the risk debate
    pub const RISK_DEBATE_STATE: &str = "risk_debate_state";

    // Debate state sub-fields
    pub const BULL_HISTORY: &str = "bull_history";
    pub const BEAR_HISTORY: &str = "bear_history";
    pub const JUDGE_DECISION: &str = "judge_decision";
    pub const CURRENT_RISKY_RESPONSE: &str = "current_risky_response";
    pub const CURRENT_SAFE_RESPONSE: &str = "current_safe_response";
    pub const CURRENT_NEUTRAL_RESPONSE: &str = "current_neutral_response";

    /// Every field the stream reducer reacts to, in pipeline order
    pub const MONITORED_FIELDS: [&str; 9] = [
        MARKET_REPORT,
        SENTIMENT_REPORT,
        NEWS_REPORT,
        FUNDAMENTALS_REPORT,
        INVESTMENT_DEBATE_STATE,
        INVESTMENT_PLAN,
        TRADER_INVESTMENT_PLAN,
        RISK_DEBATE_STATE,
        FINAL_TRADE_DECISION,
    ];
}

/// Truthiness of a chunk value.
///
/// `null`, `false`, `0`, the empty string and empty containers are empty.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Render a value as plain text: strings pass through unquoted, anything
/// else is serialized as JSON.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// One incremental state delta from the agent pipeline
///
/// # Example
///
/// ```
/// use agent_core::{PipelineChunk, keys};
///
/// let chunk = PipelineChunk::new()
///     .with(keys::MARKET_REPORT, serde_json::json!("Uptrend intact"));
///
/// assert_eq!(chunk.text(keys::MARKET_REPORT), Some("Uptrend intact"));
/// assert!(chunk.non_empty(keys::NEWS_REPORT).is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineChunk {
    data: Map<String, Value>,
}

impl PipelineChunk {
    /// Create an empty chunk
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a chunk from a JSON value, which must be an object
    pub fn from_value(value: Value) -> crate::Result<Self> {
        match value {
            Value::Object(data) => Ok(Self { data }),
            other => Err(crate::Error::Pipeline(format!(
                "chunk must be a JSON object, got {}",
                type_name(&other)
            ))),
        }
    }

    /// Set a field (builder form)
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.insert(key, value);
        self
    }

    /// Set a field
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    /// Get a field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Get a field only if it is non-empty
    pub fn non_empty(&self, key: &str) -> Option<&Value> {
        self.data.get(key).filter(|v| is_truthy(v))
    }

    /// Get a non-empty string field
    pub fn text(&self, key: &str) -> Option<&str> {
        self.non_empty(key).and_then(Value::as_str)
    }

    /// The `messages` sequence, empty when absent or not a sequence
    pub fn messages(&self) -> &[Value] {
        self.data
            .get(keys::MESSAGES)
            .and_then(Value::as_array)
            .map_or(&[], Vec::as_slice)
    }

    /// Check if a field exists
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Remove a field
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the chunk has no fields
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Merge another chunk into this one (other values override)
    pub fn merge(&mut self, other: PipelineChunk) {
        self.data.extend(other.data);
    }

    /// Merge borrowed fields into this one (other values override)
    pub fn merge_from(&mut self, other: &PipelineChunk) {
        for (key, value) in &other.data {
            self.data.insert(key.clone(), value.clone());
        }
    }

    /// Iterate over the fields
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.data.iter()
    }

    /// Borrow the underlying mapping
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Consume into a JSON object
    pub fn into_value(self) -> Value {
        Value::Object(self.data)
    }
}

impl From<Map<String, Value>> for PipelineChunk {
    fn from(data: Map<String, Value>) -> Self {
        Self { data }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_basic_operations() {
        let mut chunk = PipelineChunk::new();
        assert!(chunk.is_empty());

        chunk.insert(keys::NEWS_REPORT, json!("headline"));
        assert_eq!(chunk.len(), 1);
        assert!(chunk.contains_key(keys::NEWS_REPORT));
        assert_eq!(chunk.text(keys::NEWS_REPORT), Some("headline"));

        chunk.remove(keys::NEWS_REPORT);
        assert!(chunk.is_empty());
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!({})));
        assert!(!is_truthy(&json!([])));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!(false)));
        assert!(is_truthy(&json!(" ")));
        assert!(is_truthy(&json!({"a": 1})));
        assert!(is_truthy(&json!(1.5)));
    }

    #[test]
    fn test_non_empty_filters_blank_fields() {
        let chunk = PipelineChunk::new()
            .with(keys::MARKET_REPORT, json!(""))
            .with(keys::RISK_DEBATE_STATE, json!({}));

        assert!(chunk.non_empty(keys::MARKET_REPORT).is_none());
        assert!(chunk.non_empty(keys::RISK_DEBATE_STATE).is_none());
    }

    #[test]
    fn test_messages_tolerates_bad_shape() {
        let chunk = PipelineChunk::new().with(keys::MESSAGES, json!("not a list"));
        assert!(chunk.messages().is_empty());

        let chunk = PipelineChunk::new().with(keys::MESSAGES, json!([{"content": "hi"}]));
        assert_eq!(chunk.messages().len(), 1);
    }

    #[test]
    fn test_from_value_requires_object() {
        assert!(PipelineChunk::from_value(json!({"a": 1})).is_ok());

        let err = PipelineChunk::from_value(json!([1, 2])).unwrap_err();
        assert!(err.to_string().contains("array"));
    }

    #[test]
    fn test_merge() {
        let mut first = PipelineChunk::new()
            .with(keys::MARKET_REPORT, json!("m1"))
            .with(keys::NEWS_REPORT, json!("n1"));
        let second = PipelineChunk::new().with(keys::MARKET_REPORT, json!("m2"));

        first.merge(second);
        assert_eq!(first.text(keys::MARKET_REPORT), Some("m2")); // overridden
        assert_eq!(first.text(keys::NEWS_REPORT), Some("n1")); // kept
    }

    #[test]
    fn test_stringify() {
        assert_eq!(stringify(&json!("plain")), "plain");
        assert_eq!(stringify(&json!({"k": 1})), r#"{"k":1}"#);
        assert_eq!(stringify(&json!(null)), "null");
    }

    #[test]
    fn test_transparent_serde() {
        let chunk: PipelineChunk =
            serde_json::from_str(r#"{"fundamentals_report": "F1"}"#).unwrap();
        assert_eq!(chunk.text(keys::FUNDAMENTALS_REPORT), Some("F1"));
        assert_eq!(
            serde_json::to_value(&chunk).unwrap(),
            json!({"fundamentals_report": "F1"})
        );
    }
}
