//! Built-in trade signal extraction

use agent_core::{Result, SignalExtractor};
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;

/// Signal used when the decision text names none
pub const DEFAULT_SIGNAL: &str = "HOLD";

static PROPOSAL_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)FINAL\s+TRANSACTION\s+PROPOSAL\s*:\s*\**\s*(BUY|SELL|HOLD)\b")
        .expect("proposal marker pattern is valid")
});

static KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(BUY|SELL|HOLD)\b").expect("keyword pattern is valid"));

/// Extracts `BUY`, `SELL` or `HOLD` from decision text by keyword
///
/// An explicit `FINAL TRANSACTION PROPOSAL: **X**` marker wins. Otherwise
/// the last standalone keyword in the text is used.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordSignalExtractor;

impl KeywordSignalExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous form of [`SignalExtractor::extract`]
    pub fn classify(&self, decision_text: &str) -> String {
        if let Some(caps) = PROPOSAL_MARKER.captures_iter(decision_text).last() {
            return caps[1].to_ascii_uppercase();
        }

        KEYWORD
            .find_iter(decision_text)
            .last()
            .map_or_else(|| DEFAULT_SIGNAL.to_string(), |m| m.as_str().to_ascii_uppercase())
    }
}

#[async_trait]
impl SignalExtractor for KeywordSignalExtractor {
    async fn extract(&self, decision_text: &str) -> Result<String> {
        Ok(self.classify(decision_text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_takes_precedence() {
        let extractor = KeywordSignalExtractor::new();
        let text = "We could sell here.\nFINAL TRANSACTION PROPOSAL: **BUY**\nHold off on leverage.";
        assert_eq!(extractor.classify(text), "BUY");
    }

    #[test]
    fn test_last_keyword_wins() {
        let extractor = KeywordSignalExtractor::new();
        assert_eq!(extractor.classify("Buy the dip, then sell."), "SELL");
        assert_eq!(extractor.classify("Recommendation: Hold"), "HOLD");
    }

    #[test]
    fn test_ignores_embedded_words() {
        let extractor = KeywordSignalExtractor::new();
        assert_eq!(extractor.classify("Buyers outnumber sellers; holdings grow."), "HOLD");
        assert_eq!(extractor.classify(""), DEFAULT_SIGNAL);
    }

    #[tokio::test]
    async fn test_async_extract() {
        let extractor = KeywordSignalExtractor::new();
        assert_eq!(extractor.extract("### Portfolio Manager Decision\nSell").await.unwrap(), "SELL");
    }
}
