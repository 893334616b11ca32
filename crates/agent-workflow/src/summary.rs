//! Built-in excerpt summarizer
//!
//! Produces a short excerpt per report so that the final state carries the
//! same summary keys a model-backed summarizer would, without calling one.

use agent_core::{PipelineChunk, Result, Summarizer, keys, stringify};
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Where a summary's text comes from
#[derive(Debug, Clone, Copy)]
enum Source {
    Field(&'static str),
    Debate(&'static str, &'static str),
}

const SUMMARIES: [(&str, Source); 12] = [
    ("Summarize_market_report", Source::Field(keys::MARKET_REPORT)),
    ("Summarize_social_report", Source::Field(keys::SENTIMENT_REPORT)),
    ("Summarize_news_report", Source::Field(keys::NEWS_REPORT)),
    ("Summarize_fundamentals_report", Source::Field(keys::FUNDAMENTALS_REPORT)),
    (
        "bull_researcher_summarizer",
        Source::Debate(keys::INVESTMENT_DEBATE_STATE, keys::BULL_HISTORY),
    ),
    (
        "bear_researcher_summarizer",
        Source::Debate(keys::INVESTMENT_DEBATE_STATE, keys::BEAR_HISTORY),
    ),
    (
        "Summarize_aggressive_report",
        Source::Debate(keys::RISK_DEBATE_STATE, keys::CURRENT_RISKY_RESPONSE),
    ),
    (
        "Summarize_conservative_report",
        Source::Debate(keys::RISK_DEBATE_STATE, keys::CURRENT_SAFE_RESPONSE),
    ),
    (
        "Summarize_neutral_report",
        Source::Debate(keys::RISK_DEBATE_STATE, keys::CURRENT_NEUTRAL_RESPONSE),
    ),
    ("trader_summarizer", Source::Field(keys::TRADER_INVESTMENT_PLAN)),
    ("Summarize_investment_plan_report", Source::Field(keys::INVESTMENT_PLAN)),
    (
        "Summarize_final_trade_decision_report",
        Source::Field(keys::FINAL_TRADE_DECISION),
    ),
];

/// Summarizes each report as its first paragraph, bounded in length
#[derive(Debug, Clone)]
pub struct ExcerptSummarizer {
    max_chars: usize,
}

impl Default for ExcerptSummarizer {
    fn default() -> Self {
        Self { max_chars: 400 }
    }
}

impl ExcerptSummarizer {
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars: max_chars.max(1),
        }
    }

    /// First paragraph of `text`, skipping headings
    pub fn excerpt(&self, text: &str) -> Option<String> {
        let paragraph = text
            .split("\n\n")
            .map(|p| {
                p.lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty() && !line.starts_with('#'))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .find(|p| !p.is_empty())?;

        if paragraph.chars().count() <= self.max_chars {
            return Some(paragraph);
        }
        let mut cut: String = paragraph.chars().take(self.max_chars).collect();
        cut.push('…');
        Some(cut)
    }

    fn source_text(state: &PipelineChunk, source: Source) -> Option<String> {
        let value = match source {
            Source::Field(field) => state.non_empty(field)?,
            Source::Debate(field, sub) => state.get(field)?.get(sub)?,
        };
        Some(stringify(value))
    }
}

#[async_trait]
impl Summarizer for ExcerptSummarizer {
    fn name(&self) -> &str {
        "excerpt"
    }

    async fn summarize(&self, state: &PipelineChunk) -> Result<Map<String, Value>> {
        let mut summaries = Map::new();
        for (key, source) in SUMMARIES {
            if let Some(excerpt) =
                Self::source_text(state, source).and_then(|text| self.excerpt(&text))
            {
                summaries.insert(key.to_string(), Value::String(excerpt));
            }
        }
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_excerpt_first_paragraph() {
        let summarizer = ExcerptSummarizer::default();
        let text = "## Market\nPrices rose\nsharply.\n\nSecond paragraph.";
        assert_eq!(summarizer.excerpt(text).unwrap(), "Prices rose sharply.");
        assert_eq!(summarizer.excerpt("   \n\n## Only heading"), None);
    }

    #[test]
    fn test_excerpt_truncates() {
        let summarizer = ExcerptSummarizer::new(5);
        assert_eq!(summarizer.excerpt("abcdefgh").unwrap(), "abcde…");
        assert_eq!(summarizer.excerpt("abc").unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_summarize_known_sections() {
        let state = PipelineChunk::new()
            .with(keys::MARKET_REPORT, json!("Uptrend intact."))
            .with(keys::NEWS_REPORT, json!(""))
            .with(
                keys::RISK_DEBATE_STATE,
                json!({"current_safe_response": "Reduce size."}),
            )
            .with(
                keys::INVESTMENT_PLAN,
                json!("### Bull Researcher Analysis\nGrowth ahead"),
            );

        let summaries = ExcerptSummarizer::default().summarize(&state).await.unwrap();
        assert_eq!(summaries["Summarize_market_report"], json!("Uptrend intact."));
        assert_eq!(summaries["Summarize_conservative_report"], json!("Reduce size."));
        assert_eq!(summaries["Summarize_investment_plan_report"], json!("Growth ahead"));
        assert!(!summaries.contains_key("Summarize_news_report"));
        assert_eq!(summaries.len(), 3);
    }
}
