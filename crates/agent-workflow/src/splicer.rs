//! Composite section splicing
//!
//! Two reports are assembled from several agents' partial contributions:
//! the investment plan (bull, bear, research manager) and the final trade
//! decision (risky, safe, neutral, portfolio manager). Each is kept as an
//! ordered label → body list and rendered to marker-delimited text
//! (`### <Label>` headings) only at the boundary.
//!
//! Invariants:
//! - at most one block per label; a new contribution replaces the body of
//!   the existing block in place
//! - labels keep the order in which they first appeared
//! - splicing the same text twice renders byte-identical output

use agent_core::keys;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Heading prefix that opens a block
pub const MARKER_PREFIX: &str = "### ";

/// Block labels used by the pipeline's contributors
pub mod labels {
    pub const BULL_RESEARCHER: &str = "Bull Researcher Analysis";
    pub const BEAR_RESEARCHER: &str = "Bear Researcher Analysis";
    pub const RESEARCH_MANAGER: &str = "Research Manager Decision";
    pub const RISKY_ANALYST: &str = "Risky Analyst Analysis";
    pub const SAFE_ANALYST: &str = "Safe Analyst Analysis";
    pub const NEUTRAL_ANALYST: &str = "Neutral Analyst Analysis";
    pub const PORTFOLIO_MANAGER: &str = "Portfolio Manager Decision";
}

/// What a splice did to its section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpliceOutcome {
    /// A new block was appended
    Inserted,
    /// An existing block's body was replaced
    Replaced,
    /// The block already had this body
    Unchanged,
    /// Nothing to splice (empty contribution)
    Skipped,
}

impl SpliceOutcome {
    /// True if the rendered section changed
    pub fn changed(self) -> bool {
        matches!(self, Self::Inserted | Self::Replaced)
    }
}

/// The two composite sections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    InvestmentPlan,
    FinalTradeDecision,
}

impl SectionKind {
    /// Key under which the section is reported and stored
    pub fn key(self) -> &'static str {
        match self {
            Self::InvestmentPlan => keys::INVESTMENT_PLAN,
            Self::FinalTradeDecision => keys::FINAL_TRADE_DECISION,
        }
    }

    /// Label of the manager block that finalizes the section
    pub fn judge_label(self) -> &'static str {
        match self {
            Self::InvestmentPlan => labels::RESEARCH_MANAGER,
            Self::FinalTradeDecision => labels::PORTFOLIO_MANAGER,
        }
    }

    /// Chunk field holding the debate state that feeds this section
    pub fn debate_field(self) -> &'static str {
        match self {
            Self::InvestmentPlan => keys::INVESTMENT_DEBATE_STATE,
            Self::FinalTradeDecision => keys::RISK_DEBATE_STATE,
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// One composite document: an ordered list of labeled blocks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompositeSection {
    blocks: Vec<(String, String)>,
}

impl CompositeSection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render to marker-delimited text; blocks are separated by a blank line
    pub fn render(&self) -> String {
        self.blocks
            .iter()
            .map(|(label, body)| format!("{MARKER_PREFIX}{label}\n{body}"))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Insert or replace the block for `label`. Empty text is skipped.
    pub fn splice(&mut self, label: &str, text: &str) -> SpliceOutcome {
        if text.is_empty() {
            return SpliceOutcome::Skipped;
        }
        self.upsert(label, text)
    }

    fn upsert(&mut self, label: &str, text: &str) -> SpliceOutcome {
        match self.blocks.iter_mut().find(|(l, _)| l == label) {
            Some((_, body)) if body == text => SpliceOutcome::Unchanged,
            Some((_, body)) => {
                text.clone_into(body);
                SpliceOutcome::Replaced
            }
            None => {
                self.blocks.push((label.to_string(), text.to_string()));
                SpliceOutcome::Inserted
            }
        }
    }

    /// Body of the block for `label`
    pub fn get(&self, label: &str) -> Option<&str> {
        self.blocks
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, body)| body.as_str())
    }

    pub fn contains(&self, label: &str) -> bool {
        self.get(label).is_some()
    }

    /// Labels in first-appearance order
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.blocks.iter().map(|(l, _)| l.as_str())
    }

    /// Number of blocks
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl fmt::Display for CompositeSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Latest contribution in a free-form history: its last non-blank line
pub fn latest_line(history: &str) -> Option<&str> {
    history.lines().rev().find(|line| !line.trim().is_empty())
}

/// Owner of both composite sections for one run
#[derive(Debug, Clone, Default)]
pub struct SectionSplicer {
    investment_plan: CompositeSection,
    final_trade_decision: CompositeSection,
}

impl SectionSplicer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn section(&self, kind: SectionKind) -> &CompositeSection {
        match kind {
            SectionKind::InvestmentPlan => &self.investment_plan,
            SectionKind::FinalTradeDecision => &self.final_trade_decision,
        }
    }

    fn section_mut(&mut self, kind: SectionKind) -> &mut CompositeSection {
        match kind {
            SectionKind::InvestmentPlan => &mut self.investment_plan,
            SectionKind::FinalTradeDecision => &mut self.final_trade_decision,
        }
    }

    /// Splice one labeled contribution into a section
    pub fn contribute(&mut self, kind: SectionKind, label: &str, text: &str) -> SpliceOutcome {
        self.section_mut(kind).splice(label, text)
    }

    /// Splice the manager's decision under the section's judge label
    pub fn judge(&mut self, kind: SectionKind, decision: &str) -> SpliceOutcome {
        self.contribute(kind, kind.judge_label(), decision)
    }

    /// Rendered text of a section
    pub fn render(&self, kind: SectionKind) -> String {
        self.section(kind).render()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(haystack: &str, needle: &str) -> usize {
        haystack.matches(needle).count()
    }

    #[test]
    fn test_append_to_empty_has_no_leading_blank_line() {
        let mut section = CompositeSection::new();
        assert_eq!(section.splice(labels::BULL_RESEARCHER, "up"), SpliceOutcome::Inserted);
        assert_eq!(section.render(), "### Bull Researcher Analysis\nup");

        section.splice(labels::BEAR_RESEARCHER, "down");
        assert_eq!(
            section.render(),
            "### Bull Researcher Analysis\nup\n\n### Bear Researcher Analysis\ndown"
        );
    }

    #[test]
    fn test_replace_keeps_position() {
        let mut section = CompositeSection::new();
        section.splice(labels::BULL_RESEARCHER, "b");
        section.splice(labels::BEAR_RESEARCHER, "x");

        assert_eq!(section.splice(labels::BULL_RESEARCHER, "c"), SpliceOutcome::Replaced);
        assert_eq!(
            section.labels().collect::<Vec<_>>(),
            vec![labels::BULL_RESEARCHER, labels::BEAR_RESEARCHER]
        );
        assert_eq!(section.get(labels::BULL_RESEARCHER), Some("c"));
    }

    #[test]
    fn test_idempotent() {
        let mut once = CompositeSection::new();
        once.splice(labels::SAFE_ANALYST, "hedge");

        let mut twice = once.clone();
        assert_eq!(twice.splice(labels::SAFE_ANALYST, "hedge"), SpliceOutcome::Unchanged);
        assert_eq!(once.render(), twice.render());
    }

    #[test]
    fn test_empty_text_is_skipped() {
        let mut section = CompositeSection::new();
        assert_eq!(section.splice(labels::BULL_RESEARCHER, ""), SpliceOutcome::Skipped);
        assert!(section.is_empty());
    }

    #[test]
    fn test_never_duplicates_labels() {
        let mut section = CompositeSection::new();
        for i in 0..5 {
            section.splice(labels::BULL_RESEARCHER, &format!("round {i}"));
            section.splice(labels::BEAR_RESEARCHER, &format!("round {i}"));
        }
        let text = section.render();
        assert_eq!(count(&text, "### Bull Researcher Analysis"), 1);
        assert_eq!(count(&text, "### Bear Researcher Analysis"), 1);
        assert!(text.contains("round 4"));
        assert!(!text.contains("round 3"));
    }

    #[test]
    fn test_latest_line() {
        assert_eq!(latest_line("a\nb"), Some("b"));
        assert_eq!(latest_line("a\nb\nc\n\n"), Some("c"));
        assert_eq!(latest_line("\n  \n"), None);
        assert_eq!(latest_line(""), None);
    }

    #[test]
    fn test_judge_block_replaced_in_place() {
        let mut section = CompositeSection::new();
        section.splice(labels::RISKY_ANALYST, "lever up");
        section.splice(labels::PORTFOLIO_MANAGER, "Sell");
        section.splice(labels::SAFE_ANALYST, "stay flat");

        assert_eq!(section.splice(labels::PORTFOLIO_MANAGER, "Buy"), SpliceOutcome::Replaced);
        let text = section.render();
        assert_eq!(count(&text, "### Portfolio Manager Decision"), 1);
        assert_eq!(
            text,
            "### Risky Analyst Analysis\nlever up\n\n\
             ### Portfolio Manager Decision\nBuy\n\n\
             ### Safe Analyst Analysis\nstay flat"
        );
    }

    #[test]
    fn test_splicer_judge_labels() {
        let mut splicer = SectionSplicer::new();
        splicer.judge(SectionKind::InvestmentPlan, "Buy");
        splicer.judge(SectionKind::FinalTradeDecision, "Hold");

        assert_eq!(
            splicer.render(SectionKind::InvestmentPlan),
            "### Research Manager Decision\nBuy"
        );
        assert_eq!(
            splicer.render(SectionKind::FinalTradeDecision),
            "### Portfolio Manager Decision\nHold"
        );
    }
}
