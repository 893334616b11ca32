//! Run requests
//!
//! A `RunRequest` is what a client submits to start an analysis. It is kept
//! close to the wire shape; [`RunRequest::validate`] turns it into the
//! checked analyst selection the rest of the system works with.

use crate::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Analyst teams a request can select, in pipeline order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalystKind {
    Market,
    Social,
    News,
    Fundamentals,
}

impl AnalystKind {
    /// All analysts in pipeline order
    pub const ALL: [AnalystKind; 4] = [
        AnalystKind::Market,
        AnalystKind::Social,
        AnalystKind::News,
        AnalystKind::Fundamentals,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Market => "market",
            Self::Social => "social",
            Self::News => "news",
            Self::Fundamentals => "fundamentals",
        }
    }
}

impl fmt::Display for AnalystKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalystKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "market" => Ok(Self::Market),
            "social" => Ok(Self::Social),
            "news" => Ok(Self::News),
            "fundamentals" => Ok(Self::Fundamentals),
            other => Err(Error::InvalidRequest(format!("Unknown analyst: {other}"))),
        }
    }
}

/// Checked analyst selection
pub type AnalystSet = BTreeSet<AnalystKind>;

fn default_report_length() -> Option<String> {
    Some("summary".to_string())
}

/// Request to start one analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub ticker: String,
    pub analysis_date: String,
    /// Analyst types: "market", "social", "news", "fundamentals"
    pub analysts: Vec<String>,
    /// Debate rounds for both the research and the risk debate
    pub research_depth: u32,
    pub llm_provider: String,
    pub backend_url: String,
    pub shallow_thinker: String,
    pub deep_thinker: String,
    #[serde(default = "default_report_length")]
    pub report_length: Option<String>,
}

impl RunRequest {
    /// Create a request with default model settings
    pub fn new(ticker: impl Into<String>, analysis_date: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            analysis_date: analysis_date.into(),
            analysts: AnalystKind::ALL.iter().map(|a| a.to_string()).collect(),
            research_depth: 1,
            llm_provider: "openai".to_string(),
            backend_url: "https://api.openai.com/v1".to_string(),
            shallow_thinker: "gpt-4o-mini".to_string(),
            deep_thinker: "o4-mini".to_string(),
            report_length: default_report_length(),
        }
    }

    /// Replace the analyst selection
    pub fn with_analysts<I, S>(mut self, analysts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.analysts = analysts.into_iter().map(Into::into).collect();
        self
    }

    /// Set the debate depth
    pub fn with_research_depth(mut self, depth: u32) -> Self {
        self.research_depth = depth;
        self
    }

    /// Validate the request and return the analyst selection
    pub fn validate(&self) -> Result<AnalystSet> {
        if self.ticker.trim().is_empty() {
            return Err(Error::InvalidRequest("Ticker cannot be empty".to_string()));
        }

        NaiveDate::parse_from_str(self.analysis_date.trim(), "%Y-%m-%d").map_err(|e| {
            Error::InvalidRequest(format!(
                "Analysis date '{}' is not YYYY-MM-DD: {e}",
                self.analysis_date
            ))
        })?;

        if self.analysts.is_empty() {
            return Err(Error::InvalidRequest(
                "Analysts must be a non-empty list".to_string(),
            ));
        }

        let analysts = self
            .analysts
            .iter()
            .map(|a| a.parse::<AnalystKind>())
            .collect::<Result<AnalystSet>>()?;

        if self.research_depth == 0 {
            return Err(Error::InvalidRequest(
                "Research depth must be at least 1".to_string(),
            ));
        }

        Ok(analysts)
    }

    /// Normalized ticker symbol
    pub fn symbol(&self) -> String {
        self.ticker.trim().to_ascii_uppercase()
    }

    /// Configuration handed to the agent pipeline
    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        let analysts = self.validate()?;
        Ok(PipelineConfig {
            ticker: self.symbol(),
            analysis_date: self.analysis_date.trim().to_string(),
            analysts: analysts.into_iter().collect(),
            max_debate_rounds: self.research_depth,
            max_risk_discuss_rounds: self.research_depth,
            quick_think_llm: self.shallow_thinker.clone(),
            deep_think_llm: self.deep_thinker.clone(),
            backend_url: self.backend_url.clone(),
            llm_provider: self.llm_provider.to_lowercase(),
            report_length: self.report_length.clone(),
        })
    }
}

/// Settings derived from a request for the agent pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub ticker: String,
    pub analysis_date: String,
    /// Selected analysts in pipeline order
    pub analysts: Vec<AnalystKind>,
    pub max_debate_rounds: u32,
    pub max_risk_discuss_rounds: u32,
    pub quick_think_llm: String,
    pub deep_think_llm: String,
    pub backend_url: String,
    pub llm_provider: String,
    pub report_length: Option<String>,
}
