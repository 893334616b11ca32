//! Per-run reducer state
//!
//! An [`AnalysisRun`] owns everything one analysis mutates while its chunk
//! stream is processed: role statuses, composite sections, buffered reports
//! and the merged pipeline state. It is single-owner; only the driver's
//! sequential processing step touches it.

use crate::artifacts::{Artifact, ArtifactContent};
use crate::buffer::{FlushInterrupted, ReportBuffer};
use crate::decoder::{Delta, decode};
use crate::error::{Result, WorkflowError};
use crate::events::{EventSink, StreamEvent};
use crate::splicer::{SectionKind, SectionSplicer, labels, latest_line};
use crate::status::{StatusSnapshot, StatusTracker, Trigger};
use agent_core::{AnalystSet, PipelineChunk, RunRequest, is_truthy, keys, stringify};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Report fields that are complete the moment they appear
const LEAF_REPORTS: [&str; 5] = [
    keys::MARKET_REPORT,
    keys::SENTIMENT_REPORT,
    keys::NEWS_REPORT,
    keys::FUNDAMENTALS_REPORT,
    keys::TRADER_INVESTMENT_PLAN,
];

/// Text sections persisted at completion, in write order
const TEXT_ARTIFACTS: [&str; 7] = [
    keys::MARKET_REPORT,
    keys::SENTIMENT_REPORT,
    keys::NEWS_REPORT,
    keys::FUNDAMENTALS_REPORT,
    keys::INVESTMENT_PLAN,
    keys::TRADER_INVESTMENT_PLAN,
    keys::FINAL_TRADE_DECISION,
];

const COMPOSITES: [SectionKind; 2] = [SectionKind::InvestmentPlan, SectionKind::FinalTradeDecision];

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// State of one analysis, keyed by ticker and date
#[derive(Debug)]
pub struct AnalysisRun {
    request: RunRequest,
    analysts: AnalystSet,
    run_id: String,
    phase: RunPhase,
    tracker: StatusTracker,
    splicer: SectionSplicer,
    buffer: ReportBuffer,
    state: PipelineChunk,
    summary_keys: Vec<String>,
    chunks: usize,
    debate_messages: bool,
}

impl AnalysisRun {
    /// Validate the request and create an idle run
    pub fn new(request: RunRequest) -> Result<Self> {
        let analysts = request.validate()?;
        let run_id = format!("{}_{}", request.symbol(), request.analysis_date.trim());
        Ok(Self {
            tracker: StatusTracker::new(analysts.clone()),
            request,
            analysts,
            run_id,
            phase: RunPhase::Idle,
            splicer: SectionSplicer::new(),
            buffer: ReportBuffer::new(),
            state: PipelineChunk::new(),
            summary_keys: Vec::new(),
            chunks: 0,
            debate_messages: true,
        })
    }

    /// Toggle reasoning messages for debate contributions
    pub fn with_debate_messages(mut self, enabled: bool) -> Self {
        self.debate_messages = enabled;
        self
    }

    pub fn request(&self) -> &RunRequest {
        &self.request
    }

    pub fn analysts(&self) -> &AnalystSet {
        &self.analysts
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.tracker.snapshot()
    }

    pub fn splicer(&self) -> &SectionSplicer {
        &self.splicer
    }

    pub fn buffer(&self) -> &ReportBuffer {
        &self.buffer
    }

    /// Chunks processed so far
    pub fn chunks(&self) -> usize {
        self.chunks
    }

    /// Enter `Running`, optionally under an externally assigned id
    pub fn start(&mut self, run_id: Option<String>) -> Result<()> {
        self.transition(RunPhase::Idle, RunPhase::Running)?;
        if let Some(run_id) = run_id {
            self.run_id = run_id;
        }
        Ok(())
    }

    pub fn complete(&mut self) -> Result<()> {
        self.transition(RunPhase::Running, RunPhase::Completed)
    }

    /// Cancellation and failure are accepted from any non-terminal phase
    pub fn cancel(&mut self) {
        if !self.phase.is_terminal() {
            self.phase = RunPhase::Cancelled;
        }
    }

    pub fn fail(&mut self) {
        if !self.phase.is_terminal() {
            self.phase = RunPhase::Failed;
        }
    }

    fn transition(&mut self, from: RunPhase, to: RunPhase) -> Result<()> {
        if self.phase != from {
            return Err(WorkflowError::Pipeline(format!(
                "Cannot move run {} from {} to {}",
                self.run_id, self.phase, to
            )));
        }
        self.phase = to;
        Ok(())
    }

    /// Fold one chunk into the run and return the events to emit now
    ///
    /// Order within a chunk: the message, its tool calls, then for each
    /// monitored field the status change, debate reasoning messages and
    /// buffering it caused. Reports are buffered, never returned.
    pub fn process_chunk(&mut self, chunk: &PipelineChunk) -> Result<Vec<StreamEvent>> {
        if self.phase != RunPhase::Running {
            return Err(WorkflowError::Pipeline(format!(
                "Chunk received while run {} is {}",
                self.run_id, self.phase
            )));
        }
        self.chunks += 1;
        self.state.merge_from(chunk);

        let mut events = Vec::new();
        for delta in decode(chunk) {
            match delta {
                Delta::Message { kind, text } => events.push(StreamEvent::Message {
                    kind,
                    content: text,
                }),
                Delta::ToolCall(call) => events.push(StreamEvent::ToolCall {
                    name: call.name,
                    args: call.args,
                }),
                Delta::FieldUpdate { name, value } => self.apply_field(name, &value, &mut events),
            }
        }
        Ok(events)
    }

    fn apply_field(&mut self, name: &str, value: &Value, events: &mut Vec<StreamEvent>) {
        for trigger in Trigger::from_field(name, value) {
            if self.tracker.observe(trigger) {
                events.push(StreamEvent::status(self.tracker.snapshot()));
            }
            self.splice(trigger, value, events);
        }

        if LEAF_REPORTS.contains(&name) {
            self.buffer.record(name, &stringify(value));
        }
    }

    fn splice(&mut self, trigger: Trigger, debate: &Value, events: &mut Vec<StreamEvent>) {
        let field = |key: &str| {
            debate
                .get(key)
                .filter(|v| is_truthy(v))
                .map(stringify)
                .unwrap_or_default()
        };

        let (kind, label, text, message) = match trigger {
            Trigger::BullHistory | Trigger::BearHistory => {
                let (sub, label) = if trigger == Trigger::BullHistory {
                    (keys::BULL_HISTORY, labels::BULL_RESEARCHER)
                } else {
                    (keys::BEAR_HISTORY, labels::BEAR_RESEARCHER)
                };
                let history = field(sub);
                let Some(line) = latest_line(&history).map(str::trim) else {
                    return;
                };
                let line = line.to_string();
                (SectionKind::InvestmentPlan, label, line.clone(), line)
            }
            Trigger::ResearchJudge => {
                let decision = field(keys::JUDGE_DECISION);
                let message = format!("Research Manager: {decision}");
                (SectionKind::InvestmentPlan, labels::RESEARCH_MANAGER, decision, message)
            }
            Trigger::RiskyResponse => {
                let text = field(keys::CURRENT_RISKY_RESPONSE);
                let message = format!("Risky Analyst: {text}");
                (SectionKind::FinalTradeDecision, labels::RISKY_ANALYST, text, message)
            }
            Trigger::SafeResponse => {
                let text = field(keys::CURRENT_SAFE_RESPONSE);
                let message = format!("Safe Analyst: {text}");
                (SectionKind::FinalTradeDecision, labels::SAFE_ANALYST, text, message)
            }
            Trigger::NeutralResponse => {
                let text = field(keys::CURRENT_NEUTRAL_RESPONSE);
                let message = format!("Neutral Analyst: {text}");
                (SectionKind::FinalTradeDecision, labels::NEUTRAL_ANALYST, text, message)
            }
            Trigger::RiskJudge => {
                let decision = field(keys::JUDGE_DECISION);
                let message = format!("Portfolio Manager: {decision}");
                (SectionKind::FinalTradeDecision, labels::PORTFOLIO_MANAGER, decision, message)
            }
            _ => return,
        };

        let outcome = self.splicer.contribute(kind, label, &text);
        if outcome.changed() {
            debug!(section = %kind, label, ?outcome, "Spliced contribution");
            if self.debate_messages {
                events.push(StreamEvent::reasoning(message));
            }
        }

        // a judge decision completes its composite
        if label == kind.judge_label() {
            self.buffer.record(kind.key(), &self.splicer.render(kind));
        }
    }

    /// Apply any judge decision present in the merged state but not yet in
    /// its composite. Returns the number of sections that changed.
    pub fn finalize_sections(&mut self) -> usize {
        let mut folded = 0;
        for kind in COMPOSITES {
            let Some(decision) = self
                .state
                .get(kind.debate_field())
                .and_then(|state| state.get(keys::JUDGE_DECISION))
                .filter(|v| is_truthy(v))
                .map(stringify)
            else {
                continue;
            };

            if self.splicer.judge(kind, &decision).changed() {
                debug!(section = %kind, "Folded final judge decision");
                folded += 1;
                self.buffer.record(kind.key(), &self.splicer.render(kind));
            }
        }
        folded
    }

    /// Release buffered reports to the sink
    pub async fn flush_reports(
        &mut self,
        sink: &EventSink,
        interval: Duration,
        cancel: &CancellationToken,
    ) -> std::result::Result<usize, FlushInterrupted> {
        self.buffer.flush(sink, interval, cancel).await
    }

    /// Merge one summarizer's output into the state
    pub fn merge_summaries(&mut self, summaries: Map<String, Value>) {
        for (key, value) in summaries {
            if !self.summary_keys.contains(&key) {
                self.summary_keys.push(key.clone());
            }
            self.state.insert(key, value);
        }
    }

    /// Merged state with the rendered composite sections overlaid
    pub fn final_state(&self) -> PipelineChunk {
        let mut state = self.state.clone();
        for kind in COMPOSITES {
            let rendered = self.splicer.render(kind);
            if !rendered.is_empty() {
                state.insert(kind.key(), Value::String(rendered));
            }
        }
        state
    }

    /// Text the trade signal is extracted from: the portfolio manager's
    /// decision, then the pipeline's own decision field, then the whole
    /// rendered section. Analyst blocks never reach the extractor while a
    /// manager decision exists.
    pub fn decision_text(&self) -> String {
        let section = self.splicer.section(SectionKind::FinalTradeDecision);
        if let Some(decision) = section.get(labels::PORTFOLIO_MANAGER) {
            return decision.to_string();
        }
        if let Some(value) = self.state.non_empty(keys::FINAL_TRADE_DECISION) {
            return stringify(value);
        }
        section.render()
    }

    /// Every finished artifact, in write order: text sections, debate
    /// states, then summaries
    pub fn artifacts(&self) -> Vec<Artifact> {
        let state = self.final_state();
        let mut artifacts = Vec::new();

        for key in TEXT_ARTIFACTS {
            if let Some(value) = state.non_empty(key) {
                artifacts.push(Artifact::new(key, ArtifactContent::Text(stringify(value))));
            }
        }
        for key in [keys::INVESTMENT_DEBATE_STATE, keys::RISK_DEBATE_STATE] {
            if let Some(value) = state.non_empty(key) {
                artifacts.push(Artifact::new(key, ArtifactContent::from_value(value)));
            }
        }
        for key in &self.summary_keys {
            if let Some(value) = state.non_empty(key) {
                artifacts.push(Artifact::new(key.clone(), ArtifactContent::from_value(value)));
            }
        }
        artifacts
    }
}
