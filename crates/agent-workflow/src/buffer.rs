//! Report buffering and flushing
//!
//! Finished report sections are recorded in observation order while the
//! chunk stream runs and released as one ordered batch of `report` events
//! after the stream is exhausted.

use crate::events::{EventSink, StreamEvent};
use agent_core::keys;
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Human-readable label for a report section
pub fn report_label(section_key: &str) -> &'static str {
    match section_key {
        keys::MARKET_REPORT => "Market Analysis",
        keys::SENTIMENT_REPORT => "Social Sentiment",
        keys::NEWS_REPORT => "News Analysis",
        keys::FUNDAMENTALS_REPORT => "Fundamentals Review",
        keys::INVESTMENT_PLAN => "Research Team Decision",
        keys::TRADER_INVESTMENT_PLAN => "Trader Investment Plan",
        keys::FINAL_TRADE_DECISION => "Portfolio Management Decision",
        _ => "Report",
    }
}

/// Snapshot of a finished section at the time it was observed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BufferedReport {
    pub section_key: String,
    pub label: String,
    pub content: String,
}

impl From<BufferedReport> for StreamEvent {
    fn from(report: BufferedReport) -> Self {
        StreamEvent::Report {
            section: report.section_key,
            label: report.label,
            content: report.content,
        }
    }
}

/// Flush was interrupted by cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushInterrupted {
    /// Reports emitted before the interruption
    pub emitted: usize,
}

/// Append-only buffer of finished reports
#[derive(Debug, Default)]
pub struct ReportBuffer {
    reports: Vec<BufferedReport>,
    flushed: bool,
}

impl ReportBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished section.
    ///
    /// Every firing is kept, repeats included. Empty content is ignored.
    /// Returns whether the report was buffered.
    pub fn record(&mut self, section_key: &str, content: &str) -> bool {
        if content.is_empty() {
            return false;
        }

        debug!(section = section_key, bytes = content.len(), "Buffering report");
        self.reports.push(BufferedReport {
            section_key: section_key.to_string(),
            label: report_label(section_key).to_string(),
            content: content.to_string(),
        });
        true
    }

    /// Buffered reports in observation order
    pub fn reports(&self) -> &[BufferedReport] {
        &self.reports
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    /// Emit every buffered report as a `report` event, in order, pausing
    /// `interval` between events. Runs at most once per buffer.
    pub async fn flush(
        &mut self,
        sink: &EventSink,
        interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<usize, FlushInterrupted> {
        if self.flushed {
            warn!("Report buffer already flushed");
            return Ok(0);
        }
        self.flushed = true;

        let total = self.reports.len();
        for (index, report) in self.reports.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(FlushInterrupted { emitted: index });
            }
            sink.send(report.clone().into()).await;

            if index + 1 < total && !interval.is_zero() {
                tokio::select! {
                    () = cancel.cancelled() => return Err(FlushInterrupted { emitted: index + 1 }),
                    () = tokio::time::sleep(interval) => {}
                }
            }
        }

        debug!(reports = total, "Flushed report buffer");
        Ok(total)
    }
}
