//! Stream driver
//!
//! The driver owns one run from request to terminal event:
//!
//! 1. Validate the request (no pipeline call on failure)
//! 2. Pull chunks, reduce each one, emit live events
//! 3. On exhaustion: fold judge decisions, flush reports, summarize,
//!    persist artifacts, extract the signal, emit `complete`
//!
//! Cancellation is observed at every suspension point and short-circuits
//! to a `cancelled` event without flushing, writing or completing.

use crate::artifacts::{ArtifactStore, ArtifactWriter, MemoryArtifactStore, WriteSummary};
use crate::config::DriverConfig;
use crate::error::{Result, WorkflowError};
use crate::events::{EventSink, StreamEvent};
use crate::run::AnalysisRun;
use crate::signal::KeywordSignalExtractor;
use agent_core::{AgentPipeline, RunRecord, RunRequest, RunStatus, SignalExtractor, Summarizer};
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// Message carried by the `cancelled` event
pub const CANCELLED_MESSAGE: &str = "Analysis cancelled.";

/// How a run ended
#[derive(Debug)]
pub enum RunOutcome {
    Completed {
        run_id: String,
        decision: String,
        writes: WriteSummary,
    },
    Cancelled {
        run_id: String,
    },
    Failed {
        run_id: String,
        message: String,
    },
}

impl RunOutcome {
    pub fn run_id(&self) -> &str {
        match self {
            Self::Completed { run_id, .. }
            | Self::Cancelled { run_id }
            | Self::Failed { run_id, .. } => run_id,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

enum Pulled {
    Exhausted,
    Cancelled,
}

/// Everything one run needs while it is being driven
struct Active<'a> {
    run: AnalysisRun,
    sink: &'a EventSink,
    cancel: &'a CancellationToken,
    recorded: bool,
}

/// Drives analysis runs against an agent pipeline
pub struct StreamDriver {
    pipeline: Arc<dyn AgentPipeline>,
    summarizers: Vec<Arc<dyn Summarizer>>,
    signal: Arc<dyn SignalExtractor>,
    writer: ArtifactWriter,
    record: Option<Arc<dyn RunRecord>>,
    config: DriverConfig,
}

impl StreamDriver {
    pub fn builder() -> StreamDriverBuilder {
        StreamDriverBuilder::new()
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Drive one run to a terminal event
    ///
    /// Returns `Err` only when the request is rejected; an `error` event has
    /// been emitted in that case and the pipeline was never invoked. Every
    /// other ending is a [`RunOutcome`], after exactly one terminal event.
    pub async fn run(
        &self,
        request: RunRequest,
        sink: &EventSink,
        cancel: CancellationToken,
    ) -> Result<RunOutcome> {
        let run = match AnalysisRun::new(request) {
            Ok(run) => run.with_debate_messages(self.config.debate_messages),
            Err(e) => {
                warn!(error = %e, "Rejected analysis request");
                sink.send(StreamEvent::error(e.to_string())).await;
                return Err(e);
            }
        };

        let symbol = run.request().symbol();
        let date = run.request().analysis_date.clone();
        let (run_id, recorded) = self.open_record(&symbol, &date).await;

        let mut active = Active {
            run,
            sink,
            cancel: &cancel,
            recorded,
        };
        let span = info_span!(
            "analysis",
            ticker = %symbol,
            date = %date,
            run_id = tracing::field::Empty
        );

        let outcome = async {
            if let Err(e) = active.run.start(run_id) {
                return self.failed(&mut active, e).await;
            }
            tracing::Span::current().record("run_id", active.run.run_id());
            info!(analysts = ?active.run.analysts(), "Starting analysis");

            sink.send(StreamEvent::Status {
                message: Some(format!("Starting analysis for {symbol} on {date}")),
                agents: Some(active.run.snapshot()),
            })
            .await;

            self.execute(&mut active).await
        }
        .instrument(span)
        .await;

        Ok(outcome)
    }

    async fn execute(&self, active: &mut Active<'_>) -> RunOutcome {
        match self.pull(active).await {
            Ok(Pulled::Exhausted) => {}
            Ok(Pulled::Cancelled) => return self.cancelled(active).await,
            Err(e) => return self.failed(active, e).await,
        }

        match self.finish(active).await {
            Ok(Some(outcome)) => outcome,
            Ok(None) => self.cancelled(active).await,
            Err(e) => self.failed(active, e).await,
        }
    }

    /// Pull and reduce chunks until the stream ends or the run is cancelled
    async fn pull(&self, active: &mut Active<'_>) -> Result<Pulled> {
        let config = active.run.request().pipeline_config()?;
        let cancel = active.cancel;

        let mut stream = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(Pulled::Cancelled),
            stream = self.pipeline.stream(&config) => stream?,
        };
        debug!(pipeline = self.pipeline.name(), "Pipeline stream opened");

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(Pulled::Cancelled),
                next = stream.next() => next,
            };

            let chunk = match next {
                None => break,
                Some(chunk) => chunk?,
            };

            let events = active.run.process_chunk(&chunk)?;
            active.sink.send_all(events).await;
        }

        info!(chunks = active.run.chunks(), "Pipeline stream exhausted");
        Ok(Pulled::Exhausted)
    }

    /// Finalization after exhaustion. `Ok(None)` means cancellation was
    /// observed before anything was persisted.
    async fn finish(&self, active: &mut Active<'_>) -> Result<Option<RunOutcome>> {
        let cancel = active.cancel;

        active.run.finalize_sections();
        if let Err(interrupted) = active
            .run
            .flush_reports(active.sink, self.config.flush_interval, cancel)
            .await
        {
            warn!(emitted = interrupted.emitted, "Report flush interrupted");
            return Ok(None);
        }

        for summarizer in &self.summarizers {
            let state = active.run.final_state();
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(None),
                result = summarizer.summarize(&state) => result,
            };
            match result {
                Ok(summaries) => {
                    debug!(summarizer = summarizer.name(), count = summaries.len(), "Merged summaries");
                    active.run.merge_summaries(summaries);
                }
                Err(e) => warn!(summarizer = summarizer.name(), error = %e, "Summarizer failed, skipping"),
            }
        }

        // last point at which a cancel leaves storage untouched
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let run_id = active.run.run_id().to_string();
        let writes = self.writer.write_all(&run_id, &active.run.artifacts()).await;
        if !writes.is_clean() {
            warn!(failed = writes.failed.len(), "Some artifacts were not written");
        }

        let decision = self
            .signal
            .extract(&active.run.decision_text())
            .await
            .map_err(|e| WorkflowError::Signal(e.to_string()))?;

        active.run.complete()?;
        self.update_record(active, RunStatus::Completed, None).await;

        info!(decision = %decision, written = writes.written.len(), "Analysis complete");
        active
            .sink
            .send(StreamEvent::Complete {
                decision: decision.clone(),
                final_state: active.run.final_state().into_value(),
            })
            .await;

        Ok(Some(RunOutcome::Completed {
            run_id,
            decision,
            writes,
        }))
    }

    async fn cancelled(&self, active: &mut Active<'_>) -> RunOutcome {
        info!(chunks = active.run.chunks(), "Analysis cancelled");
        active.run.cancel();
        self.update_record(active, RunStatus::Cancelled, None).await;
        active
            .sink
            .send(StreamEvent::Cancelled {
                message: CANCELLED_MESSAGE.to_string(),
            })
            .await;
        RunOutcome::Cancelled {
            run_id: active.run.run_id().to_string(),
        }
    }

    async fn failed(&self, active: &mut Active<'_>, err: WorkflowError) -> RunOutcome {
        let message = err.to_string();
        error!(error = %message, "Analysis failed");
        active.run.fail();
        self.update_record(active, RunStatus::Failed, Some(message.clone()))
            .await;
        active.sink.send(StreamEvent::error(message.clone())).await;
        RunOutcome::Failed {
            run_id: active.run.run_id().to_string(),
            message,
        }
    }

    /// Ask the run record for an id, falling back to the deterministic one
    async fn open_record(&self, symbol: &str, date: &str) -> (Option<String>, bool) {
        let Some(record) = &self.record else {
            return (None, false);
        };
        match record.create(symbol, date).await {
            Ok(run_id) => (Some(run_id), true),
            Err(e) => {
                warn!(error = %e, "Failed to create run record");
                (None, false)
            }
        }
    }

    async fn update_record(&self, active: &Active<'_>, status: RunStatus, error: Option<String>) {
        if !active.recorded {
            return;
        }
        if let Some(record) = &self.record {
            if let Err(e) = record.update(active.run.run_id(), status, error).await {
                warn!(error = %e, %status, "Failed to update run record");
            }
        }
    }
}

/// Builder for [`StreamDriver`]
pub struct StreamDriverBuilder {
    pipeline: Option<Arc<dyn AgentPipeline>>,
    summarizers: Vec<Arc<dyn Summarizer>>,
    signal: Option<Arc<dyn SignalExtractor>>,
    store: Option<Arc<dyn ArtifactStore>>,
    record: Option<Arc<dyn RunRecord>>,
    config: DriverConfig,
}

impl StreamDriverBuilder {
    pub fn new() -> Self {
        Self {
            pipeline: None,
            summarizers: Vec::new(),
            signal: None,
            store: None,
            record: None,
            config: DriverConfig::default(),
        }
    }

    /// Set the agent pipeline
    pub fn pipeline(mut self, pipeline: Arc<dyn AgentPipeline>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Add a summarizer; summarizers run in the order added
    pub fn summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizers.push(summarizer);
        self
    }

    /// Set the signal extractor (keyword extraction by default)
    pub fn signal_extractor(mut self, extractor: Arc<dyn SignalExtractor>) -> Self {
        self.signal = Some(extractor);
        self
    }

    /// Set the artifact store (in-memory by default)
    pub fn store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the persistent run record
    pub fn run_record(mut self, record: Arc<dyn RunRecord>) -> Self {
        self.record = Some(record);
        self
    }

    pub fn config(mut self, config: DriverConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the driver
    pub fn build(self) -> Result<StreamDriver> {
        let pipeline = self
            .pipeline
            .ok_or_else(|| WorkflowError::Config("Pipeline not set".to_string()))?;
        self.config.validate()?;

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryArtifactStore::new()));
        let signal = self
            .signal
            .unwrap_or_else(|| Arc::new(KeywordSignalExtractor::new()));

        Ok(StreamDriver {
            pipeline,
            summarizers: self.summarizers,
            signal,
            writer: ArtifactWriter::new(store, self.config.write_retry.clone()),
            record: self.record,
            config: self.config,
        })
    }
}

impl Default for StreamDriverBuilder {
    fn default() -> Self {
        Self::new()
    }
}
