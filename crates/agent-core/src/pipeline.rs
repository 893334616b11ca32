//! Collaborator seams
//!
//! The stream reducer depends on a handful of external collaborators: the
//! agent pipeline that produces chunks, summarizers, a signal extractor and
//! an optional persistent run record. Each is a trait so the reducer can be
//! driven by real backends, recorded replays or test doubles alike.

use crate::{Error, PipelineChunk, PipelineConfig, Result};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Lazily pulled, finite sequence of chunks
pub type ChunkStream = BoxStream<'static, Result<PipelineChunk>>;

/// The external multi-agent pipeline
#[async_trait]
pub trait AgentPipeline: Send + Sync {
    /// Start the pipeline and return its chunk stream
    ///
    /// Pulling from the stream may yield an error, which terminates it.
    async fn stream(&self, config: &PipelineConfig) -> Result<ChunkStream>;

    /// Get the pipeline's name
    fn name(&self) -> &str {
        "pipeline"
    }
}

/// Post-stream summarization collaborator
///
/// Receives the final state and returns name → value pairs that are merged
/// back into it. Values may be text or structured.
#[async_trait]
pub trait Summarizer: Send + Sync {
    fn name(&self) -> &str;

    async fn summarize(&self, state: &PipelineChunk) -> Result<Map<String, Value>>;
}

/// Turns the final decision text into a decision label
#[async_trait]
pub trait SignalExtractor: Send + Sync {
    async fn extract(&self, decision_text: &str) -> Result<String>;
}

/// Lifecycle of a persisted run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Optional persistent record of runs. All calls are best-effort.
#[async_trait]
pub trait RunRecord: Send + Sync {
    /// Create a record and return its run id
    async fn create(&self, ticker: &str, date: &str) -> Result<String>;

    /// Update a record's status
    async fn update(&self, run_id: &str, status: RunStatus, error: Option<String>) -> Result<()>;
}

#[derive(Debug, Clone)]
enum ScriptStep {
    Chunk(PipelineChunk),
    Fail(String),
}

/// Pipeline that replays a fixed list of chunks
///
/// Used for recorded replays and tests. An optional delay is applied before
/// every chunk, and the stream can be told to hang after the last step
/// instead of ending.
///
/// # Example
///
/// ```
/// use agent_core::{keys, PipelineChunk, ScriptedPipeline};
///
/// let pipeline = ScriptedPipeline::new()
///     .chunk(PipelineChunk::new().with(keys::MARKET_REPORT, serde_json::json!("M")))
///     .fail("upstream timeout");
///
/// assert_eq!(pipeline.len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct ScriptedPipeline {
    steps: Vec<ScriptStep>,
    delay: Duration,
    hang: bool,
    invocations: AtomicUsize,
}

impl ScriptedPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a list of chunks
    pub fn from_chunks(chunks: impl IntoIterator<Item = PipelineChunk>) -> Self {
        Self {
            steps: chunks.into_iter().map(ScriptStep::Chunk).collect(),
            ..Self::default()
        }
    }

    /// Append a chunk
    pub fn chunk(mut self, chunk: PipelineChunk) -> Self {
        self.steps.push(ScriptStep::Chunk(chunk));
        self
    }

    /// Append a failure; the stream ends with this error
    pub fn fail(mut self, message: impl Into<String>) -> Self {
        self.steps.push(ScriptStep::Fail(message.into()));
        self
    }

    /// Wait this long before each chunk
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Never finish after the scripted steps
    pub fn hang_at_end(mut self) -> Self {
        self.hang = true;
        self
    }

    /// Number of scripted steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// How many times the pipeline has been started
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentPipeline for ScriptedPipeline {
    async fn stream(&self, _config: &PipelineConfig) -> Result<ChunkStream> {
        self.invocations.fetch_add(1, Ordering::SeqCst);

        let delay = self.delay;
        let mut failed = false;
        let steps: Vec<ScriptStep> = self
            .steps
            .iter()
            .take_while(|step| {
                let keep = !failed;
                failed |= matches!(step, ScriptStep::Fail(_));
                keep
            })
            .cloned()
            .collect();

        let scripted = stream::iter(steps).then(move |step| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match step {
                ScriptStep::Chunk(chunk) => Ok(chunk),
                ScriptStep::Fail(message) => Err(Error::Pipeline(message)),
            }
        });

        if self.hang {
            Ok(scripted.chain(stream::pending()).boxed())
        } else {
            Ok(scripted.boxed())
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
