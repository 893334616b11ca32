//! Stream reducer and report assembler for multi-agent trading analysis
//!
//! This crate sits between an agent pipeline that yields incremental state
//! chunks and the stores and clients that consume finished results. It
//! decodes chunks, tracks role statuses, splices debate contributions into
//! composite sections, buffers and flushes reports, persists artifacts and
//! drives each run to exactly one terminal event.

pub mod artifacts;
pub mod buffer;
pub mod config;
pub mod decoder;
pub mod driver;
pub mod error;
pub mod events;
pub mod record;
pub mod retry;
pub mod run;
pub mod session;
pub mod signal;
pub mod splicer;
pub mod status;
pub mod summary;

// Re-export for convenience
pub use artifacts::{
    Artifact, ArtifactContent, ArtifactStore, ArtifactWriter, FsArtifactStore,
    MemoryArtifactStore, WriteError, WriteSummary,
};
pub use buffer::{BufferedReport, ReportBuffer};
pub use config::{DriverConfig, DriverConfigBuilder};
pub use decoder::{Delta, ToolCall, decode};
pub use driver::{RunOutcome, StreamDriver, StreamDriverBuilder};
pub use error::{Result, WorkflowError};
pub use events::{EventSink, MessageKind, StreamEvent};
pub use record::MemoryRunRecord;
pub use retry::{RetryPolicy, Retryable};
pub use run::{AnalysisRun, RunPhase};
pub use session::{AnalysisSession, SessionCommand};
pub use signal::KeywordSignalExtractor;
pub use splicer::{CompositeSection, SectionKind, SectionSplicer, SpliceOutcome};
pub use status::{Role, RoleStatus, StatusSnapshot, StatusTracker};
pub use summary::ExcerptSummarizer;
