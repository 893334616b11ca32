//! Core data model for the trading-analysis stream reducer
//!
//! This crate defines the types shared across the workspace: pipeline chunks
//! and their well-known fields, run requests, the collaborator traits the
//! reducer is driven by, and the common error type.

pub mod chunk;
pub mod error;
pub mod pipeline;
pub mod request;

pub use chunk::{PipelineChunk, is_truthy, keys, stringify};
pub use error::{Error, Result};
pub use pipeline::{
    AgentPipeline, ChunkStream, RunRecord, RunStatus, ScriptedPipeline, SignalExtractor,
    Summarizer,
};
pub use request::{AnalystKind, AnalystSet, PipelineConfig, RunRequest};
