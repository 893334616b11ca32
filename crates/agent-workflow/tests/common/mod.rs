#![allow(dead_code)]

use agent_core::{PipelineChunk, RunRequest, ScriptedPipeline};
use agent_workflow::{
    DriverConfig, EventSink, MemoryArtifactStore, RetryPolicy, StatusSnapshot, StreamDriver,
    StreamDriverBuilder, StreamEvent,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub const TICKER: &str = "NVDA";
pub const DATE: &str = "2024-05-10";

pub fn request(analysts: &[&str]) -> RunRequest {
    RunRequest::new(TICKER, DATE).with_analysts(analysts.iter().copied())
}

pub fn chunk(pairs: &[(&str, Value)]) -> PipelineChunk {
    pairs
        .iter()
        .fold(PipelineChunk::new(), |chunk, (key, value)| {
            chunk.with(*key, value.clone())
        })
}

pub fn fast_config() -> DriverConfig {
    DriverConfig::builder()
        .flush_interval(Duration::ZERO)
        .write_retry(RetryPolicy::no_retry())
        .build()
        .unwrap()
}

pub fn builder(pipeline: ScriptedPipeline, store: Arc<MemoryArtifactStore>) -> StreamDriverBuilder {
    StreamDriver::builder()
        .pipeline(Arc::new(pipeline))
        .store(store)
        .config(fast_config())
}

/// Run to completion and return every event emitted
pub async fn run_to_end(driver: &StreamDriver, request: RunRequest) -> Vec<StreamEvent> {
    let (sink, mut rx) = EventSink::channel(512);
    driver
        .run(request, &sink, tokio_util::sync::CancellationToken::new())
        .await
        .unwrap();
    drop(sink);
    collect(&mut rx).await
}

pub async fn collect(rx: &mut mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

pub fn kinds(events: &[StreamEvent]) -> Vec<&'static str> {
    events.iter().map(StreamEvent::kind).collect()
}

/// `(section, content)` of each report event, in order
pub fn reports(events: &[StreamEvent]) -> Vec<(String, String)> {
    events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::Report {
                section, content, ..
            } => Some((section.clone(), content.clone())),
            _ => None,
        })
        .collect()
}

pub fn snapshots(events: &[StreamEvent]) -> Vec<StatusSnapshot> {
    events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::Status {
                agents: Some(agents),
                ..
            } => Some(*agents),
            _ => None,
        })
        .collect()
}

pub fn final_state(events: &[StreamEvent]) -> Option<&Value> {
    events.iter().find_map(|event| match event {
        StreamEvent::Complete { final_state, .. } => Some(final_state),
        _ => None,
    })
}
