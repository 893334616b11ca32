//! Session command handling and run replacement

mod common;

use agent_core::{
    AgentPipeline, ChunkStream, PipelineChunk, PipelineConfig, Result, ScriptedPipeline, keys,
};
use agent_workflow::{
    AnalysisSession, EventSink, MemoryArtifactStore, SessionCommand, StreamDriver, StreamEvent,
};
use async_trait::async_trait;
use common::*;
use serde_json::{Value, json};
use std::sync::Arc;

struct PanickingPipeline;

#[async_trait]
impl AgentPipeline for PanickingPipeline {
    async fn stream(&self, _config: &PipelineConfig) -> Result<ChunkStream> {
        panic!("graph construction failed");
    }
}

fn request_json(analysts: Value) -> Value {
    json!({
        "ticker": "NVDA",
        "analysis_date": "2024-05-10",
        "analysts": analysts,
        "research_depth": 1,
        "llm_provider": "openai",
        "backend_url": "http://localhost:1234/v1",
        "shallow_thinker": "quick",
        "deep_thinker": "deep"
    })
}

fn session(pipeline: ScriptedPipeline) -> (AnalysisSession, tokio::sync::mpsc::Receiver<StreamEvent>) {
    let driver = builder(pipeline, Arc::new(MemoryArtifactStore::new()))
        .build()
        .unwrap();
    let (sink, rx) = EventSink::channel(256);
    (AnalysisSession::new(Arc::new(driver), sink), rx)
}

fn notices(events: &[StreamEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::Status {
                message: Some(message),
                ..
            } => Some(message.as_str()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn ping_answers_pong() {
    let (mut session, mut rx) = session(ScriptedPipeline::new());
    session.handle_json(r#"{"action": "ping"}"#).await;
    drop(session);

    assert_eq!(collect(&mut rx).await, vec![StreamEvent::Pong]);
}

#[tokio::test]
async fn bad_commands_report_errors_and_keep_session_alive() {
    let (mut session, mut rx) = session(ScriptedPipeline::new());

    session.handle_json("not json").await;
    session
        .handle(SessionCommand::StartAnalysis { request: None })
        .await;
    session
        .handle(SessionCommand::StartAnalysis {
            request: Some(json!({"ticker": "NVDA"})),
        })
        .await;
    session.handle(SessionCommand::Ping).await;
    drop(session);

    let events = collect(&mut rx).await;
    assert_eq!(kinds(&events), vec!["error", "error", "error", "pong"]);
    assert!(matches!(
        &events[1],
        StreamEvent::Error { message } if message == "Missing analysis request"
    ));
    assert!(matches!(
        &events[2],
        StreamEvent::Error { message } if message.starts_with("Invalid analysis request")
    ));
}

#[tokio::test]
async fn empty_analyst_list_is_rejected_without_running() {
    let pipeline = Arc::new(ScriptedPipeline::new().chunk(PipelineChunk::new()));
    let driver = StreamDriver::builder()
        .pipeline(pipeline.clone())
        .config(fast_config())
        .build()
        .unwrap();
    let (sink, mut rx) = EventSink::channel(16);
    let mut session = AnalysisSession::new(Arc::new(driver), sink);

    session
        .handle(SessionCommand::StartAnalysis {
            request: Some(request_json(json!([]))),
        })
        .await;
    session.wait().await;
    drop(session);

    let events = collect(&mut rx).await;
    assert!(matches!(
        events.as_slice(),
        [StreamEvent::Error { message }] if message == "Invalid request: Analysts must be a non-empty list"
    ));
    assert_eq!(pipeline.invocations(), 0);
}

#[tokio::test]
async fn finished_run_completes() {
    let pipeline = ScriptedPipeline::new().chunk(chunk(&[(keys::MARKET_REPORT, json!("M"))]));
    let (mut session, mut rx) = session(pipeline);

    session
        .handle_json(&json!({"action": "start_analysis", "request": request_json(json!(["market"]))}).to_string())
        .await;
    session.wait().await;
    assert!(!session.is_running());
    drop(session);

    let events = collect(&mut rx).await;
    assert_eq!(notices(&events), vec!["Starting analysis for NVDA on 2024-05-10"]);
    assert_eq!(reports(&events).len(), 1);
    assert_eq!(events.last().map(StreamEvent::kind), Some("complete"));
}

#[tokio::test]
async fn stop_cancels_then_reports_ready() {
    let pipeline = ScriptedPipeline::new()
        .chunk(chunk(&[(keys::MARKET_REPORT, json!("M"))]))
        .hang_at_end();
    let (mut session, mut rx) = session(pipeline);

    session.start(request(&["market"])).await;
    session.handle(SessionCommand::Stop).await;
    assert!(!session.is_running());
    drop(session);

    let events = collect(&mut rx).await;
    let kinds = kinds(&events);
    assert_eq!(kinds.first(), Some(&"status"));
    assert!(!kinds.contains(&"report"));
    assert!(!kinds.contains(&"complete"));

    let cancelled = kinds.iter().position(|k| *k == "cancelled").unwrap();
    assert_eq!(cancelled, kinds.len() - 2);
    assert_eq!(
        events.last(),
        Some(&StreamEvent::notice("Analysis stopped. System ready."))
    );
}

#[tokio::test]
async fn starting_again_replaces_the_active_run() {
    let pipeline = ScriptedPipeline::new()
        .chunk(chunk(&[(keys::MARKET_REPORT, json!("M"))]))
        .hang_at_end();
    let (mut session, mut rx) = session(pipeline);

    session.start(request(&["market"])).await;
    session
        .start(agent_core::RunRequest::new("AMD", "2024-05-11").with_analysts(["news"]))
        .await;
    assert!(session.is_running());
    session.close().await;
    drop(session);

    let events = collect(&mut rx).await;
    assert_eq!(
        notices(&events),
        vec![
            "Starting analysis for NVDA on 2024-05-10",
            "Starting analysis for AMD on 2024-05-11"
        ]
    );

    // the first run is fully settled before the second one starts
    let kinds = kinds(&events);
    let second_start = events
        .iter()
        .position(|e| matches!(e, StreamEvent::Status { message: Some(m), .. } if m.contains("AMD")))
        .unwrap();
    assert_eq!(kinds[second_start - 1], "cancelled");
    assert_eq!(kinds.iter().filter(|k| **k == "cancelled").count(), 2);
    assert!(!kinds.contains(&"complete"));
}

#[tokio::test]
async fn panicking_run_still_ends_with_error() {
    let driver = StreamDriver::builder()
        .pipeline(Arc::new(PanickingPipeline))
        .config(fast_config())
        .build()
        .unwrap();
    let (sink, mut rx) = EventSink::channel(16);
    let mut session = AnalysisSession::new(Arc::new(driver), sink);

    session.start(request(&["market"])).await;
    session.wait().await;
    drop(session);

    let events = collect(&mut rx).await;
    assert_eq!(kinds(&events), vec!["status", "error"]);
    assert_eq!(events[1], StreamEvent::error("Analysis task panicked"));
}
