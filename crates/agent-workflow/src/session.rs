//! Per-connection session handle
//!
//! A session owns at most one active run. Starting a new run cancels the
//! previous one and waits for it to settle first, so two runs never share
//! a session's event stream at the same time.

use crate::driver::StreamDriver;
use crate::events::{EventSink, StreamEvent};
use agent_core::RunRequest;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Notice sent once a stop request has settled
pub const STOPPED_MESSAGE: &str = "Analysis stopped. System ready.";

/// Commands a client can send
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SessionCommand {
    StartAnalysis {
        #[serde(default)]
        request: Option<Value>,
    },
    Stop,
    Ping,
}

struct ActiveRun {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// One client's view of the analysis service
pub struct AnalysisSession {
    driver: Arc<StreamDriver>,
    sink: EventSink,
    active: Option<ActiveRun>,
}

impl AnalysisSession {
    pub fn new(driver: Arc<StreamDriver>, sink: EventSink) -> Self {
        Self {
            driver,
            sink,
            active: None,
        }
    }

    /// Decode and handle a raw JSON command
    pub async fn handle_json(&mut self, text: &str) {
        match serde_json::from_str::<SessionCommand>(text) {
            Ok(command) => self.handle(command).await,
            Err(e) => {
                debug!(error = %e, "Undecodable command");
                self.sink
                    .send(StreamEvent::error(format!("Invalid command: {e}")))
                    .await;
            }
        }
    }

    pub async fn handle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::StartAnalysis { request: None } => {
                self.sink
                    .send(StreamEvent::error("Missing analysis request"))
                    .await;
            }
            SessionCommand::StartAnalysis {
                request: Some(request),
            } => match serde_json::from_value::<RunRequest>(request) {
                Ok(request) => self.start(request).await,
                Err(e) => {
                    self.sink
                        .send(StreamEvent::error(format!("Invalid analysis request: {e}")))
                        .await;
                }
            },
            SessionCommand::Stop => self.stop().await,
            SessionCommand::Ping => self.sink.send(StreamEvent::Pong).await,
        }
    }

    /// Start a run, replacing any active one
    pub async fn start(&mut self, request: RunRequest) {
        if self.cancel_active().await {
            info!("Replaced active analysis");
        }

        let cancel = CancellationToken::new();
        let driver = self.driver.clone();
        let sink = self.sink.clone();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let run_sink = sink.clone();
            let task = tokio::spawn(async move {
                // the outcome has already been reported as a terminal event
                let _ = driver.run(request, &run_sink, token).await;
            });

            if let Err(e) = task.await {
                if e.is_panic() {
                    error!("Analysis task panicked");
                    sink.send(StreamEvent::error("Analysis task panicked")).await;
                } else {
                    warn!(error = %e, "Analysis task aborted");
                }
            }
        });

        self.active = Some(ActiveRun { cancel, handle });
    }

    /// Cancel the active run, wait for it, then report readiness
    pub async fn stop(&mut self) {
        self.cancel_active().await;
        self.sink.send(StreamEvent::notice(STOPPED_MESSAGE)).await;
    }

    /// Transport went away: cancel without reporting
    pub async fn close(&mut self) {
        if self.cancel_active().await {
            debug!("Cancelled analysis on close");
        }
    }

    pub fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| !active.handle.is_finished())
    }

    /// Wait for the active run to end on its own
    pub async fn wait(&mut self) {
        if let Some(active) = self.active.take() {
            if let Err(e) = active.handle.await {
                warn!(error = %e, "Session task failed");
            }
        }
    }

    /// Returns whether a run was still in flight
    async fn cancel_active(&mut self) -> bool {
        let Some(active) = self.active.take() else {
            return false;
        };
        let was_running = !active.handle.is_finished();
        active.cancel.cancel();
        if let Err(e) = active.handle.await {
            warn!(error = %e, "Session task failed");
        }
        was_running
    }
}
