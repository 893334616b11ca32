//! Events emitted to the external transport

use crate::status::StatusSnapshot;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

/// How a message event should be presented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    /// Agent output with structured content
    Reasoning,
    /// Anything else the pipeline emitted
    System,
}

/// One event of the ordered stream sent to a client
///
/// Serializes as `{"type": "...", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    Status {
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        agents: Option<StatusSnapshot>,
    },
    Message {
        #[serde(rename = "type")]
        kind: MessageKind,
        content: String,
    },
    ToolCall {
        name: String,
        args: Value,
    },
    Report {
        section: String,
        label: String,
        content: String,
    },
    Complete {
        decision: String,
        final_state: Value,
    },
    Cancelled {
        message: String,
    },
    Error {
        message: String,
    },
    Pong,
}

impl StreamEvent {
    /// Full status map
    pub fn status(agents: StatusSnapshot) -> Self {
        Self::Status {
            message: None,
            agents: Some(agents),
        }
    }

    /// Status notice without a role map
    pub fn notice(message: impl Into<String>) -> Self {
        Self::Status {
            message: Some(message.into()),
            agents: None,
        }
    }

    pub fn reasoning(content: impl Into<String>) -> Self {
        Self::Message {
            kind: MessageKind::Reasoning,
            content: content.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Wire name of the event
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Message { .. } => "message",
            Self::ToolCall { .. } => "tool_call",
            Self::Report { .. } => "report",
            Self::Complete { .. } => "complete",
            Self::Cancelled { .. } => "cancelled",
            Self::Error { .. } => "error",
            Self::Pong => "pong",
        }
    }

    /// True for the events that end a run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Complete { .. } | Self::Cancelled { .. } | Self::Error { .. }
        )
    }

    /// JSON form with a timestamp, as sent over the wire
    pub fn to_wire(&self, timestamp: DateTime<Local>) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or_else(|e| {
            serde_json::json!({"type": "error", "data": {"message": e.to_string()}})
        });
        if let Value::Object(map) = &mut value {
            map.insert("timestamp".to_string(), Value::String(timestamp.to_rfc3339()));
        }
        value
    }
}

/// Sending half of a session's event stream
///
/// Delivery is best-effort: once the receiver is gone, events are dropped.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<StreamEvent>,
}

impl EventSink {
    /// Create a bounded event channel
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    pub fn new(tx: mpsc::Sender<StreamEvent>) -> Self {
        Self { tx }
    }

    /// Send one event, waiting for capacity
    pub async fn send(&self, event: StreamEvent) {
        let kind = event.kind();
        if self.tx.send(event).await.is_err() {
            debug!(event = kind, "Event receiver dropped, discarding event");
        }
    }

    /// Send events in order
    pub async fn send_all(&self, events: impl IntoIterator<Item = StreamEvent>) {
        for event in events {
            self.send(event).await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
