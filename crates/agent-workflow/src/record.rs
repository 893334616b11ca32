//! In-process run record

use agent_core::{Error, Result, RunRecord, RunStatus};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::sync::RwLock;
use tracing::debug;

/// One recorded run
#[derive(Debug, Clone, PartialEq)]
pub struct RunEntry {
    pub run_id: String,
    pub ticker: String,
    pub date: String,
    pub status: RunStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Local>,
    pub updated_at: DateTime<Local>,
}

/// Keeps the history of runs in memory
#[derive(Debug, Default)]
pub struct MemoryRunRecord {
    entries: RwLock<Vec<RunEntry>>,
}

impl MemoryRunRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, run_id: &str) -> Option<RunEntry> {
        self.entries
            .read()
            .ok()?
            .iter()
            .find(|entry| entry.run_id == run_id)
            .cloned()
    }

    /// All runs, oldest first
    pub fn entries(&self) -> Vec<RunEntry> {
        self.entries.read().map(|e| e.clone()).unwrap_or_default()
    }
}

fn lock_error(e: impl std::fmt::Display) -> Error {
    Error::collaborator("run record", format!("Lock error: {e}"))
}

#[async_trait]
impl RunRecord for MemoryRunRecord {
    async fn create(&self, ticker: &str, date: &str) -> Result<String> {
        let mut entries = self.entries.write().map_err(lock_error)?;
        let run_id = format!(
            "{}_{}_{}",
            ticker.trim().to_uppercase(),
            date,
            entries.len() + 1
        );
        let now = Local::now();
        entries.push(RunEntry {
            run_id: run_id.clone(),
            ticker: ticker.to_string(),
            date: date.to_string(),
            status: RunStatus::Running,
            error: None,
            created_at: now,
            updated_at: now,
        });
        debug!(run_id = %run_id, "Recorded new run");
        Ok(run_id)
    }

    async fn update(&self, run_id: &str, status: RunStatus, error: Option<String>) -> Result<()> {
        let mut entries = self.entries.write().map_err(lock_error)?;
        let entry = entries
            .iter_mut()
            .find(|entry| entry.run_id == run_id)
            .ok_or_else(|| Error::collaborator("run record", format!("Unknown run: {run_id}")))?;
        entry.status = status;
        entry.error = error;
        entry.updated_at = Local::now();
        debug!(run_id, %status, "Updated run");
        Ok(())
    }
}
