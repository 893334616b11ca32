//! Artifact persistence
//!
//! Finished sections are written under `(run_id, section_key)`. Writes are
//! last-write-wins and idempotent: writing the same content again leaves
//! storage untouched. The representation is chosen from the content's
//! shape: text is written as markdown, mappings and sequences as JSON.

use crate::error::WorkflowError;
use crate::retry::{RetryPolicy, Retryable};
use agent_core::stringify;
use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Failure to persist one artifact
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Invalid artifact key: {0}")]
    InvalidKey(String),

    #[error("Failed to encode {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl Retryable for WriteError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Unavailable(_))
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> WriteError + '_ {
    move |source| WriteError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Reject keys that are empty or could escape their directory
pub fn validate_key(part: &str) -> Result<(), WriteError> {
    let valid = !part.trim().is_empty()
        && part != "."
        && part != ".."
        && !part.contains(['/', '\\', '\0']);
    if valid {
        Ok(())
    } else {
        Err(WriteError::InvalidKey(part.to_string()))
    }
}

/// Content of one artifact, in one of two physical representations
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactContent {
    /// Plain text, stored as markdown
    Text(String),
    /// Nested mapping or sequence, stored as pretty JSON
    Structured(Value),
}

impl ArtifactContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Pick the representation from the value's shape
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(_) | Value::Array(_) => Self::Structured(value.clone()),
            other => Self::Text(stringify(other)),
        }
    }

    /// File extension of the representation
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Text(_) => "md",
            Self::Structured(_) => "json",
        }
    }

    fn sibling_extension(&self) -> &'static str {
        match self {
            Self::Text(_) => "json",
            Self::Structured(_) => "md",
        }
    }

    /// Bytes as written to storage
    pub fn encode(&self, key: &str) -> Result<Vec<u8>, WriteError> {
        match self {
            Self::Text(text) => Ok(text.as_bytes().to_vec()),
            Self::Structured(value) => {
                serde_json::to_vec_pretty(value).map_err(|source| WriteError::Encode {
                    key: key.to_string(),
                    source,
                })
            }
        }
    }
}

/// Durable storage for artifacts
///
/// Implementations must tolerate concurrent writes to distinct
/// `(run_id, section_key)` pairs.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put(
        &self,
        run_id: &str,
        section_key: &str,
        content: &ArtifactContent,
    ) -> Result<(), WriteError>;
}

/// Filesystem store: `<root>/<run_id>/<section_key>.{md,json}`
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where an artifact lands on disk
    pub fn path_for(&self, run_id: &str, section_key: &str, content: &ArtifactContent) -> PathBuf {
        self.root
            .join(run_id)
            .join(format!("{section_key}.{}", content.extension()))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(
        &self,
        run_id: &str,
        section_key: &str,
        content: &ArtifactContent,
    ) -> Result<(), WriteError> {
        let dir = self.root.join(run_id);
        tokio::fs::create_dir_all(&dir).await.map_err(io_error(&dir))?;

        let path = self.path_for(run_id, section_key, content);
        let bytes = content.encode(section_key)?;

        if let Ok(existing) = tokio::fs::read(&path).await {
            if existing == bytes {
                debug!(path = %path.display(), "Artifact unchanged, skipping write");
                return Ok(());
            }
        }

        // write-then-rename so readers never observe a partial file
        let tmp = dir.join(format!(".{section_key}.{}.tmp", content.extension()));
        tokio::fs::write(&tmp, &bytes).await.map_err(io_error(&tmp))?;
        tokio::fs::rename(&tmp, &path).await.map_err(io_error(&path))?;

        // last write wins across representations too
        let sibling = dir.join(format!("{section_key}.{}", content.sibling_extension()));
        match tokio::fs::remove_file(&sibling).await {
            Ok(()) => debug!(path = %sibling.display(), "Removed stale representation"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(io_error(&sibling)(e)),
        }

        debug!(path = %path.display(), bytes = bytes.len(), "Wrote artifact");
        Ok(())
    }
}

type StoreKey = (String, String);

/// In-process store
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    entries: RwLock<HashMap<StoreKey, ArtifactContent>>,
    writes: AtomicUsize,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, run_id: &str, section_key: &str) -> Option<ArtifactContent> {
        self.entries
            .read()
            .ok()?
            .get(&(run_id.to_string(), section_key.to_string()))
            .cloned()
    }

    /// Section keys stored for a run, sorted
    pub fn keys(&self, run_id: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .map(|entries| {
                entries
                    .keys()
                    .filter(|(run, _)| run == run_id)
                    .map(|(_, key)| key.clone())
                    .collect()
            })
            .unwrap_or_default();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of writes that changed stored content
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put(
        &self,
        run_id: &str,
        section_key: &str,
        content: &ArtifactContent,
    ) -> Result<(), WriteError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| WriteError::Unavailable(format!("Lock error: {e}")))?;

        let key = (run_id.to_string(), section_key.to_string());
        if entries.get(&key) == Some(content) {
            return Ok(());
        }
        entries.insert(key, content.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// One artifact to persist
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub key: String,
    pub content: ArtifactContent,
}

impl Artifact {
    pub fn new(key: impl Into<String>, content: ArtifactContent) -> Self {
        Self {
            key: key.into(),
            content,
        }
    }
}

/// Outcome of persisting a batch of artifacts
#[derive(Debug, Default)]
pub struct WriteSummary {
    /// Keys written successfully, in request order
    pub written: Vec<String>,
    /// Keys that failed, with their errors
    pub failed: Vec<(String, WriteError)>,
}

impl WriteSummary {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Failures as workflow errors
    pub fn into_errors(self) -> Vec<WorkflowError> {
        self.failed
            .into_iter()
            .map(|(section, source)| WorkflowError::Write { section, source })
            .collect()
    }
}

/// Persists artifacts through a store, retrying transient failures
#[derive(Clone)]
pub struct ArtifactWriter {
    store: Arc<dyn ArtifactStore>,
    retry: RetryPolicy,
}

impl ArtifactWriter {
    pub fn new(store: Arc<dyn ArtifactStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Write one artifact
    pub async fn write(
        &self,
        run_id: &str,
        section_key: &str,
        content: &ArtifactContent,
    ) -> Result<(), WriteError> {
        validate_key(run_id)?;
        validate_key(section_key)?;

        let operation = format!("write {run_id}/{section_key}");
        self.retry
            .execute(&operation, || self.store.put(run_id, section_key, content))
            .await
    }

    /// Write a batch. One failure never stops the others; every failure is
    /// collected into the summary.
    pub async fn write_all(&self, run_id: &str, artifacts: &[Artifact]) -> WriteSummary {
        let results = join_all(
            artifacts
                .iter()
                .map(|artifact| self.write(run_id, &artifact.key, &artifact.content)),
        )
        .await;

        let mut summary = WriteSummary::default();
        for (artifact, result) in artifacts.iter().zip(results) {
            match result {
                Ok(()) => summary.written.push(artifact.key.clone()),
                Err(e) => {
                    warn!(run_id, section = %artifact.key, error = %e, "Failed to write artifact");
                    summary.failed.push((artifact.key.clone(), e));
                }
            }
        }

        info!(
            run_id,
            written = summary.written.len(),
            failed = summary.failed.len(),
            "Persisted artifacts"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FlakyStore {
        inner: MemoryArtifactStore,
        broken_key: &'static str,
    }

    #[async_trait]
    impl ArtifactStore for FlakyStore {
        async fn put(
            &self,
            run_id: &str,
            section_key: &str,
            content: &ArtifactContent,
        ) -> Result<(), WriteError> {
            if section_key == self.broken_key {
                return Err(WriteError::Unavailable("disk full".to_string()));
            }
            self.inner.put(run_id, section_key, content).await
        }
    }

    #[test]
    fn test_representation_follows_shape() {
        assert_eq!(
            ArtifactContent::from_value(&json!("text")),
            ArtifactContent::Text("text".into())
        );
        assert!(matches!(
            ArtifactContent::from_value(&json!({"bull_history": "a"})),
            ArtifactContent::Structured(_)
        ));
        assert!(matches!(
            ArtifactContent::from_value(&json!(["a"])),
            ArtifactContent::Structured(_)
        ));
        assert_eq!(ArtifactContent::from_value(&json!(3)).extension(), "md");
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("AAPL_2024-05-10").is_ok());
        assert!(validate_key("market_report").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("..").is_err());
        assert!(validate_key("a/b").is_err());
    }

    #[tokio::test]
    async fn test_memory_store_is_idempotent() {
        let store = Arc::new(MemoryArtifactStore::new());
        let writer = ArtifactWriter::new(store.clone(), RetryPolicy::no_retry());
        let content = ArtifactContent::text("M");

        writer.write("run", "market_report", &content).await.unwrap();
        writer.write("run", "market_report", &content).await.unwrap();
        assert_eq!(store.write_count(), 1);

        writer
            .write("run", "market_report", &ArtifactContent::text("M2"))
            .await
            .unwrap();
        assert_eq!(store.write_count(), 2);
        assert_eq!(store.get("run", "market_report"), Some(ArtifactContent::text("M2")));
    }

    #[tokio::test]
    async fn test_write_all_collects_failures() {
        let store = Arc::new(FlakyStore {
            inner: MemoryArtifactStore::new(),
            broken_key: "news_report",
        });
        let writer = ArtifactWriter::new(store.clone(), RetryPolicy::no_retry());

        let artifacts = vec![
            Artifact::new("market_report", ArtifactContent::text("M")),
            Artifact::new("news_report", ArtifactContent::text("N")),
            Artifact::new("risk_debate_state", ArtifactContent::Structured(json!({"judge_decision": "Buy"}))),
        ];

        let summary = writer.write_all("run", &artifacts).await;
        assert_eq!(summary.written, vec!["market_report", "risk_debate_state"]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, "news_report");
        assert_eq!(store.inner.keys("run"), vec!["market_report", "risk_debate_state"]);

        let errors = summary.into_errors();
        assert!(errors[0].to_string().contains("news_report"));
    }

    #[tokio::test]
    async fn test_invalid_key_rejected_before_store() {
        let store = Arc::new(MemoryArtifactStore::new());
        let writer = ArtifactWriter::new(store.clone(), RetryPolicy::default());

        let err = writer
            .write("../escape", "market_report", &ArtifactContent::text("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, WriteError::InvalidKey(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_fs_store_layout_and_idempotence() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let text = ArtifactContent::text("## Market\nUp");

        store.put("AAPL_2024-05-10", "market_report", &text).await.unwrap();
        let path = store.path_for("AAPL_2024-05-10", "market_report", &text);
        assert!(path.ends_with("AAPL_2024-05-10/market_report.md"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "## Market\nUp");

        let modified = std::fs::metadata(&path).unwrap().modified().unwrap();
        store.put("AAPL_2024-05-10", "market_report", &text).await.unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().modified().unwrap(), modified);
    }

    #[tokio::test]
    async fn test_fs_store_structured_replaces_text() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let text = ArtifactContent::text("plain");
        let structured = ArtifactContent::Structured(json!({"judge_decision": "Hold"}));

        store.put("run", "risk_debate_state", &text).await.unwrap();
        store.put("run", "risk_debate_state", &structured).await.unwrap();

        assert!(!store.path_for("run", "risk_debate_state", &text).exists());
        let written = std::fs::read_to_string(store.path_for("run", "risk_debate_state", &structured))
            .unwrap();
        let parsed: Value = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed, json!({"judge_decision": "Hold"}));
    }

    #[tokio::test]
    async fn test_fs_store_concurrent_distinct_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FsArtifactStore::new(dir.path()));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let content = ArtifactContent::text(format!("body {i}"));
                    store.put("run", &format!("section_{i}"), &content).await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        for i in 0..8 {
            let path = dir.path().join("run").join(format!("section_{i}.md"));
            assert_eq!(std::fs::read_to_string(path).unwrap(), format!("body {i}"));
        }
    }
}
