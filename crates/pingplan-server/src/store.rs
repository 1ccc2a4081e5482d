use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::models::Document;

/// Whole-document persistence. Callers serialize load/modify/save themselves.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Never fails: missing or unreadable state comes back as an empty document.
    async fn load_all(&self) -> Document;

    async fn save_all(&self, doc: &Document) -> anyhow::Result<()>;
}

pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "tasks.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl TaskStore for JsonFileStore {
    async fn load_all(&self) -> Document {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "task document missing; starting empty");
                return Document::default();
            }
            Err(err) => {
                warn!(error = %err, path = %self.path.display(), "failed to read task document");
                return Document::default();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(doc) => doc,
            Err(err) => {
                warn!(error = %err, path = %self.path.display(), "corrupt task document; starting empty");
                Document::default()
            }
        }
    }

    async fn save_all(&self, doc: &Document) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create {}", parent.display()))?;
        }

        let body = serde_json::to_vec_pretty(doc).context("serialize task document")?;
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, body)
            .await
            .with_context(|| format!("write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("rename {} -> {}", tmp.display(), self.path.display()))?;
        Ok(())
    }
}

/// Keeps the document in process memory only.
#[derive(Default)]
pub struct MemoryStore {
    doc: Mutex<Document>,
}

impl MemoryStore {
    pub fn new(doc: Document) -> Self {
        Self {
            doc: Mutex::new(doc),
        }
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn load_all(&self) -> Document {
        self.doc.lock().await.clone()
    }

    async fn save_all(&self, doc: &Document) -> anyhow::Result<()> {
        *self.doc.lock().await = doc.clone();
        Ok(())
    }
}
