use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{DocumentStore, Query, StoreError, validate_collection};

/// Append-only JSON-lines store: `<dir>/<collection>.jsonl`.
///
/// A bulk insert is serialized up front and written with a single
/// `write_all`, so readers see either the whole batch or none of it.
/// A crash mid-write leaves a torn last line; reads skip it and the next
/// append terminates it first so the new batch starts on a fresh line.
pub struct JsonlStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlStore {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    fn path(&self, collection: &str) -> Result<PathBuf, StoreError> {
        validate_collection(collection)?;
        Ok(self.dir.join(format!("{collection}.jsonl")))
    }

    async fn read_lines(&self, collection: &str, path: &Path) -> Result<Vec<Value>, StoreError> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut docs = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(line) {
                Ok(doc) => docs.push(doc),
                Err(e) => warn!(collection, line = lineno + 1, error = %e, "Skipping unreadable line"),
            }
        }
        Ok(docs)
    }
}

/// True when `file` is non-empty and its last byte is not a newline.
async fn has_torn_tail(file: &mut tokio::fs::File) -> std::io::Result<bool> {
    let len = file.metadata().await?.len();
    if len == 0 {
        return Ok(false);
    }
    file.seek(std::io::SeekFrom::Start(len - 1)).await?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).await?;
    Ok(last[0] != b'\n')
}

#[async_trait]
impl DocumentStore for JsonlStore {
    async fn insert_many(&self, collection: &str, docs: Vec<Value>) -> Result<usize, StoreError> {
        let path = self.path(collection)?;
        if docs.iter().any(|d| !d.is_object()) {
            return Err(StoreError::InvalidDocument);
        }

        let mut buf = vec![b'\n'];
        for doc in &docs {
            serde_json::to_writer(&mut buf, doc)?;
            buf.push(b'\n');
        }

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .await?;
        let start = if has_torn_tail(&mut file).await? {
            warn!(collection, "Terminating torn last line before append");
            0
        } else {
            1
        };
        file.write_all(&buf[start..]).await?;
        file.flush().await?;

        debug!(collection, count = docs.len(), "Appended documents");
        Ok(docs.len())
    }

    async fn find(&self, collection: &str, query: &Query) -> Result<Vec<Value>, StoreError> {
        let path = self.path(collection)?;
        let hits = self
            .read_lines(collection, &path)
            .await?
            .into_iter()
            .filter(|d| query.matches(d))
            .collect();
        Ok(query.finish(hits))
    }

    /// Rewrites the collection without the matching documents, via a
    /// temporary file renamed over the original.
    async fn delete_many(&self, collection: &str, query: &Query) -> Result<usize, StoreError> {
        let path = self.path(collection)?;
        let _guard = self.write_lock.lock().await;

        let docs = self.read_lines(collection, &path).await?;
        let kept: Vec<&Value> = docs.iter().filter(|d| !query.matches(d)).collect();
        let removed = docs.len() - kept.len();
        if removed == 0 {
            return Ok(0);
        }

        let mut buf = Vec::new();
        for doc in kept {
            serde_json::to_writer(&mut buf, doc)?;
            buf.push(b'\n');
        }

        let tmp = path.with_extension("jsonl.tmp");
        tokio::fs::write(&tmp, &buf).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(collection, removed, "Deleted documents");
        Ok(removed)
    }

    fn backend_name(&self) -> &'static str {
        "jsonl"
    }
}
