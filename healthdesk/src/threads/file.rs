//! File-backed thread store.
//!
//! Each thread is a JSON-lines file `<thread>.jsonl` under the base directory,
//! one message per line in append order.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::{Role, ThreadMessage, ThreadRef, ThreadStore};
use crate::error::StoreError;

#[derive(Debug, Clone)]
pub struct FileThreadStore {
    base_path: PathBuf,
}

impl FileThreadStore {
    pub async fn new(base_path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).await.map_err(|e| {
            StoreError::Io(format!(
                "failed to create thread directory {}: {}",
                base_path.display(),
                e
            ))
        })?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn thread_path(&self, thread: &ThreadRef) -> Result<PathBuf, StoreError> {
        let id = thread.as_str();
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(StoreError::UnknownThread(id.to_string()));
        }
        Ok(self.base_path.join(format!("{}.jsonl", id)))
    }

    async fn read_all(&self, thread: &ThreadRef) -> Result<Vec<ThreadMessage>, StoreError> {
        let path = self.thread_path(thread)?;
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::UnknownThread(thread.to_string()))
            }
            Err(e) => return Err(StoreError::Io(format!("{}: {}", path.display(), e))),
        };
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line).map_err(|e| StoreError::Corrupt {
                    thread: thread.to_string(),
                    detail: e.to_string(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl ThreadStore for FileThreadStore {
    async fn create_thread(&self) -> Result<ThreadRef, StoreError> {
        let thread = ThreadRef::generate();
        let path = self.thread_path(&thread)?;
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| StoreError::Io(format!("{}: {}", path.display(), e)))?;
        Ok(thread)
    }

    async fn append(&self, thread: &ThreadRef, role: Role, text: &str) -> Result<(), StoreError> {
        let path = self.thread_path(thread)?;
        let mut file = OpenOptions::new()
            .append(true)
            .open(&path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => StoreError::UnknownThread(thread.to_string()),
                _ => StoreError::Io(format!("{}: {}", path.display(), e)),
            })?;
        let mut line = serde_json::to_string(&ThreadMessage::new(role, text))
            .map_err(|e| StoreError::Io(e.to_string()))?;
        line.push('\n');
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| StoreError::Io(format!("{}: {}", path.display(), e)))?;
        file.flush()
            .await
            .map_err(|e| StoreError::Io(format!("{}: {}", path.display(), e)))
    }

    async fn list(&self, thread: &ThreadRef) -> Result<Vec<ThreadMessage>, StoreError> {
        let mut messages = self.read_all(thread).await?;
        messages.reverse();
        Ok(messages)
    }
}
