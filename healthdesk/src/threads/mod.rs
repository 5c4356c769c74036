//! Conversation threads: ordered, append-only message logs addressed by an
//! opaque [`ThreadRef`].
//!
//! Stores list messages newest-first, the way hosted agent services do;
//! [`chronological`] gives the oldest-first view used for prompts and replays.

pub mod file;
pub mod memory;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub use file::FileThreadStore;
pub use memory::InMemoryThreadStore;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadRef(String);

impl ThreadRef {
    pub fn generate() -> Self {
        ThreadRef(format!("thread_{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ThreadRef {
    fn from(value: &str) -> Self {
        ThreadRef(value.to_string())
    }
}

impl fmt::Display for ThreadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub role: Role,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl ThreadMessage {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait ThreadStore: Send + Sync {
    async fn create_thread(&self) -> Result<ThreadRef, StoreError>;

    async fn append(&self, thread: &ThreadRef, role: Role, text: &str) -> Result<(), StoreError>;

    /// Messages of `thread`, newest first.
    async fn list(&self, thread: &ThreadRef) -> Result<Vec<ThreadMessage>, StoreError>;

    async fn len(&self, thread: &ThreadRef) -> Result<usize, StoreError> {
        Ok(self.list(thread).await?.len())
    }
}

/// Messages of `thread`, oldest first.
pub async fn chronological(
    store: &dyn ThreadStore,
    thread: &ThreadRef,
) -> Result<Vec<ThreadMessage>, StoreError> {
    let mut messages = store.list(thread).await?;
    messages.reverse();
    Ok(messages)
}
