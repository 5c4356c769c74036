use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{Role, ThreadMessage, ThreadRef, ThreadStore};
use crate::error::StoreError;

/// Process-local thread store.
#[derive(Debug, Default)]
pub struct InMemoryThreadStore {
    threads: Mutex<HashMap<ThreadRef, Vec<ThreadMessage>>>,
}

impl InMemoryThreadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of threads ever created.
    pub fn thread_count(&self) -> usize {
        self.threads.lock().map(|t| t.len()).unwrap_or(0)
    }

    fn locked(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<ThreadRef, Vec<ThreadMessage>>>, StoreError> {
        self.threads
            .lock()
            .map_err(|_| StoreError::Io("thread store lock poisoned".to_string()))
    }
}

#[async_trait]
impl ThreadStore for InMemoryThreadStore {
    async fn create_thread(&self) -> Result<ThreadRef, StoreError> {
        let thread = ThreadRef::generate();
        self.locked()?.insert(thread.clone(), Vec::new());
        Ok(thread)
    }

    async fn append(&self, thread: &ThreadRef, role: Role, text: &str) -> Result<(), StoreError> {
        self.locked()?
            .get_mut(thread)
            .ok_or_else(|| StoreError::UnknownThread(thread.to_string()))?
            .push(ThreadMessage::new(role, text));
        Ok(())
    }

    async fn list(&self, thread: &ThreadRef) -> Result<Vec<ThreadMessage>, StoreError> {
        let threads = self.locked()?;
        let messages = threads
            .get(thread)
            .ok_or_else(|| StoreError::UnknownThread(thread.to_string()))?;
        Ok(messages.iter().rev().cloned().collect())
    }

    async fn len(&self, thread: &ThreadRef) -> Result<usize, StoreError> {
        self.locked()?
            .get(thread)
            .map(Vec::len)
            .ok_or_else(|| StoreError::UnknownThread(thread.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threads::chronological;

    #[tokio::test]
    async fn test_list_is_newest_first() {
        let store = InMemoryThreadStore::new();
        let thread = store.create_thread().await.unwrap();
        store.append(&thread, Role::User, "first").await.unwrap();
        store.append(&thread, Role::Assistant, "second").await.unwrap();

        let native = store.list(&thread).await.unwrap();
        assert_eq!(native[0].text, "second");

        let ordered = chronological(&store, &thread).await.unwrap();
        assert_eq!(ordered[0].text, "first");
        assert_eq!(ordered[0].role, Role::User);
        assert_eq!(store.len(&thread).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_unknown_thread() {
        let store = InMemoryThreadStore::new();
        let err = store
            .append(&ThreadRef::from("thread_missing"), Role::User, "x")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownThread(_)));
    }
}
