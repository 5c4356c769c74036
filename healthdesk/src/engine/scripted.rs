//! Engine that replays canned replies, for tests and offline demos.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream;

use super::{FragmentStream, ReasoningEngine};
use crate::error::EngineError;
use crate::threads::ThreadRef;

#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Fragments(Vec<String>),
    Fail(EngineError),
    /// A stream that never yields.
    Hang,
}

#[derive(Debug, Default)]
pub struct ScriptedEngine {
    replies: Mutex<VecDeque<ScriptedReply>>,
    submissions: Mutex<Vec<(ThreadRef, String)>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply delivered as a single fragment.
    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push(ScriptedReply::Fragments(vec![text.into()]))
    }

    /// Queue a reply delivered in the given fragments.
    pub fn reply_chunked<S: Into<String>>(self, chunks: impl IntoIterator<Item = S>) -> Self {
        self.push(ScriptedReply::Fragments(
            chunks.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn fail(self, error: EngineError) -> Self {
        self.push(ScriptedReply::Fail(error))
    }

    pub fn hang(self) -> Self {
        self.push(ScriptedReply::Hang)
    }

    fn push(self, reply: ScriptedReply) -> Self {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
        self
    }

    /// Every `(thread, input)` submitted so far.
    pub fn submissions(&self) -> Vec<(ThreadRef, String)> {
        self.submissions
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ReasoningEngine for ScriptedEngine {
    async fn submit_streaming(
        &self,
        thread: &ThreadRef,
        input: &str,
    ) -> Result<FragmentStream, EngineError> {
        if let Ok(mut submissions) = self.submissions.lock() {
            submissions.push((thread.clone(), input.to_string()));
        }
        let next = self
            .replies
            .lock()
            .map_err(|_| EngineError::Exhausted)?
            .pop_front();
        match next {
            Some(ScriptedReply::Fragments(chunks)) => {
                Ok(Box::pin(stream::iter(chunks.into_iter().map(Ok))))
            }
            Some(ScriptedReply::Fail(error)) => Err(error),
            Some(ScriptedReply::Hang) => Ok(Box::pin(stream::pending::<Result<String, EngineError>>())),
            None => Err(EngineError::Exhausted),
        }
    }
}
