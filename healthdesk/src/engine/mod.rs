//! Reasoning engines.
//!
//! An engine turns the accumulated conversation of a thread plus one new
//! input into a reply. The diagnostic stage consumes replies as a stream of
//! text fragments; the solution stage uses the non-streaming variant.

pub mod openai;
pub mod prompts;
pub mod scripted;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::error::EngineError;
use crate::threads::ThreadRef;

pub use openai::{EngineSettings, OpenAiEngine};
pub use scripted::ScriptedEngine;

pub type FragmentStream = BoxStream<'static, Result<String, EngineError>>;

#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    /// Submit `input` on `thread` and stream the reply.
    async fn submit_streaming(
        &self,
        thread: &ThreadRef,
        input: &str,
    ) -> Result<FragmentStream, EngineError>;

    /// Submit `input` on `thread` and wait for the whole reply.
    async fn submit(&self, thread: &ThreadRef, input: &str) -> Result<String, EngineError> {
        let mut stream = self.submit_streaming(thread, input).await?;
        let mut reply = String::new();
        while let Some(fragment) = stream.next().await {
            reply.push_str(&fragment?);
        }
        Ok(reply)
    }
}
