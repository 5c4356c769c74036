//! Engine backed by an OpenAI-compatible chat-completions endpoint.
//!
//! The thread store holds the conversation; each submission replays the
//! thread (oldest first) behind the stage instructions and appends the new
//! input. Streaming replies arrive as server-sent events carrying
//! `choices[0].delta.content`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{future, StreamExt};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{FragmentStream, ReasoningEngine};
use crate::error::EngineError;
use crate::threads::{chronological, Role, ThreadRef, ThreadStore};

const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub connect_timeout: Duration,
}

pub struct OpenAiEngine {
    settings: EngineSettings,
    instructions: String,
    threads: Arc<dyn ThreadStore>,
    client: Client,
}

impl OpenAiEngine {
    pub fn new(
        settings: EngineSettings,
        instructions: String,
        threads: Arc<dyn ThreadStore>,
    ) -> Result<Self, EngineError> {
        let client = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|e| EngineError::Config(e.to_string()))?;
        Ok(Self {
            settings,
            instructions,
            threads,
            client,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        )
    }

    async fn request_body(
        &self,
        thread: &ThreadRef,
        input: &str,
        stream: bool,
    ) -> Result<Value, EngineError> {
        let history = chronological(self.threads.as_ref(), thread)
            .await
            .map_err(|e| EngineError::Request(e.to_string()))?;

        let mut messages = vec![json!({"role": "system", "content": self.instructions})];
        messages.extend(history.iter().map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            json!({"role": role, "content": m.text})
        }));
        messages.push(json!({"role": "user", "content": input}));

        Ok(json!({
            "model": self.settings.model,
            "messages": messages,
            "temperature": self.settings.temperature,
            "stream": stream,
        }))
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response, EngineError> {
        let mut request = self
            .client
            .post(self.url())
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(key) = &self.settings.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }
        let response = request
            .send()
            .await
            .map_err(|e| EngineError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Status { status, body });
        }
        Ok(response)
    }
}

/// Content carried by one streamed chunk, if any.
fn delta_content(data: &str) -> Result<Option<String>, EngineError> {
    let chunk: Value = serde_json::from_str(data)
        .map_err(|e| EngineError::Stream(format!("unparseable chunk: {}", e)))?;
    if let Some(error) = chunk.get("error") {
        return Err(EngineError::Stream(error.to_string()));
    }
    Ok(chunk["choices"][0]["delta"]["content"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string))
}

fn message_content(reply: &Value) -> Result<String, EngineError> {
    reply["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| EngineError::Request("invalid response format".to_string()))
}

#[async_trait]
impl ReasoningEngine for OpenAiEngine {
    async fn submit_streaming(
        &self,
        thread: &ThreadRef,
        input: &str,
    ) -> Result<FragmentStream, EngineError> {
        let body = self.request_body(thread, input, true).await?;
        debug!(thread = %thread, model = %self.settings.model, "opening completion stream");
        let response = self.post(&body).await?;

        let fragments = response
            .bytes_stream()
            .eventsource()
            .take_while(|event| {
                future::ready(!matches!(event, Ok(e) if e.data.trim() == DONE_MARKER))
            })
            .filter_map(|event| {
                future::ready(match event {
                    Ok(event) => delta_content(&event.data).transpose(),
                    Err(e) => Some(Err(EngineError::Stream(e.to_string()))),
                })
            });
        Ok(Box::pin(fragments))
    }

    async fn submit(&self, thread: &ThreadRef, input: &str) -> Result<String, EngineError> {
        let body = self.request_body(thread, input, false).await?;
        let response = self.post(&body).await?;
        let reply: Value = response
            .json()
            .await
            .map_err(|e| EngineError::Request(e.to_string()))?;
        let content = message_content(&reply)?;
        info!(thread = %thread, chars = content.len(), "engine reply received");
        Ok(content)
    }
}
