use crate::config::AssistantConfig;
use crate::error::{CorepError, Result};
use crate::llm::types::*;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use log::{debug, warn};
use reqwest::Client;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

pub const DEFAULT_ENDPOINT: &str = "https://models.github.ai/inference/chat/completions";
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

/// Sampling parameters for one model call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionOptions {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionOptions {
    pub const CHAT: Self = Self {
        max_tokens: 2048,
        temperature: 0.7,
    };

    /// Low temperature for structured output.
    pub const EXTRACTION: Self = Self {
        max_tokens: 4096,
        temperature: 0.2,
    };
}

/// Ordered reply fragments, always finished by `Done` or `Error`.
pub type ChatStream = Pin<Box<dyn Stream<Item = ChatEvent> + Send>>;

/// A hosted chat model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Full reply to `messages`.
    async fn complete(&self, messages: &[ChatMessage], options: CompletionOptions)
        -> Result<String>;

    /// Reply to `messages` as it is generated. Dropping the stream stops the
    /// upstream read.
    async fn stream(
        &self,
        messages: &[ChatMessage],
        options: CompletionOptions,
    ) -> Result<ChatStream>;

    fn model_name(&self) -> &str;
}

/// Client for OpenAI-compatible `chat/completions` endpoints.
#[derive(Clone)]
pub struct ChatCompletionsClient {
    client: Client,
    endpoint: String,
    token: String,
    model: String,
    timeout: Duration,
}

impl ChatCompletionsClient {
    pub fn new(token: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            token: token.into(),
            model: model.into(),
            timeout: Duration::from_secs(60),
        }
    }

    /// `None` when no API token is configured.
    pub fn from_config(config: &AssistantConfig) -> Option<Self> {
        let token = config.github_token.as_ref()?;
        Some(
            Self::new(token.clone(), config.model_name.clone())
                .with_endpoint(config.model_endpoint.clone())
                .with_timeout(config.model_timeout),
        )
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn request_error(&self, err: reqwest::Error) -> CorepError {
        if err.is_timeout() {
            CorepError::ModelTimeout(self.timeout)
        } else {
            CorepError::ModelRequest(err)
        }
    }

    async fn send(
        &self,
        messages: &[ChatMessage],
        options: CompletionOptions,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let payload = ChatCompletionRequest {
            model: &self.model,
            messages,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            stream,
        };

        let request = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&payload)
            .send();

        // Bound only the wait for response headers; a stream may outlive it.
        let res = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| CorepError::ModelTimeout(self.timeout))?
            .map_err(|e| self.request_error(e))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!("Model API returned status {}", status);
            return Err(CorepError::ModelStatus {
                status: status.as_u16(),
                body,
            });
        }

        Ok(res)
    }
}

#[async_trait]
impl LanguageModel for ChatCompletionsClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: CompletionOptions,
    ) -> Result<String> {
        let res = self.send(messages, options, false).await?;

        let body: ChatCompletionResponse = tokio::time::timeout(self.timeout, res.json())
            .await
            .map_err(|_| CorepError::ModelTimeout(self.timeout))?
            .map_err(|e| self.request_error(e))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| CorepError::MalformedModelOutput("No choices returned".to_string()))
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        options: CompletionOptions,
    ) -> Result<ChatStream> {
        let res = self.send(messages, options, true).await?;
        let mut bytes = Box::pin(res.bytes_stream());
        let (tx, rx) = mpsc::channel::<ChatEvent>(32);

        tokio::spawn(async move {
            let mut buffer: Vec<u8> = Vec::new();

            loop {
                let chunk = tokio::select! {
                    _ = tx.closed() => {
                        debug!("Stream consumer went away, closing upstream");
                        return;
                    }
                    chunk = bytes.next() => chunk,
                };

                match chunk {
                    Some(Ok(chunk)) => {
                        buffer.extend_from_slice(&chunk);
                        while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                            let line: Vec<u8> = buffer.drain(..=pos).collect();
                            let line = String::from_utf8_lossy(&line);
                            match parse_sse_line(&line) {
                                Some(ChatEvent::Done) => {
                                    let _ = tx.send(ChatEvent::Done).await;
                                    return;
                                }
                                Some(event) => {
                                    if tx.send(event).await.is_err() {
                                        return;
                                    }
                                }
                                None => {}
                            }
                        }
                    }
                    Some(Err(e)) => {
                        let _ = tx.send(ChatEvent::Error(e.to_string())).await;
                        return;
                    }
                    None => {
                        let _ = tx.send(ChatEvent::Done).await;
                        return;
                    }
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Interprets one line of an upstream event stream.
///
/// Returns `Some(Done)` for the `[DONE]` sentinel, `Some(Fragment)` for a
/// chunk carrying text, and `None` for anything else (comments, keep-alives,
/// role-only deltas, undecodable chunks).
pub(crate) fn parse_sse_line(line: &str) -> Option<ChatEvent> {
    let payload = line.trim().strip_prefix("data:")?.trim();

    if payload == "[DONE]" {
        return Some(ChatEvent::Done);
    }

    let chunk: StreamChunk = serde_json::from_str(payload).ok()?;
    chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty())
        .map(ChatEvent::Fragment)
}
