use crate::error::{CorepError, Result};
use crate::llm::client::{ChatStream, CompletionOptions, LanguageModel};
use crate::llm::prompts::chat_system_prompt;
use crate::llm::types::ChatMessage;
use crate::retriever::{format_context, Retriever};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
    pub model: String,
    /// Ids of the passages given to the model.
    pub context_used: Vec<String>,
}

/// Open-ended regulatory Q&A grounded on retrieved passages.
///
/// Conversation history is supplied by the caller on every call; nothing is
/// kept between calls.
pub struct RegulatoryAssistant {
    model: Option<Arc<dyn LanguageModel>>,
    retriever: Retriever,
    top_k: usize,
    timeout: Duration,
}

impl RegulatoryAssistant {
    pub fn new(model: Option<Arc<dyn LanguageModel>>) -> Self {
        Self {
            model,
            retriever: Retriever::default(),
            top_k: 3,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model_name(&self) -> Option<&str> {
        self.model.as_deref().map(|m| m.model_name())
    }

    fn prepare(
        &self,
        message: &str,
        history: &[ChatMessage],
    ) -> Result<(&dyn LanguageModel, Vec<ChatMessage>, Vec<String>)> {
        if message.trim().is_empty() {
            return Err(CorepError::EmptyMessage);
        }
        let model = self.model.as_deref().ok_or(CorepError::ModelNotConfigured)?;

        let passages = self.retriever.retrieve(message, self.top_k);
        let context_used: Vec<String> = passages.iter().map(|p| p.id.to_string()).collect();
        info!("Answering with context {:?}", context_used);

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(chat_system_prompt(&format_context(&passages))));
        for turn in history {
            if is_conversation_role(&turn.role) {
                messages.push(turn.clone());
            } else {
                warn!("Dropping history turn with role {:?}", turn.role);
            }
        }
        messages.push(ChatMessage::user(message));

        Ok((model, messages, context_used))
    }

    pub async fn ask(&self, message: &str, history: &[ChatMessage]) -> Result<ChatReply> {
        let (model, messages, context_used) = self.prepare(message, history)?;

        let response = tokio::time::timeout(
            self.timeout,
            model.complete(&messages, CompletionOptions::CHAT),
        )
        .await
        .map_err(|_| CorepError::ModelTimeout(self.timeout))??;

        Ok(ChatReply {
            response,
            model: model.model_name().to_string(),
            context_used,
        })
    }

    /// Streams the reply. The returned stream ends with `Done` or `Error`.
    pub async fn ask_streaming(
        &self,
        message: &str,
        history: &[ChatMessage],
    ) -> Result<(Vec<String>, ChatStream)> {
        let (model, messages, context_used) = self.prepare(message, history)?;

        let stream = tokio::time::timeout(
            self.timeout,
            model.stream(&messages, CompletionOptions::CHAT),
        )
        .await
        .map_err(|_| CorepError::ModelTimeout(self.timeout))??;

        Ok((context_used, stream))
    }
}

/// Only the system prompt built here may steer the model.
fn is_conversation_role(role: &str) -> bool {
    matches!(role, "user" | "assistant")
}
