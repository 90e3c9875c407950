use crate::error::{CorepError, Result};
use crate::llm::client::{ChatStream, CompletionOptions, LanguageModel};
use crate::llm::types::{ChatEvent, ChatMessage};
use async_trait::async_trait;
use futures::stream;
use std::sync::Mutex;
use std::time::Duration;

pub(crate) enum Script {
    Reply(String),
    Fragments(Vec<&'static str>),
    Fail,
    Hang,
}

/// In-memory model that replays a fixed script and records what it was sent.
pub(crate) struct ScriptedModel {
    script: Script,
    pub sent: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedModel {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(text: impl Into<String>) -> Self {
        Self::new(Script::Reply(text.into()))
    }

    pub fn calls(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    fn record(&self, messages: &[ChatMessage]) {
        self.sent.lock().unwrap().push(messages.to_vec());
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, messages: &[ChatMessage], _: CompletionOptions) -> Result<String> {
        self.record(messages);
        match &self.script {
            Script::Reply(text) => Ok(text.clone()),
            Script::Fragments(parts) => Ok(parts.concat()),
            Script::Fail => Err(CorepError::ModelStatus {
                status: 500,
                body: "upstream exploded".to_string(),
            }),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(String::new())
            }
        }
    }

    async fn stream(&self, messages: &[ChatMessage], _: CompletionOptions) -> Result<ChatStream> {
        self.record(messages);
        let events: Vec<ChatEvent> = match &self.script {
            Script::Reply(text) => vec![ChatEvent::Fragment(text.clone()), ChatEvent::Done],
            Script::Fragments(parts) => parts
                .iter()
                .map(|p| ChatEvent::Fragment(p.to_string()))
                .chain(std::iter::once(ChatEvent::Done))
                .collect(),
            Script::Fail => {
                return Err(CorepError::ModelStatus {
                    status: 500,
                    body: "upstream exploded".to_string(),
                })
            }
            Script::Hang => vec![ChatEvent::Error("stalled".to_string())],
        };
        Ok(Box::pin(stream::iter(events)))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
