use crate::schema::{ExtractionSource, ScenarioFigures};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// One item of a streamed model reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChatEvent {
    Fragment(String),
    /// Upstream failed after the stream started.
    Error(String),
    Done,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExtractionEvent {
    Starting,
    RetrievingContext { passages: Vec<String> },
    CallingModel,
    ProcessingResponse,
    FallingBack { reason: String },
    Success { figures: usize, source: ExtractionSource },
}

/// Figures extracted from a scenario, with where they came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub figures: ScenarioFigures,
    pub assumptions: Vec<String>,
    pub source: ExtractionSource,
}

/// JSON object the model is asked to return for a scenario.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ExtractionEnvelope {
    /// Concept key to amount in millions (buffer requirement in percent).
    #[serde(default)]
    pub figures: BTreeMap<String, serde_json::Value>,
    /// Assumptions the model made while reading the scenario.
    #[serde(default)]
    pub assumptions: Vec<String>,
}

impl ExtractionEnvelope {
    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        let schema = schemars::schema_for!(ExtractionEnvelope);
        serde_json::to_string_pretty(&schema)
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CompletionChoice {
    pub message: CompletionMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CompletionMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StreamChunk {
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StreamChoice {
    #[serde(default)]
    pub delta: StreamDelta,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct StreamDelta {
    #[serde(default)]
    pub content: Option<String>,
}
