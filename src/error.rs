use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CorepError {
    #[error("Unknown template '{0}': expected CA1 or CA2")]
    UnknownTemplate(String),

    #[error("Scenario text is empty")]
    EmptyScenario,

    #[error("Chat message is empty")]
    EmptyMessage,

    #[error("Language model is not configured (set GITHUB_TOKEN)")]
    ModelNotConfigured,

    #[error("Language model request failed: {0}")]
    ModelRequest(#[from] reqwest::Error),

    #[error("Language model API error (status {status}): {body}")]
    ModelStatus { status: u16, body: String },

    #[error("Language model timed out after {0:?}")]
    ModelTimeout(Duration),

    #[error("Malformed model output: {0}")]
    MalformedModelOutput(String),

    #[error("Template {template} has a row dependency cycle involving row {row}")]
    TemplateCycle { template: String, row: String },

    #[error("Template {template} declares row {row} more than once")]
    DuplicateRow { template: String, row: String },

    #[error("Report rendering failed: {0}")]
    RenderFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CorepError {
    /// Input errors are the caller's fault and are never retried.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownTemplate(_) | Self::EmptyScenario | Self::EmptyMessage
        )
    }
}

pub type Result<T> = std::result::Result<T, CorepError>;
