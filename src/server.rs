//! HTTP surface: health, chat (blocking and SSE), analysis and PDF export.

use crate::config::AssistantConfig;
use crate::error::{CorepError, Result};
use crate::llm::{
    ChatCompletionsClient, ChatEvent, ChatMessage, ChatReply, LanguageModel, RegulatoryAssistant,
};
use crate::report::{PdfRenderer, ReportRenderer};
use crate::schema::AnalysisResult;
use crate::CorepAnalyzer;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{self, Stream, StreamExt};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

pub const FEATURES: [&str; 5] = ["chat", "streaming", "analyze", "pdf_export", "validation"];

#[derive(Clone)]
pub struct AppState {
    analyzer: Arc<CorepAnalyzer>,
    assistant: Arc<RegulatoryAssistant>,
    renderer: Arc<dyn ReportRenderer>,
}

impl AppState {
    pub fn new(analyzer: CorepAnalyzer, assistant: RegulatoryAssistant) -> Self {
        Self {
            analyzer: Arc::new(analyzer),
            assistant: Arc::new(assistant),
            renderer: Arc::new(PdfRenderer),
        }
    }

    pub fn from_config(config: &AssistantConfig) -> Self {
        let model = ChatCompletionsClient::from_config(config)
            .map(|client| Arc::new(client) as Arc<dyn LanguageModel>);
        if model.is_none() {
            warn!("GITHUB_TOKEN is not set: chat is disabled and analysis uses pattern extraction");
        }

        let assistant = RegulatoryAssistant::new(model.clone())
            .with_top_k(config.retrieval_top_k)
            .with_timeout(config.model_timeout);
        Self::new(CorepAnalyzer::from_config(config, model), assistant)
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn ReportRenderer>) -> Self {
        self.renderer = renderer;
        self
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub scenario: String,
    #[serde(default = "default_template")]
    pub template: String,
}

fn default_template() -> String {
    "CA1".to_string()
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub model: Option<String>,
    pub features: [&'static str; 5],
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

/// Status code for a pipeline error.
pub fn status_for(error: &CorepError) -> StatusCode {
    match error {
        e if e.is_client_error() => StatusCode::BAD_REQUEST,
        CorepError::ModelNotConfigured => StatusCode::SERVICE_UNAVAILABLE,
        CorepError::ModelTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        CorepError::ModelRequest(_)
        | CorepError::ModelStatus { .. }
        | CorepError::MalformedModelOutput(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<CorepError> for ApiError {
    fn from(error: CorepError) -> Self {
        Self {
            status: status_for(&error),
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!("Request failed ({}): {}", self.status, self.message);
        }
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

fn body<T>(
    payload: std::result::Result<Json<T>, JsonRejection>,
) -> std::result::Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/chat", post(chat))
        .route("/chat/stream", post(chat_stream))
        .route("/analyze", post(analyze))
        .route("/export/pdf", post(export_pdf))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

pub async fn serve(config: AssistantConfig) -> Result<()> {
    let app = router(AppState::from_config(&config));
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("COREP assistant listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        model: state.assistant.model_name().map(str::to_string),
        features: FEATURES,
    })
}

async fn chat(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> std::result::Result<Json<ChatReply>, ApiError> {
    let request = body(payload)?;
    let reply = state
        .assistant
        .ask(&request.message, &request.history)
        .await?;
    Ok(Json(reply))
}

async fn chat_stream(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> std::result::Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>, ApiError>
{
    let request = body(payload)?;
    let (_, events) = state
        .assistant
        .ask_streaming(&request.message, &request.history)
        .await?;

    let frames = events
        .flat_map(|event| stream::iter(sse_frames(event)))
        .map(Ok);

    Ok(Sse::new(frames).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    ))
}

/// SSE frames for one chat event. An upstream error is followed by the
/// end-of-stream sentinel so consumers always see one.
fn sse_frames(event: ChatEvent) -> Vec<Event> {
    let done = || Event::default().data("[DONE]");
    match event {
        ChatEvent::Fragment(content) => {
            vec![Event::default().data(serde_json::json!({ "content": content }).to_string())]
        }
        ChatEvent::Error(error) => vec![
            Event::default().data(serde_json::json!({ "error": error }).to_string()),
            done(),
        ],
        ChatEvent::Done => vec![done()],
    }
}

async fn analyze(
    State(state): State<AppState>,
    payload: std::result::Result<Json<AnalyzeRequest>, JsonRejection>,
) -> std::result::Result<Json<AnalysisResult>, ApiError> {
    let request = body(payload)?;
    let result = state
        .analyzer
        .analyze(&request.scenario, &request.template)
        .await?;
    Ok(Json(result))
}

async fn export_pdf(
    State(state): State<AppState>,
    payload: std::result::Result<Json<AnalyzeRequest>, JsonRejection>,
) -> std::result::Result<Response, ApiError> {
    let request = body(payload)?;
    let result = state
        .analyzer
        .analyze(&request.scenario, &request.template)
        .await?;

    let bytes = state.renderer.render(&result)?;
    let disposition = format!(
        "attachment; filename=COREP_{}_{}.{}",
        result.template_id,
        result.generated_at.format("%Y%m%d_%H%M%S"),
        state.renderer.file_extension()
    );

    Ok((
        [
            (header::CONTENT_TYPE, state.renderer.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::{Script, ScriptedModel};
    use crate::llm::ScenarioExtractor;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    const DEMO: &str = "A UK bank has share capital of £500 million, share premium of £200m, \
        retained earnings of £150m, intangible assets of £30m, Tier 2 subordinated debt of \
        £100m and risk-weighted assets of £4,000m.";

    fn app(script: Option<Script>) -> Router {
        let model = script.map(|s| Arc::new(ScriptedModel::new(s)) as Arc<dyn LanguageModel>);
        router(AppState::new(
            CorepAnalyzer::new(ScenarioExtractor::new(None)),
            RegulatoryAssistant::new(model),
        ))
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn read_body(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    async fn read_events(response: Response) -> Vec<String> {
        String::from_utf8(read_body(response).await)
            .unwrap()
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(|data| data.trim().to_string())
            .collect()
    }

    async fn read_json(response: Response) -> serde_json::Value {
        serde_json::from_slice(&read_body(response).await).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        for uri in ["/", "/health"] {
            let response = app(Some(Script::Reply("ok".to_string())))
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);

            let json = read_json(response).await;
            assert_eq!(json["status"], "healthy");
            assert_eq!(json["model"], "scripted");
            assert_eq!(json["features"].as_array().unwrap().len(), 5);
        }
    }

    #[tokio::test]
    async fn test_analyze_demo_scenario() {
        let response = app(None)
            .oneshot(post_json("/analyze", serde_json::json!({ "scenario": DEMO })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = read_json(response).await;
        assert_eq!(json["template_id"], "C_01.00");
        assert_eq!(json["totals"]["cet1"], 820.0);
        assert_eq!(json["ratios"]["cet1_ratio"], 20.5);
        assert_eq!(json["extraction_source"], "pattern_fallback");
    }

    #[tokio::test]
    async fn test_analyze_input_errors_are_bad_requests() {
        let cases = [
            serde_json::json!({ "scenario": DEMO, "template": "CA9" }),
            serde_json::json!({ "template": "CA1" }),
            serde_json::json!({ "scenario": 42 }),
        ];
        for case in cases {
            let response = app(None).oneshot(post_json("/analyze", case)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let json = read_json(response).await;
            assert!(json["error"].as_str().is_some_and(|e| !e.is_empty()));
        }
    }

    #[tokio::test]
    async fn test_chat_status_codes() {
        let request = || post_json("/chat", serde_json::json!({ "message": "What is CET1?" }));

        let response = app(None).oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = app(Some(Script::Fail)).oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let response = app(Some(Script::Reply("CET1 is core capital.".to_string())))
            .oneshot(request())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = read_json(response).await;
        assert_eq!(json["response"], "CET1 is core capital.");
        assert_eq!(json["model"], "scripted");
    }

    #[tokio::test]
    async fn test_chat_stream_frames() {
        let response = app(Some(Script::Fragments(vec!["Tier ", "2"])))
            .oneshot(post_json(
                "/chat/stream",
                serde_json::json!({ "message": "Tier 2 conditions?", "history": [] }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream"));

        assert_eq!(
            read_events(response).await,
            vec![r#"{"content":"Tier "}"#, r#"{"content":"2"}"#, "[DONE]"]
        );
    }

    #[tokio::test]
    async fn test_chat_stream_error_frame_then_done() {
        let response = app(Some(Script::Hang))
            .oneshot(post_json("/chat/stream", serde_json::json!({ "message": "hello" })))
            .await
            .unwrap();

        assert_eq!(
            read_events(response).await,
            vec![r#"{"error":"stalled"}"#, "[DONE]"]
        );
    }

    #[tokio::test]
    async fn test_export_pdf() {
        let response = app(None)
            .oneshot(post_json(
                "/export/pdf",
                serde_json::json!({ "scenario": DEMO, "template": "CA1" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");

        let disposition = response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.starts_with("attachment; filename=COREP_C_01.00_"));
        assert!(disposition.ends_with(".pdf"));

        let bytes = read_body(response).await;
        assert!(bytes.starts_with(b"%PDF-1.4"));
    }

    struct BrokenRenderer;

    impl ReportRenderer for BrokenRenderer {
        fn render(&self, _: &AnalysisResult) -> Result<Vec<u8>> {
            Err(CorepError::RenderFailed("out of paper".to_string()))
        }

        fn content_type(&self) -> &'static str {
            "application/pdf"
        }

        fn file_extension(&self) -> &'static str {
            "pdf"
        }
    }

    #[tokio::test]
    async fn test_render_failure_is_reported() {
        let state = AppState::new(
            CorepAnalyzer::new(ScenarioExtractor::new(None)),
            RegulatoryAssistant::new(None),
        )
        .with_renderer(Arc::new(BrokenRenderer));

        let response = router(state)
            .oneshot(post_json("/export/pdf", serde_json::json!({ "scenario": DEMO })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = read_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("out of paper"));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&CorepError::EmptyScenario), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&CorepError::ModelTimeout(Duration::from_secs(1))),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_for(&CorepError::RenderFailed("broken".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
