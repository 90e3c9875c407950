use crate::error::{CorepError, Result};
use crate::ingestion::parse_scenario_text;
use crate::llm::client::{CompletionOptions, LanguageModel};
use crate::llm::prompts::{analysis_system_prompt, extraction_user_prompt};
use crate::llm::types::*;
use crate::retriever::{format_context, Retriever};
use crate::schema::{Concept, ExtractionSource, ScenarioFigures};
use crate::templates::TemplateDefinition;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Sender;

/// Turns scenario text into figures, through the model when one is
/// configured and by local pattern matching otherwise.
pub struct ScenarioExtractor {
    model: Option<Arc<dyn LanguageModel>>,
    retriever: Retriever,
    timeout: Duration,
}

impl ScenarioExtractor {
    pub fn new(model: Option<Arc<dyn LanguageModel>>) -> Self {
        Self {
            model,
            retriever: Retriever::default(),
            timeout: Duration::from_secs(90),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retriever(mut self, retriever: Retriever) -> Self {
        self.retriever = retriever;
        self
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Never fails: model problems trigger the pattern fallback, and a
    /// scenario with no recognisable figures gives an empty extraction.
    pub async fn extract(
        &self,
        scenario: &str,
        template: &TemplateDefinition,
        progress: Option<Sender<ExtractionEvent>>,
    ) -> Extraction {
        self.send_event(&progress, ExtractionEvent::Starting).await;

        let reason = match &self.model {
            None => "no language model configured".to_string(),
            Some(model) => match self
                .extract_with_model(model.as_ref(), scenario, template, &progress)
                .await
            {
                Ok(extraction) => {
                    info!(
                        "Model extracted {} figure(s) for {}",
                        extraction.figures.len(),
                        template.id
                    );
                    self.send_event(
                        &progress,
                        ExtractionEvent::Success {
                            figures: extraction.figures.len(),
                            source: extraction.source,
                        },
                    )
                    .await;
                    return extraction;
                }
                Err(e) => e.to_string(),
            },
        };

        warn!("Falling back to pattern extraction: {}", reason);
        self.send_event(
            &progress,
            ExtractionEvent::FallingBack {
                reason: reason.clone(),
            },
        )
        .await;

        let figures = parse_scenario_text(scenario);
        let source = if figures.is_empty() {
            ExtractionSource::None
        } else {
            ExtractionSource::PatternFallback
        };
        info!("Pattern fallback extracted {} figure(s)", figures.len());

        self.send_event(
            &progress,
            ExtractionEvent::Success {
                figures: figures.len(),
                source,
            },
        )
        .await;

        Extraction {
            figures,
            assumptions: vec![format!("Figures read directly from the scenario text ({})", reason)],
            source,
        }
    }

    async fn extract_with_model(
        &self,
        model: &dyn LanguageModel,
        scenario: &str,
        template: &TemplateDefinition,
        progress: &Option<Sender<ExtractionEvent>>,
    ) -> Result<Extraction> {
        let passages = self.retriever.for_template(template.id);
        self.send_event(
            progress,
            ExtractionEvent::RetrievingContext {
                passages: passages.iter().map(|p| p.id.to_string()).collect(),
            },
        )
        .await;

        let messages = vec![
            ChatMessage::system(analysis_system_prompt(&format_context(&passages))),
            ChatMessage::user(extraction_user_prompt(scenario, template)),
        ];

        self.send_event(progress, ExtractionEvent::CallingModel).await;
        let raw = tokio::time::timeout(
            self.timeout,
            model.complete(&messages, CompletionOptions::EXTRACTION),
        )
        .await
        .map_err(|_| CorepError::ModelTimeout(self.timeout))??;

        self.send_event(progress, ExtractionEvent::ProcessingResponse).await;
        let envelope = parse_model_output(&raw)?;
        let figures = figures_from_envelope(&envelope);

        if figures.is_empty() {
            return Err(CorepError::MalformedModelOutput(
                "model reported no recognised figures".to_string(),
            ));
        }

        Ok(Extraction {
            figures,
            assumptions: envelope.assumptions,
            source: ExtractionSource::Model,
        })
    }

    async fn send_event(&self, sender: &Option<Sender<ExtractionEvent>>, event: ExtractionEvent) {
        if let Some(tx) = sender {
            let _ = tx.send(event).await;
        }
    }
}

/// Parses the model's reply into the extraction envelope, ignoring code
/// fences and prose around the JSON object.
pub fn parse_model_output(raw: &str) -> Result<ExtractionEnvelope> {
    let cleaned = clean_json_output(raw);
    serde_json::from_str(&cleaned).map_err(|e| {
        CorepError::MalformedModelOutput(format!("reply is not the expected JSON object: {}", e))
    })
}

/// Keeps recognised concepts with parseable amounts; drops everything else.
pub fn figures_from_envelope(envelope: &ExtractionEnvelope) -> ScenarioFigures {
    let mut figures = ScenarioFigures::new();

    for (key, value) in &envelope.figures {
        let Some(concept) = Concept::from_key(key) else {
            debug!("Dropping unknown concept '{}'", key);
            continue;
        };
        if figures.contains(concept) {
            continue;
        }
        match parse_amount(value) {
            Some(amount) => figures.insert(concept, amount),
            None => debug!("Dropping unparseable amount for {}: {}", concept, value),
        }
    }

    figures
}

fn parse_amount(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => parse_amount_str(s),
        _ => None,
    }
}

/// Accepts strings such as "500", "1,200", "£500m", "4.2bn" or "2.5%".
fn parse_amount_str(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches(['£', '$', '€'])
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();

    let (number, multiplier) = [
        ("billion", 1000.0),
        ("million", 1.0),
        ("bn", 1000.0),
        ("mn", 1.0),
        ("m", 1.0),
        ("b", 1000.0),
        ("%", 1.0),
    ]
    .iter()
    .find_map(|(suffix, mult)| cleaned.strip_suffix(suffix).map(|n| (n.to_string(), *mult)))
    .unwrap_or((cleaned.clone(), 1.0));

    number
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| v * multiplier)
}

fn clean_json_output(raw: &str) -> String {
    if let Some(start) = raw.find('{') {
        if let Some(end) = raw.rfind('}') {
            if end > start {
                return raw[start..=end].to_string();
            }
        }
    }
    raw.trim().to_string()
}
