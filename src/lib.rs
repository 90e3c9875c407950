//! # COREP Assistant
//!
//! Populates and validates the PRA COREP own funds (CA1, `C_01.00`) and own
//! funds requirements (CA2, `C_02.00`) templates from a free-text
//! description of a bank's capital position.
//!
//! ## Pipeline
//!
//! - **Extraction**: scenario text becomes [`ScenarioFigures`], through a
//!   language model when one is configured and by pattern matching otherwise
//! - **Population**: template rows are evaluated in dependency order into
//!   fields, totals and capital ratios
//! - **Validation**: arithmetic, minimum-ratio and sign rules over the result
//! - **Audit**: every populated field is linked to the regulatory passages
//!   that justify it
//!
//! ## Example
//!
//! ```rust,ignore
//! use corep_assistant::*;
//!
//! let analyzer = CorepAnalyzer::new(ScenarioExtractor::new(None));
//! let result = analyzer
//!     .analyze(
//!         "Share capital of £500m, retained earnings of £300m and RWA of £4,000m",
//!         "CA1",
//!     )
//!     .await?;
//!
//! assert_eq!(result.total(TotalName::Cet1), Some(800.0));
//! assert_eq!(result.ratio(RatioName::Cet1Ratio), Some(20.0));
//! ```
//!
//! Figures are illustrative and not a regulatory submission.

pub mod audit;
pub mod config;
pub mod engine;
pub mod error;
pub mod ingestion;
pub mod knowledge_base;
pub mod llm;
pub mod report;
pub mod retriever;
pub mod schema;
pub mod templates;
pub mod validation;

#[cfg(feature = "server")]
pub mod server;

pub use audit::build_audit;
pub use config::AssistantConfig;
pub use engine::{populate, PopulatedTemplate, TemplateEngine};
pub use error::{CorepError, Result};
pub use ingestion::parse_scenario_text;
pub use knowledge_base::{Passage, PASSAGES};
pub use llm::{
    ChatCompletionsClient, ChatEvent, ChatMessage, ChatReply, ExtractionEvent, LanguageModel,
    RegulatoryAssistant, ScenarioExtractor,
};
pub use report::{PdfRenderer, ReportRenderer};
pub use retriever::Retriever;
pub use schema::*;
pub use templates::{get_template, TemplateDefinition};
pub use validation::{validate, Validator};

use chrono::Utc;
use log::{debug, info};
use std::sync::Arc;
use tokio::sync::mpsc::Sender;

/// Runs scenario text through extraction, population, validation and audit.
pub struct CorepAnalyzer {
    extractor: ScenarioExtractor,
}

impl CorepAnalyzer {
    pub fn new(extractor: ScenarioExtractor) -> Self {
        Self { extractor }
    }

    pub fn from_config(config: &AssistantConfig, model: Option<Arc<dyn LanguageModel>>) -> Self {
        Self::new(ScenarioExtractor::new(model).with_timeout(config.extraction_timeout))
    }

    pub fn has_model(&self) -> bool {
        self.extractor.has_model()
    }

    pub async fn analyze(&self, scenario: &str, template: &str) -> Result<AnalysisResult> {
        self.analyze_with_progress(scenario, template, None).await
    }

    pub async fn analyze_with_progress(
        &self,
        scenario: &str,
        template: &str,
        progress: Option<Sender<ExtractionEvent>>,
    ) -> Result<AnalysisResult> {
        let template_id: TemplateId = template.parse()?;
        if scenario.trim().is_empty() {
            return Err(CorepError::EmptyScenario);
        }

        info!(
            "Analyzing {} character scenario for {}",
            scenario.len(),
            template_id
        );

        let extraction = self
            .extractor
            .extract(scenario, get_template(template_id), progress)
            .await;
        for assumption in &extraction.assumptions {
            debug!("Extraction assumption: {}", assumption);
        }

        Self::analyze_figures(&extraction.figures, template_id, extraction.source)
    }

    /// Deterministic part of the pipeline, for figures already in hand.
    pub fn analyze_figures(
        figures: &ScenarioFigures,
        template_id: TemplateId,
        source: ExtractionSource,
    ) -> Result<AnalysisResult> {
        let template = get_template(template_id);
        let populated = populate(template, figures)?;

        let validation_results = validate(
            template,
            &populated.totals,
            &populated.ratios,
            &populated.fields,
        );
        let failures = validation_results.iter().filter(|r| r.is_failure()).count();
        if failures > 0 {
            info!("{} validation rule(s) failed for {}", failures, template_id);
        }

        let audit_trail = build_audit(template, &populated.fields);

        Ok(AnalysisResult {
            template_id: template.template_id.to_string(),
            template_name: template.name.to_string(),
            fields: populated.fields,
            totals: populated.totals,
            ratios: populated.ratios,
            validation_results,
            audit_trail,
            extraction_source: source,
            generated_at: Utc::now(),
        })
    }
}

/// Analyzes with local pattern extraction only.
pub async fn analyze_scenario(scenario: &str, template: &str) -> Result<AnalysisResult> {
    CorepAnalyzer::new(ScenarioExtractor::new(None))
        .analyze(scenario, template)
        .await
}
