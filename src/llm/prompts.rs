// Prompts for the chat and scenario extraction paths

use crate::llm::types::ExtractionEnvelope;
use crate::schema::{Concept, TemplateId};
use crate::templates::{RowFormula, TemplateDefinition};
use log::warn;

pub const CHAT_SYSTEM_PROMPT: &str = r#"
You are a PRA COREP Reporting Assistant, an expert in UK banking regulatory reporting.

## YOUR EXPERTISE
- **COREP Templates**: CA1 (Own Funds), CA2 (Capital Requirements) and related templates
- **CRR/CRD IV**: the Capital Requirements Regulation and Directive
- **Credit Risk**: Standardised and IRB approaches, RWA calculations
- **Capital**: CET1, AT1, Tier 2, capital ratios and buffers
- **Validation**: COREP validation checks and common reporting errors

## WHEN ANSWERING
1. Be precise and cite specific CRR articles where they apply
2. Give step-by-step guidance for calculations
3. Point out common pitfalls and validation issues
4. Use headers and bullet points

Format responses in Markdown.
"#;

pub const ANALYSIS_SYSTEM_PROMPT: &str = r#"
You are a PRA COREP Reporting Assistant that reads bank capital scenarios and extracts the figures needed to populate COREP templates.

## YOUR TASK
Read the user's scenario and report every capital-position figure it states.

## OUTPUT FORMAT
Respond with ONE JSON object and nothing else:
{
  "figures": { "<concept_key>": <number>, ... },
  "assumptions": ["assumption 1", "assumption 2"]
}

## RULES
- Use ONLY the concept keys listed in the user message. Omit concepts the scenario does not state.
- All amounts are in millions (e.g. £500m = 500, £4.2bn = 4200).
- Deductions (goodwill, intangible assets, deferred tax assets, pension fund assets, own holdings) are POSITIVE numbers.
- Do NOT compute totals or ratios; they are calculated from your figures.
- buffer_requirement is a percentage (e.g. 2.5 for 2.5%).
- Record any interpretation you had to make in "assumptions".
"#;

/// Chat system prompt with retrieved passages appended.
pub fn chat_system_prompt(context: &str) -> String {
    if context.is_empty() {
        CHAT_SYSTEM_PROMPT.to_string()
    } else {
        format!(
            "{}\n## RELEVANT REGULATORY CONTEXT\n{}",
            CHAT_SYSTEM_PROMPT, context
        )
    }
}

pub fn analysis_system_prompt(context: &str) -> String {
    format!("{}\n## REFERENCE INFORMATION\n{}", ANALYSIS_SYSTEM_PROMPT, context)
}

/// Concepts the model may report for a template, input rows first.
pub fn template_concepts(template: &TemplateDefinition) -> Vec<Concept> {
    let mut concepts: Vec<Concept> = Vec::new();
    for row in template.rows {
        if let RowFormula::Sum(used) = row.formula {
            for concept in used {
                if !concepts.contains(concept) {
                    concepts.push(*concept);
                }
            }
        }
    }

    // Ratios fall back to the scenario RWA and CA2 borrows own funds from CA1.
    let extra: &[Concept] = match template.id {
        TemplateId::Ca1 => &[Concept::RiskWeightedAssets],
        TemplateId::Ca2 => &Concept::ALL,
    };
    for concept in extra {
        if !concepts.contains(concept) {
            concepts.push(*concept);
        }
    }
    concepts
}

pub fn extraction_user_prompt(scenario: &str, template: &TemplateDefinition) -> String {
    let concept_list = template_concepts(template)
        .iter()
        .map(|c| format!("- {}: {}", c.key(), c.label()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Extract figures from this bank capital scenario for the {} template ({} {}).\n\n\
        SCENARIO:\n{}\n\n\
        CONCEPT KEYS:\n{}\n\n\
        {}\
        Respond with a valid JSON object only, no markdown formatting.",
        template.id,
        template.template_id,
        template.name,
        scenario.trim(),
        concept_list,
        schema_section(ExtractionEnvelope::schema_as_json())
    )
}

/// The response schema block, or nothing when the schema is unavailable.
fn schema_section(schema: serde_json::Result<String>) -> String {
    match schema {
        Ok(schema) => format!("RESPONSE SCHEMA:\n{}\n\n", schema),
        Err(e) => {
            warn!("Extraction prompt sent without a response schema: {}", e);
            String::new()
        }
    }
}
