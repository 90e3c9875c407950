//! Links populated fields to the passages that justify them.

use crate::knowledge_base::passage;
use crate::schema::{AuditEntry, PopulatedField, Sign, TemplateId};
use crate::templates::TemplateDefinition;

struct Citation {
    template: TemplateId,
    row_id: &'static str,
    passages: &'static [&'static str],
    reason: &'static str,
}

const fn cite(
    template: TemplateId,
    row_id: &'static str,
    passages: &'static [&'static str],
    reason: &'static str,
) -> Citation {
    Citation {
        template,
        row_id,
        passages,
        reason,
    }
}

use TemplateId::{Ca1, Ca2};

static CITATIONS: &[Citation] = &[
    cite(Ca1, "010", &["CRR_ART_26", "CRR_ART_28"], "paid-up instruments meeting the CET1 eligibility conditions"),
    cite(Ca1, "020", &["CRR_ART_26"], "share premium related to CET1 instruments"),
    cite(Ca1, "030", &["CRR_ART_26"], "retained earnings form part of CET1 items"),
    cite(Ca1, "040", &["CRR_ART_26"], "accumulated other comprehensive income is a CET1 item"),
    cite(Ca1, "050", &["CRR_ART_26"], "other reserves available to absorb losses"),
    cite(Ca1, "060", &["CRR_ART_26"], "funds for general banking risk are a CET1 item"),
    cite(Ca1, "080", &["CRR_ART_36"], "goodwill is deducted from CET1"),
    cite(Ca1, "090", &["CRR_ART_36"], "intangible assets are deducted from CET1"),
    cite(Ca1, "100", &["CRR_ART_36"], "deferred tax assets relying on future profitability are deducted"),
    cite(Ca1, "110", &["CRR_ART_36"], "defined benefit pension fund assets are deducted"),
    cite(Ca1, "120", &["CRR_ART_36"], "holdings of own CET1 instruments are deducted"),
    cite(Ca1, "200", &["CRR_ART_26", "CRR_ART_36"], "CET1 items less regulatory deductions"),
    cite(Ca1, "300", &["CRR_ART_51", "CRR_ART_52"], "instruments meeting the AT1 eligibility conditions"),
    cite(Ca1, "310", &["CRR_ART_51"], "share premium related to AT1 instruments"),
    cite(Ca1, "400", &["CRR_ART_51"], "AT1 items less AT1 deductions"),
    cite(Ca1, "500", &["CRR_ART_92"], "Tier 1 is the sum of CET1 and AT1"),
    cite(Ca1, "600", &["CRR_ART_62", "CRR_ART_63"], "subordinated instruments meeting the Tier 2 conditions"),
    cite(Ca1, "610", &["CRR_ART_62"], "share premium related to Tier 2 instruments"),
    cite(Ca1, "620", &["CRR_ART_62"], "eligible general credit risk adjustments"),
    cite(Ca1, "700", &["CRR_ART_62"], "Tier 2 items less Tier 2 deductions"),
    cite(Ca1, "800", &["CRR_ART_92", "COREP_CA1"], "own funds are Tier 1 plus Tier 2"),
    cite(Ca2, "010", &["CRR_ART_111"], "risk-weighted exposures under the Standardised Approach"),
    cite(Ca2, "050", &["CRR_ART_92"], "credit risk forms part of the total risk exposure"),
    cite(Ca2, "300", &["CRR_ART_92"], "operational risk requirement scaled into the risk exposure"),
    cite(Ca2, "500", &["CRR_ART_92", "COREP_CA2"], "total risk exposure amount is the ratio denominator"),
    cite(Ca2, "600", &["CRR_ART_92"], "CET1 capital ratio minimum of 4.5%"),
    cite(Ca2, "610", &["CRR_ART_92"], "Tier 1 capital ratio minimum of 6%"),
    cite(Ca2, "620", &["CRR_ART_92"], "total capital ratio minimum of 8%"),
    cite(Ca2, "630", &["CRR_ART_92A"], "combined buffer requirement held in CET1"),
    cite(Ca2, "640", &["CRR_ART_92", "CRR_ART_92A"], "CET1 above the Pillar 1 minimum available for buffers"),
];

/// One entry per citation of every non-null field, in field order.
pub fn build_audit(template: &TemplateDefinition, fields: &[PopulatedField]) -> Vec<AuditEntry> {
    let mut entries = Vec::new();

    for field in fields {
        let Some(value) = field.value else {
            continue;
        };
        let Some(citation) = CITATIONS
            .iter()
            .find(|c| c.template == template.id && c.row_id == field.row_id)
        else {
            continue;
        };

        for passage in citation.passages.iter().filter_map(|id| passage(id)) {
            entries.push(AuditEntry {
                field: field.row_id.clone(),
                rule_id: passage.id.to_string(),
                rule_title: passage.title.to_string(),
                explanation: format!(
                    "{} of {} reported: {} ({})",
                    field.label,
                    format_value(value, field.sign),
                    citation.reason,
                    passage.title
                ),
            });
        }
    }

    entries
}

fn format_value(value: f64, sign: Sign) -> String {
    match sign {
        Sign::Percent => format!("{:.1}%", value),
        _ => format!("{:.1}m", value),
    }
}
