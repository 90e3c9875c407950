//! Static store of regulatory passages used for retrieval and citations.
//!
//! Passages are summaries of CRR articles and COREP template instructions,
//! written for orientation only. The store is immutable and shared by every
//! request.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Passage {
    pub id: &'static str,
    pub title: &'static str,
    pub category: &'static str,
    pub keywords: &'static [&'static str],
    pub text: &'static str,
}

/// Declaration order is the retrieval tie-break order.
pub static PASSAGES: &[Passage] = &[
    Passage {
        id: "CRR_ART_26",
        title: "CRR Article 26 - Common Equity Tier 1 items",
        category: "CET1",
        keywords: &[
            "CET1",
            "common equity",
            "tier 1",
            "capital instruments",
            "share capital",
            "share premium",
            "retained earnings",
            "reserves",
        ],
        text: "CET1 items consist of capital instruments meeting Article 28, the share premium \
               accounts related to them, retained earnings, accumulated other comprehensive \
               income, other reserves and funds for general banking risk. Items (c) to (f) count \
               only where they are available for unrestricted and immediate use to cover losses. \
               Interim or year-end profits may be included before a formal decision only with \
               the prior permission of the competent authority.",
    },
    Passage {
        id: "CRR_ART_28",
        title: "CRR Article 28 - Capital instruments qualifying as CET1",
        category: "CET1",
        keywords: &["CET1", "capital instruments", "ordinary shares", "conditions", "qualify"],
        text: "Capital instruments qualify as CET1 only where they are issued directly with \
               shareholder approval, fully paid up and not funded by the institution, classified \
               as equity, clearly disclosed, perpetual, not reducible except on liquidation or \
               discretionary repurchase, pay distributions only out of distributable items \
               without any link to the amount paid in, rank below all other claims in \
               insolvency, and carry no guarantee enhancing their seniority.",
    },
    Passage {
        id: "CRR_ART_36",
        title: "CRR Article 36 - Deductions from CET1 items",
        category: "CET1_DEDUCTIONS",
        keywords: &[
            "deductions",
            "CET1",
            "intangible assets",
            "goodwill",
            "deferred tax",
            "defined benefit pension",
            "own holdings",
        ],
        text: "Institutions deduct from CET1 items: current-year losses; intangible assets \
               including goodwill; deferred tax assets that rely on future profitability; IRB \
               expected loss shortfalls; defined benefit pension fund assets; direct, indirect \
               and synthetic holdings of own CET1 instruments; reciprocal cross-holdings; \
               significant and non-significant investments in financial sector entities above \
               thresholds; any AT1 deductions exceeding AT1 capital; and 1,250% risk-weighted \
               exposures where deduction is elected.",
    },
    Passage {
        id: "CRR_ART_51",
        title: "CRR Article 51 - Additional Tier 1 items",
        category: "AT1",
        keywords: &["AT1", "additional tier 1", "capital instruments", "share premium"],
        text: "Additional Tier 1 items consist of capital instruments meeting Article 52 and the \
               share premium accounts related to them. Together they form AT1 capital before the \
               deductions of Article 56.",
    },
    Passage {
        id: "CRR_ART_52",
        title: "CRR Article 52 - Capital instruments qualifying as AT1",
        category: "AT1",
        keywords: &["AT1", "capital instruments", "conditions", "perpetual", "subordinated"],
        text: "AT1 instruments must be issued and paid up, not funded by the institution, rank \
               below Tier 2 in insolvency, be unsecured and unguaranteed, be perpetual with no \
               incentive to redeem, be callable only after five years, pay fully discretionary \
               distributions from distributable items, and include a write-down or conversion \
               mechanism that absorbs losses.",
    },
    Passage {
        id: "CRR_ART_62",
        title: "CRR Article 62 - Tier 2 items",
        category: "T2",
        keywords: &["tier 2", "T2", "capital instruments", "subordinated loans", "subordinated debt"],
        text: "Tier 2 items consist of capital instruments and subordinated loans meeting Article \
               63, the related share premium accounts, for IRB institutions the excess of \
               provisions over expected losses up to 0.6% of risk-weighted exposures, and for \
               Standardised Approach institutions general credit risk adjustments up to 1.25% \
               of risk-weighted exposures.",
    },
    Passage {
        id: "CRR_ART_63",
        title: "CRR Article 63 - Capital instruments qualifying as Tier 2",
        category: "T2",
        keywords: &["tier 2", "T2", "conditions", "subordinated", "minimum maturity"],
        text: "Tier 2 instruments must be issued and paid up, not purchased by the institution, \
               wholly subordinated to non-subordinated creditors, unsecured and unguaranteed, \
               free of redemption incentives, have an original maturity of at least five years, \
               be callable only after five years, and give holders no right to accelerate \
               repayment. They amortise over their final five years.",
    },
    Passage {
        id: "CRR_ART_92",
        title: "CRR Article 92 - Own funds requirements",
        category: "CAPITAL_REQUIREMENTS",
        keywords: &[
            "capital requirements",
            "CET1 ratio",
            "tier 1 ratio",
            "total capital ratio",
            "capital ratio",
            "8%",
            "6%",
            "4.5%",
        ],
        text: "Institutions must at all times hold a CET1 capital ratio of 4.5%, a Tier 1 capital \
               ratio of 6% and a total capital ratio of 8%. Each ratio is the relevant capital \
               amount divided by the total risk exposure amount, which sums risk-weighted \
               exposures for credit and dilution risk with 12.5 times the own funds requirements \
               for market, operational and CVA risk.",
    },
    Passage {
        id: "CRR_ART_92A",
        title: "CRR Article 92a - Capital buffers",
        category: "CAPITAL_BUFFERS",
        keywords: &[
            "capital buffers",
            "buffer",
            "CCB",
            "conservation buffer",
            "countercyclical",
            "systemic",
            "G-SII",
            "O-SII",
        ],
        text: "On top of Article 92, institutions hold CET1 buffers: a 2.5% capital conservation \
               buffer, a countercyclical buffer of 0-2.5% set by national authorities, and \
               systemic buffers for G-SIIs (1-3.5%) and O-SIIs (0-3%). The combined buffer \
               requirement is the conservation buffer plus the countercyclical buffer plus the \
               highest applicable systemic buffer.",
    },
    Passage {
        id: "CRR_ART_111",
        title: "CRR Article 111 - Credit risk: Standardised Approach",
        category: "RWA",
        keywords: &[
            "RWA",
            "risk weighted assets",
            "risk-weighted assets",
            "standardised approach",
            "exposure classes",
            "credit risk",
        ],
        text: "Under the Standardised Approach the exposure value of an asset is its accounting \
               value after specific credit risk adjustments and deductions. Off-balance sheet \
               items take a credit conversion factor of 100%, 50%, 20% or 0%. Risk weights \
               depend on the exposure class and credit quality step, e.g. 75% for qualifying \
               retail, 35% for residential mortgages and 100% or 150% for defaulted exposures.",
    },
    Passage {
        id: "COREP_CA1",
        title: "COREP Template C 01.00 - Own Funds",
        category: "COREP_TEMPLATE",
        keywords: &["CA1", "own funds", "template", "COREP", "reporting"],
        text: "C 01.00 reports the composition of own funds. Rows 010-130 cover CET1 items, \
               prudential filters and deductions (goodwill, other intangibles, deferred tax \
               assets, pension fund assets, own holdings), row 200 is CET1 capital, rows \
               300-330 cover AT1 items and row 400 AT1 capital, row 500 is Tier 1, rows 600-640 \
               cover Tier 2 items and row 700 Tier 2 capital, and row 800 is total own funds. \
               Deductions are reported as positive amounts.",
    },
    Passage {
        id: "COREP_CA2",
        title: "COREP Template C 02.00 - Capital requirements",
        category: "COREP_TEMPLATE",
        keywords: &["CA2", "capital requirements", "RWA", "template", "COREP", "risk exposure"],
        text: "C 02.00 reports risk exposure amounts: credit risk under SA and IRB, \
               securitisation and CCP default fund contributions; market risk for position, \
               foreign exchange and commodities; credit valuation adjustment risk; operational \
               risk; and the total risk exposure amount (TREA). Memorandum rows give the CET1, \
               Tier 1 and total capital ratios, the institution-specific buffer requirement and \
               the CET1 available to meet buffers.",
    },
    Passage {
        id: "COREP_VALIDATION",
        title: "COREP Validation Rules",
        category: "VALIDATION",
        keywords: &["validation", "rules", "checks", "consistency", "errors"],
        text: "Arithmetic checks: CET1 equals its items less deductions plus other elements; \
               Tier 1 equals CET1 plus AT1; total own funds equal Tier 1 plus Tier 2; each ratio \
               equals the capital amount over TREA. Threshold checks: CET1 ratio at least 4.5%, \
               Tier 1 ratio at least 6%, total capital ratio at least 8%. Sign checks: deductions \
               are reported as positive values and capital instruments are non-negative.",
    },
];

pub fn passage(id: &str) -> Option<&'static Passage> {
    PASSAGES.iter().find(|p| p.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_passage_ids_are_unique() {
        let ids: HashSet<_> = PASSAGES.iter().map(|p| p.id).collect();
        assert_eq!(ids.len(), PASSAGES.len());
    }

    #[test]
    fn test_lookup_by_id() {
        assert_eq!(
            passage("CRR_ART_92").map(|p| p.title),
            Some("CRR Article 92 - Own funds requirements")
        );
        assert!(passage("CRR_ART_999").is_none());
    }
}
