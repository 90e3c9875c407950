//! Fixed row schemas for the supported COREP templates.

use crate::error::{CorepError, Result};
use crate::schema::{Category, Concept, RatioName, Sign, TemplateId, TotalName};
use std::collections::HashSet;

/// How a row obtains its value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RowFormula {
    /// Sum of the scenario concepts that are present.
    Sum(&'static [Concept]),
    /// Signed sum of the non-null rows tagged as contributing to the total.
    Total(TotalName),
    /// Capital ratio in percent.
    Ratio(RatioName),
    /// Percentage points by which a ratio exceeds a minimum.
    Headroom { ratio: RatioName, minimum: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowDefinition {
    pub row_id: &'static str,
    pub label: &'static str,
    pub category: Category,
    pub sign: Sign,
    pub formula: RowFormula,
    /// Totals this row's signed value is accumulated into.
    pub contributes_to: &'static [TotalName],
}

impl RowDefinition {
    const fn input(
        row_id: &'static str,
        label: &'static str,
        category: Category,
        sign: Sign,
        concepts: &'static [Concept],
        contributes_to: &'static [TotalName],
    ) -> Self {
        Self {
            row_id,
            label,
            category,
            sign,
            formula: RowFormula::Sum(concepts),
            contributes_to,
        }
    }

    const fn total(
        row_id: &'static str,
        label: &'static str,
        category: Category,
        total: TotalName,
        contributes_to: &'static [TotalName],
    ) -> Self {
        Self {
            row_id,
            label,
            category,
            sign: Sign::Total,
            formula: RowFormula::Total(total),
            contributes_to,
        }
    }

    const fn percent(
        row_id: &'static str,
        label: &'static str,
        category: Category,
        formula: RowFormula,
    ) -> Self {
        Self {
            row_id,
            label,
            category,
            sign: Sign::Percent,
            formula,
            contributes_to: &[],
        }
    }

    pub fn is_deduction(&self) -> bool {
        self.sign == Sign::Minus
    }

    /// Rows whose value is read straight from the scenario.
    pub fn is_input(&self) -> bool {
        matches!(self.formula, RowFormula::Sum(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemplateDefinition {
    pub id: TemplateId,
    /// Regulatory template code, e.g. "C_01.00".
    pub template_id: &'static str,
    pub name: &'static str,
    /// Declaration order is display order.
    pub rows: &'static [RowDefinition],
}

impl TemplateDefinition {
    pub fn row(&self, row_id: &str) -> Option<&RowDefinition> {
        self.rows.iter().find(|r| r.row_id == row_id)
    }

    pub fn defines_total(&self, total: TotalName) -> bool {
        self.rows.iter().any(|r| r.contributes_to.contains(&total))
    }

    /// Totals accumulated by this template, in canonical order.
    pub fn totals(&self) -> Vec<TotalName> {
        let mut totals: Vec<TotalName> = self
            .rows
            .iter()
            .flat_map(|r| r.contributes_to.iter().copied())
            .collect();
        totals.sort();
        totals.dedup();
        totals
    }

    /// Indices of the rows tagged as contributing to `total`.
    pub fn contributors(&self, total: TotalName) -> impl Iterator<Item = usize> + '_ {
        self.rows
            .iter()
            .enumerate()
            .filter(move |(_, r)| r.contributes_to.contains(&total))
            .map(|(idx, _)| idx)
    }

    pub fn ensure_unique_rows(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for row in self.rows {
            if !seen.insert(row.row_id) {
                return Err(CorepError::DuplicateRow {
                    template: self.template_id.to_string(),
                    row: row.row_id.to_string(),
                });
            }
        }
        Ok(())
    }
}

use Category as C;
use Concept as K;
use TotalName as T;

pub static CA1_OWN_FUNDS: TemplateDefinition = TemplateDefinition {
    id: TemplateId::Ca1,
    template_id: "C_01.00",
    name: "Own Funds",
    rows: &[
        RowDefinition::input("010", "Capital instruments eligible as CET1 capital", C::Cet1, Sign::Plus, &[K::ShareCapital], &[T::Cet1]),
        RowDefinition::input("020", "Share premium", C::Cet1, Sign::Plus, &[K::SharePremium], &[T::Cet1]),
        RowDefinition::input("030", "Retained earnings", C::Cet1, Sign::Plus, &[K::RetainedEarnings], &[T::Cet1]),
        RowDefinition::input("040", "Accumulated other comprehensive income", C::Cet1, Sign::Plus, &[K::AccumulatedOci], &[T::Cet1]),
        RowDefinition::input("050", "Other reserves", C::Cet1, Sign::Plus, &[K::OtherReserves], &[T::Cet1]),
        RowDefinition::input("060", "Funds for general banking risk", C::Cet1, Sign::Plus, &[K::GeneralBankingRiskFunds], &[T::Cet1]),
        RowDefinition::input("070", "Adjustments to CET1 due to prudential filters", C::Cet1, Sign::Either, &[K::PrudentialFilters], &[T::Cet1]),
        RowDefinition::input("080", "(-) Goodwill", C::Cet1Deduction, Sign::Minus, &[K::Goodwill], &[T::Cet1]),
        RowDefinition::input("090", "(-) Other intangible assets", C::Cet1Deduction, Sign::Minus, &[K::IntangibleAssets], &[T::Cet1]),
        RowDefinition::input("100", "(-) Deferred tax assets dependent on future profitability", C::Cet1Deduction, Sign::Minus, &[K::DeferredTaxAssets], &[T::Cet1]),
        RowDefinition::input("110", "(-) Defined benefit pension fund assets", C::Cet1Deduction, Sign::Minus, &[K::PensionFundAssets], &[T::Cet1]),
        RowDefinition::input("120", "(-) Direct, indirect and synthetic holdings of own CET1", C::Cet1Deduction, Sign::Minus, &[K::OwnCet1Holdings], &[T::Cet1]),
        RowDefinition::input("130", "CET1 capital elements or deductions - other", C::Cet1, Sign::Either, &[K::OtherCet1Adjustments], &[T::Cet1]),
        RowDefinition::total("200", "Common Equity Tier 1 (CET1) capital", C::Cet1Total, T::Cet1, &[T::Tier1]),
        RowDefinition::input("300", "Capital instruments eligible as AT1 capital", C::At1, Sign::Plus, &[K::At1Instruments], &[T::At1]),
        RowDefinition::input("310", "Share premium related to AT1 instruments", C::At1, Sign::Plus, &[K::At1SharePremium], &[T::At1]),
        RowDefinition::input("320", "(-) Holdings of own AT1 instruments", C::At1Deduction, Sign::Minus, &[K::OwnAt1Holdings], &[T::At1]),
        RowDefinition::input("330", "AT1 capital elements or deductions - other", C::At1, Sign::Either, &[K::OtherAt1Adjustments], &[T::At1]),
        RowDefinition::total("400", "Additional Tier 1 (AT1) capital", C::At1Total, T::At1, &[T::Tier1]),
        RowDefinition::total("500", "Tier 1 capital (T1 = CET1 + AT1)", C::Tier1Total, T::Tier1, &[T::TotalOwnFunds]),
        RowDefinition::input("600", "Capital instruments eligible as T2 capital", C::Tier2, Sign::Plus, &[K::Tier2Instruments], &[T::Tier2]),
        RowDefinition::input("610", "Share premium related to T2 instruments", C::Tier2, Sign::Plus, &[K::Tier2SharePremium], &[T::Tier2]),
        RowDefinition::input("620", "Credit risk adjustments", C::Tier2, Sign::Plus, &[K::CreditRiskAdjustments], &[T::Tier2]),
        RowDefinition::input("630", "(-) Holdings of own T2 instruments", C::Tier2Deduction, Sign::Minus, &[K::OwnTier2Holdings], &[T::Tier2]),
        RowDefinition::input("640", "T2 capital elements or deductions - other", C::Tier2, Sign::Either, &[K::OtherTier2Adjustments], &[T::Tier2]),
        RowDefinition::total("700", "Tier 2 (T2) capital", C::Tier2Total, T::Tier2, &[T::TotalOwnFunds]),
        RowDefinition::total("800", "Total Own Funds (T1 + T2)", C::Total, T::TotalOwnFunds, &[]),
    ],
};

pub static CA2_CAPITAL_REQUIREMENTS: TemplateDefinition = TemplateDefinition {
    id: TemplateId::Ca2,
    template_id: "C_02.00",
    name: "Own Funds Requirements",
    rows: &[
        RowDefinition::input("010", "Credit risk - Standardised Approach (SA)", C::CreditRisk, Sign::Plus, &[K::CreditRiskSa], &[T::CreditRiskRwa]),
        RowDefinition::input("020", "Credit risk - IRB Approach", C::CreditRisk, Sign::Plus, &[K::CreditRiskIrb], &[T::CreditRiskRwa]),
        RowDefinition::input("030", "Securitisation positions", C::CreditRisk, Sign::Plus, &[K::Securitisation], &[T::CreditRiskRwa]),
        RowDefinition::input("040", "Contribution to CCP default fund", C::CreditRisk, Sign::Plus, &[K::CcpDefaultFund], &[T::CreditRiskRwa]),
        RowDefinition::total("050", "Total credit risk RWA", C::CreditRiskTotal, T::CreditRiskRwa, &[T::TotalRiskExposure]),
        RowDefinition::input("100", "Position risk (trading book)", C::MarketRisk, Sign::Plus, &[K::PositionRisk], &[T::MarketRiskRwa]),
        RowDefinition::input("110", "Foreign exchange risk", C::MarketRisk, Sign::Plus, &[K::FxRisk], &[T::MarketRiskRwa]),
        RowDefinition::input("120", "Commodities risk", C::MarketRisk, Sign::Plus, &[K::CommodityRisk], &[T::MarketRiskRwa]),
        RowDefinition::total("150", "Total market risk RWA", C::MarketRiskTotal, T::MarketRiskRwa, &[T::TotalRiskExposure]),
        RowDefinition::input("200", "Credit valuation adjustment risk", C::CvaRisk, Sign::Plus, &[K::CvaRisk], &[T::TotalRiskExposure]),
        RowDefinition::input("300", "Operational risk", C::OpRisk, Sign::Plus, &[K::OperationalRisk], &[T::TotalRiskExposure]),
        RowDefinition::total("500", "Total Risk Exposure Amount (TREA)", C::TotalRwa, T::TotalRiskExposure, &[]),
        RowDefinition::percent("600", "CET1 capital ratio (%)", C::Ratio, RowFormula::Ratio(RatioName::Cet1Ratio)),
        RowDefinition::percent("610", "Tier 1 capital ratio (%)", C::Ratio, RowFormula::Ratio(RatioName::Tier1Ratio)),
        RowDefinition::percent("620", "Total capital ratio (%)", C::Ratio, RowFormula::Ratio(RatioName::TotalCapitalRatio)),
        RowDefinition::percent("630", "Institution-specific buffer requirement (%)", C::Buffer, RowFormula::Sum(&[K::BufferRequirement])),
        RowDefinition::percent("640", "CET1 available to meet buffers (%)", C::Buffer, RowFormula::Headroom { ratio: RatioName::Cet1Ratio, minimum: 4.5 }),
    ],
};

pub static TEMPLATES: [&TemplateDefinition; 2] = [&CA1_OWN_FUNDS, &CA2_CAPITAL_REQUIREMENTS];

pub fn get_template(id: TemplateId) -> &'static TemplateDefinition {
    match id {
        TemplateId::Ca1 => &CA1_OWN_FUNDS,
        TemplateId::Ca2 => &CA2_CAPITAL_REQUIREMENTS,
    }
}

/// The supported template that accumulates `total`, if any.
pub fn template_defining(total: TotalName) -> Option<&'static TemplateDefinition> {
    TEMPLATES.iter().copied().find(|t| t.defines_total(total))
}
