use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::CorepError;

/// The fixed vocabulary of capital-position figures a scenario can provide.
///
/// All amounts are in millions of the reporting currency, except
/// `BufferRequirement`, which is a percentage of risk exposure.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Concept {
    ShareCapital,
    SharePremium,
    RetainedEarnings,
    AccumulatedOci,
    OtherReserves,
    GeneralBankingRiskFunds,
    PrudentialFilters,
    Goodwill,
    IntangibleAssets,
    DeferredTaxAssets,
    PensionFundAssets,
    OwnCet1Holdings,
    OtherCet1Adjustments,
    At1Instruments,
    At1SharePremium,
    OwnAt1Holdings,
    OtherAt1Adjustments,
    Tier2Instruments,
    Tier2SharePremium,
    CreditRiskAdjustments,
    OwnTier2Holdings,
    OtherTier2Adjustments,
    RiskWeightedAssets,
    CreditRiskSa,
    CreditRiskIrb,
    Securitisation,
    CcpDefaultFund,
    PositionRisk,
    FxRisk,
    CommodityRisk,
    CvaRisk,
    OperationalRisk,
    BufferRequirement,
}

impl Concept {
    pub const ALL: [Concept; 33] = [
        Concept::ShareCapital,
        Concept::SharePremium,
        Concept::RetainedEarnings,
        Concept::AccumulatedOci,
        Concept::OtherReserves,
        Concept::GeneralBankingRiskFunds,
        Concept::PrudentialFilters,
        Concept::Goodwill,
        Concept::IntangibleAssets,
        Concept::DeferredTaxAssets,
        Concept::PensionFundAssets,
        Concept::OwnCet1Holdings,
        Concept::OtherCet1Adjustments,
        Concept::At1Instruments,
        Concept::At1SharePremium,
        Concept::OwnAt1Holdings,
        Concept::OtherAt1Adjustments,
        Concept::Tier2Instruments,
        Concept::Tier2SharePremium,
        Concept::CreditRiskAdjustments,
        Concept::OwnTier2Holdings,
        Concept::OtherTier2Adjustments,
        Concept::RiskWeightedAssets,
        Concept::CreditRiskSa,
        Concept::CreditRiskIrb,
        Concept::Securitisation,
        Concept::CcpDefaultFund,
        Concept::PositionRisk,
        Concept::FxRisk,
        Concept::CommodityRisk,
        Concept::CvaRisk,
        Concept::OperationalRisk,
        Concept::BufferRequirement,
    ];

    /// Wire key, identical to the serde representation.
    pub fn key(self) -> &'static str {
        match self {
            Concept::ShareCapital => "share_capital",
            Concept::SharePremium => "share_premium",
            Concept::RetainedEarnings => "retained_earnings",
            Concept::AccumulatedOci => "accumulated_oci",
            Concept::OtherReserves => "other_reserves",
            Concept::GeneralBankingRiskFunds => "general_banking_risk_funds",
            Concept::PrudentialFilters => "prudential_filters",
            Concept::Goodwill => "goodwill",
            Concept::IntangibleAssets => "intangible_assets",
            Concept::DeferredTaxAssets => "deferred_tax_assets",
            Concept::PensionFundAssets => "pension_fund_assets",
            Concept::OwnCet1Holdings => "own_cet1_holdings",
            Concept::OtherCet1Adjustments => "other_cet1_adjustments",
            Concept::At1Instruments => "at1_instruments",
            Concept::At1SharePremium => "at1_share_premium",
            Concept::OwnAt1Holdings => "own_at1_holdings",
            Concept::OtherAt1Adjustments => "other_at1_adjustments",
            Concept::Tier2Instruments => "tier2_instruments",
            Concept::Tier2SharePremium => "tier2_share_premium",
            Concept::CreditRiskAdjustments => "credit_risk_adjustments",
            Concept::OwnTier2Holdings => "own_tier2_holdings",
            Concept::OtherTier2Adjustments => "other_tier2_adjustments",
            Concept::RiskWeightedAssets => "risk_weighted_assets",
            Concept::CreditRiskSa => "credit_risk_sa",
            Concept::CreditRiskIrb => "credit_risk_irb",
            Concept::Securitisation => "securitisation",
            Concept::CcpDefaultFund => "ccp_default_fund",
            Concept::PositionRisk => "position_risk",
            Concept::FxRisk => "fx_risk",
            Concept::CommodityRisk => "commodity_risk",
            Concept::CvaRisk => "cva_risk",
            Concept::OperationalRisk => "operational_risk",
            Concept::BufferRequirement => "buffer_requirement",
        }
    }

    /// Human readable description, used in prompts.
    pub fn label(self) -> &'static str {
        match self {
            Concept::ShareCapital => "Paid-up ordinary share capital eligible as CET1",
            Concept::SharePremium => "Share premium on CET1 instruments",
            Concept::RetainedEarnings => "Retained earnings",
            Concept::AccumulatedOci => "Accumulated other comprehensive income",
            Concept::OtherReserves => "Other reserves",
            Concept::GeneralBankingRiskFunds => "Funds for general banking risk",
            Concept::PrudentialFilters => "Prudential filter adjustments to CET1 (signed)",
            Concept::Goodwill => "Goodwill (positive amount, deducted)",
            Concept::IntangibleAssets => "Other intangible assets (positive amount, deducted)",
            Concept::DeferredTaxAssets => {
                "Deferred tax assets relying on future profitability (positive amount, deducted)"
            }
            Concept::PensionFundAssets => {
                "Defined benefit pension fund assets (positive amount, deducted)"
            }
            Concept::OwnCet1Holdings => "Holdings of own CET1 instruments (positive amount, deducted)",
            Concept::OtherCet1Adjustments => "Other CET1 elements or deductions (signed)",
            Concept::At1Instruments => "Additional Tier 1 capital instruments",
            Concept::At1SharePremium => "Share premium on AT1 instruments",
            Concept::OwnAt1Holdings => "Holdings of own AT1 instruments (positive amount, deducted)",
            Concept::OtherAt1Adjustments => "Other AT1 elements or deductions (signed)",
            Concept::Tier2Instruments => "Tier 2 instruments and subordinated debt",
            Concept::Tier2SharePremium => "Share premium on Tier 2 instruments",
            Concept::CreditRiskAdjustments => "General credit risk adjustments eligible as Tier 2",
            Concept::OwnTier2Holdings => "Holdings of own Tier 2 instruments (positive amount, deducted)",
            Concept::OtherTier2Adjustments => "Other Tier 2 elements or deductions (signed)",
            Concept::RiskWeightedAssets => "Total risk-weighted assets",
            Concept::CreditRiskSa => "Credit risk RWA under the Standardised Approach",
            Concept::CreditRiskIrb => "Credit risk RWA under the IRB Approach",
            Concept::Securitisation => "Securitisation positions RWA",
            Concept::CcpDefaultFund => "Contribution to a CCP default fund RWA",
            Concept::PositionRisk => "Trading book position risk RWA",
            Concept::FxRisk => "Foreign exchange risk RWA",
            Concept::CommodityRisk => "Commodities risk RWA",
            Concept::CvaRisk => "Credit valuation adjustment risk RWA",
            Concept::OperationalRisk => "Operational risk RWA",
            Concept::BufferRequirement => "Institution-specific combined buffer requirement (%)",
        }
    }

    /// Alternative keys a model is known to emit for the same concept.
    fn aliases(self) -> &'static [&'static str] {
        match self {
            Concept::ShareCapital => &["ordinary_share_capital", "cet1_instruments", "capital_instruments"],
            Concept::AccumulatedOci => &["aoci", "other_comprehensive_income"],
            Concept::OtherReserves => &["reserves"],
            Concept::IntangibleAssets => &["intangibles", "other_intangible_assets"],
            Concept::DeferredTaxAssets => &["dta"],
            Concept::At1Instruments => &["additional_tier1_instruments", "at1"],
            Concept::Tier2Instruments => &["tier_2_instruments", "tier2_debt", "tier_2_debt", "subordinated_debt"],
            Concept::RiskWeightedAssets => &["rwa", "total_rwa", "risk_weighted_assets_total"],
            Concept::CvaRisk => &["cva"],
            Concept::OperationalRisk => &["op_risk"],
            _ => &[],
        }
    }

    /// Strict lookup against the vocabulary; unknown keys yield `None`.
    pub fn from_key(raw: &str) -> Option<Concept> {
        let normalized: String = raw
            .trim()
            .chars()
            .map(|c| match c {
                '-' | ' ' => '_',
                other => other.to_ascii_lowercase(),
            })
            .collect();

        Concept::ALL
            .iter()
            .copied()
            .find(|c| c.key() == normalized || c.aliases().contains(&normalized.as_str()))
    }
}

impl fmt::Display for Concept {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Normalized capital-position figures for one request.
///
/// A concept that is missing from the map is *absent*; a concept present
/// with the value `0.0` is an explicit zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScenarioFigures(BTreeMap<Concept, f64>);

impl ScenarioFigures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, concept: Concept, amount: f64) -> Self {
        self.insert(concept, amount);
        self
    }

    /// Non-finite amounts are treated as absent.
    pub fn insert(&mut self, concept: Concept, amount: f64) {
        if amount.is_finite() {
            self.0.insert(concept, amount);
        }
    }

    pub fn get(&self, concept: Concept) -> Option<f64> {
        self.0.get(&concept).copied()
    }

    pub fn contains(&self, concept: Concept) -> bool {
        self.0.contains_key(&concept)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Concept, f64)> + '_ {
        self.0.iter().map(|(c, v)| (*c, *v))
    }

    /// Sum of the referenced concepts that are present, `None` if none are.
    pub fn sum_present(&self, concepts: &[Concept]) -> Option<f64> {
        concepts
            .iter()
            .filter_map(|c| self.get(*c))
            .fold(None, |acc, v| Some(acc.unwrap_or(0.0) + v))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemplateId {
    #[serde(rename = "CA1")]
    Ca1,
    #[serde(rename = "CA2")]
    Ca2,
}

impl TemplateId {
    pub fn code(self) -> &'static str {
        match self {
            TemplateId::Ca1 => "CA1",
            TemplateId::Ca2 => "CA2",
        }
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for TemplateId {
    type Err = CorepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CA1" | "C_01.00" | "C 01.00" => Ok(TemplateId::Ca1),
            "CA2" | "C_02.00" | "C 02.00" => Ok(TemplateId::Ca2),
            _ => Err(CorepError::UnknownTemplate(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sign {
    #[serde(rename = "+")]
    Plus,
    /// Deduction: reported as a positive magnitude and subtracted.
    #[serde(rename = "-")]
    Minus,
    /// Signed adjustment, added as reported.
    #[serde(rename = "+/-")]
    Either,
    #[serde(rename = "=")]
    Total,
    #[serde(rename = "%")]
    Percent,
}

impl Sign {
    /// Contribution of a row value to a total it is tagged for.
    pub fn apply(self, value: f64) -> f64 {
        match self {
            Sign::Minus => -value,
            _ => value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Cet1,
    #[serde(rename = "CET1_DED")]
    Cet1Deduction,
    #[serde(rename = "CET1_TOTAL")]
    Cet1Total,
    At1,
    #[serde(rename = "AT1_DED")]
    At1Deduction,
    #[serde(rename = "AT1_TOTAL")]
    At1Total,
    #[serde(rename = "T1_TOTAL")]
    Tier1Total,
    #[serde(rename = "T2")]
    Tier2,
    #[serde(rename = "T2_DED")]
    Tier2Deduction,
    #[serde(rename = "T2_TOTAL")]
    Tier2Total,
    Total,
    CreditRisk,
    CreditRiskTotal,
    MarketRisk,
    MarketRiskTotal,
    CvaRisk,
    OpRisk,
    TotalRwa,
    Ratio,
    Buffer,
}

/// Aggregates accumulated from tagged rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TotalName {
    Cet1,
    At1,
    Tier1,
    Tier2,
    TotalOwnFunds,
    CreditRiskRwa,
    MarketRiskRwa,
    TotalRiskExposure,
}

impl TotalName {
    pub fn key(self) -> &'static str {
        match self {
            TotalName::Cet1 => "cet1",
            TotalName::At1 => "at1",
            TotalName::Tier1 => "tier1",
            TotalName::Tier2 => "tier2",
            TotalName::TotalOwnFunds => "total_own_funds",
            TotalName::CreditRiskRwa => "credit_risk_rwa",
            TotalName::MarketRiskRwa => "market_risk_rwa",
            TotalName::TotalRiskExposure => "total_risk_exposure",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatioName {
    Cet1Ratio,
    Tier1Ratio,
    TotalCapitalRatio,
}

impl RatioName {
    pub const ALL: [RatioName; 3] = [
        RatioName::Cet1Ratio,
        RatioName::Tier1Ratio,
        RatioName::TotalCapitalRatio,
    ];

    pub fn key(self) -> &'static str {
        match self {
            RatioName::Cet1Ratio => "cet1_ratio",
            RatioName::Tier1Ratio => "tier1_ratio",
            RatioName::TotalCapitalRatio => "total_capital_ratio",
        }
    }

    /// The capital total divided by risk exposure for this ratio.
    pub fn numerator(self) -> TotalName {
        match self {
            RatioName::Cet1Ratio => TotalName::Cet1,
            RatioName::Tier1Ratio => TotalName::Tier1,
            RatioName::TotalCapitalRatio => TotalName::TotalOwnFunds,
        }
    }
}

pub type Totals = BTreeMap<TotalName, Option<f64>>;
pub type Ratios = BTreeMap<RatioName, Option<f64>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulatedField {
    pub row_id: String,
    pub label: String,
    /// `None` when no contributing input was present.
    pub value: Option<f64>,
    pub category: Category,
    pub sign: Sign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOutcome {
    Passed,
    Failed,
    NotEvaluated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub rule_id: String,
    pub name: String,
    pub severity: Severity,
    /// False only when the rule was evaluated and failed.
    pub passed: bool,
    pub outcome: RuleOutcome,
    pub message: String,
}

impl ValidationResult {
    pub fn is_failure(&self) -> bool {
        self.outcome == RuleOutcome::Failed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub field: String,
    pub rule_id: String,
    pub rule_title: String,
    pub explanation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionSource {
    /// Figures came from the language model.
    Model,
    /// Figures came from local pattern matching over the scenario text.
    PatternFallback,
    /// Neither path found any figure.
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub template_id: String,
    pub template_name: String,
    pub fields: Vec<PopulatedField>,
    pub totals: Totals,
    pub ratios: Ratios,
    pub validation_results: Vec<ValidationResult>,
    pub audit_trail: Vec<AuditEntry>,
    pub extraction_source: ExtractionSource,
    pub generated_at: DateTime<Utc>,
}

impl AnalysisResult {
    pub fn field(&self, row_id: &str) -> Option<&PopulatedField> {
        self.fields.iter().find(|f| f.row_id == row_id)
    }

    pub fn total(&self, name: TotalName) -> Option<f64> {
        self.totals.get(&name).copied().flatten()
    }

    pub fn ratio(&self, name: RatioName) -> Option<f64> {
        self.ratios.get(&name).copied().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concept_keys_round_trip_through_lookup() {
        for concept in Concept::ALL {
            assert_eq!(Concept::from_key(concept.key()), Some(concept));
            let json = serde_json::to_string(&concept).unwrap();
            assert_eq!(json, format!("\"{}\"", concept.key()));
        }
    }

    #[test]
    fn test_concept_lookup_normalizes_and_rejects_unknown() {
        assert_eq!(Concept::from_key("Share-Capital"), Some(Concept::ShareCapital));
        assert_eq!(Concept::from_key("RWA"), Some(Concept::RiskWeightedAssets));
        assert_eq!(Concept::from_key("tier 2 debt"), Some(Concept::Tier2Instruments));
        assert_eq!(Concept::from_key("minority_interests"), None);
    }

    #[test]
    fn test_sum_present_distinguishes_absent_from_zero() {
        let figures = ScenarioFigures::new().with(Concept::Goodwill, 0.0);
        assert_eq!(figures.sum_present(&[Concept::Goodwill]), Some(0.0));
        assert_eq!(figures.sum_present(&[Concept::IntangibleAssets]), None);
        assert_eq!(
            figures.sum_present(&[Concept::Goodwill, Concept::IntangibleAssets]),
            Some(0.0)
        );
    }

    #[test]
    fn test_non_finite_amounts_are_absent() {
        let mut figures = ScenarioFigures::new();
        figures.insert(Concept::ShareCapital, f64::NAN);
        assert!(figures.is_empty());
    }

    #[test]
    fn test_template_id_parsing() {
        assert_eq!("ca1".parse::<TemplateId>().unwrap(), TemplateId::Ca1);
        assert_eq!("C_02.00".parse::<TemplateId>().unwrap(), TemplateId::Ca2);
        assert!(matches!(
            "CA9".parse::<TemplateId>(),
            Err(CorepError::UnknownTemplate(_))
        ));
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(serde_json::to_string(&Sign::Either).unwrap(), "\"+/-\"");
        assert_eq!(
            serde_json::to_string(&Category::Cet1Deduction).unwrap(),
            "\"CET1_DED\""
        );
        assert_eq!(
            serde_json::to_string(&TotalName::TotalOwnFunds).unwrap(),
            "\"total_own_funds\""
        );
        assert_eq!(serde_json::to_string(&Severity::Warning).unwrap(), "\"WARNING\"");
    }
}
