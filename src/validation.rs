use crate::schema::{
    Concept, PopulatedField, RatioName, Ratios, RuleOutcome, Severity, TotalName, Totals,
    ValidationResult,
};
use crate::templates::{RowDefinition, RowFormula, TemplateDefinition};
use log::debug;

/// Absolute tolerance, in millions, for recomputed totals.
pub const ARITHMETIC_TOLERANCE: f64 = 0.01;

const CAPITAL_INSTRUMENTS: [Concept; 3] = [
    Concept::ShareCapital,
    Concept::At1Instruments,
    Concept::Tier2Instruments,
];

#[derive(Debug, Clone, Copy)]
enum Check {
    /// Recompute a total from its contributing fields.
    Arithmetic(TotalName),
    /// Ratio must be at least `minimum` percent.
    MinimumRatio { ratio: RatioName, minimum: f64 },
    /// Selected rows must not be negative.
    NonNegative(RowSelector),
    /// At least one input row has a value.
    DataAvailable,
}

#[derive(Debug, Clone, Copy)]
enum RowSelector {
    CapitalInstruments,
    Deductions,
}

impl RowSelector {
    fn matches(self, row: &RowDefinition) -> bool {
        match self {
            RowSelector::CapitalInstruments => matches!(
                row.formula,
                RowFormula::Sum(concepts) if concepts.iter().any(|c| CAPITAL_INSTRUMENTS.contains(c))
            ),
            RowSelector::Deductions => row.is_deduction(),
        }
    }

    fn describe(self) -> &'static str {
        match self {
            RowSelector::CapitalInstruments => "capital instrument",
            RowSelector::Deductions => "deduction",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Rule {
    id: &'static str,
    name: &'static str,
    severity: Severity,
    check: Check,
}

/// Evaluated in this order; every rule always produces a result.
static RULES: [Rule; 11] = [
    Rule {
        id: "VAL_001",
        name: "CET1 total calculation",
        severity: Severity::Error,
        check: Check::Arithmetic(TotalName::Cet1),
    },
    Rule {
        id: "VAL_002",
        name: "Tier 1 total calculation",
        severity: Severity::Error,
        check: Check::Arithmetic(TotalName::Tier1),
    },
    Rule {
        id: "VAL_003",
        name: "Total own funds calculation",
        severity: Severity::Error,
        check: Check::Arithmetic(TotalName::TotalOwnFunds),
    },
    Rule {
        id: "VAL_004",
        name: "Minimum CET1 ratio",
        severity: Severity::Error,
        check: Check::MinimumRatio {
            ratio: RatioName::Cet1Ratio,
            minimum: 4.5,
        },
    },
    Rule {
        id: "VAL_005",
        name: "Minimum Tier 1 ratio",
        severity: Severity::Error,
        check: Check::MinimumRatio {
            ratio: RatioName::Tier1Ratio,
            minimum: 6.0,
        },
    },
    Rule {
        id: "VAL_006",
        name: "Minimum total capital ratio",
        severity: Severity::Error,
        check: Check::MinimumRatio {
            ratio: RatioName::TotalCapitalRatio,
            minimum: 8.0,
        },
    },
    Rule {
        id: "VAL_007",
        name: "Non-negative capital instruments",
        severity: Severity::Error,
        check: Check::NonNegative(RowSelector::CapitalInstruments),
    },
    Rule {
        id: "VAL_008",
        name: "Deductions reported as positive values",
        severity: Severity::Warning,
        check: Check::NonNegative(RowSelector::Deductions),
    },
    Rule {
        id: "VAL_009",
        name: "Capital conservation buffer",
        severity: Severity::Warning,
        check: Check::MinimumRatio {
            ratio: RatioName::Cet1Ratio,
            minimum: 7.0,
        },
    },
    Rule {
        id: "VAL_010",
        name: "RWA consistency",
        severity: Severity::Error,
        check: Check::Arithmetic(TotalName::TotalRiskExposure),
    },
    Rule {
        id: "VAL_011",
        name: "Scenario data available",
        severity: Severity::Error,
        check: Check::DataAvailable,
    },
];

pub struct Validator<'a> {
    template: &'a TemplateDefinition,
    tolerance: f64,
}

impl<'a> Validator<'a> {
    pub fn new(template: &'a TemplateDefinition) -> Self {
        Self {
            template,
            tolerance: ARITHMETIC_TOLERANCE,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Runs every rule against the computed values. Never short-circuits.
    pub fn validate(
        &self,
        totals: &Totals,
        ratios: &Ratios,
        fields: &[PopulatedField],
    ) -> Vec<ValidationResult> {
        let results: Vec<ValidationResult> = RULES
            .iter()
            .map(|rule| {
                let (outcome, message) = match rule.check {
                    Check::Arithmetic(total) => self.check_total(total, totals, fields),
                    Check::MinimumRatio { ratio, minimum } => {
                        check_ratio(ratio, minimum, ratios)
                    }
                    Check::NonNegative(selector) => self.check_non_negative(selector, fields),
                    Check::DataAvailable => self.check_data_available(fields),
                };

                ValidationResult {
                    rule_id: rule.id.to_string(),
                    name: rule.name.to_string(),
                    severity: rule.severity,
                    passed: outcome != RuleOutcome::Failed,
                    outcome,
                    message,
                }
            })
            .collect();

        debug!(
            "Validated {}: {} failed, {} not evaluated",
            self.template.template_id,
            results.iter().filter(|r| r.is_failure()).count(),
            results
                .iter()
                .filter(|r| r.outcome == RuleOutcome::NotEvaluated)
                .count()
        );

        results
    }

    fn field_value(&self, fields: &[PopulatedField], row: &RowDefinition) -> Option<f64> {
        fields
            .iter()
            .find(|f| f.row_id == row.row_id)
            .and_then(|f| f.value)
    }

    fn check_total(
        &self,
        total: TotalName,
        totals: &Totals,
        fields: &[PopulatedField],
    ) -> (RuleOutcome, String) {
        if !self.template.defines_total(total) {
            return (
                RuleOutcome::NotEvaluated,
                format!(
                    "Not applicable: {} does not report {}",
                    self.template.template_id,
                    total.key()
                ),
            );
        }

        let expected = self
            .template
            .contributors(total)
            .filter_map(|idx| {
                let row = &self.template.rows[idx];
                self.field_value(fields, row).map(|v| row.sign.apply(v))
            })
            .fold(None, |acc: Option<f64>, v| Some(acc.unwrap_or(0.0) + v));
        let reported = totals.get(&total).copied().flatten();

        match (expected, reported) {
            (None, None) => (
                RuleOutcome::NotEvaluated,
                format!("Insufficient data to check {}", total.key()),
            ),
            (Some(expected), Some(reported)) if (expected - reported).abs() <= self.tolerance => (
                RuleOutcome::Passed,
                format!("{} of {:.2} matches its components", total.key(), reported),
            ),
            (expected, reported) => (
                RuleOutcome::Failed,
                format!(
                    "{} mismatch: components sum to {}, reported {}",
                    total.key(),
                    display_amount(expected),
                    display_amount(reported)
                ),
            ),
        }
    }

    fn check_non_negative(
        &self,
        selector: RowSelector,
        fields: &[PopulatedField],
    ) -> (RuleOutcome, String) {
        let checked: Vec<(&RowDefinition, f64)> = self
            .template
            .rows
            .iter()
            .filter(|row| selector.matches(row))
            .filter_map(|row| self.field_value(fields, row).map(|v| (row, v)))
            .collect();

        if checked.is_empty() {
            return (
                RuleOutcome::NotEvaluated,
                format!("No {} values reported", selector.describe()),
            );
        }

        let negative: Vec<&str> = checked
            .iter()
            .filter(|(_, v)| *v < 0.0)
            .map(|(row, _)| row.row_id)
            .collect();

        if negative.is_empty() {
            (
                RuleOutcome::Passed,
                format!("All {} values are non-negative", selector.describe()),
            )
        } else {
            (
                RuleOutcome::Failed,
                format!(
                    "Negative {} value in row(s) {}",
                    selector.describe(),
                    negative.join(", ")
                ),
            )
        }
    }

    fn check_data_available(&self, fields: &[PopulatedField]) -> (RuleOutcome, String) {
        let reported = self
            .template
            .rows
            .iter()
            .filter(|row| row.is_input())
            .filter(|row| self.field_value(fields, row).is_some())
            .count();

        if reported == 0 {
            (
                RuleOutcome::Failed,
                format!(
                    "No {} input rows populated from the scenario",
                    self.template.id
                ),
            )
        } else {
            (
                RuleOutcome::Passed,
                format!("{} input row(s) populated", reported),
            )
        }
    }
}

fn check_ratio(ratio: RatioName, minimum: f64, ratios: &Ratios) -> (RuleOutcome, String) {
    match ratios.get(&ratio).copied().flatten() {
        None => (
            RuleOutcome::NotEvaluated,
            format!("{} not available: insufficient data", ratio.key()),
        ),
        Some(value) if value >= minimum => (
            RuleOutcome::Passed,
            format!("{} of {:.1}% meets the {:.1}% minimum", ratio.key(), value, minimum),
        ),
        Some(value) => (
            RuleOutcome::Failed,
            format!("{} of {:.1}% is below the {:.1}% minimum", ratio.key(), value, minimum),
        ),
    }
}

fn display_amount(value: Option<f64>) -> String {
    value.map_or_else(|| "nothing".to_string(), |v| format!("{:.2}", v))
}

pub fn validate(
    template: &TemplateDefinition,
    totals: &Totals,
    ratios: &Ratios,
    fields: &[PopulatedField],
) -> Vec<ValidationResult> {
    Validator::new(template).validate(totals, ratios, fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::populate;
    use crate::schema::ScenarioFigures;
    use crate::templates::{CA1_OWN_FUNDS, CA2_CAPITAL_REQUIREMENTS};

    fn demo_figures() -> ScenarioFigures {
        ScenarioFigures::new()
            .with(Concept::ShareCapital, 500.0)
            .with(Concept::SharePremium, 200.0)
            .with(Concept::RetainedEarnings, 150.0)
            .with(Concept::IntangibleAssets, 30.0)
            .with(Concept::Tier2Instruments, 100.0)
            .with(Concept::RiskWeightedAssets, 4000.0)
    }

    fn result<'a>(results: &'a [ValidationResult], id: &str) -> &'a ValidationResult {
        results.iter().find(|r| r.rule_id == id).unwrap()
    }

    #[test]
    fn test_demo_scenario_passes_every_evaluated_rule() {
        let populated = populate(&CA1_OWN_FUNDS, &demo_figures()).unwrap();
        let results = validate(
            &CA1_OWN_FUNDS,
            &populated.totals,
            &populated.ratios,
            &populated.fields,
        );

        let ids: Vec<_> = results.iter().map(|r| r.rule_id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "VAL_001", "VAL_002", "VAL_003", "VAL_004", "VAL_005", "VAL_006", "VAL_007",
                "VAL_008", "VAL_009", "VAL_010", "VAL_011"
            ]
        );
        assert!(results.iter().all(|r| r.passed));
        assert_eq!(result(&results, "VAL_001").outcome, RuleOutcome::Passed);
        assert_eq!(result(&results, "VAL_010").outcome, RuleOutcome::NotEvaluated);
    }

    #[test]
    fn test_low_cet1_ratio_fails_with_error() {
        let mut ratios = Ratios::new();
        ratios.insert(RatioName::Cet1Ratio, Some(4.0));

        let results = validate(&CA1_OWN_FUNDS, &Totals::new(), &ratios, &[]);
        let rule = result(&results, "VAL_004");

        assert!(!rule.passed);
        assert_eq!(rule.outcome, RuleOutcome::Failed);
        assert_eq!(rule.severity, Severity::Error);

        let buffer = result(&results, "VAL_009");
        assert_eq!(buffer.outcome, RuleOutcome::Failed);
        assert_eq!(buffer.severity, Severity::Warning);
    }

    #[test]
    fn test_null_ratio_is_not_evaluated() {
        let mut ratios = Ratios::new();
        ratios.insert(RatioName::Cet1Ratio, None);

        let results = validate(&CA1_OWN_FUNDS, &Totals::new(), &ratios, &[]);
        let rule = result(&results, "VAL_004");

        assert!(rule.passed);
        assert_eq!(rule.outcome, RuleOutcome::NotEvaluated);
        assert_eq!(results.len(), 11);
    }

    #[test]
    fn test_empty_scenario_reports_missing_data() {
        let populated = populate(&CA1_OWN_FUNDS, &ScenarioFigures::new()).unwrap();
        let results = validate(
            &CA1_OWN_FUNDS,
            &populated.totals,
            &populated.ratios,
            &populated.fields,
        );

        let missing = result(&results, "VAL_011");
        assert!(!missing.passed);
        assert_eq!(missing.severity, Severity::Error);
        assert_eq!(results.iter().filter(|r| r.is_failure()).count(), 1);
    }

    #[test]
    fn test_missing_data_names_the_template() {
        // Own funds figures only; none of them is a CA2 input row.
        let populated = populate(&CA2_CAPITAL_REQUIREMENTS, &demo_figures()).unwrap();
        let results = validate(
            &CA2_CAPITAL_REQUIREMENTS,
            &populated.totals,
            &populated.ratios,
            &populated.fields,
        );

        let missing = result(&results, "VAL_011");
        assert!(missing.is_failure());
        assert_eq!(missing.message, "No CA2 input rows populated from the scenario");
    }

    #[test]
    fn test_mismatched_total_fails() {
        let mut populated = populate(&CA1_OWN_FUNDS, &demo_figures()).unwrap();
        populated.totals.insert(TotalName::Cet1, Some(900.0));

        let results = validate(
            &CA1_OWN_FUNDS,
            &populated.totals,
            &populated.ratios,
            &populated.fields,
        );
        assert!(result(&results, "VAL_001").is_failure());
        // Tier 1 is recomputed from row 200, not from the totals map.
        assert!(result(&results, "VAL_002").passed);
    }

    #[test]
    fn test_rounding_within_tolerance_passes() {
        let mut populated = populate(&CA1_OWN_FUNDS, &demo_figures()).unwrap();
        populated.totals.insert(TotalName::Cet1, Some(820.004));

        let results = validate(
            &CA1_OWN_FUNDS,
            &populated.totals,
            &populated.ratios,
            &populated.fields,
        );
        assert_eq!(result(&results, "VAL_001").outcome, RuleOutcome::Passed);
    }

    #[test]
    fn test_sign_rules() {
        let figures = demo_figures()
            .with(Concept::Goodwill, -10.0)
            .with(Concept::At1Instruments, -5.0);
        let populated = populate(&CA1_OWN_FUNDS, &figures).unwrap();
        let results = validate(
            &CA1_OWN_FUNDS,
            &populated.totals,
            &populated.ratios,
            &populated.fields,
        );

        let instruments = result(&results, "VAL_007");
        assert!(instruments.is_failure());
        assert!(instruments.message.contains("300"));

        let deductions = result(&results, "VAL_008");
        assert!(deductions.is_failure());
        assert_eq!(deductions.severity, Severity::Warning);
        assert!(deductions.message.contains("080"));
    }

    #[test]
    fn test_ca2_checks_risk_exposure_and_skips_own_funds_arithmetic() {
        let figures = demo_figures()
            .with(Concept::CreditRiskSa, 3000.0)
            .with(Concept::OperationalRisk, 1000.0);
        let populated = populate(&CA2_CAPITAL_REQUIREMENTS, &figures).unwrap();
        let results = validate(
            &CA2_CAPITAL_REQUIREMENTS,
            &populated.totals,
            &populated.ratios,
            &populated.fields,
        );

        assert_eq!(result(&results, "VAL_001").outcome, RuleOutcome::NotEvaluated);
        assert_eq!(result(&results, "VAL_010").outcome, RuleOutcome::Passed);
        assert_eq!(result(&results, "VAL_004").outcome, RuleOutcome::Passed);
        assert_eq!(result(&results, "VAL_007").outcome, RuleOutcome::NotEvaluated);
        assert!(results.iter().all(|r| r.passed));
    }
}
