use crate::error::{CorepError, Result};
use crate::schema::{
    Concept, PopulatedField, RatioName, Ratios, ScenarioFigures, TotalName, Totals,
};
use crate::templates::{template_defining, RowFormula, TemplateDefinition};
use log::debug;
use std::collections::{BTreeMap, BTreeSet};

/// Output of evaluating one template against one set of figures.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulatedTemplate {
    pub fields: Vec<PopulatedField>,
    pub totals: Totals,
    pub ratios: Ratios,
}

pub struct TemplateEngine<'a> {
    template: &'a TemplateDefinition,
}

// Per-request evaluation state
struct Evaluation<'a, 'f> {
    template: &'a TemplateDefinition,
    figures: &'f ScenarioFigures,
    values: Vec<Option<f64>>,
    /// Totals the template does not accumulate itself, taken from the
    /// template that does.
    borrowed: Totals,
}

impl<'a> TemplateEngine<'a> {
    pub fn new(template: &'a TemplateDefinition) -> Self {
        Self { template }
    }

    /// Row indices in an order where every row follows the rows it reads.
    ///
    /// Among rows that are ready at the same time, declaration order wins, so
    /// a template whose rows are already in dependency order evaluates
    /// top to bottom.
    pub fn evaluation_order(&self) -> Result<Vec<usize>> {
        let rows = self.template.rows;
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); rows.len()];
        let mut pending: Vec<usize> = vec![0; rows.len()];

        for (idx, _) in rows.iter().enumerate() {
            for dep in self.dependencies(idx) {
                if dep == idx {
                    return Err(self.cycle_error(idx));
                }
                dependents[dep].push(idx);
                pending[idx] += 1;
            }
        }

        let mut ready: BTreeSet<usize> = (0..rows.len()).filter(|i| pending[*i] == 0).collect();
        let mut order = Vec::with_capacity(rows.len());

        while let Some(idx) = ready.pop_first() {
            order.push(idx);
            for &next in &dependents[idx] {
                pending[next] -= 1;
                if pending[next] == 0 {
                    ready.insert(next);
                }
            }
        }

        if order.len() < rows.len() {
            let stuck = (0..rows.len())
                .find(|i| pending[*i] > 0)
                .unwrap_or_default();
            return Err(self.cycle_error(stuck));
        }

        Ok(order)
    }

    fn dependencies(&self, idx: usize) -> Vec<usize> {
        let mut deps: Vec<usize> = match self.template.rows[idx].formula {
            RowFormula::Sum(_) => Vec::new(),
            RowFormula::Total(total) => self.template.contributors(total).collect(),
            RowFormula::Ratio(ratio) | RowFormula::Headroom { ratio, .. } => self
                .template
                .contributors(ratio.numerator())
                .chain(self.template.contributors(TotalName::TotalRiskExposure))
                .collect(),
        };
        deps.sort_unstable();
        deps.dedup();
        deps
    }

    fn cycle_error(&self, idx: usize) -> CorepError {
        CorepError::TemplateCycle {
            template: self.template.template_id.to_string(),
            row: self.template.rows[idx].row_id.to_string(),
        }
    }

    pub fn populate(&self, figures: &ScenarioFigures) -> Result<PopulatedTemplate> {
        self.template.ensure_unique_rows()?;
        let borrowed = self.borrowed_totals(figures)?;
        let eval = self.evaluate(figures, borrowed)?;
        let totals = eval.own_totals();

        let ratios: Ratios = RatioName::ALL
            .iter()
            .map(|r| (*r, eval.ratio(*r)))
            .collect();

        let fields = self
            .template
            .rows
            .iter()
            .zip(eval.values.iter())
            .map(|(row, value)| PopulatedField {
                row_id: row.row_id.to_string(),
                label: row.label.to_string(),
                value: *value,
                category: row.category,
                sign: row.sign,
            })
            .collect::<Vec<_>>();

        debug!(
            "Populated {} with {} of {} rows non-null",
            self.template.template_id,
            fields.iter().filter(|f| f.value.is_some()).count(),
            fields.len()
        );

        Ok(PopulatedTemplate {
            fields,
            totals,
            ratios,
        })
    }

    /// Capital totals needed for ratios that this template does not build.
    fn borrowed_totals(&self, figures: &ScenarioFigures) -> Result<Totals> {
        let mut borrowed = BTreeMap::new();

        for ratio in RatioName::ALL {
            let total = ratio.numerator();
            if self.template.defines_total(total) || borrowed.contains_key(&total) {
                continue;
            }
            let Some(source) = template_defining(total) else {
                continue;
            };
            if source.template_id == self.template.template_id {
                continue;
            }

            debug!(
                "{} borrows {:?} from {}",
                self.template.template_id, total, source.template_id
            );
            let source_eval = TemplateEngine::new(source).evaluate(figures, Totals::new())?;
            for (name, value) in source_eval.own_totals() {
                borrowed.entry(name).or_insert(value);
            }
        }

        Ok(borrowed)
    }

    fn evaluate<'f>(
        &self,
        figures: &'f ScenarioFigures,
        borrowed: Totals,
    ) -> Result<Evaluation<'a, 'f>> {
        let order = self.evaluation_order()?;
        let mut eval = Evaluation {
            template: self.template,
            figures,
            values: vec![None; self.template.rows.len()],
            borrowed,
        };
        for idx in order {
            eval.values[idx] = eval.row_value(idx);
        }
        Ok(eval)
    }
}

impl Evaluation<'_, '_> {
    /// Totals accumulated by the template itself.
    fn own_totals(&self) -> Totals {
        self.template
            .totals()
            .into_iter()
            .map(|t| (t, self.total(t)))
            .collect()
    }

    fn row_value(&self, idx: usize) -> Option<f64> {
        match self.template.rows[idx].formula {
            RowFormula::Sum(concepts) => self.figures.sum_present(concepts),
            RowFormula::Total(total) => self.total(total),
            RowFormula::Ratio(ratio) => self.ratio(ratio),
            RowFormula::Headroom { ratio, minimum } => {
                self.ratio(ratio).map(|r| round_one_decimal(r - minimum))
            }
        }
    }

    /// Signed sum of the non-null contributing rows; `None` if every
    /// contributor is null.
    fn total(&self, total: TotalName) -> Option<f64> {
        if !self.template.defines_total(total) {
            return self.borrowed.get(&total).copied().flatten();
        }

        self.template
            .contributors(total)
            .filter_map(|idx| {
                let row = &self.template.rows[idx];
                self.values[idx].map(|v| row.sign.apply(v))
            })
            .fold(None, |acc, v| Some(acc.unwrap_or(0.0) + v))
    }

    /// The template's own risk exposure total, or the scenario's RWA figure.
    fn risk_exposure(&self) -> Option<f64> {
        let own = if self.template.defines_total(TotalName::TotalRiskExposure) {
            self.total(TotalName::TotalRiskExposure)
        } else {
            None
        };
        own.or_else(|| self.figures.get(Concept::RiskWeightedAssets))
    }

    fn ratio(&self, ratio: RatioName) -> Option<f64> {
        capital_ratio(self.total(ratio.numerator()), self.risk_exposure())
    }
}

/// `capital / exposure * 100` to one decimal place; `None` when either side
/// is missing or the exposure is zero.
pub fn capital_ratio(capital: Option<f64>, exposure: Option<f64>) -> Option<f64> {
    match (capital, exposure) {
        (Some(c), Some(e)) if e != 0.0 => Some(round_one_decimal(c / e * 100.0)),
        _ => None,
    }
}

pub fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn populate(template: &TemplateDefinition, figures: &ScenarioFigures) -> Result<PopulatedTemplate> {
    TemplateEngine::new(template).populate(figures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Category, Sign, TemplateId};
    use crate::templates::{RowDefinition, CA1_OWN_FUNDS, CA2_CAPITAL_REQUIREMENTS};

    fn demo_figures() -> ScenarioFigures {
        ScenarioFigures::new()
            .with(Concept::ShareCapital, 500.0)
            .with(Concept::SharePremium, 200.0)
            .with(Concept::RetainedEarnings, 150.0)
            .with(Concept::IntangibleAssets, 30.0)
            .with(Concept::Tier2Instruments, 100.0)
            .with(Concept::RiskWeightedAssets, 4000.0)
    }

    fn field(populated: &PopulatedTemplate, row_id: &str) -> Option<f64> {
        populated
            .fields
            .iter()
            .find(|f| f.row_id == row_id)
            .and_then(|f| f.value)
    }

    #[test]
    fn test_demo_scenario_ca1() {
        let populated = populate(&CA1_OWN_FUNDS, &demo_figures()).unwrap();

        assert_eq!(populated.totals[&TotalName::Cet1], Some(820.0));
        assert_eq!(populated.totals[&TotalName::At1], None);
        assert_eq!(populated.totals[&TotalName::Tier1], Some(820.0));
        assert_eq!(populated.totals[&TotalName::Tier2], Some(100.0));
        assert_eq!(populated.totals[&TotalName::TotalOwnFunds], Some(920.0));

        assert_eq!(populated.ratios[&RatioName::Cet1Ratio], Some(20.5));
        assert_eq!(populated.ratios[&RatioName::Tier1Ratio], Some(20.5));
        assert_eq!(populated.ratios[&RatioName::TotalCapitalRatio], Some(23.0));

        assert_eq!(field(&populated, "090"), Some(30.0));
        assert_eq!(field(&populated, "200"), Some(820.0));
        assert_eq!(field(&populated, "400"), None);
        assert_eq!(field(&populated, "800"), Some(920.0));
    }

    #[test]
    fn test_fields_follow_declaration_order() {
        let populated = populate(&CA1_OWN_FUNDS, &demo_figures()).unwrap();
        let ids: Vec<_> = populated.fields.iter().map(|f| f.row_id.as_str()).collect();
        let declared: Vec<_> = CA1_OWN_FUNDS.rows.iter().map(|r| r.row_id).collect();
        assert_eq!(ids, declared);
    }

    #[test]
    fn test_absent_concepts_give_null_not_zero() {
        let figures = ScenarioFigures::new().with(Concept::ShareCapital, 100.0);
        let populated = populate(&CA1_OWN_FUNDS, &figures).unwrap();

        assert_eq!(field(&populated, "020"), None);
        assert_eq!(populated.totals[&TotalName::Cet1], Some(100.0));
        assert_eq!(populated.totals[&TotalName::Tier2], None);
        assert_eq!(populated.totals[&TotalName::TotalOwnFunds], Some(100.0));
    }

    #[test]
    fn test_explicit_zero_is_present() {
        let figures = ScenarioFigures::new().with(Concept::Goodwill, 0.0);
        let populated = populate(&CA1_OWN_FUNDS, &figures).unwrap();

        assert_eq!(field(&populated, "080"), Some(0.0));
        assert_eq!(populated.totals[&TotalName::Cet1], Some(0.0));
        assert_eq!(populated.totals[&TotalName::At1], None);
    }

    #[test]
    fn test_zero_or_missing_rwa_gives_null_ratios() {
        let without = demo_figures_without_rwa();
        let zero = demo_figures_without_rwa().with(Concept::RiskWeightedAssets, 0.0);

        for figures in [without, zero] {
            let populated = populate(&CA1_OWN_FUNDS, &figures).unwrap();
            assert!(populated.ratios.values().all(|r| r.is_none()));
        }
    }

    fn demo_figures_without_rwa() -> ScenarioFigures {
        ScenarioFigures::new()
            .with(Concept::ShareCapital, 500.0)
            .with(Concept::IntangibleAssets, 30.0)
    }

    #[test]
    fn test_empty_figures_give_all_null_fields() {
        for template in [&CA1_OWN_FUNDS, &CA2_CAPITAL_REQUIREMENTS] {
            let populated = populate(template, &ScenarioFigures::new()).unwrap();
            assert!(populated.fields.iter().all(|f| f.value.is_none()));
            assert!(populated.totals.values().all(|t| t.is_none()));
        }
    }

    #[test]
    fn test_populate_is_deterministic() {
        let first = populate(&CA1_OWN_FUNDS, &demo_figures()).unwrap();
        let second = populate(&CA1_OWN_FUNDS, &demo_figures()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_ca2_sums_risk_and_borrows_capital() {
        let figures = demo_figures()
            .with(Concept::CreditRiskSa, 3000.0)
            .with(Concept::OperationalRisk, 900.0)
            .with(Concept::CvaRisk, 100.0)
            .with(Concept::BufferRequirement, 3.5);
        let populated = populate(&CA2_CAPITAL_REQUIREMENTS, &figures).unwrap();

        assert_eq!(populated.totals[&TotalName::CreditRiskRwa], Some(3000.0));
        assert_eq!(populated.totals[&TotalName::MarketRiskRwa], None);
        assert_eq!(populated.totals[&TotalName::TotalRiskExposure], Some(4000.0));
        assert!(!populated.totals.contains_key(&TotalName::Cet1));

        assert_eq!(field(&populated, "600"), Some(20.5));
        assert_eq!(field(&populated, "620"), Some(23.0));
        assert_eq!(field(&populated, "630"), Some(3.5));
        assert_eq!(field(&populated, "640"), Some(16.0));
    }

    #[test]
    fn test_ca2_falls_back_to_scenario_rwa() {
        let populated = populate(&CA2_CAPITAL_REQUIREMENTS, &demo_figures()).unwrap();
        assert_eq!(populated.totals[&TotalName::TotalRiskExposure], None);
        assert_eq!(populated.ratios[&RatioName::Cet1Ratio], Some(20.5));
    }

    static REORDERED: TemplateDefinition = TemplateDefinition {
        id: TemplateId::Ca1,
        template_id: "TEST_REORDERED",
        name: "Totals declared before their inputs",
        rows: &[
            RowDefinition {
                row_id: "900",
                label: "Tier 1",
                category: Category::Tier1Total,
                sign: Sign::Total,
                formula: RowFormula::Total(TotalName::Tier1),
                contributes_to: &[],
            },
            RowDefinition {
                row_id: "950",
                label: "CET1 ratio",
                category: Category::Ratio,
                sign: Sign::Percent,
                formula: RowFormula::Ratio(RatioName::Cet1Ratio),
                contributes_to: &[],
            },
            RowDefinition {
                row_id: "200",
                label: "CET1",
                category: Category::Cet1Total,
                sign: Sign::Total,
                formula: RowFormula::Total(TotalName::Cet1),
                contributes_to: &[TotalName::Tier1],
            },
            RowDefinition {
                row_id: "010",
                label: "Share capital",
                category: Category::Cet1,
                sign: Sign::Plus,
                formula: RowFormula::Sum(&[Concept::ShareCapital]),
                contributes_to: &[TotalName::Cet1],
            },
            RowDefinition {
                row_id: "090",
                label: "(-) Intangibles",
                category: Category::Cet1Deduction,
                sign: Sign::Minus,
                formula: RowFormula::Sum(&[Concept::IntangibleAssets]),
                contributes_to: &[TotalName::Cet1],
            },
        ],
    };

    #[test]
    fn test_forward_references_are_evaluated_after_their_inputs() {
        let engine = TemplateEngine::new(&REORDERED);
        assert_eq!(engine.evaluation_order().unwrap(), vec![3, 4, 1, 2, 0]);

        let figures = ScenarioFigures::new()
            .with(Concept::ShareCapital, 500.0)
            .with(Concept::IntangibleAssets, 100.0)
            .with(Concept::RiskWeightedAssets, 1000.0);
        let populated = engine.populate(&figures).unwrap();

        assert_eq!(field(&populated, "900"), Some(400.0));
        assert_eq!(field(&populated, "950"), Some(40.0));
        assert_eq!(populated.fields[0].row_id, "900");
    }

    static CYCLIC: TemplateDefinition = TemplateDefinition {
        id: TemplateId::Ca1,
        template_id: "TEST_CYCLIC",
        name: "Total feeding itself",
        rows: &[RowDefinition {
            row_id: "200",
            label: "CET1",
            category: Category::Cet1Total,
            sign: Sign::Total,
            formula: RowFormula::Total(TotalName::Cet1),
            contributes_to: &[TotalName::Cet1],
        }],
    };

    #[test]
    fn test_cycles_are_reported() {
        let result = populate(&CYCLIC, &ScenarioFigures::new());
        assert!(matches!(result, Err(CorepError::TemplateCycle { .. })));
    }

    #[test]
    fn test_capital_ratio_edge_cases() {
        assert_eq!(capital_ratio(Some(820.0), Some(4000.0)), Some(20.5));
        assert_eq!(capital_ratio(Some(820.0), Some(0.0)), None);
        assert_eq!(capital_ratio(None, Some(4000.0)), None);
        assert_eq!(capital_ratio(Some(1.0), Some(3.0)), Some(33.3));
    }
}
