//! Local extraction of scenario figures from free text.
//!
//! Used when the language model is unavailable or returns nothing usable.
//! Amounts are paired with the nearest concept keyword; everything is
//! normalized to millions.

use crate::schema::{Concept, ScenarioFigures};
use log::debug;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Longest gap, in characters, allowed between a keyword and its amount.
const MAX_GAP: usize = 40;
const CLAUSE_PENALTY: usize = 30;
const UNQUALIFIED_PENALTY: usize = 20;

/// Words that precede numbers which are identifiers rather than amounts.
const LABEL_WORDS: &[&str] = &["tier", "article", "art", "pillar", "basel", "step", "row"];

const MONTHS: &[&str] = &[
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december", "jan", "feb", "mar", "apr", "jun", "jul", "aug", "sep",
    "sept", "oct", "nov", "dec",
];

const KEYWORDS: &[(&str, Concept)] = &[
    ("ordinary share capital", Concept::ShareCapital),
    ("share capital", Concept::ShareCapital),
    ("ordinary shares", Concept::ShareCapital),
    ("paid-up capital", Concept::ShareCapital),
    ("cet1 instruments", Concept::ShareCapital),
    ("share premium", Concept::SharePremium),
    ("retained earnings", Concept::RetainedEarnings),
    ("retained profits", Concept::RetainedEarnings),
    ("accumulated other comprehensive income", Concept::AccumulatedOci),
    ("other comprehensive income", Concept::AccumulatedOci),
    ("aoci", Concept::AccumulatedOci),
    ("other reserves", Concept::OtherReserves),
    ("reserves", Concept::OtherReserves),
    ("general banking risk", Concept::GeneralBankingRiskFunds),
    ("prudential filters", Concept::PrudentialFilters),
    ("prudential filter", Concept::PrudentialFilters),
    ("goodwill", Concept::Goodwill),
    ("intangible assets", Concept::IntangibleAssets),
    ("intangibles", Concept::IntangibleAssets),
    ("intangible", Concept::IntangibleAssets),
    ("deferred tax assets", Concept::DeferredTaxAssets),
    ("deferred tax", Concept::DeferredTaxAssets),
    ("dta", Concept::DeferredTaxAssets),
    ("defined benefit pension", Concept::PensionFundAssets),
    ("pension fund assets", Concept::PensionFundAssets),
    ("pension assets", Concept::PensionFundAssets),
    ("holdings of own cet1", Concept::OwnCet1Holdings),
    ("treasury shares", Concept::OwnCet1Holdings),
    ("at1 share premium", Concept::At1SharePremium),
    ("additional tier 1 instruments", Concept::At1Instruments),
    ("additional tier 1", Concept::At1Instruments),
    ("at1 instruments", Concept::At1Instruments),
    ("contingent convertible", Concept::At1Instruments),
    ("cocos", Concept::At1Instruments),
    ("at1", Concept::At1Instruments),
    ("holdings of own at1", Concept::OwnAt1Holdings),
    ("tier 2 share premium", Concept::Tier2SharePremium),
    ("tier 2 instruments", Concept::Tier2Instruments),
    ("tier 2 debt", Concept::Tier2Instruments),
    ("tier 2", Concept::Tier2Instruments),
    ("tier2", Concept::Tier2Instruments),
    ("subordinated debt", Concept::Tier2Instruments),
    ("subordinated loans", Concept::Tier2Instruments),
    ("credit risk adjustments", Concept::CreditRiskAdjustments),
    ("general provisions", Concept::CreditRiskAdjustments),
    ("holdings of own tier 2", Concept::OwnTier2Holdings),
    ("risk-weighted assets", Concept::RiskWeightedAssets),
    ("risk weighted assets", Concept::RiskWeightedAssets),
    ("total risk exposure", Concept::RiskWeightedAssets),
    ("rwas", Concept::RiskWeightedAssets),
    ("rwa", Concept::RiskWeightedAssets),
    ("standardised approach", Concept::CreditRiskSa),
    ("standardized approach", Concept::CreditRiskSa),
    ("internal ratings", Concept::CreditRiskIrb),
    ("irb", Concept::CreditRiskIrb),
    ("securitisation", Concept::Securitisation),
    ("securitization", Concept::Securitisation),
    ("default fund", Concept::CcpDefaultFund),
    ("position risk", Concept::PositionRisk),
    ("foreign exchange risk", Concept::FxRisk),
    ("fx risk", Concept::FxRisk),
    ("commodities risk", Concept::CommodityRisk),
    ("commodity risk", Concept::CommodityRisk),
    ("credit valuation adjustment", Concept::CvaRisk),
    ("cva", Concept::CvaRisk),
    ("operational risk", Concept::OperationalRisk),
    ("combined buffer requirement", Concept::BufferRequirement),
    ("buffer requirement", Concept::BufferRequirement),
    ("combined buffer", Concept::BufferRequirement),
];

static AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:([£$€])\s*)?\b(\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?)(?:\s*(billion|bn|million|mn|m|b|thousand|k)\b|\s*(%|per\s?cent\b))?",
    )
    .expect("amount pattern is valid")
});

static KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    let mut phrases: Vec<&str> = KEYWORDS.iter().map(|(k, _)| *k).collect();
    phrases.sort_by(|a, b| b.len().cmp(&a.len()));
    let alternation = phrases
        .iter()
        .map(|p| regex::escape(p))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternation)).expect("keyword pattern is valid")
});

#[derive(Debug, Clone, Copy)]
struct KeywordHit {
    start: usize,
    end: usize,
    concept: Concept,
}

#[derive(Debug, Clone, Copy)]
struct AmountHit {
    start: usize,
    end: usize,
    value: f64,
    /// Carries a currency symbol or scale word.
    qualified: bool,
    percent: bool,
}

impl AmountHit {
    /// Currency, scale and percent amounts are paired before bare numbers.
    fn tier(&self) -> usize {
        usize::from(!self.qualified && !self.percent)
    }
}

fn keyword_concept(matched: &str) -> Option<Concept> {
    let lower = matched.to_lowercase();
    KEYWORDS
        .iter()
        .find(|(k, _)| *k == lower)
        .map(|(_, c)| *c)
}

fn find_keywords(text: &str) -> Vec<KeywordHit> {
    KEYWORD_RE
        .find_iter(text)
        .filter_map(|m| {
            keyword_concept(m.as_str()).map(|concept| KeywordHit {
                start: m.start(),
                end: m.end(),
                concept,
            })
        })
        .collect()
}

fn word_before(text: &str, start: usize) -> String {
    let word: String = text[..start]
        .trim_end()
        .chars()
        .rev()
        .take_while(|c| c.is_alphabetic() || *c == '.')
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    word.trim_end_matches('.').to_lowercase()
}

fn word_after(text: &str, end: usize) -> String {
    text[end..]
        .trim_start()
        .chars()
        .take_while(|c| c.is_alphabetic())
        .collect::<String>()
        .to_lowercase()
}

fn preceded_by_label(text: &str, start: usize) -> bool {
    LABEL_WORDS.contains(&word_before(text, start).as_str())
}

/// Day of month next to a month name, or a calendar year.
fn is_date_part(text: &str, start: usize, end: usize) -> bool {
    let digits = &text[start..end];
    if digits.len() == 4 && digits.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(year) = digits.parse::<u32>() {
            if (1900..2100).contains(&year) {
                return true;
            }
        }
    }
    MONTHS.contains(&word_after(text, end).as_str())
        || MONTHS.contains(&word_before(text, start).as_str())
}

fn find_amounts(text: &str, keywords: &[KeywordHit]) -> Vec<AmountHit> {
    AMOUNT_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let number = caps.get(2)?;

            if keywords
                .iter()
                .any(|k| number.start() >= k.start && number.start() < k.end)
            {
                return None;
            }

            // "500kg" and "31st" are not amounts.
            if text[whole.end()..]
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric())
            {
                return None;
            }

            let currency = caps.get(1).is_some();
            let scale = caps.get(3).map(|m| m.as_str().to_lowercase());
            let percent = caps.get(4).is_some();

            if !currency
                && scale.is_none()
                && !percent
                && (preceded_by_label(text, number.start())
                    || is_date_part(text, number.start(), number.end()))
            {
                return None;
            }

            let raw: f64 = number.as_str().replace(',', "").parse().ok()?;
            let value = match scale.as_deref() {
                Some("billion") | Some("bn") | Some("b") => raw * 1000.0,
                Some("thousand") | Some("k") => raw / 1000.0,
                _ => raw,
            };

            Some(AmountHit {
                start: whole.start(),
                end: whole.end(),
                value,
                qualified: currency || scale.is_some(),
                percent,
            })
        })
        .collect()
}

/// Pairing cost, or `None` when the two cannot belong together.
fn pairing_cost(
    text: &str,
    keyword: &KeywordHit,
    amount: &AmountHit,
    keywords: &[KeywordHit],
) -> Option<usize> {
    if (keyword.concept == Concept::BufferRequirement) != amount.percent {
        return None;
    }

    let (gap_start, gap_end) = if amount.start >= keyword.end {
        (keyword.end, amount.start)
    } else if amount.end <= keyword.start {
        (amount.end, keyword.start)
    } else {
        return None;
    };

    let gap = &text[gap_start..gap_end];
    let length = gap.chars().count();
    if length > MAX_GAP {
        return None;
    }
    if keywords
        .iter()
        .any(|k| k.start >= gap_start && k.end <= gap_end)
    {
        return None;
    }

    let mut cost = length;
    if gap.contains([',', ';', '.', '\n']) {
        cost += CLAUSE_PENALTY;
    }
    if !amount.qualified && !amount.percent {
        cost += UNQUALIFIED_PENALTY;
    }
    Some(cost)
}

/// Extracts figures by pairing concept keywords with nearby amounts.
///
/// Pairs are claimed greedily, qualified amounts first and then cheapest
/// first; every keyword occurrence and every amount is used at most once,
/// and the first amount claimed for a concept wins.
pub fn parse_scenario_text(text: &str) -> ScenarioFigures {
    let keywords = find_keywords(text);
    let amounts = find_amounts(text, &keywords);

    let mut candidates: Vec<(usize, usize, usize, usize)> = Vec::new();
    for (ki, keyword) in keywords.iter().enumerate() {
        for (ai, amount) in amounts.iter().enumerate() {
            if let Some(cost) = pairing_cost(text, keyword, amount, &keywords) {
                candidates.push((amount.tier(), cost, ki, ai));
            }
        }
    }
    candidates.sort_unstable();

    let mut used_keywords = HashSet::new();
    let mut used_amounts = HashSet::new();
    let mut figures = ScenarioFigures::new();

    for (_, _, ki, ai) in candidates {
        let concept = keywords[ki].concept;
        if used_keywords.contains(&ki) || used_amounts.contains(&ai) || figures.contains(concept) {
            continue;
        }
        used_keywords.insert(ki);
        used_amounts.insert(ai);
        figures.insert(concept, amounts[ai].value);
    }

    debug!(
        "Pattern extraction found {} figure(s) from {} keyword(s) and {} amount(s)",
        figures.len(),
        keywords.len(),
        amounts.len()
    );

    figures
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) const DEMO_SCENARIO: &str = "A UK bank has share capital of £500 million, share \
        premium of £200m, retained earnings of £150m, intangible assets of £30m, Tier 2 \
        subordinated debt of £100m and risk-weighted assets of £4,000m.";

    #[test]
    fn test_simple_phrase() {
        let figures = parse_scenario_text("£500 million share capital");
        assert_eq!(figures.get(Concept::ShareCapital), Some(500.0));
        assert_eq!(figures.len(), 1);
    }

    #[test]
    fn test_demo_scenario() {
        let figures = parse_scenario_text(DEMO_SCENARIO);

        assert_eq!(figures.get(Concept::ShareCapital), Some(500.0));
        assert_eq!(figures.get(Concept::SharePremium), Some(200.0));
        assert_eq!(figures.get(Concept::RetainedEarnings), Some(150.0));
        assert_eq!(figures.get(Concept::IntangibleAssets), Some(30.0));
        assert_eq!(figures.get(Concept::Tier2Instruments), Some(100.0));
        assert_eq!(figures.get(Concept::RiskWeightedAssets), Some(4000.0));
        assert_eq!(figures.len(), 6);
    }

    #[test]
    fn test_scale_words() {
        let figures = parse_scenario_text("RWA of £4.2bn. Goodwill: 12 million. Reserves 75");
        assert_eq!(figures.get(Concept::RiskWeightedAssets), Some(4200.0));
        assert_eq!(figures.get(Concept::Goodwill), Some(12.0));
        assert_eq!(figures.get(Concept::OtherReserves), Some(75.0));
    }

    #[test]
    fn test_amount_before_keyword_in_list() {
        let figures = parse_scenario_text("£500m of share capital, £200m of share premium");
        assert_eq!(figures.get(Concept::ShareCapital), Some(500.0));
        assert_eq!(figures.get(Concept::SharePremium), Some(200.0));
    }

    #[test]
    fn test_percentages_only_feed_buffers() {
        let figures = parse_scenario_text(
            "CET1 ratio of 12.5% with a combined buffer requirement of 3.5% and RWA of £1,000m",
        );
        assert_eq!(figures.get(Concept::BufferRequirement), Some(3.5));
        assert_eq!(figures.get(Concept::RiskWeightedAssets), Some(1000.0));
        assert_eq!(figures.len(), 2);
    }

    #[test]
    fn test_identifiers_are_not_amounts() {
        let figures = parse_scenario_text("Under Article 36 goodwill of £15m is deducted");
        assert_eq!(figures.get(Concept::Goodwill), Some(15.0));
    }

    #[test]
    fn test_reporting_dates_are_not_amounts() {
        let figures = parse_scenario_text(
            "Share capital as at 31 December 2024 was £500m and RWA of £4,000m.",
        );
        assert_eq!(figures.get(Concept::ShareCapital), Some(500.0));
        assert_eq!(figures.get(Concept::RiskWeightedAssets), Some(4000.0));
        assert_eq!(figures.len(), 2);

        let figures = parse_scenario_text("Reserves at June 30 stood at 75");
        assert_eq!(figures.get(Concept::OtherReserves), Some(75.0));
    }

    #[test]
    fn test_qualified_amount_beats_nearer_bare_number() {
        let figures = parse_scenario_text("Goodwill across 3 subsidiaries totals £45m");
        assert_eq!(figures.get(Concept::Goodwill), Some(45.0));
    }

    #[test]
    fn test_thousands_scale_to_millions() {
        let figures = parse_scenario_text("Goodwill of £500k. Share capital of £250 thousand.");
        assert_eq!(figures.get(Concept::Goodwill), Some(0.5));
        assert_eq!(figures.get(Concept::ShareCapital), Some(0.25));

        let figures = parse_scenario_text("Goodwill of 500kg");
        assert!(figures.is_empty());
    }

    #[test]
    fn test_no_figures() {
        assert!(parse_scenario_text("The bank is well capitalised.").is_empty());
        assert!(parse_scenario_text("").is_empty());
    }
}
