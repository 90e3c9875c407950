use crate::knowledge_base::{Passage, PASSAGES};
use crate::schema::TemplateId;
use log::debug;

/// Keyword retriever over a fixed passage store.
#[derive(Debug, Clone, Copy)]
pub struct Retriever {
    passages: &'static [Passage],
}

impl Default for Retriever {
    fn default() -> Self {
        Self::new(PASSAGES)
    }
}

impl Retriever {
    pub fn new(passages: &'static [Passage]) -> Self {
        Self { passages }
    }

    /// Number of tags of `passage` matched by the query.
    ///
    /// A tag matches when it occurs in the query as a whole phrase (a single
    /// token for one-word tags), compared case-insensitively.
    pub fn score(passage: &Passage, query: &str) -> usize {
        let query_lower = query.to_lowercase();

        passage
            .keywords
            .iter()
            .filter(|keyword| contains_phrase(&query_lower, &keyword.to_lowercase()))
            .count()
    }

    /// Highest-scoring passages first, at most `top_k`, ties in store order.
    /// Passages with no matching tag are never returned.
    pub fn retrieve(&self, query: &str, top_k: usize) -> Vec<&'static Passage> {
        let mut scored: Vec<(usize, usize)> = self
            .passages
            .iter()
            .enumerate()
            .map(|(idx, passage)| (Self::score(passage, query), idx))
            .filter(|(score, _)| *score > 0)
            .collect();

        // Stable sort keeps declaration order among equal scores.
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        let passages = self.passages;
        let selected: Vec<&'static Passage> = scored
            .into_iter()
            .take(top_k)
            .map(|(_, idx)| &passages[idx])
            .collect();

        debug!(
            "Retrieved {} passage(s) for query: {:?}",
            selected.len(),
            selected.iter().map(|p| p.id).collect::<Vec<_>>()
        );

        selected
    }

    /// Reference material for populating a template: every passage tagged with
    /// the template code, followed by its instructions and the validation rules.
    pub fn for_template(&self, template: TemplateId) -> Vec<&'static Passage> {
        let code = template.code();
        let mut selected: Vec<&'static Passage> = self
            .passages
            .iter()
            .filter(|p| {
                p.category.eq_ignore_ascii_case(code)
                    || p.keywords.iter().any(|k| k.eq_ignore_ascii_case(code))
            })
            .collect();

        let always: &[&str] = match template {
            TemplateId::Ca1 => &["COREP_CA1", "COREP_VALIDATION"],
            TemplateId::Ca2 => &["COREP_CA2", "CRR_ART_92", "COREP_VALIDATION"],
        };

        for id in always {
            if selected.iter().any(|p| p.id == *id) {
                continue;
            }
            if let Some(passage) = self.passages.iter().find(|p| p.id == *id) {
                selected.push(passage);
            }
        }

        selected
    }
}

/// Substring match that refuses to split words, so "rwa" does not match "forward".
fn contains_phrase(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }

    haystack.match_indices(needle).any(|(start, _)| {
        let end = start + needle.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = haystack[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        before_ok && after_ok
    })
}

/// Formats passages as markdown sections for a prompt.
pub fn format_context(passages: &[&Passage]) -> String {
    passages
        .iter()
        .map(|p| format!("### {}\n{}", p.title, p.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmatched_query_returns_nothing() {
        let retriever = Retriever::default();
        assert!(retriever.retrieve("weather forecast for tomorrow", 3).is_empty());
    }

    #[test]
    fn test_ranking_prefers_more_tag_matches() {
        let retriever = Retriever::default();
        let results = retriever.retrieve("How are goodwill and intangible assets deducted?", 3);
        assert_eq!(results.first().map(|p| p.id), Some("CRR_ART_36"));
    }

    #[test]
    fn test_ties_keep_declaration_order() {
        let retriever = Retriever::default();
        // "conditions" is a tag of Articles 28, 52 and 63 only.
        let ids: Vec<_> = retriever
            .retrieve("conditions", 5)
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec!["CRR_ART_28", "CRR_ART_52", "CRR_ART_63"]);
    }

    #[test]
    fn test_top_k_limits_results() {
        let retriever = Retriever::default();
        assert_eq!(retriever.retrieve("CET1 capital instruments", 2).len(), 2);
        assert!(retriever.retrieve("CET1", 0).is_empty());
    }

    #[test]
    fn test_token_match_is_case_insensitive() {
        let retriever = Retriever::default();
        let ids: Vec<_> = retriever.retrieve("ccb", 3).iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["CRR_ART_92A"]);
    }

    #[test]
    fn test_tags_do_not_match_inside_words() {
        let retriever = Retriever::default();
        assert!(retriever.retrieve("a forward looking statement", 3).is_empty());
    }

    #[test]
    fn test_template_context_includes_instructions() {
        let retriever = Retriever::default();
        let ca1: Vec<_> = retriever.for_template(TemplateId::Ca1).iter().map(|p| p.id).collect();
        assert_eq!(ca1, vec!["COREP_CA1", "COREP_VALIDATION"]);

        let ca2: Vec<_> = retriever.for_template(TemplateId::Ca2).iter().map(|p| p.id).collect();
        assert_eq!(ca2, vec!["COREP_CA2", "CRR_ART_92", "COREP_VALIDATION"]);
    }
}
