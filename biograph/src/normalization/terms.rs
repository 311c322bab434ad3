use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref GENE_LIKE: Regex = Regex::new(r"^[A-Z0-9\-]+$").unwrap();
    static ref NOT_WORD_OR_SPACE: Regex = Regex::new(r"[^A-Za-z0-9\s]").unwrap();
    static ref NOT_WORD_SPACE_OR_HYPHEN: Regex = Regex::new(r"[^A-Za-z0-9\s\-]").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Turns raw biomarker / disease names into literature search terms.
///
/// Term extraction is lossy, so it lives behind this trait and each source
/// picks a strategy in its configuration.
pub trait TermStrategy: Send + Sync {
    fn biomarker_term(&self, raw: &str) -> String;
    fn disease_term(&self, raw: &str) -> String;
}

/// Strategy names accepted in source configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TermStrategyKind {
    #[default]
    GeneSymbol,
    Verbatim,
}

impl TermStrategyKind {
    pub fn strategy(&self) -> &'static dyn TermStrategy {
        match self {
            TermStrategyKind::GeneSymbol => &GeneSymbolTerms,
            TermStrategyKind::Verbatim => &VerbatimTerms,
        }
    }
}

/// "EZH2 (A692V,Y646C)" -> "EZH2", "ERBB2 amplification" -> "ERBB2";
/// disease names lose parentheticals and punctuation.
pub struct GeneSymbolTerms;

impl TermStrategy for GeneSymbolTerms {
    fn biomarker_term(&self, raw: &str) -> String {
        let base = raw.split('(').next().unwrap_or_default().trim();
        let first_token = base.split_whitespace().next().unwrap_or_default();
        if GENE_LIKE.is_match(first_token) {
            return first_token.to_string();
        }

        let stripped = NOT_WORD_OR_SPACE.replace_all(base, " ");
        let phrase = stripped.split_whitespace().take(4).collect::<Vec<_>>().join(" ");
        if phrase.is_empty() {
            first_token.to_string()
        } else {
            phrase
        }
    }

    fn disease_term(&self, raw: &str) -> String {
        let text = raw.split(';').next().unwrap_or_default();
        let text = text.split('(').next().unwrap_or_default();
        let text = NOT_WORD_SPACE_OR_HYPHEN.replace_all(text, " ");
        WHITESPACE.replace_all(&text, " ").trim().to_string()
    }
}

/// Quotes removed and whitespace collapsed, nothing else.
pub struct VerbatimTerms;

impl VerbatimTerms {
    fn clean(raw: &str) -> String {
        raw.replace(&['"', '\''][..], " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl TermStrategy for VerbatimTerms {
    fn biomarker_term(&self, raw: &str) -> String {
        Self::clean(raw)
    }

    fn disease_term(&self, raw: &str) -> String {
        Self::clean(raw)
    }
}

/// PubMed query descriptor for a co-mention count
pub fn literature_query(biomarker_term: &str, disease_term: &str) -> String {
    if disease_term.trim().is_empty() {
        format!("{}[Title/Abstract]", biomarker_term)
    } else {
        format!(
            "{}[Title/Abstract] AND {}[Title/Abstract]",
            biomarker_term, disease_term
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gene_symbol_biomarker_terms() {
        let s = GeneSymbolTerms;
        assert_eq!(s.biomarker_term("EZH2 (A692V,Y646C,Y646F)"), "EZH2");
        assert_eq!(s.biomarker_term("ERBB2 amplification"), "ERBB2");
        assert_eq!(s.biomarker_term("Urine albumin-to-creatinine ratio, spot"), "Urine albumin to creatinine");
        assert_eq!(s.biomarker_term("BRCA1"), "BRCA1");
    }

    #[test]
    fn test_gene_symbol_disease_terms() {
        let s = GeneSymbolTerms;
        assert_eq!(s.disease_term("Follicular lymphoma (FL); other"), "Follicular lymphoma");
        assert_eq!(s.disease_term("Non-small cell lung carcinoma!"), "Non-small cell lung carcinoma");
    }

    #[test]
    fn test_verbatim_terms() {
        let s = VerbatimTerms;
        assert_eq!(s.biomarker_term("  \"HER2\"   status "), "HER2 status");
    }

    #[test]
    fn test_literature_query() {
        assert_eq!(
            literature_query("BRCA1", "Breast adenocarcinoma"),
            "BRCA1[Title/Abstract] AND Breast adenocarcinoma[Title/Abstract]"
        );
        assert_eq!(literature_query("BRCA1", " "), "BRCA1[Title/Abstract]");
    }

    #[test]
    fn test_strategy_kind_default() {
        assert_eq!(TermStrategyKind::default(), TermStrategyKind::GeneSymbol);
        assert_eq!(TermStrategyKind::Verbatim.strategy().disease_term("a  b"), "a b");
    }
}
