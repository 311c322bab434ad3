use serde::{Deserialize, Serialize};
use strsim::jaro_winkler;

use crate::entity_resolution::normalize_name;

/// Which text of a node a search term is matched against
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchField {
    Name,
    Aliases,
    #[default]
    NameOrAliases,
}

impl SearchField {
    fn names(&self) -> bool {
        matches!(self, SearchField::Name | SearchField::NameOrAliases)
    }

    fn aliases(&self) -> bool {
        matches!(self, SearchField::Aliases | SearchField::NameOrAliases)
    }
}

const EXACT_NAME: f64 = 1.0;
const EXACT_ALIAS: f64 = 0.9;
const PREFIX_NAME: f64 = 0.8;
const PREFIX_ALIAS: f64 = 0.7;
const SUBSTRING_NAME: f64 = 0.6;
const SUBSTRING_ALIAS: f64 = 0.5;
/// Weight of the string-similarity component inside a tier
const SIMILARITY_WEIGHT: f64 = 0.1;

/// Case-insensitive relevance of a node for a search term, `None` when the
/// term is not a substring of the name or any alias.
///
/// Exact matches rank above prefix matches above substring matches, names
/// above aliases; Jaro-Winkler similarity to the name orders hits inside a
/// tier.
pub fn score_match<'a, I>(query: &str, field: SearchField, name: &str, aliases: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a String>,
{
    let query = normalize_name(query);
    if query.is_empty() {
        return None;
    }
    let name = normalize_name(name);

    let mut tier: Option<f64> = None;
    let mut raise = |score: f64| {
        if tier.map_or(true, |t| score > t) {
            tier = Some(score);
        }
    };

    if field.names() {
        if name == query {
            raise(EXACT_NAME);
        } else if name.starts_with(&query) {
            raise(PREFIX_NAME);
        } else if name.contains(&query) {
            raise(SUBSTRING_NAME);
        }
    }

    if field.aliases() {
        for alias in aliases {
            let alias = normalize_name(alias);
            if alias == query {
                raise(EXACT_ALIAS);
            } else if alias.starts_with(&query) {
                raise(PREFIX_ALIAS);
            } else if alias.contains(&query) {
                raise(SUBSTRING_ALIAS);
            }
        }
    }

    tier.map(|t| round(t + SIMILARITY_WEIGHT * jaro_winkler(&query, &name)))
}

/// Cypher expression ranking node `n` against `$q` by the tiers of
/// [`score_match`], 0 best. Stores that pre-select candidates order by it so
/// the pool they hand to `score_match` keeps the strongest hits.
pub fn cypher_tier(field: SearchField) -> String {
    const NAME: &str = "toLower(n.name)";
    const ANY_ALIAS: &str = "any(a IN coalesce(n.aliases, []) WHERE toLower(a)";

    let mut cases = Vec::new();
    for op in ["=", "STARTS WITH", "CONTAINS"] {
        if field.names() {
            cases.push(format!("{} {} $q", NAME, op));
        }
        if field.aliases() {
            cases.push(format!("{} {} $q)", ANY_ALIAS, op));
        }
    }
    let whens: Vec<String> = cases
        .iter()
        .enumerate()
        .map(|(rank, condition)| format!("WHEN {} THEN {}", condition, rank))
        .collect();
    format!("CASE {} ELSE {} END", whens.join(" "), cases.len())
}

fn round(score: f64) -> f64 {
    (score * 10_000.0).round() / 10_000.0
}
