use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::io::Read;
use std::path::Path;
use tracing::info;

use crate::entity_resolution::normalize_name;
use crate::errors::{GraphError, GraphResult};
use crate::models::parse_flag;

use super::{OntologyMatch, OntologyResolver};

#[derive(Debug, Deserialize)]
struct OntologyRow {
    doid: String,
    name: String,
    #[serde(default)]
    synonyms: String,
    #[serde(default)]
    parent_doids: String,
    #[serde(default)]
    is_cancer_like: String,
}

#[derive(Debug, Clone)]
struct OntologyTerm {
    id: String,
    name: String,
    synonyms: BTreeSet<String>,
    parent_ids: BTreeSet<String>,
    cancer_like: bool,
}

/// Disease ontology loaded from a DOID-style table
/// (`doid,name,synonyms,parent_doids,is_cancer_like`).
#[derive(Debug, Default)]
pub struct OntologyTable {
    terms: HashMap<String, OntologyTerm>,
    /// normalized name or synonym -> term ids
    by_name: HashMap<String, BTreeSet<String>>,
}

impl OntologyTable {
    pub fn from_path(path: &Path) -> GraphResult<Self> {
        let file = std::fs::File::open(path).map_err(|e| {
            GraphError::Config(format!("cannot open ontology table {}: {}", path.display(), e))
        })?;
        let table = Self::from_reader(file)?;
        info!(
            path = %path.display(),
            terms = table.len(),
            "📚 [Ontology] Table loaded"
        );
        Ok(table)
    }

    pub fn from_reader<R: Read>(input: R) -> GraphResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(input);

        let mut table = Self::default();
        for row in reader.deserialize::<OntologyRow>() {
            let row = row?;
            if row.doid.is_empty() || row.name.is_empty() {
                continue;
            }
            let synonyms = split_multi(&row.synonyms);
            let cancer_like = parse_flag(&row.is_cancer_like)
                .unwrap_or_else(|| looks_cancer_like(&row.name, &synonyms));

            table.insert(OntologyTerm {
                id: row.doid,
                name: row.name,
                synonyms,
                parent_ids: split_multi(&row.parent_doids),
                cancer_like,
            });
        }
        Ok(table)
    }

    fn insert(&mut self, term: OntologyTerm) {
        let mut names = vec![normalize_name(&term.name)];
        names.extend(term.synonyms.iter().map(|s| normalize_name(s)));
        for name in names {
            self.by_name.entry(name).or_default().insert(term.id.clone());
        }
        self.terms.insert(term.id.clone(), term);
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Exact code first, then a name or synonym that points at exactly one term
    pub fn lookup(&self, raw: &str) -> OntologyMatch {
        let raw = raw.trim();
        let term = self.terms.get(raw).or_else(|| {
            let ids = self.by_name.get(&normalize_name(raw))?;
            if ids.len() == 1 {
                ids.iter().next().and_then(|id| self.terms.get(id))
            } else {
                None
            }
        });

        match term {
            Some(term) => OntologyMatch {
                canonical_id: Some(term.id.clone()),
                name: Some(term.name.clone()),
                synonyms: term.synonyms.clone(),
                parent_ids: term.parent_ids.clone(),
                category_flag: Some(term.cancer_like),
            },
            None => OntologyMatch::default(),
        }
    }
}

#[async_trait]
impl OntologyResolver for OntologyTable {
    fn name(&self) -> &str {
        "ontology_table"
    }

    async fn resolve(&self, raw: &str) -> GraphResult<OntologyMatch> {
        Ok(self.lookup(raw))
    }
}

fn split_multi(raw: &str) -> BTreeSet<String> {
    raw.split(&[';', '|'][..])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn looks_cancer_like(name: &str, synonyms: &BTreeSet<String>) -> bool {
    std::iter::once(name)
        .chain(synonyms.iter().map(String::as_str))
        .any(|n| {
            let lower = n.to_lowercase();
            lower.contains("cancer") || lower.contains("carcinoma")
        })
}
