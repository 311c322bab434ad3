use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

use crate::errors::{GraphError, GraphResult};

use super::{DeviceRegistry, RegistryRecord};

lazy_static! {
    static ref LAMP_WORD: Regex = Regex::new(r"\blamp\b").unwrap();
    static ref PCR_WORD: Regex = Regex::new(r"\bpcr\b").unwrap();
}

/// Structured field carrying the keyword that decided the method
pub const METHOD_KEYWORD: &str = "method_keyword";

pub const LAMP: &str = "LAMP";
pub const PCR: &str = "PCR";
pub const FLUORESCENCE: &str = "Fluorescence";
pub const IMMUNOASSAY: &str = "Immunoassay";
pub const DIPSTICK: &str = "Dipstick";
pub const COLORIMETRIC: &str = "Colorimetric";
pub const BIOSENSOR: &str = "Biosensor";
pub const ANALYZER: &str = "Analyzer";

/// Ordered substring rules; the first hit wins
const KEYWORD_RULES: &[(&str, &[&str])] = &[
    (PCR, &["polymerase chain reaction"]),
    (FLUORESCENCE, &["fluorescen"]),
    (
        IMMUNOASSAY,
        &["immunoassay", "radioimmunoassay", "immuno assay", "elisa", "ihc", "immunohisto"],
    ),
    (DIPSTICK, &["dipstick", "lateral flow", "test strip", "strip test"]),
    (COLORIMETRIC, &["colorimetric", "colourimetric"]),
    (BIOSENSOR, &["biosensor"]),
];

/// Infer the detection method category of a device from its name.
/// Returns the method and the keyword that matched.
pub fn classify_method(device_name: &str) -> (&'static str, &'static str) {
    let name = device_name.to_lowercase();

    if LAMP_WORD.is_match(&name) {
        return (LAMP, "lamp");
    }
    if PCR_WORD.is_match(&name) {
        return (PCR, "pcr");
    }
    for (method, keywords) in KEYWORD_RULES {
        if let Some(keyword) = keywords.iter().find(|k| name.contains(**k)) {
            return (*method, *keyword);
        }
    }
    (ANALYZER, "")
}

/// Registry stand-in that classifies devices by keywords in their name
#[derive(Debug, Default, Clone)]
pub struct KeywordDeviceRegistry;

#[async_trait]
impl DeviceRegistry for KeywordDeviceRegistry {
    fn name(&self) -> &str {
        "keyword_registry"
    }

    async fn lookup(&self, raw: &str) -> GraphResult<RegistryRecord> {
        let (method, keyword) = classify_method(raw);
        debug!(device = raw, method, "[Registry] Device classified");

        let mut structured = BTreeMap::new();
        if !keyword.is_empty() {
            structured.insert(METHOD_KEYWORD.to_string(), keyword.to_string());
        }
        Ok(RegistryRecord {
            structured,
            method: Some(method.to_string()),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RuleRow {
    biomarker_name: String,
    match_tokens: String,
}

/// "A device whose name contains all of these tokens measures this biomarker"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceLinkRule {
    /// 1-based row of the rule file
    pub rule_id: usize,
    pub biomarker_name: String,
    /// Lowercase tokens
    pub tokens: BTreeSet<String>,
}

impl DeviceLinkRule {
    pub fn matches(&self, device_name: &str) -> bool {
        let name = device_name.to_lowercase();
        self.tokens.iter().all(|t| name.contains(t.as_str()))
    }

    pub fn load(path: &Path) -> GraphResult<Vec<DeviceLinkRule>> {
        let file = std::fs::File::open(path).map_err(|e| {
            GraphError::Config(format!("cannot open device rules {}: {}", path.display(), e))
        })?;
        let rules = Self::from_reader(file)?;
        info!(path = %path.display(), rules = rules.len(), "📏 [Registry] Device link rules loaded");
        Ok(rules)
    }

    pub fn from_reader<R: Read>(input: R) -> GraphResult<Vec<DeviceLinkRule>> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(input);

        let mut rules = Vec::new();
        for (index, row) in reader.deserialize::<RuleRow>().enumerate() {
            let row = row?;
            let tokens: BTreeSet<String> = row
                .match_tokens
                .split(';')
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect();
            if row.biomarker_name.is_empty() || tokens.is_empty() {
                continue;
            }
            rules.push(DeviceLinkRule {
                rule_id: index + 1,
                biomarker_name: row.biomarker_name,
                tokens,
            });
        }
        Ok(rules)
    }
}
