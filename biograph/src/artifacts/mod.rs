//! Human-inspectable stage artifacts written between pipeline stages.
//!
//! Multi-valued fields are sets in memory and only become delimited strings
//! here, at the file boundary.

pub mod csv_store;

pub use csv_store::{ArtifactStore, CANDIDATES_FILE, EDGES_FILE, ENTITIES_FILE, REPORT_FILE, REVIEW_FILE};

use std::collections::BTreeSet;

/// Separator of multi-valued cells
pub const LIST_SEPARATOR: &str = "; ";

pub fn join_set(values: &BTreeSet<String>) -> String {
    values
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(LIST_SEPARATOR)
}

pub fn split_set(cell: &str) -> BTreeSet<String> {
    cell.split(LIST_SEPARATOR.trim())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}
