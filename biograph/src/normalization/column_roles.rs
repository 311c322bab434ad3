use crate::models::EntityType;

use super::source_config::RoleMapping;

/// Columns chosen for the id and name of one role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedColumns {
    pub id: Option<String>,
    pub name: String,
    /// At least one column came from the fallback heuristic
    pub inferred: bool,
}

/// Pick the id and name columns for a role.
///
/// Explicit configuration always wins. Otherwise: the first column named
/// "id" or ending in "_id"; the first column containing "name", "label" or
/// "desc"; else the first / second column. Returns `None` for a source
/// without columns.
pub fn resolve_columns(mapping: &RoleMapping, columns: &[String]) -> Option<ResolvedColumns> {
    if columns.is_empty() {
        return None;
    }

    let mut inferred = false;

    let id = match &mapping.id_field {
        Some(field) => Some(field.clone()),
        None => {
            inferred = true;
            Some(infer_id_column(columns))
        }
    };

    let name = match &mapping.name_field {
        Some(field) => field.clone(),
        None => {
            inferred = true;
            infer_name_column(columns)
        }
    };

    tracing::debug!(
        role = %mapping.role,
        entity_type = %mapping.entity_type,
        id_column = ?id,
        name_column = %name,
        inferred,
        "🧭 [Normalizer] Column roles resolved"
    );

    Some(ResolvedColumns { id, name, inferred })
}

fn infer_id_column(columns: &[String]) -> String {
    columns
        .iter()
        .find(|c| {
            let lower = c.trim().to_lowercase();
            lower == "id" || lower.ends_with("_id")
        })
        .unwrap_or(&columns[0])
        .clone()
}

fn infer_name_column(columns: &[String]) -> String {
    columns
        .iter()
        .find(|c| {
            let lower = c.to_lowercase();
            lower.contains("name") || lower.contains("label") || lower.contains("desc")
        })
        .or_else(|| columns.get(1))
        .unwrap_or(&columns[0])
        .clone()
}

/// Default role name for a heuristic-only mapping of a single-entity table
pub fn default_role(entity_type: EntityType) -> String {
    entity_type.as_str().to_string()
}
