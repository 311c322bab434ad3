pub mod matchers;
pub mod resolver;

pub use matchers::{is_ontology_code, normalize_name};
pub use resolver::EntityResolver;
