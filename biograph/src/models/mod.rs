pub mod candidate;
pub mod entity;
pub mod graph_query;
pub mod relationship;
pub mod resolution;

pub use candidate::*;
pub use entity::*;
pub use graph_query::*;
pub use relationship::*;
pub use resolution::*;
