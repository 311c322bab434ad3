//! Read side of the graph: ranked search, bounded expansion and subgraph
//! extraction.

pub mod expansion;
pub mod relevance;
pub mod search;
pub mod subgraph;

pub use expansion::expand;
pub use relevance::{score_match, SearchField};
pub use search::QueryEngine;
pub use subgraph::{to_dot, SubgraphExtractor};
