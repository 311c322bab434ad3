pub mod edge_aggregator;
pub mod merge_rules;

pub use edge_aggregator::EdgeAggregator;
