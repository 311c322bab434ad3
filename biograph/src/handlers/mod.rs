pub mod query_handler;

pub use query_handler::{
    devices_by_method, get_statistics, get_subgraph, health, method_summary, post_subgraph, search,
};
