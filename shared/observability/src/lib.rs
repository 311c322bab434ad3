//! biograph observability
//!
//! Tracing initialisation and the logging macros used by the build pipeline
//! and the query service.

pub mod init;
pub mod macros;

pub use init::*;

// Re-export tracing for convenience
pub use tracing::{debug, error, info, warn, trace, span, Level, Instrument};
pub use tracing::instrument;
