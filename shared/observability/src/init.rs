//! Subscriber setup for the biograph binaries and the spans the build
//! pipeline runs under.
//!
//! `build-graph` runs are usually shipped to a log store, so they read
//! `LOG_FORMAT=json`; the query service defaults to pretty output. With
//! `LOG_STAGE_TIMINGS=true` the close of every build run span is logged with
//! its busy and idle time, which is how a slow rebuild gets attributed.

use std::env;
use std::fmt::Display;
use tracing::Span;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    registry::Registry,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Filter used when neither `RUST_LOG` nor the configured filter parses.
/// The bolt driver is chatty at info.
pub const DEFAULT_FILTER: &str = "info,neo4rs=warn";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    /// Anything other than "json" falls back to pretty output
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            LogFormat::Pretty => "pretty",
            LogFormat::Json => "json",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Binary the log lines belong to ("build-graph", "biograph-query")
    pub binary: String,
    pub format: LogFormat,
    /// `EnvFilter` directives
    pub filter: String,
    /// Log build run spans on close, with timings
    pub stage_timings: bool,
}

impl TracingConfig {
    /// Reads `LOG_FORMAT`, `RUST_LOG` and `LOG_STAGE_TIMINGS`
    pub fn for_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            format: env::var("LOG_FORMAT").map(|v| LogFormat::parse(&v)).unwrap_or_default(),
            filter: env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_FILTER.to_string()),
            stage_timings: env::var("LOG_STAGE_TIMINGS").map(|v| v == "true").unwrap_or(false),
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_stage_timings(mut self, enabled: bool) -> Self {
        self.stage_timings = enabled;
        self
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }

    fn output_layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let span_events = if self.stage_timings { FmtSpan::CLOSE } else { FmtSpan::NONE };
        match self.format {
            LogFormat::Json => fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .with_span_events(span_events)
                .with_target(true)
                .boxed(),
            LogFormat::Pretty => fmt::layer()
                .with_span_events(span_events)
                .with_target(true)
                .boxed(),
        }
    }
}

/// Install the global subscriber. Only the first call per process takes
/// effect; integration tests and both binaries may all reach this.
pub fn init_tracing(config: TracingConfig) {
    let installed = tracing_subscriber::registry()
        .with(config.output_layer())
        .with(config.env_filter())
        .try_init();

    if installed.is_ok() {
        tracing::info!(
            binary = %config.binary,
            format = config.format.as_str(),
            stage_timings = config.stage_timings,
            "📋 [Observability] Tracing initialized"
        );
    }
}

/// Span a whole build run executes in; every pipeline log line carries its
/// `run_id` once entered.
pub fn build_run_span(run_id: &impl Display) -> Span {
    tracing::info_span!("build_run", run_id = %run_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::subscriber::with_default;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse(" JSON "), LogFormat::Json);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("compact"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse(""), LogFormat::Pretty);
    }

    #[test]
    fn test_config_builder() {
        let config = TracingConfig::for_binary("build-graph")
            .with_filter("biograph=debug,info")
            .with_format(LogFormat::Json)
            .with_stage_timings(true);

        assert_eq!(config.binary, "build-graph");
        assert_eq!(config.filter, "biograph=debug,info");
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.stage_timings);
    }

    #[test]
    fn test_unparseable_filter_falls_back() {
        let config = TracingConfig::for_binary("build-graph").with_filter("biograph=[");
        assert_eq!(config.env_filter().to_string(), EnvFilter::new(DEFAULT_FILTER).to_string());
    }

    #[test]
    fn test_build_run_span_carries_run_id() {
        let subscriber = tracing_subscriber::registry();
        with_default(subscriber, || {
            let span = build_run_span(&"run-42");
            let meta = span.metadata().expect("span enabled under the registry");
            assert_eq!(meta.name(), "build_run");
            assert!(meta.fields().field("run_id").is_some());
        });
    }

    #[test]
    fn test_repeated_init_is_harmless() {
        init_tracing(TracingConfig::for_binary("first"));
        init_tracing(TracingConfig::for_binary("second").with_format(LogFormat::Json));
    }
}
