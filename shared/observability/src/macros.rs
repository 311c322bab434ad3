//! Logging macros for the recurring patterns of the pipeline: timed stages,
//! store writes, collaborator calls and batch retries.

/// Run a block and log how long it took under the "timing" target.
#[macro_export]
macro_rules! log_timed {
    ($name:expr, $block:expr) => {{
        let start = std::time::Instant::now();
        let result = $block;
        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(target: "timing", operation = $name, duration_ms = duration_ms, "operation completed");
        result
    }};
}

/// Log a graph store write
#[macro_export]
macro_rules! log_db {
    ($operation:expr, $label:expr) => {
        tracing::debug!(target: "graph_store", operation = $operation, label = $label, "store operation");
    };
    ($operation:expr, $label:expr, $key:expr) => {
        tracing::debug!(target: "graph_store", operation = $operation, label = $label, key = ?$key, "store operation");
    };
    ($operation:expr, $label:expr, $key:expr, $duration_ms:expr) => {
        tracing::debug!(target: "graph_store", operation = $operation, label = $label, key = ?$key, duration_ms = $duration_ms, "store operation");
    };
}

/// Log a call to an external evidence collaborator
#[macro_export]
macro_rules! log_external_call {
    ($service:expr, $query:expr) => {
        tracing::debug!(target: "external", service = $service, query = $query, "calling external collaborator");
    };
    ($service:expr, $query:expr, $duration_ms:expr, $status:expr) => {
        tracing::debug!(target: "external", service = $service, query = $query, duration_ms = $duration_ms, status = $status, "external call completed");
    };
}

/// Log a batch retry pass
#[macro_export]
macro_rules! log_retry {
    ($operation:expr, $attempt:expr, $max_attempts:expr) => {
        tracing::warn!(target: "retry", operation = $operation, attempt = $attempt, max_attempts = $max_attempts, "retrying operation");
    };
    ($operation:expr, $attempt:expr, $max_attempts:expr, $pending:expr) => {
        tracing::warn!(target: "retry", operation = $operation, attempt = $attempt, max_attempts = $max_attempts, pending = $pending, "retrying failed lookups");
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_macros_compile() {
        let value = log_timed!("noop", 1 + 1);
        assert_eq!(value, 2);

        log_db!("MERGE", "Biomarker");
        log_db!("MERGE", "Biomarker", "biomarker:brca1");
        log_db!("MERGE", "Biomarker", "biomarker:brca1", 4u64);

        log_external_call!("pubmed", "BRCA1[Title/Abstract]");
        log_external_call!("pubmed", "BRCA1[Title/Abstract]", 12u64, "ok");

        log_retry!("literature_count", 2, 3);
        log_retry!("literature_count", 2, 3, 7usize);
    }
}
