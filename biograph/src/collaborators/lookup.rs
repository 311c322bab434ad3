use biograph_config::LookupConfig;
use biograph_observability::log_retry;
use futures::{stream, Future, StreamExt};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::time::Duration;
use tracing::{debug, warn};

use crate::errors::GraphResult;

use super::{OntologyMatch, RegistryRecord};

/// Values for which "nothing found" is a legitimate successful answer
pub trait LookupValue {
    fn is_empty(&self) -> bool;
}

impl LookupValue for u64 {
    fn is_empty(&self) -> bool {
        *self == 0
    }
}

impl LookupValue for OntologyMatch {
    fn is_empty(&self) -> bool {
        !self.is_resolved()
    }
}

impl LookupValue for RegistryRecord {
    fn is_empty(&self) -> bool {
        self.method.is_none() && self.structured.is_empty()
    }
}

/// Final state of one lookup after all retry passes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome<V> {
    Found(V),
    Failed { reason: String, attempts: u32 },
}

impl<V> LookupOutcome<V> {
    pub fn found(&self) -> Option<&V> {
        match self {
            LookupOutcome::Found(value) => Some(value),
            LookupOutcome::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, LookupOutcome::Failed { .. })
    }
}

/// Runs a set of fallible collaborator lookups with bounded concurrency and
/// retries the failures as a batch. A lookup that still fails after the
/// last pass is reported, never raised.
#[derive(Debug, Clone, Copy)]
pub struct BatchLookup {
    config: LookupConfig,
}

impl BatchLookup {
    pub fn new(config: LookupConfig) -> Self {
        Self { config }
    }

    pub async fn run<K, V, F, Fut>(
        &self,
        service: &str,
        keys: impl IntoIterator<Item = K>,
        lookup: F,
    ) -> BTreeMap<K, LookupOutcome<V>>
    where
        K: Clone + Ord + Debug,
        V: LookupValue,
        F: Fn(K) -> Fut,
        Fut: Future<Output = GraphResult<V>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut pending: BTreeSet<K> = keys.into_iter().collect();
        let mut outcomes = BTreeMap::new();
        let mut last_errors: BTreeMap<K, String> = BTreeMap::new();

        for attempt in 1..=max_attempts {
            if pending.is_empty() {
                break;
            }
            if attempt > 1 {
                log_retry!(service, attempt, max_attempts, pending.len());
                let backoff = self.config.backoff_ms.saturating_mul(u64::from(attempt - 1));
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }

            let results: Vec<(K, GraphResult<V>)> = stream::iter(pending.iter().cloned())
                .map(|key| {
                    let call = lookup(key.clone());
                    async move { (key, call.await) }
                })
                .buffered(self.config.concurrency.max(1))
                .collect()
                .await;

            pending.clear();
            for (key, result) in results {
                match result {
                    Ok(value) => {
                        if value.is_empty() {
                            debug!(service, key = ?key, outcome = "empty", "[Lookup] No evidence found");
                        }
                        last_errors.remove(&key);
                        outcomes.insert(key, LookupOutcome::Found(value));
                    }
                    Err(e) => {
                        debug!(service, key = ?key, attempt, error = %e, "[Lookup] Attempt failed");
                        last_errors.insert(key.clone(), e.to_string());
                        pending.insert(key);
                    }
                }
            }
        }

        for (key, reason) in last_errors {
            warn!(
                service,
                key = ?key,
                attempts = max_attempts,
                outcome = "lookup_failed",
                error = %reason,
                "⚠️ [Lookup] Giving up, evidence left empty"
            );
            outcomes.insert(
                key,
                LookupOutcome::Failed {
                    reason,
                    attempts: max_attempts,
                },
            );
        }

        outcomes
    }
}
