use dashmap::DashMap;
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};

use crate::models::{CandidateEdge, EdgeEvidence, EdgeKey, MergedEdge, ResolutionOutcome};

/// Collapses every observation of an `(from, relation, to)` key into one
/// edge. Observations may arrive from many threads; each key is merged
/// under its own shard lock.
#[derive(Debug, Default)]
pub struct EdgeAggregator {
    edges: DashMap<EdgeKey, EdgeEvidence>,
    unresolved: AtomicUsize,
    type_mismatches: AtomicUsize,
}

impl EdgeAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, key: EdgeKey, evidence: &EdgeEvidence) {
        self.edges
            .entry(key)
            .and_modify(|existing| existing.merge(evidence))
            .or_insert_with(|| evidence.clone());
    }

    /// Map candidate endpoints onto canonical nodes and merge. Edges with an
    /// unresolved (e.g. ambiguous) endpoint are dropped and counted.
    pub fn observe_batch(&self, edges: &[CandidateEdge], resolution: &ResolutionOutcome) {
        edges.par_iter().for_each(|edge| {
            let (Some(from), Some(to)) = (resolution.canonical(&edge.from), resolution.canonical(&edge.to)) else {
                debug!(
                    from = %edge.from,
                    to = %edge.to,
                    relation = %edge.relation,
                    "[Edge Aggregator] Endpoint unresolved, edge dropped"
                );
                self.unresolved.fetch_add(1, Ordering::Relaxed);
                return;
            };

            if edge.relation.endpoints() != (from.entity_type, to.entity_type) {
                warn!(
                    from = %from,
                    to = %to,
                    relation = %edge.relation,
                    "⚠️ [Edge Aggregator] Endpoint types do not fit relation, edge dropped"
                );
                self.type_mismatches.fetch_add(1, Ordering::Relaxed);
                return;
            }

            self.observe(EdgeKey::new(from.clone(), edge.relation, to.clone()), &edge.evidence);
        });
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Edges dropped for an endpoint without a canonical entity
    pub fn unresolved(&self) -> usize {
        self.unresolved.load(Ordering::Relaxed)
    }

    pub fn type_mismatches(&self) -> usize {
        self.type_mismatches.load(Ordering::Relaxed)
    }

    /// The merged edge list, sorted by key
    pub fn into_merged(self) -> Vec<MergedEdge> {
        let mut merged: Vec<MergedEdge> = self
            .edges
            .into_iter()
            .map(|(key, evidence)| MergedEdge { key, evidence })
            .collect();
        merged.sort_by(|a, b| a.key.cmp(&b.key));

        info!(
            edges = merged.len(),
            unresolved = self.unresolved.load(Ordering::Relaxed),
            "🔗 [Edge Aggregator] Edges merged"
        );
        merged
    }
}
