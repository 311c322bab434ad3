use crate::models::{EdgeEvidence, Observed, Sequence};

/// Keep whichever observation ranks higher by provenance, then sequence.
/// An absent incoming value never replaces a present one. Exact ties fall
/// back to the value so the choice does not depend on merge order.
pub fn prefer<T: Clone + Ord>(current: &mut Option<Observed<T>>, incoming: &Option<Observed<T>>) {
    let Some(new) = incoming else {
        return;
    };
    let replace = match current {
        None => true,
        Some(old) => (new.provenance, new.seq, &new.value) > (old.provenance, old.seq, &old.value),
    };
    if replace {
        *current = Some(new.clone());
    }
}

impl EdgeEvidence {
    /// Fold another observation of the same edge into this one.
    ///
    /// Counters and labels: curated beats heuristic, then later beats
    /// earlier (last observed value overwrites, never summed). Sets are
    /// unioned; status and provenance take the maximum.
    pub fn merge(&mut self, other: &EdgeEvidence) {
        prefer(&mut self.comention_count, &other.comention_count);
        prefer(&mut self.literature_query, &other.literature_query);
        prefer(&mut self.strength, &other.strength);
        prefer(&mut self.evidence_source, &other.evidence_source);

        self.status = self.status.max(other.status);
        self.provenance = self.provenance.max(other.provenance);
        self.sources.extend(other.sources.iter().cloned());
        for (name, values) in &other.lists {
            self.lists
                .entry(name.clone())
                .or_default()
                .extend(values.iter().cloned());
        }
    }

    /// Evidence as persisted: every observation older than the next run
    pub fn into_stored(mut self) -> Self {
        if let Some(count) = self.comention_count.as_mut() {
            count.seq = Sequence::STORED;
        }
        for label in [
            &mut self.literature_query,
            &mut self.strength,
            &mut self.evidence_source,
        ] {
            if let Some(observed) = label {
                observed.seq = Sequence::STORED;
            }
        }
        self
    }

    /// Merge a run's evidence onto what the store already holds
    pub fn merged_onto(stored: Option<EdgeEvidence>, incoming: &EdgeEvidence) -> EdgeEvidence {
        match stored {
            Some(stored) => {
                let mut merged = stored.into_stored();
                merged.merge(incoming);
                merged.into_stored()
            }
            None => incoming.clone().into_stored(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EvidenceStatus, Provenance};
    use std::collections::BTreeSet;

    fn evidence(source: &str, provenance: Provenance) -> EdgeEvidence {
        EdgeEvidence::from_source(source, provenance)
    }

    fn label(value: &str, provenance: Provenance, row: usize) -> Option<Observed<String>> {
        Some(Observed::new(value.to_string(), provenance, Sequence::new(1, row)))
    }

    fn count(value: u64, provenance: Provenance, ordinal: u32, row: usize) -> Option<Observed<u64>> {
        Some(Observed::new(value, provenance, Sequence::new(ordinal, row)))
    }

    #[test]
    fn test_curated_strength_survives_later_heuristic() {
        let mut curated = evidence("curated_pairs", Provenance::Curated);
        curated.strength = label("strong", Provenance::Curated, 1);
        let mut heuristic = evidence("pubmed", Provenance::Heuristic);
        heuristic.strength = label("weak", Provenance::Heuristic, 9);

        let mut a = curated.clone();
        a.merge(&heuristic);
        let mut b = heuristic.clone();
        b.merge(&curated);

        assert_eq!(a.strength_label(), Some("strong"));
        assert_eq!(a, b);
        assert_eq!(a.provenance, Provenance::Curated);
    }

    #[test]
    fn test_equal_provenance_last_write_wins() {
        let mut first = evidence("a", Provenance::Heuristic);
        first.strength = label("weak", Provenance::Heuristic, 1);
        let mut second = evidence("b", Provenance::Heuristic);
        second.strength = label("moderate", Provenance::Heuristic, 2);

        first.merge(&second);
        assert_eq!(first.strength_label(), Some("moderate"));
    }

    #[test]
    fn test_counts_overwrite_not_accumulate() {
        let mut edge = evidence("pubmed", Provenance::Heuristic);
        edge.comention_count = count(12, Provenance::Heuristic, 1, 1);
        let mut rerun = evidence("pubmed", Provenance::Heuristic);
        rerun.comention_count = count(12, Provenance::Heuristic, 1, 1);

        edge.merge(&rerun);
        edge.merge(&rerun);
        assert_eq!(edge.count(), 12);

        let mut refreshed = evidence("pubmed", Provenance::Heuristic);
        refreshed.comention_count = count(15, Provenance::Heuristic, 2, 1);
        edge.merge(&refreshed);
        assert_eq!(edge.count(), 15);
    }

    #[test]
    fn test_absent_count_keeps_existing() {
        let mut edge = evidence("pubmed", Provenance::Heuristic);
        edge.comention_count = count(7, Provenance::Heuristic, 1, 1);
        edge.status = EvidenceStatus::Observed;

        let mut failed = evidence("pubmed", Provenance::Heuristic);
        failed.status = EvidenceStatus::LookupFailed;

        edge.merge(&failed);
        assert_eq!(edge.count(), 7);
        assert_eq!(edge.status, EvidenceStatus::Observed);
    }

    #[test]
    fn test_list_union() {
        let mut b1 = evidence("s1", Provenance::Curated);
        b1.lists.insert("syn".to_string(), BTreeSet::from(["X".to_string()]));
        let mut b2 = evidence("s2", Provenance::Curated);
        b2.lists.insert("syn".to_string(), BTreeSet::from(["Y".to_string()]));

        b1.merge(&b2);
        assert_eq!(
            b1.lists["syn"],
            BTreeSet::from(["X".to_string(), "Y".to_string()])
        );
        assert_eq!(b1.sources.len(), 2);
    }

    #[test]
    fn test_run_observation_beats_stored_value() {
        let mut stored = evidence("pubmed", Provenance::Heuristic);
        stored.comention_count = count(40, Provenance::Heuristic, 3, 10);

        // same position in the new run, different value
        let mut incoming = evidence("pubmed", Provenance::Heuristic);
        incoming.comention_count = count(30, Provenance::Heuristic, 3, 10);

        let merged = EdgeEvidence::merged_onto(Some(stored), &incoming);
        assert_eq!(merged.count(), 30);
        assert_eq!(merged.comention_count.unwrap().seq, Sequence::STORED);
    }

    #[test]
    fn test_stored_curated_not_overwritten_by_heuristic_run() {
        let mut stored = evidence("curated", Provenance::Curated);
        stored.strength = label("strong", Provenance::Curated, 1);
        let mut incoming = evidence("pubmed", Provenance::Heuristic);
        incoming.strength = label("weak", Provenance::Heuristic, 5);

        let merged = EdgeEvidence::merged_onto(Some(stored.clone()), &incoming);
        assert_eq!(merged.strength_label(), Some("strong"));

        let again = EdgeEvidence::merged_onto(Some(merged.clone()), &incoming);
        assert_eq!(again, merged);
    }
}
