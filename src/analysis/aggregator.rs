//! Fragment aggregation and ranking.
//!
//! This module merges provider fragments into the canonical aggregate and
//! provides the ranking both renderers use.

use crate::models::{AggregateData, Counter, UnavailableSource};
use crate::sources::{AdapterOutcome, PartialFragment};
use std::cmp::Reverse;

/// Merge fragments into one aggregate.
///
/// Counters are summed per key, record counts accumulate into
/// `total_records`, source ids are collected distinct and sorted. The result
/// does not depend on the order of `fragments`.
pub fn merge(fragments: &[PartialFragment]) -> AggregateData {
    let mut aggregate = AggregateData::default();

    for fragment in fragments {
        aggregate.counters.absorb(fragment.counters());
        let records = fragment.record_count();
        let metadata = &mut aggregate.metadata;
        metadata.total_records = metadata.total_records.saturating_add(records);
        let per_source = metadata
            .source_records
            .entry(fragment.source_id().to_string())
            .or_insert(0);
        *per_source = per_source.saturating_add(records);
        if let Some(block) = fragment.provider() {
            aggregate.upstream.push(block.clone());
        }
    }

    aggregate.metadata.sources = aggregate.metadata.source_records.keys().cloned().collect();
    aggregate
        .upstream
        .sort_by(|a, b| a.source_id.cmp(&b.source_id).then_with(|| a.note.cmp(&b.note)));

    aggregate
}

/// Merge adapter outcomes, recording unavailable sources alongside.
pub fn merge_outcomes(outcomes: &[AdapterOutcome]) -> AggregateData {
    let fragments: Vec<PartialFragment> = outcomes
        .iter()
        .filter_map(|o| match o {
            AdapterOutcome::Fragment(f) => Some(f.clone()),
            AdapterOutcome::Unavailable(_) => None,
        })
        .collect();

    let mut unavailable: Vec<UnavailableSource> = outcomes
        .iter()
        .filter_map(|o| match o {
            AdapterOutcome::Unavailable(u) => Some(u.clone()),
            AdapterOutcome::Fragment(_) => None,
        })
        .collect();
    unavailable.sort_by(|a, b| a.source_id.cmp(&b.source_id));

    let mut aggregate = merge(&fragments);
    aggregate.metadata.unavailable = unavailable;
    aggregate
}

/// Categories ranked by count, highest first.
///
/// Ties keep the counter's key order, which is the canonical category order.
pub fn ranked(counter: &Counter) -> Vec<(&str, u64)> {
    let mut entries: Vec<(&str, u64)> = counter.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    entries.sort_by_key(|(_, count)| Reverse(*count));
    entries
}

/// The `n` highest-ranked categories.
pub fn top_n(counter: &Counter, n: usize) -> Vec<(&str, u64)> {
    let mut entries = ranked(counter);
    entries.truncate(n);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CounterSet, Dimension, UnavailableReason};

    fn fragment(source: &str, records: u64, entries: &[(Dimension, &str, u64)]) -> PartialFragment {
        let mut counters = CounterSet::default();
        for (dimension, key, count) in entries {
            counters.add(*dimension, *key, *count);
        }
        PartialFragment::fixture(source, records, counters)
    }

    fn fixtures() -> Vec<PartialFragment> {
        vec![
            fragment(
                "platform",
                6,
                &[
                    (Dimension::AgeGroup, "18-25", 4),
                    (Dimension::AgeGroup, "26-35", 2),
                    (Dimension::Page, "/eventos", 5),
                ],
            ),
            fragment(
                "analytics",
                5,
                &[
                    (Dimension::AgeGroup, "18-25", 3),
                    (Dimension::Country, "Paraguai", 2),
                ],
            ),
            fragment("survey", 2, &[(Dimension::Search, "bonito", 1)]),
        ]
    }

    #[test]
    fn test_merge_sums_and_unions() {
        let aggregate = merge(&fixtures());
        let counters = &aggregate.counters;

        assert_eq!(counters.demographics.age_groups.get("18-25"), Some(&7));
        assert_eq!(counters.demographics.age_groups.get("26-35"), Some(&2));
        assert_eq!(counters.origins.countries.get("Paraguai"), Some(&2));
        assert_eq!(counters.interactions.searches.get("bonito"), Some(&1));
        assert_eq!(counters.total_interactions(), 6);
        assert_eq!(aggregate.metadata.total_records, 13);
        assert_eq!(
            aggregate.metadata.sources,
            vec!["analytics", "platform", "survey"]
        );
    }

    #[test]
    fn test_merge_order_independent() {
        let base = fixtures();
        let expected = serde_json::to_vec(&merge(&base)).unwrap();

        let permutations = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];
        for order in permutations {
            let shuffled: Vec<PartialFragment> = order.iter().map(|i| base[*i].clone()).collect();
            assert_eq!(serde_json::to_vec(&merge(&shuffled)).unwrap(), expected);
        }
    }

    #[test]
    fn test_merge_associative() {
        let base = fixtures();
        let left = merge(&base[..2]);
        let whole = merge(&base);

        // (a + b) + c == a + b + c at the counter level
        let mut regrouped = left.counters.clone();
        regrouped.absorb(base[2].counters());
        assert_eq!(regrouped, whole.counters);
    }

    #[test]
    fn test_merge_empty_is_identity() {
        let aggregate = merge(&[]);
        assert!(aggregate.counters.is_empty());
        assert_eq!(aggregate.metadata.total_records, 0);
        assert!(aggregate.metadata.sources.is_empty());
        assert!(aggregate.upstream.is_empty());
    }

    #[test]
    fn test_merge_single_fragment_unchanged() {
        let single = fixtures().remove(0);
        let aggregate = merge(std::slice::from_ref(&single));
        assert_eq!(&aggregate.counters, single.counters());
        assert_eq!(aggregate.metadata.total_records, single.record_count());
    }

    #[test]
    fn test_merge_record_counts_saturate() {
        let aggregate = merge(&[
            fragment("analytics", u64::MAX, &[]),
            fragment("analytics", 3, &[]),
            fragment("platform", 4, &[]),
        ]);
        assert_eq!(aggregate.metadata.total_records, u64::MAX);
        assert_eq!(aggregate.metadata.source_records.get("analytics"), Some(&u64::MAX));
        assert_eq!(aggregate.metadata.source_records.get("platform"), Some(&4));
    }

    #[test]
    fn test_merge_outcomes_records_unavailable() {
        let outcomes = vec![
            AdapterOutcome::Fragment(fixtures().remove(0)),
            AdapterOutcome::unavailable("analytics", UnavailableReason::Unreachable, "503"),
        ];
        let aggregate = merge_outcomes(&outcomes);
        assert_eq!(aggregate.metadata.sources, vec!["platform"]);
        assert_eq!(aggregate.metadata.unavailable.len(), 1);
        assert_eq!(aggregate.metadata.unavailable[0].source_id, "analytics");
    }

    #[test]
    fn test_ranked_breaks_ties_by_key_order() {
        let mut counter = Counter::new();
        counter.insert("pantanal".to_string(), 3);
        counter.insert("bonito".to_string(), 3);
        counter.insert("corumba".to_string(), 9);
        counter.insert("aquidauana".to_string(), 1);

        let ranked = ranked(&counter);
        assert_eq!(
            ranked,
            vec![("corumba", 9), ("bonito", 3), ("pantanal", 3), ("aquidauana", 1)]
        );
        assert_eq!(top_n(&counter, 2).len(), 2);
    }
}
