//! Minimum-disclosure validation.

use crate::models::{AggregateData, ValidationVerdict};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Default floor on aggregated records before anything may be published.
pub const MIN_DISCLOSURE_THRESHOLD: u64 = 10;

/// Check an aggregate against the disclosure threshold.
///
/// The rule applies to the overall record total, not per category. Notes
/// are produced on both pass and fail and name every source that
/// contributed nothing.
pub fn validate(aggregate: &AggregateData, threshold: u64) -> ValidationVerdict {
    let meta = &aggregate.metadata;
    let is_valid = meta.total_records >= threshold;

    let mut source_records: BTreeMap<String, u64> = meta.source_records.clone();
    for missing in &meta.unavailable {
        source_records.entry(missing.source_id.clone()).or_insert(0);
    }

    let mut notes = Vec::new();
    for (source, records) in &meta.source_records {
        notes.push(format!("Source '{}' contributed {} records.", source, records));
    }
    for missing in &meta.unavailable {
        notes.push(format!(
            "Source '{}' contributed 0 records ({}): {}.",
            missing.source_id, missing.reason, missing.note
        ));
    }

    if is_valid {
        info!(
            "Aggregate passed disclosure check: {} >= {}",
            meta.total_records, threshold
        );
        notes.push(format!(
            "{} aggregated records meet the minimum of {} required for publication.",
            meta.total_records, threshold
        ));
    } else {
        warn!(
            "Aggregate below disclosure threshold: {} < {}",
            meta.total_records, threshold
        );
        notes.push(format!(
            "Insufficient data for the requested period: {} aggregated records, at least {} are required before a report can be published.",
            meta.total_records, threshold
        ));
        notes.push(
            "This does not mean no data exists; retry with a wider period or once more sources are available."
                .to_string(),
        );
    }

    ValidationVerdict {
        is_valid,
        total_records: meta.total_records,
        threshold,
        source_records,
        notes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{UnavailableReason, UnavailableSource};

    fn aggregate_with(total: u64) -> AggregateData {
        let mut aggregate = AggregateData::default();
        aggregate.metadata.total_records = total;
        aggregate
            .metadata
            .source_records
            .insert("platform".to_string(), total);
        aggregate.metadata.sources = vec!["platform".to_string()];
        aggregate
    }

    #[test]
    fn test_threshold_boundary() {
        let below = validate(&aggregate_with(MIN_DISCLOSURE_THRESHOLD - 1), MIN_DISCLOSURE_THRESHOLD);
        let at = validate(&aggregate_with(MIN_DISCLOSURE_THRESHOLD), MIN_DISCLOSURE_THRESHOLD);
        assert!(!below.is_valid);
        assert!(at.is_valid);
        assert_eq!(at.threshold, 10);
    }

    #[test]
    fn test_failure_notes_name_missing_sources() {
        let mut aggregate = aggregate_with(4);
        aggregate.metadata.unavailable.push(UnavailableSource {
            source_id: "analytics".to_string(),
            reason: UnavailableReason::Unreachable,
            note: "provider answered 503".to_string(),
        });

        let verdict = validate(&aggregate, MIN_DISCLOSURE_THRESHOLD);
        assert!(!verdict.is_valid);
        assert_eq!(verdict.source_records.get("analytics"), Some(&0));
        assert_eq!(verdict.source_records.get("platform"), Some(&4));
        assert!(verdict.notes.iter().any(|n| n.contains("'analytics'")));
        assert!(verdict.notes.iter().any(|n| n.contains("Insufficient data")));
        assert!(verdict
            .notes
            .iter()
            .all(|n| !n.to_lowercase().contains("no data exists.")));
    }

    #[test]
    fn test_pass_still_reports_unavailable_sources() {
        let mut aggregate = aggregate_with(25);
        aggregate.metadata.unavailable.push(UnavailableSource {
            source_id: "analytics".to_string(),
            reason: UnavailableReason::Disabled,
            note: "not provisioned".to_string(),
        });

        let verdict = validate(&aggregate, MIN_DISCLOSURE_THRESHOLD);
        assert!(verdict.is_valid);
        assert!(verdict
            .notes
            .iter()
            .any(|n| n.contains("'analytics' contributed 0 records (integration disabled)")));
    }
}
