use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::models::{AddressLabel, ExistingLabels, LabelCandidate, LabelKey};

/// Counts from one merge pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Pairs never seen in an earlier run.
    pub created: usize,
    /// Pairs that already existed and were refreshed.
    pub updated: usize,
}

/// Merge this run's candidates with labels from earlier runs.
///
/// At most one label per (address, label) key survives; if two evaluators emit
/// the same key, the higher confidence wins and ties keep the earlier candidate.
/// Existing keys keep `created_at`; everything else is taken from the new
/// computation. Output is sorted by key.
pub fn merge_candidates<I>(
    candidates: I,
    existing: &ExistingLabels,
    run_time: DateTime<Utc>,
) -> (Vec<AddressLabel>, MergeStats)
where
    I: IntoIterator<Item = LabelCandidate>,
{
    let mut best: BTreeMap<LabelKey, LabelCandidate> = BTreeMap::new();
    for candidate in candidates {
        let key = candidate.key();
        match best.get(&key) {
            Some(current) if current.confidence >= candidate.confidence => {
                tracing::debug!(
                    address = %key.address,
                    label = %key.kind,
                    kept = %current.source_rule,
                    dropped = %candidate.source_rule,
                    "Duplicate candidate for key, keeping higher confidence"
                );
            }
            _ => {
                best.insert(key, candidate);
            }
        }
    }

    let mut stats = MergeStats::default();
    let labels = best
        .into_iter()
        .map(|(key, candidate)| {
            let created_at = match existing.get(&key) {
                Some(previous) => {
                    stats.updated += 1;
                    previous.created_at
                }
                None => {
                    stats.created += 1;
                    run_time
                }
            };
            AddressLabel {
                address: candidate.address,
                kind: candidate.kind,
                confidence: candidate.confidence,
                source_rule: candidate.source_rule,
                evidence: candidate.evidence,
                created_at,
                updated_at: run_time,
            }
        })
        .collect();

    (labels, stats)
}

/// The full label set after a run: every earlier label plus this run's output,
/// with this run winning on shared keys. Nothing is pruned. Sorted by key.
pub fn carry_forward(existing: &ExistingLabels, fresh: &[AddressLabel]) -> Vec<AddressLabel> {
    let mut all: BTreeMap<LabelKey, AddressLabel> = existing
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    for label in fresh {
        all.insert(label.key(), label.clone());
    }
    all.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{index_labels, Evidence, LabelKind};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn make_candidate(address: &str, kind: LabelKind, confidence: f64, rule: &str) -> LabelCandidate {
        LabelCandidate {
            address: address.into(),
            kind,
            confidence,
            source_rule: rule.into(),
            evidence: Evidence::new(),
        }
    }

    #[test]
    fn test_new_keys_get_run_time_for_both_timestamps() {
        let (labels, stats) = merge_candidates(
            vec![make_candidate("0xa", LabelKind::Whale, 0.5, "r")],
            &ExistingLabels::new(),
            t0(),
        );
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].created_at, t0());
        assert_eq!(labels[0].updated_at, t0());
        assert_eq!(stats, MergeStats { created: 1, updated: 0 });
    }

    #[test]
    fn test_existing_key_keeps_created_at_and_takes_new_values() {
        let (first, _) = merge_candidates(
            vec![make_candidate("0xa", LabelKind::Whale, 0.5, "whale/v1")],
            &ExistingLabels::new(),
            t0(),
        );
        let existing = index_labels(first);

        let later = t0() + Duration::days(1);
        let (second, stats) = merge_candidates(
            vec![make_candidate("0xa", LabelKind::Whale, 0.9, "whale/v2")],
            &existing,
            later,
        );

        assert_eq!(second[0].created_at, t0());
        assert_eq!(second[0].updated_at, later);
        assert_eq!(second[0].confidence, 0.9);
        assert_eq!(second[0].source_rule, "whale/v2");
        assert_eq!(stats, MergeStats { created: 0, updated: 1 });
    }

    #[test]
    fn test_duplicate_keys_keep_highest_confidence() {
        let (labels, _) = merge_candidates(
            vec![
                make_candidate("0xa", LabelKind::Whale, 0.6, "first"),
                make_candidate("0xa", LabelKind::Whale, 0.8, "second"),
                make_candidate("0xa", LabelKind::Whale, 0.8, "third"),
            ],
            &ExistingLabels::new(),
            t0(),
        );
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].source_rule, "second");
    }

    #[test]
    fn test_distinct_kinds_are_separate_records() {
        let (labels, _) = merge_candidates(
            vec![
                make_candidate("0xa", LabelKind::DexUser, 0.3, "d"),
                make_candidate("0xa", LabelKind::Whale, 0.5, "w"),
            ],
            &ExistingLabels::new(),
            t0(),
        );
        let kinds: Vec<_> = labels.iter().map(|l| l.kind.clone()).collect();
        assert_eq!(kinds, vec![LabelKind::Whale, LabelKind::DexUser]);
    }

    #[test]
    fn test_carry_forward_never_prunes() {
        let (old, _) = merge_candidates(
            vec![
                make_candidate("0xa", LabelKind::Whale, 0.5, "w"),
                make_candidate("0xb", LabelKind::NewWallet, 0.9, "n"),
            ],
            &ExistingLabels::new(),
            t0(),
        );
        let existing = index_labels(old);

        let later = t0() + Duration::days(1);
        let (fresh, _) = merge_candidates(
            vec![make_candidate("0xa", LabelKind::Whale, 0.7, "w")],
            &existing,
            later,
        );

        let all = carry_forward(&existing, &fresh);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].address, "0xa");
        assert_eq!(all[0].confidence, 0.7);
        assert_eq!(all[0].updated_at, later);
        assert_eq!(all[1].address, "0xb");
        assert_eq!(all[1].updated_at, t0());
    }
}
