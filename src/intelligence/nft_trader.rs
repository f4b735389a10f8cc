use chrono::{DateTime, Utc};
use serde_json::json;

use crate::config::Thresholds;
use crate::errors::DataError;
use crate::intelligence::evaluator::{build_candidate, evidence, Evaluator, RuleDescription};
use crate::intelligence::scoring::{clamp_unit, round_to, saturating_ratio};
use crate::models::{AddressStatistics, LabelCandidate, LabelKind, TokenStandard, TOKEN_INTERACTIONS};

const VERSION: &str = "v1";

/// Largest confidence boost from activity alone.
const MAX_ACTIVITY_BOOST: f64 = 0.2;

/// Token interactions at which the activity boost is fully earned.
const FULL_ACTIVITY_AT: f64 = 100.0;

const MIN_CONFIDENCE: f64 = 0.4;

/// Addresses whose token activity is dominated by ERC-721 transfers.
///
/// `ratio = erc721 / total`; fires when `ratio >= nft_trader_threshold`.
/// Confidence is `ratio` plus up to 0.2 for activity, floored at 0.4.
#[derive(Debug, Clone, Copy, Default)]
pub struct NftTraderEvaluator;

impl NftTraderEvaluator {
    pub fn confidence(ratio: f64, total_interactions: u64) -> f64 {
        let boost = MAX_ACTIVITY_BOOST * saturating_ratio(total_interactions as f64, FULL_ACTIVITY_AT);
        clamp_unit(ratio + boost).max(MIN_CONFIDENCE)
    }
}

impl Evaluator for NftTraderEvaluator {
    fn kind(&self) -> LabelKind {
        LabelKind::NftTrader
    }

    fn source_rule(&self, thresholds: &Thresholds) -> String {
        format!("nft_trader/{VERSION}:nft_ratio >= {}", thresholds.nft_trader_threshold)
    }

    fn describe(&self, thresholds: &Thresholds) -> RuleDescription {
        RuleDescription {
            label: self.kind(),
            source_rule: self.source_rule(thresholds),
            formula: "max(0.4, min(1, nft_ratio + 0.2 * min(1, total_interactions / 100)))",
            parameters: evidence([
                ("threshold", json!(thresholds.nft_trader_threshold)),
                ("min_interactions", json!(thresholds.nft_min_interactions)),
            ]),
        }
    }

    fn evaluate(
        &self,
        stats: &AddressStatistics,
        thresholds: &Thresholds,
        _as_of: DateTime<Utc>,
    ) -> Result<Option<LabelCandidate>, DataError> {
        stats.ensure_usable(TOKEN_INTERACTIONS)?;

        let total = stats.total_token_interactions();
        if total == 0 || total < thresholds.nft_min_interactions {
            return Ok(None);
        }

        let nft = stats.interactions_with(TokenStandard::Erc721);
        let ratio = nft as f64 / total as f64;
        if ratio < thresholds.nft_trader_threshold {
            return Ok(None);
        }

        let confidence = Self::confidence(ratio, total);
        let ev = evidence([
            ("erc721_interactions", json!(nft)),
            ("total_token_interactions", json!(total)),
            ("nft_ratio", json!(round_to(ratio, 4))),
        ]);

        Ok(Some(build_candidate(self, stats, thresholds, confidence, ev)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_stats(pairs: &[(&str, u64)]) -> AddressStatistics {
        let mut stats = AddressStatistics::new("0xnft");
        for (tag, n) in pairs {
            stats.token_interactions.insert(tag.to_string(), *n);
        }
        stats
    }

    fn eval(pairs: &[(&str, u64)]) -> Option<LabelCandidate> {
        NftTraderEvaluator
            .evaluate(&make_stats(pairs), &Thresholds::default(), Utc::now())
            .expect("never a data error")
    }

    #[test]
    fn test_fires_above_ratio() {
        let candidate = eval(&[("ERC-721", 8), ("ERC-20", 2)]).expect("ratio 0.8 should fire");
        assert_eq!(candidate.kind, LabelKind::NftTrader);
        assert_eq!(candidate.evidence["nft_ratio"], json!(0.8));
        // 0.8 + 0.2 * 10/100
        assert!((candidate.confidence - 0.82).abs() < 1e-9);
    }

    #[test]
    fn test_fires_at_exact_ratio() {
        assert!(eval(&[("ERC-721", 7), ("ERC-20", 3)]).is_some());
    }

    #[test]
    fn test_below_ratio_does_not_fire() {
        assert!(eval(&[("ERC-721", 6), ("ERC-20", 4)]).is_none());
    }

    #[test]
    fn test_no_token_interactions_does_not_fire() {
        assert!(eval(&[]).is_none());
        assert!(eval(&[("ERC-721", 0), ("ERC-20", 0)]).is_none());
    }

    #[test]
    fn test_min_interactions_respected() {
        let thresholds = Thresholds {
            nft_min_interactions: 10,
            ..Thresholds::default()
        };
        let stats = make_stats(&[("ERC-721", 5)]);
        let result = NftTraderEvaluator.evaluate(&stats, &thresholds, Utc::now()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_confidence_increases_with_activity_and_ratio() {
        assert!(NftTraderEvaluator::confidence(0.8, 50) > NftTraderEvaluator::confidence(0.8, 10));
        assert!(NftTraderEvaluator::confidence(0.9, 10) > NftTraderEvaluator::confidence(0.8, 10));
        assert_eq!(NftTraderEvaluator::confidence(1.0, 1_000), 1.0);
    }

    #[test]
    fn test_confidence_floor() {
        let thresholds = Thresholds {
            nft_trader_threshold: 0.1,
            ..Thresholds::default()
        };
        let stats = make_stats(&[("ERC-721", 1), ("ERC-20", 4)]);
        let candidate = NftTraderEvaluator
            .evaluate(&stats, &thresholds, Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(candidate.confidence, 0.4);
    }

    #[test]
    fn test_described_formula_uses_scoring_constants() {
        let formula = NftTraderEvaluator.describe(&Thresholds::default()).formula;
        assert!(formula.starts_with(&format!("max({MIN_CONFIDENCE}, ")));
        assert!(formula.contains(&format!(
            "{MAX_ACTIVITY_BOOST} * min(1, total_interactions / {FULL_ACTIVITY_AT})"
        )));
    }
}
