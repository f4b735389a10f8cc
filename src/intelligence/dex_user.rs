use chrono::{DateTime, Utc};
use serde_json::json;

use crate::config::Thresholds;
use crate::errors::DataError;
use crate::intelligence::evaluator::{build_candidate, evidence, Evaluator, RuleDescription};
use crate::intelligence::scoring::saturating_ratio;
use crate::models::{AddressStatistics, LabelCandidate, LabelKind, CONTRACT_INTERACTIONS};

const VERSION: &str = "v1";

/// Distinct routers at which the diversity score is maxed.
const FULL_DIVERSITY_AT: f64 = 5.0;

/// Router interactions at which the activity score is maxed.
const FULL_ACTIVITY_AT: f64 = 50.0;

const MIN_CONFIDENCE: f64 = 0.25;

/// Addresses that trade through known DEX routers.
///
/// Confidence averages router diversity (full at 5 routers) and router
/// volume (full at 50 interactions), floored at 0.25.
#[derive(Debug, Clone, Copy, Default)]
pub struct DexUserEvaluator;

impl DexUserEvaluator {
    pub fn confidence(distinct_routers: usize, volume: u64) -> f64 {
        let diversity = saturating_ratio(distinct_routers as f64, FULL_DIVERSITY_AT);
        let activity = saturating_ratio(volume as f64, FULL_ACTIVITY_AT);
        ((diversity + activity) / 2.0).max(MIN_CONFIDENCE)
    }
}

impl Evaluator for DexUserEvaluator {
    fn kind(&self) -> LabelKind {
        LabelKind::DexUser
    }

    fn source_rule(&self, thresholds: &Thresholds) -> String {
        format!(
            "dex_user/{VERSION}:dex_interactions >= {}",
            thresholds.dex_min_interactions
        )
    }

    fn describe(&self, thresholds: &Thresholds) -> RuleDescription {
        RuleDescription {
            label: self.kind(),
            source_rule: self.source_rule(thresholds),
            formula: "max(0.25, (min(1, distinct_routers / 5) + min(1, dex_interactions / 50)) / 2)",
            parameters: evidence([
                ("min_interactions", json!(thresholds.dex_min_interactions)),
                ("known_routers", json!(thresholds.dex_routers.len())),
            ]),
        }
    }

    fn evaluate(
        &self,
        stats: &AddressStatistics,
        thresholds: &Thresholds,
        _as_of: DateTime<Utc>,
    ) -> Result<Option<LabelCandidate>, DataError> {
        stats.ensure_usable(CONTRACT_INTERACTIONS)?;

        let (routers, volume) =
            stats.contract_activity(|contract| thresholds.dex_router_name(contract).is_some());

        if routers.is_empty() || volume < thresholds.dex_min_interactions {
            return Ok(None);
        }

        let confidence = Self::confidence(routers.len(), volume);
        let router_names: Vec<&str> = routers
            .iter()
            .filter_map(|r| thresholds.dex_router_name(r))
            .collect();
        let ev = evidence([
            ("dex_routers", json!(router_names)),
            ("distinct_dex_contracts", json!(routers.len())),
            ("dex_interactions", json!(volume)),
        ]);

        Ok(Some(build_candidate(self, stats, thresholds, confidence, ev)))
    }
}
