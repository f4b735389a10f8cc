use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;

use crate::config::Thresholds;
use crate::errors::DataError;
use crate::intelligence::evaluator::{build_candidate, evidence, Evaluator, RuleDescription};
use crate::intelligence::scoring::{decimal_to_f64, saturating_ratio};
use crate::models::{AddressStatistics, LabelCandidate, LabelKind, ETH_BALANCE};

const VERSION: &str = "v1";

/// Confidence at exactly the threshold balance.
pub const BASELINE_CONFIDENCE: f64 = 0.5;

/// Confidence saturates at this multiple of the threshold.
pub const SATURATION_MULTIPLE: i64 = 10;

/// Large ETH holders.
///
/// Fires when `eth_balance >= min_eth_balance_whale`. Confidence rises linearly
/// from 0.5 at the threshold to 1.0 at ten times the threshold.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhaleEvaluator;

impl WhaleEvaluator {
    /// Divides before scaling so a threshold near `Decimal::MAX` cannot overflow.
    pub fn confidence(balance: Decimal, threshold: Decimal) -> f64 {
        let excess = balance
            .checked_sub(threshold)
            .and_then(|above| above.checked_div(threshold))
            .and_then(|multiple| multiple.checked_div(Decimal::from(SATURATION_MULTIPLE - 1)))
            .map(decimal_to_f64)
            .unwrap_or(1.0);
        BASELINE_CONFIDENCE + (1.0 - BASELINE_CONFIDENCE) * saturating_ratio(excess, 1.0)
    }
}

impl Evaluator for WhaleEvaluator {
    fn kind(&self) -> LabelKind {
        LabelKind::Whale
    }

    fn source_rule(&self, thresholds: &Thresholds) -> String {
        format!(
            "whale/{VERSION}:eth_balance >= {}",
            thresholds.min_eth_balance_whale.normalize()
        )
    }

    fn describe(&self, thresholds: &Thresholds) -> RuleDescription {
        RuleDescription {
            label: self.kind(),
            source_rule: self.source_rule(thresholds),
            formula: "0.5 + 0.5 * min(1, (eth_balance - min_balance) / (min_balance * 9))",
            parameters: evidence([
                ("min_balance", json!(thresholds.min_eth_balance_whale.to_string())),
                (
                    "saturation_balance",
                    json!(thresholds
                        .min_eth_balance_whale
                        .checked_mul(Decimal::from(SATURATION_MULTIPLE))
                        .map_or_else(|| Decimal::MAX.to_string(), |d| d.to_string())),
                ),
            ]),
        }
    }

    fn evaluate(
        &self,
        stats: &AddressStatistics,
        thresholds: &Thresholds,
        _as_of: DateTime<Utc>,
    ) -> Result<Option<LabelCandidate>, DataError> {
        stats.ensure_usable(ETH_BALANCE)?;
        let balance = stats.eth_balance.ok_or_else(|| DataError::MissingField {
            address: stats.address.clone(),
            field: ETH_BALANCE,
        })?;

        if balance < Decimal::ZERO {
            return Err(DataError::InvalidValue {
                address: stats.address.clone(),
                field: ETH_BALANCE,
                reason: format!("negative balance {balance}"),
            });
        }

        let threshold = thresholds.min_eth_balance_whale;
        if balance < threshold {
            return Ok(None);
        }

        let confidence = Self::confidence(balance, threshold);
        let ev = evidence([
            ("eth_balance", json!(balance.to_string())),
            ("min_eth_balance_whale", json!(threshold.to_string())),
        ]);

        Ok(Some(build_candidate(self, stats, thresholds, confidence, ev)))
    }
}
