use chrono::{DateTime, Utc};
use serde_json::json;

use crate::config::Thresholds;
use crate::errors::DataError;
use crate::intelligence::evaluator::{build_candidate, evidence, Evaluator, RuleDescription};
use crate::intelligence::scoring::{linear_decay, round_to};
use crate::models::{AddressStatistics, LabelCandidate, LabelKind, FIRST_TX_TIMESTAMP};

const VERSION: &str = "v1";

/// Confidence for a wallet at the edge of the lookback window.
pub const MIN_CONFIDENCE: f64 = 0.1;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Addresses whose first transaction falls within the lookback window.
///
/// Confidence decays linearly with age: 1.0 for a wallet first seen at `as_of`,
/// 0.1 at the window boundary.
#[derive(Debug, Clone, Copy, Default)]
pub struct NewWalletEvaluator;

impl NewWalletEvaluator {
    pub fn confidence(age_days: f64, lookback_days: u32) -> f64 {
        linear_decay(age_days, f64::from(lookback_days), MIN_CONFIDENCE)
    }
}

impl Evaluator for NewWalletEvaluator {
    fn kind(&self) -> LabelKind {
        LabelKind::NewWallet
    }

    fn source_rule(&self, thresholds: &Thresholds) -> String {
        format!(
            "new_wallet/{VERSION}:first_transaction_within_{}_days",
            thresholds.lookback_days_new_wallet
        )
    }

    fn describe(&self, thresholds: &Thresholds) -> RuleDescription {
        RuleDescription {
            label: self.kind(),
            source_rule: self.source_rule(thresholds),
            formula: "max(0.1, 1 - age_days / lookback_days)",
            parameters: evidence([("lookback_days", json!(thresholds.lookback_days_new_wallet))]),
        }
    }

    fn evaluate(
        &self,
        stats: &AddressStatistics,
        thresholds: &Thresholds,
        as_of: DateTime<Utc>,
    ) -> Result<Option<LabelCandidate>, DataError> {
        stats.ensure_usable(FIRST_TX_TIMESTAMP)?;

        // Never transacted: nothing to judge.
        let Some(first_tx) = stats.first_tx_timestamp else {
            return Ok(None);
        };

        if first_tx > as_of {
            return Err(DataError::InvalidValue {
                address: stats.address.clone(),
                field: FIRST_TX_TIMESTAMP,
                reason: format!("{} is after snapshot time {}", first_tx.to_rfc3339(), as_of.to_rfc3339()),
            });
        }

        let age_days = (as_of - first_tx).num_seconds() as f64 / SECONDS_PER_DAY;
        let lookback = thresholds.lookback_days_new_wallet;
        if age_days > f64::from(lookback) {
            return Ok(None);
        }

        let confidence = Self::confidence(age_days, lookback);
        let ev = evidence([
            ("first_tx_timestamp", json!(first_tx.to_rfc3339())),
            ("age_days", json!(round_to(age_days, 2))),
            ("lookback_days", json!(lookback)),
        ]);

        Ok(Some(build_candidate(self, stats, thresholds, confidence, ev)))
    }
}
