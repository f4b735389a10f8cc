use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::Thresholds;
use crate::errors::DataError;
use crate::intelligence::scoring::clamp_unit;
use crate::models::{AddressStatistics, Evidence, LabelCandidate, LabelKind};

/// One label kind's decision and scoring rule.
///
/// Implementations must be pure: the same statistics, thresholds and `as_of`
/// always produce the same result. Returning `Ok(None)` means the rule does not
/// apply; `Err` means the record lacks or mangles a field this rule needs, and
/// only this rule is skipped for the address.
pub trait Evaluator: Send + Sync {
    fn kind(&self) -> LabelKind;

    /// Identifier recorded on every label this evaluator produces.
    fn source_rule(&self, thresholds: &Thresholds) -> String;

    /// Human-readable formula and the parameters it runs with.
    fn describe(&self, thresholds: &Thresholds) -> RuleDescription;

    fn evaluate(
        &self,
        stats: &AddressStatistics,
        thresholds: &Thresholds,
        as_of: DateTime<Utc>,
    ) -> Result<Option<LabelCandidate>, DataError>;
}

/// Describes an evaluator for operators and audit logs.
#[derive(Debug, Clone, Serialize)]
pub struct RuleDescription {
    pub label: LabelKind,
    pub source_rule: String,
    pub formula: &'static str,
    pub parameters: Evidence,
}

/// Assemble a candidate, clamping confidence into [0, 1].
pub fn build_candidate(
    evaluator: &dyn Evaluator,
    stats: &AddressStatistics,
    thresholds: &Thresholds,
    confidence: f64,
    evidence: Evidence,
) -> LabelCandidate {
    LabelCandidate {
        address: stats.address.clone(),
        kind: evaluator.kind(),
        confidence: clamp_unit(confidence),
        source_rule: evaluator.source_rule(thresholds),
        evidence,
    }
}

/// Build an `Evidence` map from `(name, value)` pairs.
pub fn evidence<I, K>(pairs: I) -> Evidence
where
    I: IntoIterator<Item = (K, serde_json::Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
