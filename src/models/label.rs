use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Behavioral label categories.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LabelKind {
    /// Large ETH holder.
    Whale,
    /// Token activity dominated by ERC-721 transfers.
    NftTrader,
    /// Interacts with known DEX routers.
    DexUser,
    /// First transaction falls inside the lookback window.
    NewWallet,
    /// Label produced by an evaluator registered outside this crate.
    Custom(String),
}

impl LabelKind {
    pub fn as_str(&self) -> &str {
        match self {
            LabelKind::Whale => "whale",
            LabelKind::NftTrader => "nft_trader",
            LabelKind::DexUser => "dex_user",
            LabelKind::NewWallet => "new_wallet",
            LabelKind::Custom(name) => name,
        }
    }
}

impl From<&str> for LabelKind {
    fn from(s: &str) -> Self {
        match s {
            "whale" => LabelKind::Whale,
            "nft_trader" => LabelKind::NftTrader,
            "dex_user" => LabelKind::DexUser,
            "new_wallet" => LabelKind::NewWallet,
            other => LabelKind::Custom(other.to_string()),
        }
    }
}

impl From<String> for LabelKind {
    fn from(s: String) -> Self {
        LabelKind::from(s.as_str())
    }
}

impl From<LabelKind> for String {
    fn from(kind: LabelKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for LabelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statistic values that justified a label decision.
pub type Evidence = BTreeMap<String, serde_json::Value>;

/// Identity of a label across runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelKey {
    pub address: String,
    pub kind: LabelKind,
}

impl LabelKey {
    pub fn new(address: impl Into<String>, kind: LabelKind) -> Self {
        Self {
            address: address.into(),
            kind,
        }
    }
}

/// Output of one evaluator for one address. Lives only within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelCandidate {
    pub address: String,
    #[serde(rename = "label")]
    pub kind: LabelKind,
    pub confidence: f64,
    pub source_rule: String,
    pub evidence: Evidence,
}

impl LabelCandidate {
    pub fn key(&self) -> LabelKey {
        LabelKey::new(self.address.clone(), self.kind.clone())
    }
}

/// Persisted label record.
///
/// `created_at` is fixed by the first run that produced the (address, label) pair;
/// every later run only moves `updated_at` and overwrites the computed fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressLabel {
    pub address: String,
    #[serde(rename = "label")]
    pub kind: LabelKind,
    pub confidence: f64,
    pub source_rule: String,
    pub evidence: Evidence,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AddressLabel {
    pub fn key(&self) -> LabelKey {
        LabelKey::new(self.address.clone(), self.kind.clone())
    }
}

impl fmt::Display for AddressLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}... | {} | {:.3}",
            &self.address[..10.min(self.address.len())],
            self.kind,
            self.confidence,
        )
    }
}

/// Labels from earlier runs, keyed for the merge step.
pub type ExistingLabels = HashMap<LabelKey, AddressLabel>;

/// Index labels by key. Later entries win on duplicate keys.
pub fn index_labels<I>(labels: I) -> ExistingLabels
where
    I: IntoIterator<Item = AddressLabel>,
{
    labels.into_iter().map(|l| (l.key(), l)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_kind_round_trips_through_strings() {
        for kind in [
            LabelKind::Whale,
            LabelKind::NftTrader,
            LabelKind::DexUser,
            LabelKind::NewWallet,
            LabelKind::Custom("mev_bot".into()),
        ] {
            assert_eq!(LabelKind::from(kind.as_str()), kind);
        }
    }

    #[test]
    fn test_label_kind_serializes_as_plain_string() {
        let json = serde_json::to_string(&LabelKind::NftTrader).unwrap();
        assert_eq!(json, "\"nft_trader\"");
        let kind: LabelKind = serde_json::from_str("\"mev_bot\"").unwrap();
        assert_eq!(kind, LabelKind::Custom("mev_bot".into()));
    }

    #[test]
    fn test_display_truncates_address() {
        let now = Utc::now();
        let label = AddressLabel {
            address: "0x1234567890abcdef".into(),
            kind: LabelKind::Whale,
            confidence: 0.5,
            source_rule: "whale/v1".into(),
            evidence: Evidence::new(),
            created_at: now,
            updated_at: now,
        };
        assert_eq!(label.to_string(), "0x12345678... | whale | 0.500");
    }
}
