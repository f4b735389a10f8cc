use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::DataError;

/// Aggregate on-chain facts for one address within one snapshot.
///
/// Decoding is per field: a value the source sent but that cannot be used is
/// recorded in `malformed_fields` instead of failing the whole record, so only
/// the evaluators reading that field are affected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawStatistics")]
pub struct AddressStatistics {
    pub address: String,
    /// `None` when the source omitted the field or sent a non-numeric value.
    pub eth_balance: Option<Decimal>,
    /// Interaction counts keyed by token-standard tag (`ERC-20`, `ERC-721`, ...).
    pub token_interactions: BTreeMap<String, u64>,
    pub contract_interactions: Vec<ContractInteraction>,
    /// Absent when the address never transacted.
    pub first_tx_timestamp: Option<DateTime<Utc>>,
    pub total_tx_count: u64,
    #[serde(skip)]
    pub malformed_fields: BTreeSet<&'static str>,
}

impl AddressStatistics {
    /// Empty record for `address`; every statistic absent or zero.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            eth_balance: None,
            token_interactions: BTreeMap::new(),
            contract_interactions: Vec::new(),
            first_tx_timestamp: None,
            total_tx_count: 0,
            malformed_fields: BTreeSet::new(),
        }
    }

    /// `Err` when the source sent an unusable value for `field`.
    pub fn ensure_usable(&self, field: &'static str) -> Result<(), DataError> {
        if self.malformed_fields.contains(field) {
            return Err(DataError::InvalidValue {
                address: self.address.clone(),
                field,
                reason: "unparsable value in source record".into(),
            });
        }
        Ok(())
    }

    /// Sum of interactions across every token standard.
    pub fn total_token_interactions(&self) -> u64 {
        self.token_interactions
            .values()
            .fold(0u64, |acc, n| acc.saturating_add(*n))
    }

    /// Interactions with tokens of the given standard, regardless of tag spelling.
    pub fn interactions_with(&self, standard: TokenStandard) -> u64 {
        self.token_interactions
            .iter()
            .filter(|(tag, _)| TokenStandard::from_tag(tag) == Some(standard))
            .fold(0u64, |acc, (_, n)| acc.saturating_add(*n))
    }

    /// Distinct contracts (lowercased) and total interaction volume with them,
    /// restricted to the contracts accepted by `filter`.
    pub fn contract_activity<F>(&self, mut filter: F) -> (BTreeSet<String>, u64)
    where
        F: FnMut(&str) -> bool,
    {
        let mut distinct = BTreeSet::new();
        let mut volume = 0u64;
        for interaction in &self.contract_interactions {
            let contract = interaction.contract.trim().to_ascii_lowercase();
            if filter(&contract) {
                volume = volume.saturating_add(interaction.interaction_count);
                distinct.insert(contract);
            }
        }
        (distinct, volume)
    }
}

/// A contract the address sent transactions to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractInteraction {
    pub contract: String,
    #[serde(default = "default_interaction_count")]
    pub interaction_count: u64,
}

impl ContractInteraction {
    pub fn new(contract: impl Into<String>, interaction_count: u64) -> Self {
        Self {
            contract: contract.into(),
            interaction_count,
        }
    }
}

fn default_interaction_count() -> u64 {
    1
}

/// Token standards the evaluators understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenStandard {
    Erc20,
    Erc721,
    Erc1155,
}

impl TokenStandard {
    /// Parse a source tag. Accepts `ERC-721`, `ERC721`, `erc_721` and similar.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let normalized: String = tag
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_uppercase();
        match normalized.as_str() {
            "ERC20" => Some(TokenStandard::Erc20),
            "ERC721" => Some(TokenStandard::Erc721),
            "ERC1155" => Some(TokenStandard::Erc1155),
            _ => None,
        }
    }

    pub fn as_tag(&self) -> &'static str {
        match self {
            TokenStandard::Erc20 => "ERC-20",
            TokenStandard::Erc721 => "ERC-721",
            TokenStandard::Erc1155 => "ERC-1155",
        }
    }
}

/// Trim and lowercase an address, rejecting anything that is not `0x` + hex digits.
pub fn canonical_address(raw: &str) -> Option<String> {
    let address = raw.trim().to_ascii_lowercase();
    let digits = address.strip_prefix("0x")?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(address)
}

/// Wire shape of a statistics record. Only the address is strict; every
/// statistic is kept as raw JSON and decoded field by field.
#[derive(Deserialize)]
struct RawStatistics {
    address: String,
    #[serde(default)]
    eth_balance: Value,
    #[serde(default)]
    token_interactions: Value,
    #[serde(default)]
    contract_interactions: Value,
    #[serde(default)]
    first_tx_timestamp: Value,
    #[serde(default)]
    total_tx_count: Value,
}

impl From<RawStatistics> for AddressStatistics {
    fn from(raw: RawStatistics) -> Self {
        let mut stats = AddressStatistics::new(raw.address);
        let mut malformed = BTreeSet::new();

        match decode_decimal(&raw.eth_balance) {
            Some(balance) => stats.eth_balance = balance,
            None => {
                malformed.insert(ETH_BALANCE);
            }
        }
        match decode_token_interactions(&raw.token_interactions) {
            Some(counts) => stats.token_interactions = counts,
            None => {
                malformed.insert(TOKEN_INTERACTIONS);
            }
        }
        match decode_contract_interactions(&raw.contract_interactions) {
            Some(contracts) => stats.contract_interactions = contracts,
            None => {
                malformed.insert(CONTRACT_INTERACTIONS);
            }
        }
        match decode_timestamp(&raw.first_tx_timestamp) {
            Some(first_tx) => stats.first_tx_timestamp = first_tx,
            None => {
                malformed.insert(FIRST_TX_TIMESTAMP);
            }
        }
        match &raw.total_tx_count {
            Value::Null => {}
            value => match decode_count(value) {
                Some(count) => stats.total_tx_count = count,
                None => {
                    malformed.insert(TOTAL_TX_COUNT);
                }
            },
        }

        for field in &malformed {
            tracing::warn!(address = %stats.address, field = %field, "Unusable value in source record");
        }
        stats.malformed_fields = malformed;
        stats
    }
}

pub const ETH_BALANCE: &str = "eth_balance";
pub const TOKEN_INTERACTIONS: &str = "token_interactions";
pub const CONTRACT_INTERACTIONS: &str = "contract_interactions";
pub const FIRST_TX_TIMESTAMP: &str = "first_tx_timestamp";
pub const TOTAL_TX_COUNT: &str = "total_tx_count";

/// Outer `None` means unusable; `Some(None)` means absent.
fn decode_decimal(value: &Value) -> Option<Option<Decimal>> {
    match value {
        Value::Null => Some(None),
        Value::Number(n) => parse_decimal(&n.to_string()).map(Some),
        Value::String(s) => parse_decimal(s.trim()).map(Some),
        _ => None,
    }
}

/// Non-negative integer, as a JSON number or a numeric string.
fn decode_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn decode_token_interactions(value: &Value) -> Option<BTreeMap<String, u64>> {
    match value {
        Value::Null => Some(BTreeMap::new()),
        Value::Object(map) => map
            .iter()
            .map(|(tag, count)| decode_count(count).map(|n| (tag.clone(), n)))
            .collect(),
        _ => None,
    }
}

/// Accepts bare contract addresses or `{contract, interaction_count}` objects.
fn decode_contract_interactions(value: &Value) -> Option<Vec<ContractInteraction>> {
    match value {
        Value::Null => Some(Vec::new()),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(contract) => Some(ContractInteraction::new(contract.clone(), 1)),
                Value::Object(_) => serde_json::from_value::<ContractInteraction>(item.clone()).ok(),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

/// RFC 3339 strings or unix seconds.
fn decode_timestamp(value: &Value) -> Option<Option<DateTime<Utc>>> {
    match value {
        Value::Null => Some(None),
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|t| Some(t.with_timezone(&Utc))),
        Value::Number(n) => n
            .as_i64()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map(Some),
        _ => None,
    }
}

fn parse_decimal(s: &str) -> Option<Decimal> {
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}
