use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::errors::ConfigError;
use crate::models::canonical_address;

/// Known DEX router contracts and their display names.
pub const DEFAULT_DEX_ROUTERS: &[(&str, &str)] = &[
    ("0x7a250d5630b4cf539739df2c5dacb4c659f2488d", "uniswap_v2_router"),
    ("0xe592427a0aece92de3edee1f18e0157c05861564", "uniswap_v3_router"),
    ("0x1b02da8cb0d097eb8d57a175b88c7d8b47997506", "sushiswap_router"),
    ("0xd9e1ce17f2641f24ae83637ab66a2cca9c378b9f", "sushiswap_router_v2"),
    ("0x1111111254fb6c44bac0bed2854e76f90643097d", "1inch_v4_router"),
];

/// Named thresholds consumed by the evaluators. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    /// Minimum ETH balance for the whale label.
    pub min_eth_balance_whale: Decimal,
    /// Minimum ERC-721 share of token interactions, in [0, 1].
    pub nft_trader_threshold: f64,
    /// Minimum total token interactions before the NFT ratio is considered.
    pub nft_min_interactions: u64,
    /// Age window, in days, for the new-wallet label.
    pub lookback_days_new_wallet: u32,
    /// Minimum interactions with known routers for the DEX-user label.
    pub dex_min_interactions: u64,
    /// Lowercased router address -> router name.
    pub dex_routers: BTreeMap<String, String>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_eth_balance_whale: Decimal::from(1_000),
            nft_trader_threshold: 0.7,
            nft_min_interactions: 1,
            lookback_days_new_wallet: 30,
            dex_min_interactions: 1,
            dex_routers: DEFAULT_DEX_ROUTERS
                .iter()
                .map(|(addr, name)| (addr.to_string(), name.to_string()))
                .collect(),
        }
    }
}

impl Thresholds {
    /// Reject values no evaluator can work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_eth_balance_whale <= Decimal::ZERO {
            return Err(ConfigError::OutOfRange {
                name: "MIN_ETH_BALANCE_WHALE",
                value: self.min_eth_balance_whale.to_string(),
                expected: "> 0",
            });
        }

        // The whale saturation point (ten times the threshold) must stay representable.
        if self.min_eth_balance_whale.checked_mul(Decimal::TEN).is_none() {
            return Err(ConfigError::OutOfRange {
                name: "MIN_ETH_BALANCE_WHALE",
                value: self.min_eth_balance_whale.to_string(),
                expected: "<= 7.9e27",
            });
        }

        if !(0.0..=1.0).contains(&self.nft_trader_threshold) {
            return Err(ConfigError::OutOfRange {
                name: "NFT_TRADER_THRESHOLD",
                value: self.nft_trader_threshold.to_string(),
                expected: "0.0 ..= 1.0",
            });
        }

        if self.nft_min_interactions == 0 {
            return Err(ConfigError::OutOfRange {
                name: "NFT_MIN_INTERACTIONS",
                value: "0".into(),
                expected: ">= 1",
            });
        }

        if self.lookback_days_new_wallet == 0 {
            return Err(ConfigError::OutOfRange {
                name: "LOOKBACK_DAYS_NEW_WALLET",
                value: "0".into(),
                expected: ">= 1",
            });
        }

        if self.dex_min_interactions == 0 {
            return Err(ConfigError::OutOfRange {
                name: "DEX_MIN_INTERACTIONS",
                value: "0".into(),
                expected: ">= 1",
            });
        }

        if let Some(bad) = self
            .dex_routers
            .keys()
            .find(|addr| canonical_address(addr).as_deref() != Some(addr.as_str()))
        {
            return Err(ConfigError::InvalidRouter(bad.clone()));
        }

        Ok(())
    }

    /// Router name if `contract` (already lowercased) is a known DEX router.
    pub fn dex_router_name(&self, contract: &str) -> Option<&str> {
        self.dex_routers.get(contract).map(String::as_str)
    }
}

/// Parse `0xaddr[=name],0xaddr[=name],...`. Unnamed routers are named by address.
pub fn parse_dex_routers(raw: &str) -> Result<BTreeMap<String, String>, ConfigError> {
    let mut routers = BTreeMap::new();
    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (addr, name) = match entry.split_once('=') {
            Some((addr, name)) => (addr.trim(), name.trim()),
            None => (entry, ""),
        };
        let addr = canonical_address(addr).ok_or_else(|| ConfigError::InvalidRouter(entry.into()))?;
        let name = if name.is_empty() { addr.clone() } else { name.to_string() };
        routers.insert(addr, name);
    }

    if routers.is_empty() {
        return Err(ConfigError::Unparsable {
            name: "DEX_ROUTER_ADDRESSES",
            value: raw.into(),
        });
    }
    Ok(routers)
}
