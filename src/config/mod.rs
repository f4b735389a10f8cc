pub mod thresholds;

pub use thresholds::{parse_dex_routers, Thresholds, DEFAULT_DEX_ROUTERS};

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::errors::ConfigError;

const DEFAULT_OUTPUT_DIR: &str = "output";
const DEFAULT_PAGE_SIZE: usize = 5_000;

/// Where the run reads its per-address statistics from.
#[derive(Debug, Clone, PartialEq)]
pub enum StatisticsLocation {
    /// JSON-lines export on local disk.
    File(PathBuf),
    /// Remote analytical query service.
    Http {
        url: String,
        api_key: Option<String>,
        page_size: usize,
    },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub thresholds: Thresholds,
    pub statistics: Option<StatisticsLocation>,
    pub snapshot_lookback_days: u32,

    // Sinks
    pub output_dir: PathBuf,
    pub database_url: Option<String>,

    pub eval_workers: usize,
    pub metrics_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key/value lookup. Values that are set but
    /// unparsable are errors, never silently replaced by defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let defaults = Thresholds::default();
        let thresholds = Thresholds {
            min_eth_balance_whale: parse_or(&get, "MIN_ETH_BALANCE_WHALE", defaults.min_eth_balance_whale)?,
            nft_trader_threshold: parse_or(&get, "NFT_TRADER_THRESHOLD", defaults.nft_trader_threshold)?,
            nft_min_interactions: parse_or(&get, "NFT_MIN_INTERACTIONS", defaults.nft_min_interactions)?,
            lookback_days_new_wallet: parse_or(&get, "LOOKBACK_DAYS_NEW_WALLET", defaults.lookback_days_new_wallet)?,
            dex_min_interactions: parse_or(&get, "DEX_MIN_INTERACTIONS", defaults.dex_min_interactions)?,
            dex_routers: match get("DEX_ROUTER_ADDRESSES") {
                Some(raw) => parse_dex_routers(&raw)?,
                None => defaults.dex_routers,
            },
        };
        thresholds.validate()?;

        let statistics = match (get("STATISTICS_PATH"), get("STATISTICS_URL")) {
            (Some(path), _) => Some(StatisticsLocation::File(PathBuf::from(path))),
            (None, Some(url)) => {
                let page_size: usize = parse_or(&get, "STATISTICS_PAGE_SIZE", DEFAULT_PAGE_SIZE)?;
                if page_size == 0 {
                    return Err(ConfigError::OutOfRange {
                        name: "STATISTICS_PAGE_SIZE",
                        value: "0".into(),
                        expected: ">= 1",
                    });
                }
                Some(StatisticsLocation::Http {
                    url,
                    api_key: get("STATISTICS_API_KEY"),
                    page_size,
                })
            }
            (None, None) => None,
        };

        let snapshot_lookback_days: u32 = parse_or(&get, "SNAPSHOT_LOOKBACK_DAYS", 30)?;
        if snapshot_lookback_days == 0 {
            return Err(ConfigError::OutOfRange {
                name: "SNAPSHOT_LOOKBACK_DAYS",
                value: "0".into(),
                expected: ">= 1",
            });
        }

        let default_workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        let eval_workers: usize = parse_or(&get, "EVAL_WORKERS", default_workers)?;
        if eval_workers == 0 {
            return Err(ConfigError::OutOfRange {
                name: "EVAL_WORKERS",
                value: "0".into(),
                expected: ">= 1",
            });
        }

        Ok(Self {
            thresholds,
            statistics,
            snapshot_lookback_days,
            output_dir: PathBuf::from(get("OUTPUT_DIR").unwrap_or_else(|| DEFAULT_OUTPUT_DIR.into())),
            database_url: get("DATABASE_URL"),
            eval_workers,
            metrics_path: get("METRICS_PATH").map(PathBuf::from),
        })
    }

    /// The configured statistics source, required by `run` and `validate`.
    pub fn statistics_location(&self) -> Result<&StatisticsLocation, ConfigError> {
        self.statistics.as_ref().ok_or(ConfigError::Missing {
            name: "STATISTICS_PATH or STATISTICS_URL",
        })
    }
}

fn parse_or<G, T>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match get(name) {
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::Unparsable { name, value: raw }),
        None => Ok(default),
    }
}
