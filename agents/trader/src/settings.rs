//! Trader settings, loaded from json config files and the environment.
//!
//! Sources, in increasing precedence:
//! 1. `./config/trader.json`, if present
//! 2. files listed in `CONFIG_FILES` (comma separated)
//! 3. `TRADER_` prefixed environment variables, with `__` separating nested
//!    keys (e.g. `TRADER_FEES__MAX_FEE_GWEI=7`)

use std::{env, path::PathBuf, time::Duration};

use config::{Config, Environment, File};
use ethers::types::Address;
use eyre::{bail, Context, Result};
use serde::Deserialize;
use submitter::FeeCaps;
use url::Url;

use crate::trace::TracingConfig;

const DEFAULT_CONFIG_FILE: &str = "./config/trader.json";
const ENV_PREFIX: &str = "TRADER";

const DEFAULT_RPC_URL: &str = "https://testnet.dplabs-internal.com";
const DEFAULT_PROOF_API_URL: &str = "https://proofcrypto-production.up.railway.app";
const DEFAULT_CHAIN_ID: u64 = 688688;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TraderSettings {
    pub rpc_url: Url,
    pub chain_id: u64,
    /// Base url of the off-chain proof service
    pub proof_api_url: Url,
    /// Newline delimited list of private keys
    pub wallet_file: PathBuf,
    /// Number of accounts processed concurrently
    pub max_concurrency: usize,
    /// Hard wall-clock budget of one account task
    #[serde(deserialize_with = "human_duration")]
    pub task_timeout: Duration,
    /// Number of passes over the whole account list
    pub rounds: u32,
    #[serde(deserialize_with = "human_duration")]
    pub round_cooldown: Duration,
    pub contracts: ContractAddresses,
    pub pairs: Vec<TradingPair>,
    pub fees: FeeSettings,
    pub tracing: TracingConfig,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct ContractAddresses {
    /// The collateral token, an ERC-20
    pub token: Address,
    /// Token faucet exposing `claim()`
    pub faucet: Address,
    /// Trading router exposing `openPosition`
    pub router: Address,
    /// Address the token allowance is granted to
    pub spender: Address,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct TradingPair {
    pub name: String,
    /// Index of the pair on the router, also used to request its proof
    pub index: u64,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FeeSettings {
    pub max_fee_gwei: u64,
    pub max_priority_fee_gwei: u64,
}

impl Default for FeeSettings {
    fn default() -> Self {
        Self {
            max_fee_gwei: 5,
            max_priority_fee_gwei: 2,
        }
    }
}

impl FeeSettings {
    pub fn baseline(&self) -> FeeCaps {
        FeeCaps::from_gwei(self.max_fee_gwei, self.max_priority_fee_gwei)
    }
}

impl Default for ContractAddresses {
    fn default() -> Self {
        Self {
            token: address("78ac5e2d8a78a8b8e6d10c7b7274b03c10c91cef"),
            faucet: address("50576285bd33261dee1ad99bf766cd8249520a58"),
            router: address("de897635870b3dd2e097c09f1cd08841dbc3976a"),
            spender: address("9a88d07850723267db386c681646217af7e220d7"),
        }
    }
}

impl Default for TradingPair {
    fn default() -> Self {
        Self {
            name: "AAPL_USDT".to_owned(),
            index: 6004,
        }
    }
}

#[allow(clippy::expect_used)]
impl Default for TraderSettings {
    fn default() -> Self {
        Self {
            rpc_url: Url::parse(DEFAULT_RPC_URL).expect("default rpc url is valid"),
            chain_id: DEFAULT_CHAIN_ID,
            proof_api_url: Url::parse(DEFAULT_PROOF_API_URL)
                .expect("default proof api url is valid"),
            wallet_file: PathBuf::from("wallet.txt"),
            max_concurrency: 10,
            task_timeout: Duration::from_secs(20 * 60),
            rounds: 1,
            round_cooldown: Duration::from_secs(3),
            contracts: ContractAddresses::default(),
            pairs: vec![TradingPair::default()],
            fees: FeeSettings::default(),
            tracing: TracingConfig::default(),
        }
    }
}

impl TraderSettings {
    /// Load settings from the config files and the environment.
    pub fn load() -> Result<Self> {
        let mut builder =
            Config::builder().add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false));

        let config_file_paths: Vec<String> = env::var("CONFIG_FILES")
            .map(|s| s.split(',').map(|s| s.trim().to_owned()).collect())
            .unwrap_or_default();

        for path in config_file_paths.iter().filter(|p| !p.is_empty()) {
            let p = PathBuf::from(path);
            if !p.exists() {
                bail!("Provided config path via CONFIG_FILES does not exist ({p:?})");
            } else if !p.is_file() {
                bail!("Provided config path via CONFIG_FILES is not a file ({p:?})");
            } else if p.extension() != Some("json".as_ref()) {
                bail!("Provided config path via CONFIG_FILES is of an unsupported type ({p:?})");
            }
            builder = builder.add_source(File::from(p));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to load config sources")?
            .try_deserialize::<Self>()
            .context("Config deserialization error")?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            bail!("max_concurrency must be at least 1");
        }
        if self.rounds == 0 {
            bail!("rounds must be at least 1");
        }
        if self.pairs.is_empty() {
            bail!("at least one trading pair must be configured");
        }
        if self.task_timeout.is_zero() {
            bail!("task_timeout must be positive");
        }
        Ok(())
    }
}

#[allow(clippy::expect_used)]
fn address(hex: &str) -> Address {
    hex.parse().expect("hardcoded address is valid")
}

fn human_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn defaults_target_the_public_testnet() {
        let settings = TraderSettings::default();

        assert_eq!(settings.chain_id, 688688);
        assert_eq!(settings.task_timeout, Duration::from_secs(1200));
        assert_eq!(settings.pairs, vec![TradingPair::default()]);
        assert_eq!(settings.fees.baseline(), FeeCaps::from_gwei(5, 2));
        settings.validate().unwrap();
    }

    #[test]
    fn partial_json_overrides_defaults() {
        let settings: TraderSettings = serde_json::from_str(
            r#"{
                "max_concurrency": 3,
                "task_timeout": "90s",
                "round_cooldown": "1m 30s",
                "pairs": [{ "name": "TSLA_USDT", "index": 6005 }],
                "fees": { "max_fee_gwei": 8 }
            }"#,
        )
        .unwrap();

        assert_eq!(settings.max_concurrency, 3);
        assert_eq!(settings.task_timeout, Duration::from_secs(90));
        assert_eq!(settings.round_cooldown, Duration::from_secs(90));
        assert_eq!(settings.pairs[0].index, 6005);
        assert_eq!(settings.fees.max_fee_gwei, 8);
        assert_eq!(settings.fees.max_priority_fee_gwei, 2);
        assert_eq!(settings.contracts, ContractAddresses::default());
    }

    #[test]
    fn invalid_duration_is_rejected() {
        let result = serde_json::from_str::<TraderSettings>(r#"{ "task_timeout": "soon" }"#);
        assert!(result.is_err());
    }

    #[test]
    fn environment_overrides_config_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overrides.json");
        fs::write(
            &path,
            r#"{ "rounds": 2, "max_concurrency": 8, "round_cooldown": "1s" }"#,
        )
        .unwrap();

        env::set_var("CONFIG_FILES", &path);
        env::set_var("TRADER_MAX_CONCURRENCY", "3");
        env::set_var("TRADER_TASK_TIMEOUT", "90s");
        env::set_var("TRADER_FEES__MAX_FEE_GWEI", "7");
        let settings = TraderSettings::load();
        for key in [
            "CONFIG_FILES",
            "TRADER_MAX_CONCURRENCY",
            "TRADER_TASK_TIMEOUT",
            "TRADER_FEES__MAX_FEE_GWEI",
        ] {
            env::remove_var(key);
        }
        let settings = settings.unwrap();

        assert_eq!(settings.rounds, 2);
        assert_eq!(settings.round_cooldown, Duration::from_secs(1));
        assert_eq!(settings.max_concurrency, 3);
        assert_eq!(settings.task_timeout, Duration::from_secs(90));
        assert_eq!(settings.fees.max_fee_gwei, 7);
        assert_eq!(settings.fees.max_priority_fee_gwei, 2);
    }

    #[test]
    fn validation_rejects_degenerate_runs() {
        let mut settings = TraderSettings {
            max_concurrency: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        settings.max_concurrency = 1;
        settings.rounds = 0;
        assert!(settings.validate().is_err());

        settings.rounds = 1;
        settings.pairs.clear();
        assert!(settings.validate().is_err());
    }
}
