//! Configuration management for the daily transaction runner
//!
//! Loads configuration from TOML files with environment variable substitution.

use crate::orchestrator::{PlanInputs, RunSettings};
use crate::tx::{TokenRef, TxRunnerConfig};

use anyhow::{Context, Result};
use ethers::types::{Address, U256};
use ethers::utils::{parse_units, ParseUnits};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "DAILY_RUNNER_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

lazy_static! {
    static ref ENV_VAR_PATTERN: Regex =
        Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("env var pattern is valid");
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub chain: ChainConfig,
    pub wallet: WalletConfig,
    pub run: RunConfig,
    pub contracts: ContractsConfig,
    pub tokens: Vec<TokenConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub rpc_url: String,
    pub explorer_tx_base: String,
    #[serde(default = "default_confirmations")]
    pub confirmations: usize,
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    #[serde(default = "default_priority_fee_wei")]
    pub priority_fee_wei: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    pub keystore_path: PathBuf,
    /// Environment variable holding the keystore password
    pub password_env: Option<String>,
    /// Secret file holding the keystore password, used when the env var is unset
    pub password_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    pub sink_address: String,
    /// Human-readable amount, scaled by `token_decimals`
    pub transfer_amount: String,
    #[serde(default = "default_token_decimals")]
    pub token_decimals: u8,
    #[serde(default = "default_currency")]
    pub expected_currency: String,
    /// Address of the configured token fees are paid in
    pub fee_token: String,
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContractsConfig {
    pub fee_manager: String,
    pub policy_registry: String,
    pub permit_registry: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub name: String,
    pub address: String,
}

fn default_confirmations() -> usize {
    1
}

fn default_confirmation_timeout_secs() -> u64 {
    120
}

fn default_priority_fee_wei() -> u64 {
    1_000_000_000
}

fn default_token_decimals() -> u8 {
    6
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("reports")
}

impl Settings {
    /// Load settings from `path`, else `DAILY_RUNNER_CONFIG`, else the default file
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => env::var(CONFIG_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH)),
        };

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::from_toml(&config_str)
    }

    /// Parse and validate a TOML document after environment substitution
    pub fn from_toml(input: &str) -> Result<Self> {
        let config_str = substitute_env_vars(input);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Checks every command needs: the chain and the wallet sections
    fn validate(&self) -> Result<()> {
        if self.chain.chain_id == 0 {
            anyhow::bail!("chain.chain_id must be > 0");
        }
        if self.chain.rpc_url.trim().is_empty() {
            anyhow::bail!("chain.rpc_url is empty");
        }
        if self.chain.confirmations == 0 {
            anyhow::bail!("chain.confirmations must be >= 1");
        }
        if self.wallet.keystore_path.as_os_str().is_empty() {
            anyhow::bail!("wallet.keystore_path is empty");
        }

        if self.wallet.password_env.is_none() && self.wallet.password_file.is_none() {
            tracing::warn!("wallet has neither password_env nor password_file configured");
        }

        Ok(())
    }

    /// Checks only the daily run needs: sink, amount, tokens and contracts
    pub fn validate_run(&self) -> Result<()> {
        if self.tokens.is_empty() {
            anyhow::bail!("At least one token must be configured");
        }

        self.sink()?;
        self.transfer_amount()?;
        self.tokens()?;
        self.fee_token()?;
        self.policy_registry()?;
        self.plan_inputs()?;

        Ok(())
    }

    pub fn sink(&self) -> Result<Address> {
        parse_address("run.sink_address", &self.run.sink_address)
    }

    /// Per-transfer amount in the token's smallest unit
    pub fn transfer_amount(&self) -> Result<U256> {
        let raw = self.run.transfer_amount.trim();
        let parsed = parse_units(raw, u32::from(self.run.token_decimals))
            .with_context(|| format!("run.transfer_amount is not a valid amount: {}", raw))?;
        let units = match parsed {
            ParseUnits::U256(units) => units,
            ParseUnits::I256(_) => {
                anyhow::bail!("run.transfer_amount must be > 0: received {}", raw)
            }
        };
        if units.is_zero() {
            anyhow::bail!("run.transfer_amount must be > 0: received {}", raw);
        }
        Ok(units)
    }

    pub fn tokens(&self) -> Result<Vec<TokenRef>> {
        self.tokens
            .iter()
            .map(|t| {
                let address = parse_address(&format!("tokens.{}", t.name), &t.address)?;
                Ok(TokenRef::new(t.name.clone(), address))
            })
            .collect()
    }

    /// The configured token whose address matches `run.fee_token`
    pub fn fee_token(&self) -> Result<TokenRef> {
        let address = parse_address("run.fee_token", &self.run.fee_token)?;
        self.tokens()?
            .into_iter()
            .find(|t| t.address == address)
            .with_context(|| format!("run.fee_token {:?} is not a configured token", address))
    }

    pub fn policy_registry(&self) -> Result<Address> {
        parse_address("contracts.policy_registry", &self.contracts.policy_registry)
    }

    pub fn run_settings(&self) -> Result<RunSettings> {
        Ok(RunSettings {
            chain_id: self.chain.chain_id,
            rpc_url: self.chain.rpc_url.clone(),
            sink: self.sink()?,
            fee_token: self.fee_token()?,
            expected_currency: self.run.expected_currency.clone(),
            token_decimals: self.run.token_decimals,
            runner: TxRunnerConfig {
                confirmations: self.chain.confirmations,
                confirmation_timeout: Duration::from_secs(self.chain.confirmation_timeout_secs),
                explorer_tx_base: self.chain.explorer_tx_base.clone(),
            },
        })
    }

    pub fn plan_inputs(&self) -> Result<PlanInputs> {
        Ok(PlanInputs {
            fee_manager: parse_address("contracts.fee_manager", &self.contracts.fee_manager)?,
            permit_registry: parse_address(
                "contracts.permit_registry",
                &self.contracts.permit_registry,
            )?,
            fee_token: self.fee_token()?,
            tokens: self.tokens()?,
            sink: self.sink()?,
            transfer_amount: self.transfer_amount()?,
        })
    }
}

fn parse_address(field: &str, value: &str) -> Result<Address> {
    value
        .trim()
        .parse::<Address>()
        .with_context(|| format!("{} is not a valid EVM address: {}", field, value))
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    ENV_VAR_PATTERN
        .replace_all(input, |caps: &regex::Captures| {
            env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}
