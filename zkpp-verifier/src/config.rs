//! Verifier configuration from environment variables.

use std::{env, path::PathBuf, sync::Arc, time::Duration};

use ethers::types::Address;
use thiserror::Error;

use crate::{
    circuits::{BindingPolicy, CircuitRegistry, ContractAddressBinding},
    metadata::{
        Clock, FreshnessWindow, LedgerError, MetadataValidator, ReplayLedger,
        DEFAULT_MAX_AGE_SECS, DEFAULT_MAX_FUTURE_SECS,
    },
    oracle::ProofOracle,
    verify::{Verifier, DEFAULT_CONTRACT_TIMEOUT, DEFAULT_ORACLE_TIMEOUT},
};

pub const ORIGIN_ENV: &str = "ZKPP_ORIGIN";
pub const MAX_AGE_ENV: &str = "ZKPP_MAX_AGE_SECS";
pub const FUTURE_SKEW_ENV: &str = "ZKPP_FUTURE_SKEW_SECS";
pub const REPLAY_DB_ENV: &str = "ZKPP_REPLAY_DB";
pub const RPC_URL_ENV: &str = "ZKPP_RPC_URL";
pub const ORACLE_TIMEOUT_ENV: &str = "ZKPP_ORACLE_TIMEOUT_MS";
pub const CONTRACT_TIMEOUT_ENV: &str = "ZKPP_CONTRACT_TIMEOUT_MS";
pub const ADDRESS_BINDING_ENV: &str = "ZKPP_ADDRESS_BINDING";
pub const BOUND_CONTRACT_ENV: &str = "ZKPP_BOUND_CONTRACT";
pub const NOW_OVERRIDE_ENV: &str = "ZKPP_NOW_OVERRIDE";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[derive(Clone, Debug)]
pub struct VerifierConfig {
    /// Origin of the verifying application; proofs must carry exactly this.
    pub origin: String,
    pub window: FreshnessWindow,
    /// Persist consumed nonces here instead of keeping them in memory.
    pub replay_db: Option<PathBuf>,
    pub rpc_url: Option<String>,
    pub oracle_timeout: Duration,
    pub contract_timeout: Duration,
    pub address_binding: BindingPolicy,
    /// Contract address the coinbase_kyc inputs must spell out, if any.
    pub bound_contract: Option<Address>,
    pub now_override: Option<i64>,
}

impl VerifierConfig {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            window: FreshnessWindow::default(),
            replay_db: None,
            rpc_url: None,
            oracle_timeout: DEFAULT_ORACLE_TIMEOUT,
            contract_timeout: DEFAULT_CONTRACT_TIMEOUT,
            address_binding: BindingPolicy::default(),
            bound_contract: None,
            now_override: None,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any key/value source; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let origin = get(ORIGIN_ENV).ok_or(ConfigError::Missing(ORIGIN_ENV))?;
        let mut config = Self::new(origin.trim());

        config.window = FreshnessWindow {
            max_age_secs: parse_or(get(MAX_AGE_ENV), MAX_AGE_ENV, DEFAULT_MAX_AGE_SECS)?,
            max_future_secs: parse_or(
                get(FUTURE_SKEW_ENV),
                FUTURE_SKEW_ENV,
                DEFAULT_MAX_FUTURE_SECS,
            )?,
        };
        config.replay_db = get(REPLAY_DB_ENV).map(PathBuf::from);
        config.rpc_url = get(RPC_URL_ENV);
        config.oracle_timeout = Duration::from_millis(parse_or(
            get(ORACLE_TIMEOUT_ENV),
            ORACLE_TIMEOUT_ENV,
            DEFAULT_ORACLE_TIMEOUT.as_millis() as u64,
        )?);
        config.contract_timeout = Duration::from_millis(parse_or(
            get(CONTRACT_TIMEOUT_ENV),
            CONTRACT_TIMEOUT_ENV,
            DEFAULT_CONTRACT_TIMEOUT.as_millis() as u64,
        )?);
        config.address_binding = parse_or(
            get(ADDRESS_BINDING_ENV),
            ADDRESS_BINDING_ENV,
            BindingPolicy::default(),
        )?;
        config.bound_contract = get(BOUND_CONTRACT_ENV)
            .map(|raw| parse(&raw, BOUND_CONTRACT_ENV))
            .transpose()?;
        config.now_override = get(NOW_OVERRIDE_ENV)
            .map(|raw| parse(&raw, NOW_OVERRIDE_ENV))
            .transpose()?;

        config.registry()?;
        Ok(config)
    }

    pub fn clock(&self) -> Clock {
        match self.now_override {
            Some(now) => Clock::Fixed(now),
            None => Clock::System,
        }
    }

    pub fn open_ledger(&self) -> Result<ReplayLedger, ConfigError> {
        match &self.replay_db {
            Some(path) => Ok(ReplayLedger::persistent(path)?),
            None => Ok(ReplayLedger::in_memory()),
        }
    }

    pub fn metadata_validator(&self) -> Result<MetadataValidator, ConfigError> {
        Ok(MetadataValidator::new(self.origin.clone(), self.open_ledger()?)
            .with_window(self.window)
            .with_clock(self.clock()))
    }

    /// Shipped circuits, with the contract-address binding applied to every
    /// circuit that exposes address slots. A bound contract that no circuit
    /// can carry is a configuration error.
    pub fn registry(&self) -> Result<CircuitRegistry, ConfigError> {
        let mut registry = CircuitRegistry::with_defaults();
        if let Some(address) = self.bound_contract {
            let binding = ContractAddressBinding::new(address, self.address_binding);
            if registry.bind_contract(&binding) == 0 {
                return Err(ConfigError::Invalid {
                    name: BOUND_CONTRACT_ENV,
                    reason: format!(
                        "no registered circuit carries a contract address \
                         in its public inputs (circuits: {})",
                        registry.ids().join(", ")
                    ),
                });
            }
        }
        Ok(registry)
    }

    pub fn build_verifier(&self, oracle: Arc<dyn ProofOracle>) -> Result<Verifier, ConfigError> {
        Ok(
            Verifier::new(self.registry()?, self.metadata_validator()?, oracle)
                .with_oracle_timeout(self.oracle_timeout)
                .with_contract_timeout(self.contract_timeout),
        )
    }
}

fn parse<T>(raw: &str, name: &'static str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
        name,
        reason: err.to_string(),
    })
}

fn parse_or<T>(raw: Option<String>, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => parse(&raw, name),
        None => Ok(default),
    }
}
