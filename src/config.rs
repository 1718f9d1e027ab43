use crate::domain::entity::{EntityConfig, EntityKind};
use crate::shared::errors::AppError;
use crate::shared::types::TokenInfo;
use crate::shared::utils::ReadPolicy;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;
use std::{fs, path::Path};

const SECONDS_PER_YEAR: f64 = 31_536_000.0;

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkCfg {
    /// External price API base URL; the simulated feed is used when unset
    pub price_api_url: Option<String>,
    pub read_timeout_ms: u64,
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainCfg {
    pub block_time_seconds: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshCfg {
    pub interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenCfg {
    pub address: String,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PairSeedCfg {
    pub reserve0_units: f64,
    pub reserve1_units: f64,
    pub total_supply_units: f64,
    pub leg0_price: f64,
    pub leg1_price: f64,
}

/// Initial simulated chain state for one entity
#[derive(Debug, Clone, Deserialize)]
pub struct SeedCfg {
    pub staked_units: f64,
    pub stake_price: Option<f64>,
    pub reward_price: Option<f64>,
    pub alloc_weight: u64,
    pub total_alloc_weight: u64,
    pub emission_per_block: f64,
    pub active: bool,
    pub price_per_share: Option<f64>,
    pub pair: Option<PairSeedCfg>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntityCfg {
    pub id: String,
    pub address: String,
    /// "vault" (share-based) or "farm" (direct-stake)
    pub kind: String,
    pub farm_pid: Option<u64>,
    pub stake_token: TokenCfg,
    pub pair_tokens: Option<Vec<TokenCfg>>,
    pub reward_token: TokenCfg,
    pub farm_address: Option<String>,
    pub zap_address: Option<String>,
    pub seed: Option<SeedCfg>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub network: NetworkCfg,
    pub chain: ChainCfg,
    pub refresh: RefreshCfg,
    pub entities: Vec<EntityCfg>,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path.as_ref())?;
        let cfg: Self = toml::from_str(&s).context("parse Config.toml")?;
        Ok(cfg)
    }

    pub fn read_policy(&self) -> ReadPolicy {
        ReadPolicy {
            timeout: Duration::from_millis(self.network.read_timeout_ms),
            attempts: self.network.retry_attempts,
            backoff: Duration::from_millis(self.network.retry_backoff_ms),
        }
    }

    pub fn blocks_per_year(&self) -> f64 {
        SECONDS_PER_YEAR / self.chain.block_time_seconds
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh.interval_ms)
    }

    /// Validated registry entries for the engine
    pub fn entity_configs(&self) -> Result<Vec<EntityConfig>, AppError> {
        self.entities.iter().map(entity_config).collect()
    }
}

fn token_info(cfg: &TokenCfg) -> TokenInfo {
    TokenInfo {
        address: cfg.address.clone(),
        symbol: cfg.symbol.clone(),
        decimals: cfg.decimals,
    }
}

fn entity_config(cfg: &EntityCfg) -> Result<EntityConfig, AppError> {
    let kind = match cfg.kind.as_str() {
        "vault" => EntityKind::ShareBased,
        "farm" => {
            let farm_pid = cfg.farm_pid.ok_or_else(|| {
                AppError::ConfigError(format!("entity {}: farm requires farm_pid", cfg.id))
            })?;
            EntityKind::DirectStake { farm_pid }
        }
        other => {
            return Err(AppError::ConfigError(format!(
                "entity {}: unknown kind '{}'",
                cfg.id, other
            )))
        }
    };

    let pairs: Vec<TokenInfo> = cfg
        .pair_tokens
        .as_deref()
        .unwrap_or(&[])
        .iter()
        .map(token_info)
        .collect();
    if !pairs.is_empty() && pairs.len() != 2 {
        return Err(AppError::ConfigError(format!(
            "entity {}: LP stake tokens need exactly two pair legs",
            cfg.id
        )));
    }

    Ok(EntityConfig {
        id: cfg.id.clone(),
        address: cfg.address.clone(),
        kind,
        stake_token: token_info(&cfg.stake_token),
        pairs,
        reward_token: token_info(&cfg.reward_token),
        farm_address: cfg.farm_address.clone(),
        zap_address: cfg.zap_address.clone(),
    })
}
