//! Tracked entities (vaults, farms, pools) and their refresh snapshots

use crate::domain::apr::Apr;
use crate::shared::types::{Amount, Reading, TokenInfo};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How an entity accounts user stake.
///
/// Direct-stake entities (farms, pools) track the raw staked amount per
/// account; share-based entities (vaults) issue shares priced by
/// price-per-full-share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    DirectStake { farm_pid: u64 },
    ShareBased,
}

/// Static registry facts for one tracked entity. Addresses come from the
/// upstream contract registry; the engine never embeds them itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityConfig {
    pub id: String,
    pub address: String,
    pub kind: EntityKind,
    pub stake_token: TokenInfo,
    /// Pair legs when the stake token is an LP token (empty otherwise)
    pub pairs: Vec<TokenInfo>,
    pub reward_token: TokenInfo,
    /// Masterchef-style farm backing a share-based vault
    pub farm_address: Option<String>,
    /// Zap router that converts other assets into the stake token
    pub zap_address: Option<String>,
}

impl EntityConfig {
    pub fn is_lp_stake(&self) -> bool {
        self.pairs.len() == 2
    }

    /// Tokens the entity (or its zap router) accepts for deposits
    pub fn accepted_tokens(&self) -> Vec<&TokenInfo> {
        let mut tokens = vec![&self.stake_token];
        if self.zap_address.is_some() {
            tokens.extend(self.pairs.iter());
        }
        tokens
    }

    /// Which contract must be approved to spend `token_address`.
    /// Non-stake tokens route through the zap router when one exists.
    pub fn spender_for(&self, token_address: &str) -> &str {
        match &self.zap_address {
            Some(zap) if token_address != self.stake_token.address => zap,
            _ => &self.address,
        }
    }
}

/// Reward-farm allocation state read on-chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FarmState {
    pub alloc_weight: u64,
    pub total_alloc_weight: u64,
    /// Reward-token units emitted per block, farm-wide
    pub emission_per_block: f64,
    /// Rewards accrue only while active; inactive entities report zero APR
    pub active: bool,
}

impl Default for FarmState {
    fn default() -> Self {
        Self {
            alloc_weight: 0,
            total_alloc_weight: 0,
            emission_per_block: 0.0,
            active: false,
        }
    }
}

/// AMM pair reserves used to derive an LP token price
#[derive(Debug, Clone, PartialEq)]
pub struct PairReserves {
    pub reserve0: Amount,
    pub reserve1: Amount,
    pub total_supply: Amount,
}

/// Account-scoped facts for one entity, as of the last read
#[derive(Debug, Clone, PartialEq)]
pub struct UserPosition {
    pub shares: Amount,
    /// 1.0 for direct-stake entities
    pub price_per_share: f64,
    /// shares × price-per-share, in stake-token units
    pub total_staked: f64,
    pub available_to_unstake: Amount,
    pub rewards_earned: Amount,
    /// Token addresses with non-zero allowance toward their spender
    pub approved_tokens: Vec<String>,
    pub has_approved_pool: bool,
    pub has_approved_zap: bool,
    pub has_wallet_balance: bool,
    pub has_staked: bool,
}

impl UserPosition {
    pub fn empty(stake_decimals: u8) -> Self {
        Self {
            shares: Amount::zero(stake_decimals),
            price_per_share: 1.0,
            total_staked: 0.0,
            available_to_unstake: Amount::zero(stake_decimals),
            rewards_earned: Amount::zero(stake_decimals),
            approved_tokens: Vec::new(),
            has_approved_pool: false,
            has_approved_zap: false,
            has_wallet_balance: false,
            has_staked: false,
        }
    }
}

/// Merged, read-only result of one refresh cycle for one (entity, account)
/// pair. Superseded by the next refresh, never mutated in place.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub entity_id: String,
    pub account: Option<String>,
    pub total_staked: Reading<Amount>,
    pub stake_token_price: Reading<Option<f64>>,
    pub reward_token_price: Reading<Option<f64>>,
    pub farm: Reading<FarmState>,
    pub apr: Apr,
    pub user: Option<UserPosition>,
    pub fetched_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn is_active(&self) -> bool {
        self.farm.value().active
    }

    /// Total value locked in reference currency, when the price is known
    pub fn tvl(&self) -> Option<f64> {
        self.stake_token_price
            .value()
            .map(|price| self.total_staked.value().to_units() * price)
    }

    /// True when any field carries a substituted last-known/default value
    pub fn has_stale_fields(&self) -> bool {
        self.total_staked.is_stale()
            || self.stake_token_price.is_stale()
            || self.reward_token_price.is_stale()
            || self.farm.is_stale()
    }

    /// Field-wise equality ignoring the fetch timestamp. Two refreshes with
    /// no intervening on-chain change must agree under this comparison.
    pub fn same_facts(&self, other: &Snapshot) -> bool {
        self.entity_id == other.entity_id
            && self.account == other.account
            && self.total_staked == other.total_staked
            && self.stake_token_price == other.stake_token_price
            && self.reward_token_price == other.reward_token_price
            && self.farm == other.farm
            && self.apr == other.apr
            && self.user == other.user
    }
}
