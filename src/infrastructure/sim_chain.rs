//! In-memory chain backend
//!
//! Holds entity balances, farm allocations, prices, allowances and wallet
//! state behind the same traits a live RPC backend would implement. Fault
//! injection (`fail_entity`, `fail_price`, `fail_token_reads`, `reject_tx`)
//! drives the degraded-read and rejected-action paths.

use crate::domain::action::{TxReceipt, TxSender};
use crate::domain::entity::{EntityConfig, EntityKind, FarmState, PairReserves};
use crate::domain::price::{PairSource, PriceSource};
use crate::domain::reader::FactReader;
use crate::shared::errors::{ActionError, ReadError};
use crate::shared::types::{Amount, TokenInfo};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

#[derive(Default)]
struct SimState {
    // entity id keyed
    staked: HashMap<String, Amount>,
    farms: HashMap<String, FarmState>,
    price_per_share: HashMap<String, f64>,
    // token address keyed
    prices: HashMap<String, f64>,
    pairs: HashMap<String, PairReserves>,
    // account scoped
    shares: HashMap<(String, String), Amount>,
    rewards: HashMap<(String, String), Amount>,
    balances: HashMap<(String, String), Amount>,
    allowances: HashMap<(String, String, String), u64>,
    // fault injection
    unreachable_entities: HashSet<String>,
    failed_prices: HashSet<String>,
    failed_tokens: HashSet<String>,
    reject_tx: bool,
}

#[derive(Clone, Default)]
pub struct SimChain {
    state: Arc<RwLock<SimState>>,
}

impl SimChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_entity(&self, entity: &EntityConfig, staked: Amount, farm: FarmState) {
        let mut state = self.state.write().await;
        state.staked.insert(entity.id.clone(), staked);
        state.farms.insert(entity.id.clone(), farm);
    }

    pub async fn set_price(&self, token: &str, price: f64) {
        let mut state = self.state.write().await;
        state.prices.insert(token.to_string(), price);
        state.failed_prices.remove(token);
    }

    pub async fn set_pair(
        &self,
        pair_address: &str,
        reserve0: Amount,
        reserve1: Amount,
        total_supply: Amount,
    ) {
        self.state.write().await.pairs.insert(
            pair_address.to_string(),
            PairReserves { reserve0, reserve1, total_supply },
        );
    }

    pub async fn set_price_per_share(&self, entity_id: &str, pps: f64) {
        self.state
            .write()
            .await
            .price_per_share
            .insert(entity_id.to_string(), pps);
    }

    pub async fn set_shares(&self, entity_id: &str, account: &str, shares: Amount) {
        self.state
            .write()
            .await
            .shares
            .insert((entity_id.to_string(), account.to_string()), shares);
    }

    pub async fn set_rewards(&self, entity_id: &str, account: &str, rewards: Amount) {
        self.state
            .write()
            .await
            .rewards
            .insert((entity_id.to_string(), account.to_string()), rewards);
    }

    pub async fn set_balance(&self, account: &str, token: &str, balance: Amount) {
        self.state
            .write()
            .await
            .balances
            .insert((account.to_string(), token.to_string()), balance);
    }

    pub async fn set_allowance(&self, owner: &str, token: &str, spender: &str, allowance: u64) {
        self.state.write().await.allowances.insert(
            (owner.to_string(), token.to_string(), spender.to_string()),
            allowance,
        );
    }

    /// All reads against this entity start failing with `EntityUnreachable`
    pub async fn fail_entity(&self, entity_id: &str) {
        self.state
            .write()
            .await
            .unreachable_entities
            .insert(entity_id.to_string());
    }

    pub async fn fail_price(&self, token: &str) {
        self.state
            .write()
            .await
            .failed_prices
            .insert(token.to_string());
    }

    /// Allowance and balance reads for this token start failing
    pub async fn fail_token_reads(&self, token: &str) {
        self.state
            .write()
            .await
            .failed_tokens
            .insert(token.to_string());
    }

    /// All submitted transactions are rejected until cleared
    pub async fn reject_transactions(&self, reject: bool) {
        self.state.write().await.reject_tx = reject;
    }

    fn check_reachable(state: &SimState, entity: &EntityConfig) -> Result<(), ReadError> {
        if state.unreachable_entities.contains(&entity.id) {
            return Err(ReadError::EntityUnreachable(format!(
                "no response from {}",
                entity.address
            )));
        }
        Ok(())
    }

    fn check_submittable(state: &SimState) -> Result<(), ActionError> {
        if state.reject_tx {
            return Err(ActionError::TransactionRejected(
                "user rejected signature".into(),
            ));
        }
        Ok(())
    }

    fn receipt() -> TxReceipt {
        TxReceipt {
            tx_id: Uuid::new_v4().to_string(),
        }
    }
}

#[async_trait]
impl FactReader for SimChain {
    async fn total_staked(&self, entity: &EntityConfig) -> Result<Amount, ReadError> {
        let state = self.state.read().await;
        Self::check_reachable(&state, entity)?;
        Ok(state
            .staked
            .get(&entity.id)
            .cloned()
            .unwrap_or_else(|| Amount::zero(entity.stake_token.decimals)))
    }

    async fn farm_state(&self, entity: &EntityConfig) -> Result<FarmState, ReadError> {
        let state = self.state.read().await;
        Self::check_reachable(&state, entity)?;
        Ok(state.farms.get(&entity.id).cloned().unwrap_or_default())
    }

    async fn user_shares(
        &self,
        entity: &EntityConfig,
        account: &str,
    ) -> Result<Amount, ReadError> {
        let state = self.state.read().await;
        Self::check_reachable(&state, entity)?;
        Ok(state
            .shares
            .get(&(entity.id.clone(), account.to_string()))
            .cloned()
            .unwrap_or_else(|| Amount::zero(entity.stake_token.decimals)))
    }

    async fn price_per_share(&self, entity: &EntityConfig) -> Result<f64, ReadError> {
        let state = self.state.read().await;
        Self::check_reachable(&state, entity)?;
        Ok(state.price_per_share.get(&entity.id).copied().unwrap_or(1.0))
    }

    async fn rewards_earned(
        &self,
        entity: &EntityConfig,
        account: &str,
    ) -> Result<Amount, ReadError> {
        let state = self.state.read().await;
        Self::check_reachable(&state, entity)?;
        Ok(state
            .rewards
            .get(&(entity.id.clone(), account.to_string()))
            .cloned()
            .unwrap_or_else(|| Amount::zero(entity.reward_token.decimals)))
    }

    async fn allowance(
        &self,
        owner: &str,
        token: &str,
        spender: &str,
    ) -> Result<u64, ReadError> {
        let state = self.state.read().await;
        if state.failed_tokens.contains(token) {
            return Err(ReadError::EntityUnreachable(format!(
                "token contract {} not responding",
                token
            )));
        }
        Ok(state
            .allowances
            .get(&(owner.to_string(), token.to_string(), spender.to_string()))
            .copied()
            .unwrap_or(0))
    }

    async fn wallet_balance(&self, account: &str, token: &str) -> Result<Amount, ReadError> {
        let state = self.state.read().await;
        if state.failed_tokens.contains(token) {
            return Err(ReadError::EntityUnreachable(format!(
                "token contract {} not responding",
                token
            )));
        }
        Ok(state
            .balances
            .get(&(account.to_string(), token.to_string()))
            .cloned()
            .unwrap_or_else(|| Amount::zero(18)))
    }
}

#[async_trait]
impl PriceSource for SimChain {
    async fn spot_price(&self, token: &TokenInfo) -> Result<f64, ReadError> {
        let state = self.state.read().await;
        if state.failed_prices.contains(&token.address) {
            return Err(ReadError::PriceUnavailable(format!(
                "no feed for {}",
                token.symbol
            )));
        }
        state
            .prices
            .get(&token.address)
            .copied()
            .ok_or_else(|| ReadError::PriceUnavailable(format!("no feed for {}", token.symbol)))
    }
}

#[async_trait]
impl PairSource for SimChain {
    async fn pair_reserves(&self, pair_address: &str) -> Result<PairReserves, ReadError> {
        let state = self.state.read().await;
        state
            .pairs
            .get(pair_address)
            .cloned()
            .ok_or_else(|| ReadError::EntityUnreachable(format!("pair {} not found", pair_address)))
    }
}

#[async_trait]
impl TxSender for SimChain {
    async fn approve(
        &self,
        entity: &EntityConfig,
        account: &str,
        token: &str,
    ) -> Result<TxReceipt, ActionError> {
        let mut state = self.state.write().await;
        Self::check_submittable(&state)?;

        let spender = entity.spender_for(token).to_string();
        state.allowances.insert(
            (account.to_string(), token.to_string(), spender),
            u64::MAX,
        );
        info!("✅ approved {} for {} on {}", token, account, entity.id);
        Ok(Self::receipt())
    }

    async fn deposit(
        &self,
        entity: &EntityConfig,
        account: &str,
        amount: Option<&Amount>,
        via_token: Option<&str>,
    ) -> Result<TxReceipt, ActionError> {
        let mut state = self.state.write().await;
        Self::check_submittable(&state)?;

        let token = via_token.unwrap_or(&entity.stake_token.address).to_string();
        let balance_key = (account.to_string(), token.clone());
        let wallet = state
            .balances
            .get(&balance_key)
            .cloned()
            .unwrap_or_else(|| Amount::zero(entity.stake_token.decimals));

        let moved = match amount {
            Some(amount) => amount.clone(),
            None => wallet.clone(),
        };
        if moved.value > wallet.value {
            return Err(ActionError::TransactionRejected(format!(
                "insufficient balance of {}",
                token
            )));
        }

        state
            .balances
            .insert(balance_key, Amount::new(wallet.value - moved.value, wallet.decimals));

        // zap deposits convert one-for-one in the simulation
        let pps = match entity.kind {
            EntityKind::ShareBased => {
                state.price_per_share.get(&entity.id).copied().unwrap_or(1.0)
            }
            EntityKind::DirectStake { .. } => 1.0,
        };
        let minted = Amount::from_units(moved.to_units() / pps, entity.stake_token.decimals);

        let share_key = (entity.id.clone(), account.to_string());
        let shares = state
            .shares
            .entry(share_key)
            .or_insert_with(|| Amount::zero(entity.stake_token.decimals));
        shares.value += minted.value;

        let staked = state
            .staked
            .entry(entity.id.clone())
            .or_insert_with(|| Amount::zero(entity.stake_token.decimals));
        staked.value += moved.value;

        info!("✅ deposited {} into {}", moved.to_units(), entity.id);
        Ok(Self::receipt())
    }

    async fn withdraw(
        &self,
        entity: &EntityConfig,
        account: &str,
        amount: Option<&Amount>,
    ) -> Result<TxReceipt, ActionError> {
        let mut state = self.state.write().await;
        Self::check_submittable(&state)?;

        let share_key = (entity.id.clone(), account.to_string());
        let held = state
            .shares
            .get(&share_key)
            .cloned()
            .unwrap_or_else(|| Amount::zero(entity.stake_token.decimals));

        let burned = match amount {
            Some(amount) => amount.clone(),
            None => held.clone(),
        };
        if burned.value > held.value {
            return Err(ActionError::TransactionRejected(
                "withdraw exceeds position".into(),
            ));
        }

        state
            .shares
            .insert(share_key, Amount::new(held.value - burned.value, held.decimals));

        let pps = state.price_per_share.get(&entity.id).copied().unwrap_or(1.0);
        let released = Amount::from_units(burned.to_units() * pps, entity.stake_token.decimals);

        if let Some(staked) = state.staked.get_mut(&entity.id) {
            staked.value = staked.value.saturating_sub(released.value);
        }

        let balance_key = (account.to_string(), entity.stake_token.address.clone());
        let wallet = state
            .balances
            .entry(balance_key)
            .or_insert_with(|| Amount::zero(entity.stake_token.decimals));
        wallet.value += released.value;

        info!("✅ withdrew {} from {}", released.to_units(), entity.id);
        Ok(Self::receipt())
    }

    async fn harvest(
        &self,
        entity: &EntityConfig,
        account: &str,
    ) -> Result<TxReceipt, ActionError> {
        let mut state = self.state.write().await;
        Self::check_submittable(&state)?;

        let reward_key = (entity.id.clone(), account.to_string());
        let earned = state
            .rewards
            .remove(&reward_key)
            .unwrap_or_else(|| Amount::zero(entity.reward_token.decimals));

        let balance_key = (account.to_string(), entity.reward_token.address.clone());
        let wallet = state
            .balances
            .entry(balance_key)
            .or_insert_with(|| Amount::zero(entity.reward_token.decimals));
        wallet.value += earned.value;

        info!("✅ harvested {} {} from {}", earned.to_units(), entity.reward_token.symbol, entity.id);
        Ok(Self::receipt())
    }

    async fn compound(
        &self,
        entity: &EntityConfig,
        account: &str,
    ) -> Result<TxReceipt, ActionError> {
        let mut state = self.state.write().await;
        Self::check_submittable(&state)?;

        let reward_key = (entity.id.clone(), account.to_string());
        let earned = state
            .rewards
            .remove(&reward_key)
            .unwrap_or_else(|| Amount::zero(entity.reward_token.decimals));

        let staked = state
            .staked
            .entry(entity.id.clone())
            .or_insert_with(|| Amount::zero(entity.stake_token.decimals));
        staked.value += earned.value;

        let share_key = (entity.id.clone(), account.to_string());
        let shares = state
            .shares
            .entry(share_key)
            .or_insert_with(|| Amount::zero(entity.stake_token.decimals));
        shares.value += earned.value;

        info!("✅ compounded {} into {}", earned.to_units(), entity.id);
        Ok(Self::receipt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::types::TokenInfo;

    fn token(address: &str) -> TokenInfo {
        TokenInfo {
            address: address.to_string(),
            symbol: address.trim_start_matches("0x").to_string(),
            decimals: 18,
        }
    }

    fn vault() -> EntityConfig {
        EntityConfig {
            id: "vault-a".into(),
            address: "0xVAULT".into(),
            kind: EntityKind::ShareBased,
            stake_token: token("0xSTK"),
            pairs: Vec::new(),
            reward_token: token("0xRWD"),
            farm_address: None,
            zap_address: None,
        }
    }

    #[tokio::test]
    async fn test_deposit_moves_wallet_balance_into_position() {
        let sim = SimChain::new();
        let entity = vault();
        sim.seed_entity(&entity, Amount::zero(18), FarmState::default())
            .await;
        sim.set_balance("0xME", "0xSTK", Amount::from_units(10.0, 18))
            .await;

        sim.deposit(&entity, "0xME", Some(&Amount::from_units(4.0, 18)), None)
            .await
            .unwrap();

        assert_eq!(
            sim.wallet_balance("0xME", "0xSTK").await.unwrap().to_units(),
            6.0
        );
        assert_eq!(
            sim.user_shares(&entity, "0xME").await.unwrap().to_units(),
            4.0
        );
        assert_eq!(sim.total_staked(&entity).await.unwrap().to_units(), 4.0);
    }

    #[tokio::test]
    async fn test_deposit_all_uses_full_wallet_balance() {
        let sim = SimChain::new();
        let entity = vault();
        sim.seed_entity(&entity, Amount::zero(18), FarmState::default())
            .await;
        sim.set_balance("0xME", "0xSTK", Amount::from_units(10.0, 18))
            .await;

        sim.deposit(&entity, "0xME", None, None).await.unwrap();

        assert!(sim.wallet_balance("0xME", "0xSTK").await.unwrap().is_zero());
        assert_eq!(
            sim.user_shares(&entity, "0xME").await.unwrap().to_units(),
            10.0
        );
    }

    #[tokio::test]
    async fn test_withdraw_respects_price_per_share() {
        let sim = SimChain::new();
        let entity = vault();
        sim.seed_entity(&entity, Amount::from_units(100.0, 18), FarmState::default())
            .await;
        sim.set_price_per_share("vault-a", 2.0).await;
        sim.set_shares("vault-a", "0xME", Amount::from_units(5.0, 18))
            .await;

        sim.withdraw(&entity, "0xME", None).await.unwrap();

        // 5 shares at pps 2.0 release 10 stake tokens
        assert_eq!(
            sim.wallet_balance("0xME", "0xSTK").await.unwrap().to_units(),
            10.0
        );
        assert!(sim.user_shares(&entity, "0xME").await.unwrap().is_zero());
    }

    #[tokio::test]
    async fn test_rejected_transactions_leave_state_untouched() {
        let sim = SimChain::new();
        let entity = vault();
        sim.seed_entity(&entity, Amount::zero(18), FarmState::default())
            .await;
        sim.set_balance("0xME", "0xSTK", Amount::from_units(10.0, 18))
            .await;
        sim.reject_transactions(true).await;

        let result = sim.deposit(&entity, "0xME", None, None).await;
        assert!(matches!(result, Err(ActionError::TransactionRejected(_))));
        assert_eq!(
            sim.wallet_balance("0xME", "0xSTK").await.unwrap().to_units(),
            10.0
        );
    }

    #[tokio::test]
    async fn test_harvest_then_compound_accounting() {
        let sim = SimChain::new();
        let entity = vault();
        sim.seed_entity(&entity, Amount::from_units(10.0, 18), FarmState::default())
            .await;
        sim.set_rewards("vault-a", "0xME", Amount::from_units(3.0, 18))
            .await;

        sim.harvest(&entity, "0xME").await.unwrap();
        assert_eq!(
            sim.wallet_balance("0xME", "0xRWD").await.unwrap().to_units(),
            3.0
        );
        assert!(sim
            .rewards_earned(&entity, "0xME")
            .await
            .unwrap()
            .is_zero());

        sim.set_rewards("vault-a", "0xME", Amount::from_units(2.0, 18))
            .await;
        sim.compound(&entity, "0xME").await.unwrap();
        assert_eq!(sim.total_staked(&entity).await.unwrap().to_units(), 12.0);
    }
}
