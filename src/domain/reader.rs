//! On-chain fact reader interface
//!
//! Each query is independent; the orchestrator issues them concurrently and
//! decides what a failure means (substitution, omission, staleness).
//! Implementations live in the infrastructure layer.

use crate::domain::entity::{EntityConfig, FarmState};
use crate::shared::errors::ReadError;
use crate::shared::types::Amount;
use async_trait::async_trait;

#[async_trait]
pub trait FactReader: Send + Sync {
    /// Primary entity state query: total stake-token balance held by the
    /// entity. Failure here is the only thing that counts as
    /// `EntityUnreachable`.
    async fn total_staked(&self, entity: &EntityConfig) -> Result<Amount, ReadError>;

    /// Allocation weights, emission rate and active flag from the farm
    /// backing this entity
    async fn farm_state(&self, entity: &EntityConfig) -> Result<FarmState, ReadError>;

    /// Account's shares (share-based) or raw staked amount (direct-stake)
    async fn user_shares(&self, entity: &EntityConfig, account: &str)
        -> Result<Amount, ReadError>;

    /// Stake-token value of one full share; meaningful for share-based
    /// entities only
    async fn price_per_share(&self, entity: &EntityConfig) -> Result<f64, ReadError>;

    /// Rewards accrued and not yet harvested
    async fn rewards_earned(
        &self,
        entity: &EntityConfig,
        account: &str,
    ) -> Result<Amount, ReadError>;

    /// Raw allowance granted by `owner` on `token` toward `spender`
    async fn allowance(&self, owner: &str, token: &str, spender: &str)
        -> Result<u64, ReadError>;

    /// Account's wallet balance of `token`
    async fn wallet_balance(&self, account: &str, token: &str) -> Result<Amount, ReadError>;
}
