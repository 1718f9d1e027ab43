//! User-initiated mutations and their lifecycle records
//!
//! Mutations never change a snapshot directly: a successful transaction
//! invalidates the affected cache key and the next refresh observes the
//! new on-chain state. A failed transaction leaves the cache untouched.

use crate::shared::errors::ActionError;
use crate::shared::types::Amount;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    Approve,
    Deposit,
    DepositAll,
    Withdraw,
    WithdrawAll,
    Harvest,
    Compound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionStatus {
    /// Created but not yet submitted
    Idle,
    Pending,
    Success,
    Error,
}

/// Journal record for one submitted action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    pub id: Uuid,
    pub kind: ActionKind,
    pub entity_id: String,
    pub account: String,
    /// Human-readable amount; `None` for all-in and amount-less actions
    pub amount: Option<String>,
    /// Token the action moves or approves, when not the stake token
    pub token_address: Option<String>,
    pub status: ActionStatus,
    pub submitted_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl PendingAction {
    pub fn submitted(
        kind: ActionKind,
        entity_id: &str,
        account: &str,
        amount: Option<&Amount>,
        token_address: Option<&str>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            entity_id: entity_id.to_string(),
            account: account.to_string(),
            amount: amount.map(|a| format!("{}", a.to_units())),
            token_address: token_address.map(str::to_string),
            status: ActionStatus::Pending,
            submitted_at: Utc::now(),
            error: None,
        }
    }

    pub fn succeed(mut self) -> Self {
        self.status = ActionStatus::Success;
        self
    }

    pub fn fail(mut self, error: &ActionError) -> Self {
        self.status = ActionStatus::Error;
        self.error = Some(error.to_string());
        self
    }
}

/// Confirmation handle returned by the transaction layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_id: String,
}

/// Transaction submission seam. Implementations sign and submit; the
/// application layer owns prechecks, journaling and cache invalidation.
#[async_trait]
pub trait TxSender: Send + Sync {
    async fn approve(
        &self,
        entity: &crate::domain::entity::EntityConfig,
        account: &str,
        token: &str,
    ) -> Result<TxReceipt, ActionError>;

    /// `amount: None` means deposit the full wallet balance;
    /// `via_token` routes a non-stake asset through the zap router
    async fn deposit(
        &self,
        entity: &crate::domain::entity::EntityConfig,
        account: &str,
        amount: Option<&Amount>,
        via_token: Option<&str>,
    ) -> Result<TxReceipt, ActionError>;

    /// `amount: None` means withdraw the full position
    async fn withdraw(
        &self,
        entity: &crate::domain::entity::EntityConfig,
        account: &str,
        amount: Option<&Amount>,
    ) -> Result<TxReceipt, ActionError>;

    async fn harvest(
        &self,
        entity: &crate::domain::entity::EntityConfig,
        account: &str,
    ) -> Result<TxReceipt, ActionError>;

    /// Harvest and restake rewards in one transaction
    async fn compound(
        &self,
        entity: &crate::domain::entity::EntityConfig,
        account: &str,
    ) -> Result<TxReceipt, ActionError>;
}

/// Fire-and-forget action event for external sinks
#[derive(Debug, Clone, Serialize)]
pub struct ActionEvent {
    pub kind: ActionKind,
    pub entity_id: String,
    pub success: bool,
    pub tx_id: Option<String>,
}

/// Analytics delivery must never block or fail an action
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn record(&self, event: ActionEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        let action = PendingAction::submitted(
            ActionKind::Deposit,
            "vault-a",
            "0xME",
            Some(&Amount::from_units(2.5, 18)),
            None,
        );
        assert_eq!(action.status, ActionStatus::Pending);
        assert_eq!(action.amount.as_deref(), Some("2.5"));

        let done = action.clone().succeed();
        assert_eq!(done.status, ActionStatus::Success);
        assert!(done.error.is_none());

        let failed = action.fail(&ActionError::NoAccount);
        assert_eq!(failed.status, ActionStatus::Error);
        assert!(failed.error.unwrap().contains("no connected account"));
    }
}
