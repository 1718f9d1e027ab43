//! Action service: submit user mutations and settle their effects
//!
//! Every action follows the same shape: require a connected account,
//! resolve the entity, precheck, submit, journal the outcome. On success
//! the (entity, account) cache key is invalidated so the next read
//! observes the new on-chain state; on failure the cache stays untouched.

use crate::domain::action::{
    ActionEvent, ActionKind, AnalyticsSink, PendingAction, TxReceipt, TxSender,
};
use crate::domain::cache::{snapshot_key, SnapshotCache};
use crate::domain::entity::EntityConfig;
use crate::domain::reader::FactReader;
use crate::shared::errors::ActionError;
use crate::shared::types::Amount;
use crate::shared::utils::{with_read_policy, ReadKind, ReadPolicy};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

pub struct ActionService {
    entities: Vec<EntityConfig>,
    reader: Arc<dyn FactReader>,
    sender: Arc<dyn TxSender>,
    cache: SnapshotCache,
    analytics: Arc<dyn AnalyticsSink>,
    read_policy: ReadPolicy,
    journal: Arc<RwLock<Vec<PendingAction>>>,
}

impl ActionService {
    pub fn new(
        entities: Vec<EntityConfig>,
        reader: Arc<dyn FactReader>,
        sender: Arc<dyn TxSender>,
        cache: SnapshotCache,
        analytics: Arc<dyn AnalyticsSink>,
        read_policy: ReadPolicy,
    ) -> Self {
        Self {
            entities,
            reader,
            sender,
            cache,
            analytics,
            read_policy,
            journal: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn journal(&self) -> Vec<PendingAction> {
        self.journal.read().await.clone()
    }

    pub async fn approve(
        &self,
        entity_id: &str,
        account: Option<&str>,
        token: &str,
    ) -> Result<TxReceipt, ActionError> {
        let account = account.ok_or(ActionError::NoAccount)?;
        let entity = self.entity(entity_id)?.clone();

        let record = self
            .journal_submit(ActionKind::Approve, entity_id, account, None, Some(token))
            .await;
        let result = self.sender.approve(&entity, account, token).await;
        self.settle(record, account, result).await
    }

    /// `amount: None` deposits the full wallet balance; `via_token` routes
    /// a non-stake asset through the zap router
    pub async fn deposit(
        &self,
        entity_id: &str,
        account: Option<&str>,
        amount: Option<Amount>,
        via_token: Option<&str>,
    ) -> Result<TxReceipt, ActionError> {
        let account = account.ok_or(ActionError::NoAccount)?;
        let entity = self.entity(entity_id)?.clone();

        let token = via_token.unwrap_or(&entity.stake_token.address).to_string();
        self.check_allowance(&entity, account, &token, amount.as_ref())
            .await?;

        let kind = if amount.is_some() {
            ActionKind::Deposit
        } else {
            ActionKind::DepositAll
        };
        let record = self
            .journal_submit(kind, entity_id, account, amount.as_ref(), via_token)
            .await;
        let result = self
            .sender
            .deposit(&entity, account, amount.as_ref(), via_token)
            .await;
        self.settle(record, account, result).await
    }

    /// `amount: None` withdraws the full position
    pub async fn withdraw(
        &self,
        entity_id: &str,
        account: Option<&str>,
        amount: Option<Amount>,
    ) -> Result<TxReceipt, ActionError> {
        let account = account.ok_or(ActionError::NoAccount)?;
        let entity = self.entity(entity_id)?.clone();

        let kind = if amount.is_some() {
            ActionKind::Withdraw
        } else {
            ActionKind::WithdrawAll
        };
        let record = self
            .journal_submit(kind, entity_id, account, amount.as_ref(), None)
            .await;
        let result = self.sender.withdraw(&entity, account, amount.as_ref()).await;
        self.settle(record, account, result).await
    }

    pub async fn harvest(
        &self,
        entity_id: &str,
        account: Option<&str>,
    ) -> Result<TxReceipt, ActionError> {
        let account = account.ok_or(ActionError::NoAccount)?;
        let entity = self.entity(entity_id)?.clone();

        let record = self
            .journal_submit(ActionKind::Harvest, entity_id, account, None, None)
            .await;
        let result = self.sender.harvest(&entity, account).await;
        self.settle(record, account, result).await
    }

    pub async fn compound(
        &self,
        entity_id: &str,
        account: Option<&str>,
    ) -> Result<TxReceipt, ActionError> {
        let account = account.ok_or(ActionError::NoAccount)?;
        let entity = self.entity(entity_id)?.clone();

        let record = self
            .journal_submit(ActionKind::Compound, entity_id, account, None, None)
            .await;
        let result = self.sender.compound(&entity, account).await;
        self.settle(record, account, result).await
    }

    /// Harvest every entity where rewards are pending. Entities with
    /// nothing to claim (or unreadable rewards) are skipped, not failed.
    pub async fn harvest_all(&self, account: Option<&str>) -> Result<Vec<TxReceipt>, ActionError> {
        let account = account.ok_or(ActionError::NoAccount)?;

        let mut receipts = Vec::new();
        for entity in self.entities.clone() {
            let label = format!("{}:rewards", entity.id);
            let pending = with_read_policy(&self.read_policy, ReadKind::Entity, &label, || {
                self.reader.rewards_earned(&entity, account)
            })
            .await;
            let pending = match pending {
                Ok(amount) => amount,
                Err(err) => {
                    warn!("skipping {} in harvest-all: {}", entity.id, err);
                    continue;
                }
            };
            if pending.is_zero() {
                continue;
            }

            let record = self
                .journal_submit(ActionKind::Harvest, &entity.id, account, None, None)
                .await;
            let result = self.sender.harvest(&entity, account).await;
            receipts.push(self.settle(record, account, result).await?);
        }

        info!("🌾 harvest-all claimed rewards from {} entities", receipts.len());
        Ok(receipts)
    }

    fn entity(&self, entity_id: &str) -> Result<&EntityConfig, ActionError> {
        self.entities
            .iter()
            .find(|e| e.id == entity_id)
            .ok_or_else(|| ActionError::UnknownEntity(entity_id.to_string()))
    }

    /// A failed or zero allowance read both count as not approved.
    /// All-in deposits must be covered for the wallet balance they will
    /// actually move, not just a dust allowance.
    async fn check_allowance(
        &self,
        entity: &EntityConfig,
        account: &str,
        token: &str,
        amount: Option<&Amount>,
    ) -> Result<(), ActionError> {
        let spender = entity.spender_for(token);
        let label = format!("{}:allowance:{}", entity.id, token);
        let allowance = with_read_policy(&self.read_policy, ReadKind::Entity, &label, || {
            self.reader.allowance(account, token, spender)
        })
        .await
        .unwrap_or(0);

        let needed = match amount {
            Some(amount) => amount.value,
            None => {
                let label = format!("{}:balance:{}", entity.id, token);
                let balance = with_read_policy(&self.read_policy, ReadKind::Entity, &label, || {
                    self.reader.wallet_balance(account, token)
                })
                .await
                .map(|b| b.value)
                .unwrap_or(0);
                balance.max(1)
            }
        };

        if (allowance as u128) < needed {
            return Err(ActionError::AllowanceInsufficient(token.to_string()));
        }
        Ok(())
    }

    async fn journal_submit(
        &self,
        kind: ActionKind,
        entity_id: &str,
        account: &str,
        amount: Option<&Amount>,
        token: Option<&str>,
    ) -> PendingAction {
        let record = PendingAction::submitted(kind, entity_id, account, amount, token);
        self.journal.write().await.push(record.clone());
        record
    }

    async fn settle(
        &self,
        record: PendingAction,
        account: &str,
        result: Result<TxReceipt, ActionError>,
    ) -> Result<TxReceipt, ActionError> {
        let (settled, event) = match &result {
            Ok(receipt) => (
                record.clone().succeed(),
                ActionEvent {
                    kind: record.kind,
                    entity_id: record.entity_id.clone(),
                    success: true,
                    tx_id: Some(receipt.tx_id.clone()),
                },
            ),
            Err(err) => (
                record.clone().fail(err),
                ActionEvent {
                    kind: record.kind,
                    entity_id: record.entity_id.clone(),
                    success: false,
                    tx_id: None,
                },
            ),
        };

        self.journal_update(settled).await;

        // invalidation happens only after a confirmed transaction
        if result.is_ok() {
            self.cache
                .invalidate(&snapshot_key(&record.entity_id, Some(account)))
                .await;
        }

        let analytics = self.analytics.clone();
        tokio::spawn(async move {
            analytics.record(event).await;
        });

        result
    }

    async fn journal_update(&self, settled: PendingAction) {
        let id: Uuid = settled.id;
        let mut journal = self.journal.write().await;
        if let Some(entry) = journal.iter_mut().find(|entry| entry.id == id) {
            *entry = settled;
        }
    }
}
