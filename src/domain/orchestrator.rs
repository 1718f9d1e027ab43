//! Entity refresh orchestrator
//!
//! Sequences reader, oracle and calculator per entity, merges the results
//! into an immutable snapshot and hands it to the cache. Best-effort merge:
//! a failed read substitutes the last-known (or default) value marked
//! `Stale` and the refresh still completes. A stale price must never crash
//! the refresh of an otherwise-healthy entity.

use crate::domain::apr::compute_apr;
use crate::domain::cache::{snapshot_key, CacheLookup, SnapshotCache};
use crate::domain::entity::{EntityConfig, FarmState, Snapshot, UserPosition};
use crate::domain::price::PairAwareOracle;
use crate::domain::reader::FactReader;
use crate::shared::types::{Amount, Reading};
use crate::shared::utils::{with_read_policy, ReadKind, ReadPolicy};
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};

/// Chain and read-policy parameters for the refresh pipeline
#[derive(Debug, Clone)]
pub struct RefreshSettings {
    pub blocks_per_year: f64,
    pub read_policy: ReadPolicy,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            // 2-second block time
            blocks_per_year: 15_768_000.0,
            read_policy: ReadPolicy::default(),
        }
    }
}

pub struct RefreshOrchestrator {
    reader: Arc<dyn FactReader>,
    oracle: PairAwareOracle,
    cache: SnapshotCache,
    settings: RefreshSettings,
}

impl RefreshOrchestrator {
    pub fn new(
        reader: Arc<dyn FactReader>,
        oracle: PairAwareOracle,
        cache: SnapshotCache,
        settings: RefreshSettings,
    ) -> Self {
        Self { reader, oracle, cache, settings }
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    /// One full refresh cycle for (entity, account). Always returns a
    /// complete snapshot; substituted fields carry `Reading::Stale`.
    pub async fn refresh(&self, entity: &EntityConfig, account: Option<&str>) -> Snapshot {
        let key = snapshot_key(&entity.id, account);
        let previous = self.cache.last_known(&key).await;

        // base facts and prices are independent; fetch them concurrently
        let (base, prices) = tokio::join!(
            self.read_base(entity, previous.as_ref()),
            self.read_prices(entity, previous.as_ref())
        );
        let (total_staked, farm) = base;
        let (stake_token_price, reward_token_price) = prices;

        let farm_facts = farm.value();
        let apr = compute_apr(
            *stake_token_price.value(),
            *reward_token_price.value(),
            total_staked.value().to_units(),
            farm_facts.emission_per_block,
            self.settings.blocks_per_year,
            farm_facts.alloc_weight,
            farm_facts.total_alloc_weight,
            farm_facts.active,
        );

        let user = match account {
            Some(acct) => Some(self.read_user(entity, acct, previous.as_ref()).await),
            None => None,
        };

        let snapshot = Snapshot {
            entity_id: entity.id.clone(),
            account: account.map(str::to_string),
            total_staked,
            stake_token_price,
            reward_token_price,
            farm,
            apr,
            user,
            fetched_at: Utc::now(),
        };

        if snapshot.has_stale_fields() {
            debug!("entity {} refreshed with stale substitutions", entity.id);
        }

        self.cache.put(snapshot.clone()).await;
        snapshot
    }

    /// Refresh every entity concurrently. One entity's failure never
    /// affects another's snapshot.
    pub async fn refresh_all(
        &self,
        entities: &[EntityConfig],
        account: Option<&str>,
    ) -> Vec<Snapshot> {
        join_all(entities.iter().map(|entity| self.refresh(entity, account))).await
    }

    /// Serve from cache when fresh, otherwise re-run the refresh.
    /// Invalidated entries always trigger a new refresh.
    pub async fn snapshot_for(&self, entity: &EntityConfig, account: Option<&str>) -> Snapshot {
        let key = snapshot_key(&entity.id, account);
        match self.cache.get(&key).await {
            CacheLookup::Hit(snapshot) => snapshot,
            CacheLookup::StaleHit(_) | CacheLookup::Missing => {
                self.refresh(entity, account).await
            }
        }
    }

    async fn read_base(
        &self,
        entity: &EntityConfig,
        previous: Option<&Snapshot>,
    ) -> (Reading<Amount>, Reading<FarmState>) {
        let policy = &self.settings.read_policy;
        let staked_label = format!("{}:total_staked", entity.id);
        let farm_label = format!("{}:farm_state", entity.id);

        let (staked, farm) = tokio::join!(
            with_read_policy(policy, ReadKind::Entity, &staked_label, || {
                self.reader.total_staked(entity)
            }),
            with_read_policy(policy, ReadKind::Entity, &farm_label, || {
                self.reader.farm_state(entity)
            })
        );

        let staked = match staked {
            Ok(amount) => Reading::Fresh(amount),
            Err(err) => {
                warn!("entity {} primary read failed: {}", entity.id, err);
                Reading::Stale(
                    previous
                        .map(|p| p.total_staked.value().clone())
                        .unwrap_or_else(|| Amount::zero(entity.stake_token.decimals)),
                )
            }
        };

        let farm = match farm {
            Ok(state) => Reading::Fresh(state),
            Err(err) => {
                warn!("entity {} farm read failed: {}", entity.id, err);
                Reading::Stale(
                    previous.map(|p| p.farm.value().clone()).unwrap_or_default(),
                )
            }
        };

        (staked, farm)
    }

    async fn read_prices(
        &self,
        entity: &EntityConfig,
        previous: Option<&Snapshot>,
    ) -> (Reading<Option<f64>>, Reading<Option<f64>>) {
        let policy = &self.settings.read_policy;
        let stake_label = format!("{}:stake_price", entity.id);
        let reward_label = format!("{}:reward_price", entity.id);

        let (stake, reward) = tokio::join!(
            with_read_policy(policy, ReadKind::Price, &stake_label, || {
                self.oracle.stake_token_price(entity)
            }),
            with_read_policy(policy, ReadKind::Price, &reward_label, || {
                self.oracle.reward_token_price(entity)
            })
        );

        let stake = match stake {
            Ok(price) => Reading::Fresh(Some(price)),
            Err(err) => {
                warn!("entity {} stake-token price unavailable: {}", entity.id, err);
                Reading::Stale(previous.and_then(|p| *p.stake_token_price.value()))
            }
        };

        let reward = match reward {
            Ok(price) => Reading::Fresh(Some(price)),
            Err(err) => {
                warn!("entity {} reward-token price unavailable: {}", entity.id, err);
                Reading::Stale(previous.and_then(|p| *p.reward_token_price.value()))
            }
        };

        (stake, reward)
    }

    /// Account-scoped reads. Sub-queries are independent: a failed
    /// allowance check omits that token from the approved set; only a
    /// failed primary shares query falls back to the last-known position.
    async fn read_user(
        &self,
        entity: &EntityConfig,
        account: &str,
        previous: Option<&Snapshot>,
    ) -> UserPosition {
        let policy = &self.settings.read_policy;
        let decimals = entity.stake_token.decimals;

        let shares_label = format!("{}:user_shares", entity.id);
        let shares = with_read_policy(policy, ReadKind::Entity, &shares_label, || {
            self.reader.user_shares(entity, account)
        })
        .await;

        let shares = match shares {
            Ok(shares) => shares,
            Err(err) => {
                warn!("entity {} user shares read failed: {}", entity.id, err);
                return previous
                    .and_then(|p| p.user.clone())
                    .unwrap_or_else(|| UserPosition::empty(decimals));
            }
        };

        let price_per_share = match entity.kind {
            crate::domain::entity::EntityKind::ShareBased => {
                let label = format!("{}:price_per_share", entity.id);
                let read = with_read_policy(policy, ReadKind::Entity, &label, || {
                    self.reader.price_per_share(entity)
                })
                .await;
                match read {
                    Ok(pps) => pps,
                    Err(err) => {
                        warn!("entity {} price-per-share read failed: {}", entity.id, err);
                        previous
                            .and_then(|p| p.user.as_ref())
                            .map(|u| u.price_per_share)
                            .unwrap_or(1.0)
                    }
                }
            }
            crate::domain::entity::EntityKind::DirectStake { .. } => 1.0,
        };

        let rewards_label = format!("{}:rewards", entity.id);
        let rewards_read = with_read_policy(policy, ReadKind::Entity, &rewards_label, || {
            self.reader.rewards_earned(entity, account)
        })
        .await;
        let rewards_earned = match rewards_read {
            Ok(amount) => amount,
            Err(err) => {
                debug!("entity {} rewards read failed: {}", entity.id, err);
                Amount::zero(entity.reward_token.decimals)
            }
        };

        let accepted = entity.accepted_tokens();
        let allowance_checks = join_all(accepted.iter().map(|token| {
            let spender = entity.spender_for(&token.address);
            let label = format!("{}:allowance:{}", entity.id, token.address);
            async move {
                let read = with_read_policy(policy, ReadKind::Entity, &label, || {
                    self.reader.allowance(account, &token.address, spender)
                })
                .await;
                match read {
                    Ok(allowance) if allowance > 0 => Some(token.address.clone()),
                    Ok(_) => None,
                    Err(err) => {
                        // omit from the approved set, do not fail the batch
                        debug!(
                            "allowance check skipped for {} on {}: {}",
                            token.address, entity.id, err
                        );
                        None
                    }
                }
            }
        }))
        .await;
        let approved_tokens: Vec<String> = allowance_checks.into_iter().flatten().collect();

        let has_approved_pool = approved_tokens.contains(&entity.stake_token.address)
            && entity.spender_for(&entity.stake_token.address) == entity.address;

        let has_approved_zap = match &entity.zap_address {
            Some(zap) => {
                let label = format!("{}:zap_allowance", entity.id);
                matches!(
                    with_read_policy(policy, ReadKind::Entity, &label, || {
                        self.reader.allowance(account, &entity.stake_token.address, zap)
                    })
                    .await,
                    Ok(allowance) if allowance > 0
                )
            }
            None => false,
        };

        let balance_label = format!("{}:wallet_balance", entity.id);
        let has_wallet_balance = with_read_policy(policy, ReadKind::Entity, &balance_label, || {
            self.reader.wallet_balance(account, &entity.stake_token.address)
        })
        .await
        .map(|balance| !balance.is_zero())
        .unwrap_or(false);

        let total_staked = shares.to_units() * price_per_share;

        UserPosition {
            available_to_unstake: shares.clone(),
            has_staked: total_staked > 0.0,
            shares,
            price_per_share,
            total_staked,
            rewards_earned,
            approved_tokens,
            has_approved_pool,
            has_approved_zap,
            has_wallet_balance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::EntityKind;
    use crate::infrastructure::sim_chain::SimChain;
    use crate::shared::types::TokenInfo;
    use std::time::Duration;

    fn token(address: &str, symbol: &str) -> TokenInfo {
        TokenInfo {
            address: address.to_string(),
            symbol: symbol.to_string(),
            decimals: 18,
        }
    }

    fn vault(id: &str) -> EntityConfig {
        EntityConfig {
            id: id.to_string(),
            address: format!("0x{}", id.to_uppercase()),
            kind: EntityKind::ShareBased,
            stake_token: token(&format!("0xSTAKE-{}", id), "STK"),
            pairs: Vec::new(),
            reward_token: token("0xRWD", "RWD"),
            farm_address: None,
            zap_address: None,
        }
    }

    fn settings() -> RefreshSettings {
        RefreshSettings {
            blocks_per_year: 730.0,
            read_policy: ReadPolicy {
                timeout: Duration::from_millis(200),
                attempts: 1,
                backoff: Duration::from_millis(1),
            },
        }
    }

    async fn seeded_sim(entities: &[EntityConfig]) -> Arc<SimChain> {
        let sim = Arc::new(SimChain::new());
        for entity in entities {
            sim.seed_entity(
                entity,
                Amount::from_units(1000.0, 18),
                FarmState {
                    alloc_weight: 50,
                    total_alloc_weight: 100,
                    emission_per_block: 1.0,
                    active: true,
                },
            )
            .await;
            sim.set_price(&entity.stake_token.address, 2.0).await;
        }
        sim.set_price("0xRWD", 1.0).await;
        sim
    }

    fn orchestrator(sim: Arc<SimChain>) -> RefreshOrchestrator {
        let oracle = PairAwareOracle::new(sim.clone(), sim.clone());
        RefreshOrchestrator::new(sim, oracle, SnapshotCache::new(), settings())
    }

    #[tokio::test]
    async fn test_refresh_is_idempotent_modulo_timestamp() {
        let entity = vault("a");
        let sim = seeded_sim(std::slice::from_ref(&entity)).await;
        let orch = orchestrator(sim);

        let first = orch.refresh(&entity, Some("0xME")).await;
        let second = orch.refresh(&entity, Some("0xME")).await;

        assert!(first.same_facts(&second));
        assert!((first.apr.yearly - 18.25).abs() < 1e-9);
        assert!((first.apr.daily - 0.05).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_price_failure_substitutes_last_known_and_marks_stale() {
        let entity = vault("a");
        let sim = seeded_sim(std::slice::from_ref(&entity)).await;
        let orch = orchestrator(sim.clone());

        let healthy = orch.refresh(&entity, None).await;
        assert_eq!(*healthy.stake_token_price.value(), Some(2.0));
        assert!(!healthy.has_stale_fields());

        sim.fail_price(&entity.stake_token.address).await;
        let degraded = orch.refresh(&entity, None).await;

        assert!(degraded.stake_token_price.is_stale());
        assert_eq!(*degraded.stake_token_price.value(), Some(2.0));
        // total staked still refreshed fine
        assert!(!degraded.total_staked.is_stale());
    }

    #[tokio::test]
    async fn test_price_failure_with_no_history_is_unknown_not_zero() {
        let entity = vault("a");
        let sim = seeded_sim(std::slice::from_ref(&entity)).await;
        sim.fail_price(&entity.stake_token.address).await;
        let orch = orchestrator(sim);

        let snapshot = orch.refresh(&entity, None).await;

        assert_eq!(*snapshot.stake_token_price.value(), None);
        assert_eq!(snapshot.tvl(), None);
        // unknown price means zero APR, never NaN
        assert_eq!(snapshot.apr.yearly, 0.0);
    }

    #[tokio::test]
    async fn test_partial_failure_containment_across_entities() {
        let a = vault("a");
        let b = vault("b");
        let sim = seeded_sim(&[a.clone(), b.clone()]).await;
        sim.fail_price(&a.stake_token.address).await;
        let orch = orchestrator(sim);

        let snapshots = orch.refresh_all(&[a, b], None).await;

        assert!(snapshots[0].stake_token_price.is_stale());
        assert!(!snapshots[1].has_stale_fields());
        assert_eq!(snapshots[1].tvl(), Some(2000.0));
    }

    #[tokio::test]
    async fn test_unreachable_entity_falls_back_to_defaults() {
        let entity = vault("a");
        let sim = seeded_sim(std::slice::from_ref(&entity)).await;
        sim.fail_entity(&entity.id).await;
        let orch = orchestrator(sim);

        let snapshot = orch.refresh(&entity, Some("0xME")).await;

        assert!(snapshot.total_staked.is_stale());
        assert!(snapshot.total_staked.value().is_zero());
        assert_eq!(snapshot.apr.yearly, 0.0);
        // user position degrades to the empty default, not a crash
        assert_eq!(snapshot.user, Some(UserPosition::empty(18)));
    }

    #[tokio::test]
    async fn test_snapshot_for_serves_cache_until_invalidated() {
        let entity = vault("a");
        let sim = seeded_sim(std::slice::from_ref(&entity)).await;
        let orch = orchestrator(sim.clone());

        let first = orch.snapshot_for(&entity, None).await;

        // on-chain state moves, but the cached snapshot is still fresh
        sim.seed_entity(
            &entity,
            Amount::from_units(5000.0, 18),
            FarmState {
                alloc_weight: 50,
                total_alloc_weight: 100,
                emission_per_block: 1.0,
                active: true,
            },
        )
        .await;
        let cached = orch.snapshot_for(&entity, None).await;
        assert!(cached.same_facts(&first));

        // invalidation forces the next lookup through a refresh
        orch.cache().invalidate(&snapshot_key(&entity.id, None)).await;
        let refreshed = orch.snapshot_for(&entity, None).await;
        assert_eq!(refreshed.total_staked.value().to_units(), 5000.0);
    }

    struct HangingRewards(Arc<SimChain>);

    #[async_trait::async_trait]
    impl crate::domain::reader::FactReader for HangingRewards {
        async fn total_staked(
            &self,
            entity: &EntityConfig,
        ) -> Result<Amount, crate::shared::errors::ReadError> {
            self.0.total_staked(entity).await
        }

        async fn farm_state(
            &self,
            entity: &EntityConfig,
        ) -> Result<FarmState, crate::shared::errors::ReadError> {
            self.0.farm_state(entity).await
        }

        async fn user_shares(
            &self,
            entity: &EntityConfig,
            account: &str,
        ) -> Result<Amount, crate::shared::errors::ReadError> {
            self.0.user_shares(entity, account).await
        }

        async fn price_per_share(
            &self,
            entity: &EntityConfig,
        ) -> Result<f64, crate::shared::errors::ReadError> {
            self.0.price_per_share(entity).await
        }

        async fn rewards_earned(
            &self,
            _entity: &EntityConfig,
            _account: &str,
        ) -> Result<Amount, crate::shared::errors::ReadError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Amount::zero(18))
        }

        async fn allowance(
            &self,
            owner: &str,
            token: &str,
            spender: &str,
        ) -> Result<u64, crate::shared::errors::ReadError> {
            self.0.allowance(owner, token, spender).await
        }

        async fn wallet_balance(
            &self,
            account: &str,
            token: &str,
        ) -> Result<Amount, crate::shared::errors::ReadError> {
            self.0.wallet_balance(account, token).await
        }
    }

    #[tokio::test]
    async fn test_hanging_rewards_read_degrades_instead_of_blocking() {
        let entity = vault("a");
        let sim = seeded_sim(std::slice::from_ref(&entity)).await;
        let oracle = PairAwareOracle::new(sim.clone(), sim.clone());
        let orch = RefreshOrchestrator::new(
            Arc::new(HangingRewards(sim)),
            oracle,
            SnapshotCache::new(),
            settings(),
        );

        // the per-read timeout must bound the whole refresh
        let snapshot = tokio::time::timeout(
            Duration::from_secs(2),
            orch.refresh(&entity, Some("0xME")),
        )
        .await
        .expect("refresh must finish within the read timeout");

        let user = snapshot.user.expect("user position");
        assert!(user.rewards_earned.is_zero());
        assert!(!snapshot.total_staked.is_stale());
    }

    #[tokio::test]
    async fn test_allowance_failure_omits_token_without_failing_refresh() {
        let mut entity = vault("a");
        entity.zap_address = Some("0xZAP".into());
        entity.pairs = vec![token("0xAAA", "AAA"), token("0xBBB", "BBB")];
        // make the stake token a priced LP pair
        let sim = Arc::new(SimChain::new());
        sim.seed_entity(
            &entity,
            Amount::from_units(1000.0, 18),
            FarmState {
                alloc_weight: 50,
                total_alloc_weight: 100,
                emission_per_block: 1.0,
                active: true,
            },
        )
        .await;
        sim.set_pair(
            &entity.stake_token.address,
            Amount::from_units(100.0, 18),
            Amount::from_units(300.0, 18),
            Amount::from_units(200.0, 18),
        )
        .await;
        sim.set_price("0xAAA", 3.0).await;
        sim.set_price("0xBBB", 1.0).await;
        sim.set_price("0xRWD", 1.0).await;
        sim.set_allowance("0xME", &entity.stake_token.address, &entity.address, u64::MAX)
            .await;
        sim.set_allowance("0xME", "0xAAA", "0xZAP", u64::MAX).await;
        sim.fail_token_reads("0xBBB").await;

        let orch = orchestrator(sim);
        let snapshot = orch.refresh(&entity, Some("0xME")).await;
        let user = snapshot.user.expect("user position");

        assert!(user.approved_tokens.contains(&entity.stake_token.address));
        assert!(user.approved_tokens.contains(&"0xAAA".to_string()));
        // the failing token is omitted, not an error
        assert!(!user.approved_tokens.contains(&"0xBBB".to_string()));
        assert!(user.has_approved_pool);
    }
}
