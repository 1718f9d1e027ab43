//! Periodic refresh loop and portfolio aggregates
//!
//! Drives the orchestrator on a fixed interval and keeps rolling stats
//! over the latest snapshots: combined TVL, best available APR, and how
//! many reads came back degraded.

use crate::domain::entity::{EntityConfig, Snapshot};
use crate::domain::orchestrator::RefreshOrchestrator;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct MonitorStats {
    pub cycles: u64,
    pub portfolio_tvl: f64,
    pub best_yearly_apr: f64,
    pub degraded_snapshots: usize,
}

/// Sum of TVL across snapshots whose stake-token price is known
pub fn portfolio_tvl(snapshots: &[Snapshot]) -> f64 {
    snapshots.iter().filter_map(|s| s.tvl()).sum()
}

/// Highest yearly APR among active entities
pub fn best_yearly_apr(snapshots: &[Snapshot]) -> f64 {
    snapshots
        .iter()
        .filter(|s| s.is_active())
        .map(|s| s.apr.yearly)
        .fold(0.0, f64::max)
}

pub fn degraded_count(snapshots: &[Snapshot]) -> usize {
    snapshots.iter().filter(|s| s.has_stale_fields()).count()
}

pub struct RefreshMonitor {
    orchestrator: Arc<RefreshOrchestrator>,
    entities: Vec<EntityConfig>,
    account: Option<String>,
    interval: Duration,
    stats: Arc<RwLock<MonitorStats>>,
}

impl RefreshMonitor {
    pub fn new(
        orchestrator: Arc<RefreshOrchestrator>,
        entities: Vec<EntityConfig>,
        account: Option<String>,
        interval: Duration,
    ) -> Self {
        Self {
            orchestrator,
            entities,
            account,
            interval,
            stats: Arc::new(RwLock::new(MonitorStats::default())),
        }
    }

    pub async fn stats(&self) -> MonitorStats {
        self.stats.read().await.clone()
    }

    /// One refresh cycle over every tracked entity
    pub async fn tick(&self) -> Vec<Snapshot> {
        let snapshots = self
            .orchestrator
            .refresh_all(&self.entities, self.account.as_deref())
            .await;

        let tvl = portfolio_tvl(&snapshots);
        let best_apr = best_yearly_apr(&snapshots);
        let degraded = degraded_count(&snapshots);

        {
            let mut stats = self.stats.write().await;
            stats.cycles += 1;
            stats.portfolio_tvl = tvl;
            stats.best_yearly_apr = best_apr;
            stats.degraded_snapshots = degraded;
        }

        info!(
            "🔄 refreshed {} entities | TVL ${:.2} | best APR {:.2}% | {} degraded",
            snapshots.len(),
            tvl,
            best_apr,
            degraded
        );

        snapshots
    }

    /// Refresh forever on the configured interval
    pub async fn run(&self) {
        info!(
            "🚀 refresh loop started: {} entities every {:?}",
            self.entities.len(),
            self.interval
        );
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }
}
