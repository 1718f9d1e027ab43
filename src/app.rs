//! Application wiring: build the engine from configuration and run it

use crate::application::monitor::RefreshMonitor;
use crate::config::Config;
use crate::domain::cache::SnapshotCache;
use crate::domain::entity::FarmState;
use crate::domain::orchestrator::{RefreshOrchestrator, RefreshSettings};
use crate::domain::price::{PairAwareOracle, PriceSource};
use crate::infrastructure::price_api::HttpPriceSource;
use crate::infrastructure::sim_chain::SimChain;
use crate::shared::types::Amount;
use anyhow::Result;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct AppOptions {
    pub account: Option<String>,
    /// Run a single refresh cycle and exit
    pub once: bool,
}

pub async fn run(config: Config, opts: AppOptions) -> Result<()> {
    let entities = config.entity_configs()?;
    info!("📋 loaded {} entities from config", entities.len());

    let sim = Arc::new(SimChain::new());
    seed_from_config(&sim, &config).await?;

    let price_source: Arc<dyn PriceSource> = match &config.network.price_api_url {
        Some(url) => {
            info!("🌐 using external price API at {}", url);
            Arc::new(HttpPriceSource::new(url))
        }
        None => sim.clone(),
    };

    let oracle = PairAwareOracle::new(price_source, sim.clone());
    let settings = RefreshSettings {
        blocks_per_year: config.blocks_per_year(),
        read_policy: config.read_policy(),
    };
    let orchestrator = Arc::new(RefreshOrchestrator::new(
        sim,
        oracle,
        SnapshotCache::new(),
        settings,
    ));

    let monitor = RefreshMonitor::new(
        orchestrator,
        entities,
        opts.account,
        config.refresh_interval(),
    );

    if opts.once {
        monitor.tick().await;
        let stats = monitor.stats().await;
        info!(
            "✨ done: TVL ${:.2}, best APR {:.2}%",
            stats.portfolio_tvl, stats.best_yearly_apr
        );
        return Ok(());
    }

    monitor.run().await;
    Ok(())
}

async fn seed_from_config(sim: &SimChain, config: &Config) -> Result<()> {
    let entities = config.entity_configs()?;

    for (cfg, entity) in config.entities.iter().zip(&entities) {
        let Some(seed) = &cfg.seed else { continue };

        sim.seed_entity(
            entity,
            Amount::from_units(seed.staked_units, entity.stake_token.decimals),
            FarmState {
                alloc_weight: seed.alloc_weight,
                total_alloc_weight: seed.total_alloc_weight,
                emission_per_block: seed.emission_per_block,
                active: seed.active,
            },
        )
        .await;

        if let Some(price) = seed.stake_price {
            sim.set_price(&entity.stake_token.address, price).await;
        }
        if let Some(price) = seed.reward_price {
            sim.set_price(&entity.reward_token.address, price).await;
        }
        if let Some(pps) = seed.price_per_share {
            sim.set_price_per_share(&entity.id, pps).await;
        }

        if let (Some(pair), [leg0, leg1]) = (&seed.pair, entity.pairs.as_slice()) {
            let decimals = entity.stake_token.decimals;
            sim.set_pair(
                &entity.stake_token.address,
                Amount::from_units(pair.reserve0_units, decimals),
                Amount::from_units(pair.reserve1_units, decimals),
                Amount::from_units(pair.total_supply_units, decimals),
            )
            .await;
            sim.set_price(&leg0.address, pair.leg0_price).await;
            sim.set_price(&leg1.address, pair.leg1_price).await;
        }
    }

    Ok(())
}
