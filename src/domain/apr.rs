//! Yield calculator: pure APR/APY derivation
//!
//! Both horizons are simple annualized rates: `daily` is always
//! `yearly / 365`. Compounding is exposed separately through
//! [`compounded_apy`] for display figures.

use serde::{Deserialize, Serialize};

pub const DAYS_PER_YEAR: f64 = 365.0;

/// Derived yield rates, in percent
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Apr {
    pub yearly: f64,
    pub daily: f64,
}

impl Apr {
    pub fn zero() -> Self {
        Self::default()
    }
}

/// Derive APR from reward emission, allocation weight and TVL.
///
/// Returns zero when TVL is zero, either price is unknown, the total
/// allocation weight is zero, or the entity is inactive. Never produces
/// NaN or infinity.
#[allow(clippy::too_many_arguments)]
pub fn compute_apr(
    stake_token_price: Option<f64>,
    reward_token_price: Option<f64>,
    total_staked: f64,
    emission_per_block: f64,
    blocks_per_year: f64,
    alloc_weight: u64,
    total_alloc_weight: u64,
    active: bool,
) -> Apr {
    let (Some(stake_price), Some(reward_price)) = (stake_token_price, reward_token_price) else {
        return Apr::zero();
    };

    if !active || total_alloc_weight == 0 {
        return Apr::zero();
    }

    let total_staked_value = total_staked * stake_price;
    if !(total_staked_value > 0.0) || !total_staked_value.is_finite() {
        return Apr::zero();
    }

    let weight_share = alloc_weight as f64 / total_alloc_weight as f64;
    let yearly_rewards_value = emission_per_block * blocks_per_year * reward_price * weight_share;

    let yearly = yearly_rewards_value / total_staked_value * 100.0;
    if !yearly.is_finite() {
        return Apr::zero();
    }

    Apr {
        yearly,
        daily: yearly / DAYS_PER_YEAR,
    }
}

/// Compounded yearly yield from a simple APR (both in percent)
pub fn compounded_apy(yearly_apr: f64, periods_per_year: f64) -> f64 {
    if !(periods_per_year > 0.0) || !yearly_apr.is_finite() {
        return 0.0;
    }
    let rate = yearly_apr / 100.0;
    ((1.0 + rate / periods_per_year).powf(periods_per_year) - 1.0) * 100.0
}
