//! Price oracle adapter
//!
//! Resolves a token's reference price. LP tokens are never priced directly:
//! their price is derived from the pair's reserve-weighted leg prices and
//! total supply.

use crate::domain::entity::{EntityConfig, PairReserves};
use crate::shared::errors::ReadError;
use crate::shared::types::TokenInfo;
use async_trait::async_trait;
use std::sync::Arc;

/// Spot price feed for plain (non-pair) tokens
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn spot_price(&self, token: &TokenInfo) -> Result<f64, ReadError>;
}

/// AMM pair reserve lookup, needed only for LP stake tokens
#[async_trait]
pub trait PairSource: Send + Sync {
    async fn pair_reserves(&self, pair_address: &str) -> Result<PairReserves, ReadError>;
}

/// Pair-aware price resolution on top of a spot source.
/// Pure read path: any failure is `PriceUnavailable`, never zero.
pub struct PairAwareOracle {
    source: Arc<dyn PriceSource>,
    pairs: Arc<dyn PairSource>,
}

impl PairAwareOracle {
    pub fn new(source: Arc<dyn PriceSource>, pairs: Arc<dyn PairSource>) -> Self {
        Self { source, pairs }
    }

    /// Price of the entity's stake token, deriving LP prices from reserves
    pub async fn stake_token_price(&self, entity: &EntityConfig) -> Result<f64, ReadError> {
        if let [leg0, leg1] = entity.pairs.as_slice() {
            self.pair_price(&entity.stake_token, leg0, leg1).await
        } else {
            self.source.spot_price(&entity.stake_token).await
        }
    }

    pub async fn reward_token_price(&self, entity: &EntityConfig) -> Result<f64, ReadError> {
        self.source.spot_price(&entity.reward_token).await
    }

    /// LP price = (reserve0·price0 + reserve1·price1) / total_supply
    async fn pair_price(
        &self,
        lp_token: &TokenInfo,
        leg0: &TokenInfo,
        leg1: &TokenInfo,
    ) -> Result<f64, ReadError> {
        let reserves = self
            .pairs
            .pair_reserves(&lp_token.address)
            .await
            .map_err(|e| ReadError::PriceUnavailable(format!("pair data missing: {}", e)))?;

        let (price0, price1) = tokio::try_join!(
            self.source.spot_price(leg0),
            self.source.spot_price(leg1)
        )?;

        let supply = reserves.total_supply.to_units();
        if !(supply > 0.0) {
            return Err(ReadError::PriceUnavailable(format!(
                "pair {} has zero supply",
                lp_token.address
            )));
        }

        let pooled_value =
            reserves.reserve0.to_units() * price0 + reserves.reserve1.to_units() * price1;
        let price = pooled_value / supply;

        if !price.is_finite() {
            return Err(ReadError::PriceUnavailable(format!(
                "pair {} price not finite",
                lp_token.address
            )));
        }

        Ok(price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::EntityKind;
    use crate::shared::types::Amount;
    use std::collections::HashMap;

    struct FixedPrices(HashMap<String, f64>);

    #[async_trait]
    impl PriceSource for FixedPrices {
        async fn spot_price(&self, token: &TokenInfo) -> Result<f64, ReadError> {
            self.0
                .get(&token.address)
                .copied()
                .ok_or_else(|| ReadError::PriceUnavailable(token.address.clone()))
        }
    }

    struct FixedPair(Option<PairReserves>);

    #[async_trait]
    impl PairSource for FixedPair {
        async fn pair_reserves(&self, pair_address: &str) -> Result<PairReserves, ReadError> {
            self.0
                .clone()
                .ok_or_else(|| ReadError::EntityUnreachable(pair_address.to_string()))
        }
    }

    fn token(address: &str) -> TokenInfo {
        TokenInfo {
            address: address.to_string(),
            symbol: address.trim_start_matches("0x").to_string(),
            decimals: 18,
        }
    }

    fn lp_entity() -> EntityConfig {
        EntityConfig {
            id: "lp-vault".into(),
            address: "0xVAULT".into(),
            kind: EntityKind::ShareBased,
            stake_token: token("0xLP"),
            pairs: vec![token("0xAAA"), token("0xBBB")],
            reward_token: token("0xRWD"),
            farm_address: None,
            zap_address: None,
        }
    }

    fn prices() -> HashMap<String, f64> {
        HashMap::from([
            ("0xAAA".to_string(), 3.0),
            ("0xBBB".to_string(), 1.0),
            ("0xRWD".to_string(), 0.5),
        ])
    }

    #[tokio::test]
    async fn test_lp_price_from_reserves() {
        let reserves = PairReserves {
            reserve0: Amount::from_units(100.0, 18),
            reserve1: Amount::from_units(300.0, 18),
            total_supply: Amount::from_units(200.0, 18),
        };
        let oracle = PairAwareOracle::new(
            Arc::new(FixedPrices(prices())),
            Arc::new(FixedPair(Some(reserves))),
        );

        // (100*3 + 300*1) / 200 = 3.0
        let price = oracle.stake_token_price(&lp_entity()).await.unwrap();
        assert!((price - 3.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_zero_supply_is_price_unavailable() {
        let reserves = PairReserves {
            reserve0: Amount::from_units(100.0, 18),
            reserve1: Amount::from_units(300.0, 18),
            total_supply: Amount::zero(18),
        };
        let oracle = PairAwareOracle::new(
            Arc::new(FixedPrices(prices())),
            Arc::new(FixedPair(Some(reserves))),
        );

        assert!(matches!(
            oracle.stake_token_price(&lp_entity()).await,
            Err(ReadError::PriceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_pair_data_is_price_unavailable() {
        let oracle =
            PairAwareOracle::new(Arc::new(FixedPrices(prices())), Arc::new(FixedPair(None)));

        // pair lookup failed with EntityUnreachable; callers must see a
        // price error, not a reachability error
        assert!(matches!(
            oracle.stake_token_price(&lp_entity()).await,
            Err(ReadError::PriceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_plain_token_uses_spot_source() {
        let mut entity = lp_entity();
        entity.pairs.clear();
        entity.stake_token = token("0xAAA");

        let oracle =
            PairAwareOracle::new(Arc::new(FixedPrices(prices())), Arc::new(FixedPair(None)));

        assert_eq!(oracle.stake_token_price(&entity).await.unwrap(), 3.0);
        assert_eq!(oracle.reward_token_price(&entity).await.unwrap(), 0.5);
    }
}
