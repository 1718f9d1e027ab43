//! Common types used across the application

use serde::{Deserialize, Serialize};

/// Token representation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenInfo {
    pub address: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Amount representation with precision. Raw value is wide enough for
/// 18-decimal token balances.
#[derive(Debug, Clone, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount {
    pub value: u128,
    pub decimals: u8,
}

impl Amount {
    pub fn new(value: u128, decimals: u8) -> Self {
        Self { value, decimals }
    }

    pub fn zero(decimals: u8) -> Self {
        Self { value: 0, decimals }
    }

    pub fn from_units(units: f64, decimals: u8) -> Self {
        Self {
            value: (units * 10_f64.powi(decimals as i32)) as u128,
            decimals,
        }
    }

    /// Whole-token units as a float
    pub fn to_units(&self) -> f64 {
        self.value as f64 / 10_f64.powi(self.decimals as i32)
    }

    pub fn is_zero(&self) -> bool {
        self.value == 0
    }
}

/// Result of one on-chain read after the orchestrator's best-effort merge.
///
/// `Stale` carries the substituted last-known (or default) value after a
/// failed read; "missing price" is a typed state here, never a swallowed
/// exception.
#[derive(Debug, Clone, PartialEq)]
pub enum Reading<T> {
    Fresh(T),
    Stale(T),
}

impl<T> Reading<T> {
    pub fn value(&self) -> &T {
        match self {
            Reading::Fresh(v) | Reading::Stale(v) => v,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Reading::Fresh(v) | Reading::Stale(v) => v,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Reading::Stale(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Reading<U> {
        match self {
            Reading::Fresh(v) => Reading::Fresh(f(v)),
            Reading::Stale(v) => Reading::Stale(f(v)),
        }
    }
}
