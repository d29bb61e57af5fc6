// 9.0: price oracle boundary.
//
// The engine never trusts a price it can't vouch for. A feed that is switched off
// or hasn't been updated within its max age is an error, never a fallback.

use crate::math::Wad;
use crate::types::Timestamp;
use serde::{Deserialize, Serialize};

/// Anything that can serve an index price.
pub trait PriceOracle {
    /// Current index price. Fails when inactive or stale at `now`.
    fn get_price(&self, now: Timestamp) -> Result<Wad, OracleError>;

    fn is_active(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    #[error("oracle is inactive")]
    Inactive,

    #[error("oracle has never published a price")]
    NoPrice,

    #[error("oracle price is stale: updated at {updated_at:?}, now {now:?}, max age {max_age_ms}ms")]
    Stale {
        updated_at: Timestamp,
        now: Timestamp,
        max_age_ms: i64,
    },
}

/// A single published price and when it was published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub price: Wad,
    pub timestamp: Timestamp,
}

impl PriceUpdate {
    pub fn is_stale(&self, now: Timestamp, max_age_ms: i64) -> bool {
        now.millis_since(self.timestamp) > max_age_ms
    }
}

/// Oracle fed by hand: tests, the simulator, or a keeper pushing prices in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualOracle {
    latest: Option<PriceUpdate>,
    max_age_ms: i64,
    active: bool,
}

impl ManualOracle {
    pub fn new(max_age_ms: i64) -> Self {
        Self {
            latest: None,
            max_age_ms,
            active: true,
        }
    }

    pub fn with_price(mut self, price: Wad, timestamp: Timestamp) -> Self {
        self.set_price(price, timestamp);
        self
    }

    pub fn set_price(&mut self, price: Wad, timestamp: Timestamp) {
        self.latest = Some(PriceUpdate { price, timestamp });
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn latest(&self) -> Option<PriceUpdate> {
        self.latest
    }

    pub fn max_age_ms(&self) -> i64 {
        self.max_age_ms
    }
}

impl PriceOracle for ManualOracle {
    fn get_price(&self, now: Timestamp) -> Result<Wad, OracleError> {
        if !self.active {
            return Err(OracleError::Inactive);
        }
        let update = self.latest.ok_or(OracleError::NoPrice)?;
        if update.is_stale(now, self.max_age_ms) {
            return Err(OracleError::Stale {
                updated_at: update.timestamp,
                now,
                max_age_ms: self.max_age_ms,
            });
        }
        Ok(update.price)
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_price_is_served() {
        let oracle = ManualOracle::new(60_000).with_price(Wad::from_int(2000), Timestamp::from_secs(100));
        assert_eq!(oracle.get_price(Timestamp::from_secs(130)).unwrap(), Wad::from_int(2000));
        // exactly at the edge of the window is still fresh
        assert!(oracle.get_price(Timestamp::from_secs(160)).is_ok());
    }

    #[test]
    fn stale_price_rejected() {
        let oracle = ManualOracle::new(60_000).with_price(Wad::from_int(2000), Timestamp::from_secs(100));
        let result = oracle.get_price(Timestamp::from_millis(160_001));
        assert!(matches!(result, Err(OracleError::Stale { .. })));
    }

    #[test]
    fn inactive_oracle_rejected() {
        let mut oracle = ManualOracle::new(60_000).with_price(Wad::ONE, Timestamp::from_secs(0));
        oracle.set_active(false);
        assert!(!oracle.is_active());
        assert_eq!(oracle.get_price(Timestamp::from_secs(1)), Err(OracleError::Inactive));
    }

    #[test]
    fn no_price_yet() {
        let oracle = ManualOracle::new(60_000);
        assert_eq!(oracle.get_price(Timestamp::from_secs(0)), Err(OracleError::NoPrice));
    }
}
