// 5.0: funding rates. once per interval longs pay shorts or vice versa to keep the mark near the index.
// 5.0 has the params/state structs. 5.1 has the rate calculation logic.

use crate::math::{MathError, SignedWad, Wad};
use crate::types::{Side, Timestamp};
use serde::{Deserialize, Serialize};

pub const DEFAULT_FUNDING_INTERVAL_MS: i64 = 3_600_000;
pub const DEFAULT_PREMIUM_DIVISOR: u64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingParams {
    pub interval_ms: i64,
    // per-interval clamp on the rate, 0.01 = 1%
    pub max_rate: Wad,
    pub premium_divisor: u64,
}

impl Default for FundingParams {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_FUNDING_INTERVAL_MS,
            max_rate: Wad::from_raw(Wad::ONE.raw() / 100),
            premium_divisor: DEFAULT_PREMIUM_DIVISOR,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingState {
    pub funding_rate: SignedWad,
    pub funding_index: SignedWad,
    pub last_funding_time: Timestamp,
    pub premium_fraction: SignedWad,
}

impl FundingState {
    pub fn new(timestamp: Timestamp) -> Self {
        Self {
            last_funding_time: timestamp,
            ..Default::default()
        }
    }

    pub fn is_due(&self, now: Timestamp, params: &FundingParams) -> bool {
        now >= self.last_funding_time.plus_millis(params.interval_ms)
    }

    pub fn next_funding_time(&self, params: &FundingParams) -> Timestamp {
        self.last_funding_time.plus_millis(params.interval_ms)
    }

    /// The state after one funding update at `now`. pure; the caller decides whether to keep it.
    pub fn advanced(
        &self,
        mark_price: Wad,
        index_price: Wad,
        now: Timestamp,
        params: &FundingParams,
    ) -> Result<FundingState, MathError> {
        let premium = calculate_premium(mark_price, index_price)?;
        let rate = calculate_funding_rate(premium, params)?;
        Ok(FundingState {
            funding_rate: rate,
            funding_index: self.funding_index.checked_add(rate)?,
            last_funding_time: now,
            premium_fraction: premium,
        })
    }
}

// 5.1: how far the mark is from the index, as a fraction. positive = mark above index
pub fn calculate_premium(mark_price: Wad, index_price: Wad) -> Result<SignedWad, MathError> {
    let ratio = mark_price.div(index_price)?;
    Ok(SignedWad::difference(ratio, Wad::ONE))
}

// 5.2: spreads the premium over the divisor and clamps the result to +-max_rate
pub fn calculate_funding_rate(premium: SignedWad, params: &FundingParams) -> Result<SignedWad, MathError> {
    Ok(premium
        .div_int(params.premium_divisor)?
        .clamp_abs(params.max_rate))
}

// 5.3: what a position receives for an index move of `delta`. longs pay positive funding.
pub fn calculate_funding_payment(side: Side, size: Wad, delta: SignedWad) -> Result<SignedWad, MathError> {
    let amount = delta.mul_wad(size)?;
    Ok(match side {
        Side::Long => amount.negated(),
        Side::Short => amount,
    })
}
