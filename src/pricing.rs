// 3.0: mark price discovery. one PricingEngine, two modes.
// 3.1 open interest aggregates, 3.2 dynamic virtual reserves, 3.3 bonding curve,
// 3.4 the engine: mark price, price impact, previews and the crate-private commit.
//
// the open interest here is the only copy. positions never touch it directly;
// the trading engine previews with after_increase/after_decrease and commits on success.

use crate::math::{exp, MathError, SignedWad, Wad};
use crate::types::Side;
use serde::{Deserialize, Serialize};

/// 3.1: total long and short size outstanding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenInterest {
    pub total_long: Wad,
    pub total_short: Wad,
}

impl OpenInterest {
    /// total_long - total_short
    pub fn net_position(&self) -> SignedWad {
        SignedWad::difference(self.total_long, self.total_short)
    }

    pub fn increased(&self, side: Side, size: Wad) -> Result<Self, MathError> {
        let mut next = *self;
        match side {
            Side::Long => next.total_long = next.total_long.checked_add(size)?,
            Side::Short => next.total_short = next.total_short.checked_add(size)?,
        }
        Ok(next)
    }

    pub fn decreased(&self, side: Side, size: Wad) -> Result<Self, MathError> {
        let mut next = *self;
        match side {
            Side::Long => next.total_long = next.total_long.checked_sub(size)?,
            Side::Short => next.total_short = next.total_short.checked_sub(size)?,
        }
        Ok(next)
    }

    pub fn total(&self) -> Result<Wad, MathError> {
        self.total_long.checked_add(self.total_short)
    }
}

/// 3.2: constant virtual quote against a base that shrinks as net longs build up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicReserves {
    pub base_reserves: Wad,
    pub quote_reserves: Wad,
    pub impact_divisor: u64,
}

impl DynamicReserves {
    /// quote = base * oracle price, so the mark starts at the oracle price.
    pub fn seeded(base_reserves: Wad, oracle_price: Wad, impact_divisor: u64) -> Result<Self, MathError> {
        Ok(Self {
            base_reserves,
            quote_reserves: base_reserves.mul(oracle_price)?,
            impact_divisor,
        })
    }

    pub fn adjusted_base(&self, net: SignedWad) -> Result<Wad, MathError> {
        let adjustment = net.abs().div_int(self.impact_divisor)?;
        if net.is_positive() {
            if adjustment >= self.base_reserves {
                // the base falls toward zero just below here and the mark spikes.
                // at and past this point it snaps back to twice the seed price
                self.base_reserves.div_int(2)
            } else {
                self.base_reserves.checked_sub(adjustment)
            }
        } else if net.is_negative() {
            self.base_reserves.checked_add(adjustment)
        } else {
            Ok(self.base_reserves)
        }
    }

    pub fn price(&self, oi: &OpenInterest) -> Result<Wad, MathError> {
        let base = self.adjusted_base(oi.net_position())?;
        self.quote_reserves.div(base)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveShape {
    /// factor = 1 + exponent * x
    #[default]
    Linear,
    /// factor = (1 + x) ^ exponent
    Exponential,
}

/// 3.3: price rises with cumulative long interest, capped at a multiple of the start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BondingCurve {
    pub starting_price: Wad,
    pub steepness: Wad,
    pub exponent: Wad,
    pub max_pump_multiplier: Wad,
    pub virtual_base_reserves: Wad,
    #[serde(default)]
    pub shape: CurveShape,
}

impl BondingCurve {
    fn factor(&self, supply: Wad) -> Result<Wad, MathError> {
        let x = supply.div(self.steepness)?;
        match self.shape {
            CurveShape::Linear => Wad::ONE.checked_add(self.exponent.mul(x)?),
            CurveShape::Exponential => {
                let ln_base = Wad::ONE.checked_add(x)?.ln()?;
                exp(ln_base.mul_wad(self.exponent)?)
            }
        }
    }

    /// shorts never move the curve: supply is total_long only.
    pub fn price(&self, oi: &OpenInterest) -> Result<Wad, MathError> {
        let factor = match self.factor(oi.total_long) {
            Ok(factor) => factor.min(self.max_pump_multiplier),
            // past the point of overflow the cap has long since kicked in
            Err(MathError::Overflow) => self.max_pump_multiplier,
            Err(e) => return Err(e),
        };
        self.starting_price.mul(factor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PricingMode {
    DynamicReserves(DynamicReserves),
    BondingCurve(BondingCurve),
}

/// 3.4: mark price, impact and the open interest that drives both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingEngine {
    mode: PricingMode,
    open_interest: OpenInterest,
}

impl PricingEngine {
    pub fn new(mode: PricingMode) -> Self {
        Self {
            mode,
            open_interest: OpenInterest::default(),
        }
    }

    pub fn mode(&self) -> &PricingMode {
        &self.mode
    }

    pub fn open_interest(&self) -> OpenInterest {
        self.open_interest
    }

    pub fn net_position(&self) -> SignedWad {
        self.open_interest.net_position()
    }

    pub fn mark_price(&self) -> Result<Wad, MathError> {
        self.price_at(&self.open_interest)
    }

    /// The one pricing formula. every other price in the crate comes through here.
    pub fn price_at(&self, oi: &OpenInterest) -> Result<Wad, MathError> {
        match &self.mode {
            PricingMode::DynamicReserves(reserves) => reserves.price(oi),
            PricingMode::BondingCurve(curve) => curve.price(oi),
        }
    }

    /// How far the mark would move if `size` were opened on `side`.
    pub fn price_impact(&self, size: Wad, side: Side) -> Result<Wad, MathError> {
        let after = self.price_at(&self.after_increase(side, size)?)?;
        Ok(after.abs_diff(self.mark_price()?))
    }

    pub fn after_increase(&self, side: Side, size: Wad) -> Result<OpenInterest, MathError> {
        self.open_interest.increased(side, size)
    }

    pub fn after_decrease(&self, side: Side, size: Wad) -> Result<OpenInterest, MathError> {
        self.open_interest.decreased(side, size)
    }

    pub(crate) fn commit(&mut self, open_interest: OpenInterest) {
        self.open_interest = open_interest;
    }

    /// (base, quote) view of the current state. computed, never stored.
    pub fn virtual_reserves(&self) -> Result<(Wad, Wad), MathError> {
        match &self.mode {
            PricingMode::DynamicReserves(reserves) => {
                let base = reserves.adjusted_base(self.net_position())?;
                Ok((base, reserves.quote_reserves))
            }
            PricingMode::BondingCurve(curve) => {
                let base = curve.virtual_base_reserves;
                Ok((base, self.mark_price()?.mul(base)?))
            }
        }
    }
}
