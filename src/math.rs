// 2.0: fixed point math. every price, size and margin amount is a Wad: a U256 scaled by 1e18.
// 2.1 Wad ops, 2.2 sqrt, 2.3 exp/ln approximations, 2.4 SignedWad (sign + magnitude).
// nothing here wraps or saturates. overflow is always an error.

use primitive_types::U256;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

pub const WAD_DECIMALS: u32 = 18;
pub const BASIS_POINTS: u32 = 10_000;

/// Raw value of one unit (1e18).
pub const ONE_RAW: U256 = U256([1_000_000_000_000_000_000, 0, 0, 0]);

// ln(2) * 1e18, truncated
const LN2_RAW: U256 = U256([693_147_180_559_945_309, 0, 0, 0]);

const NEWTON_ITERATIONS: usize = 8;
const EXP_TAYLOR_TERMS: u64 = 24;
const LN_SERIES_TERMS: u64 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MathError {
    #[error("arithmetic overflow")]
    Overflow,

    #[error("arithmetic underflow")]
    Underflow,

    #[error("division by zero")]
    DivisionByZero,

    #[error("negative value where an unsigned amount is required")]
    Negative,

    #[error("logarithm of zero is undefined")]
    LogOfZero,
}

/// 2.1: unsigned 18-decimal fixed point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Wad(U256);

impl Wad {
    pub const ZERO: Wad = Wad(U256([0, 0, 0, 0]));
    pub const ONE: Wad = Wad(ONE_RAW);
    pub const MAX: Wad = Wad(U256::MAX);

    pub const fn from_raw(raw: U256) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> U256 {
        self.0
    }

    /// Whole units. u64::MAX * 1e18 still fits comfortably in 256 bits.
    pub fn from_int(units: u64) -> Self {
        Self(U256::from(units) * ONE_RAW)
    }

    /// `num / den` as a Wad, floored.
    pub fn from_ratio(num: u64, den: u64) -> Result<Self, MathError> {
        Self::from_int(num).div(Self::from_int(den))
    }

    pub fn from_decimal(value: Decimal) -> Result<Self, MathError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(MathError::Negative);
        }
        let mantissa = U256::from(value.mantissa().unsigned_abs());
        let scale = value.scale();
        let raw = if scale <= WAD_DECIMALS {
            let factor = U256::exp10((WAD_DECIMALS - scale) as usize);
            mantissa.checked_mul(factor).ok_or(MathError::Overflow)?
        } else {
            // more than 18 decimals: truncate toward zero
            mantissa / U256::exp10((scale - WAD_DECIMALS) as usize)
        };
        Ok(Self(raw))
    }

    /// Lossy for values with more than 28 significant digits; None when out of Decimal range.
    pub fn to_decimal(&self) -> Option<Decimal> {
        let int_part = self.0 / ONE_RAW;
        let frac_part = self.0 % ONE_RAW;
        if int_part.bits() > 96 {
            return None;
        }
        let whole = Decimal::try_from_i128_with_scale(int_part.low_u128() as i128, 0).ok()?;
        let frac = Decimal::try_from_i128_with_scale(frac_part.low_u128() as i128, WAD_DECIMALS).ok()?;
        whole.checked_add(frac).map(|d| d.normalize())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_add(self, other: Wad) -> Result<Wad, MathError> {
        self.0.checked_add(other.0).map(Wad).ok_or(MathError::Overflow)
    }

    pub fn checked_sub(self, other: Wad) -> Result<Wad, MathError> {
        self.0.checked_sub(other.0).map(Wad).ok_or(MathError::Underflow)
    }

    pub fn saturating_sub(self, other: Wad) -> Wad {
        if other.0 >= self.0 {
            Wad::ZERO
        } else {
            Wad(self.0 - other.0)
        }
    }

    pub fn abs_diff(self, other: Wad) -> Wad {
        if self >= other {
            Wad(self.0 - other.0)
        } else {
            Wad(other.0 - self.0)
        }
    }

    /// x * y / ONE, floored. fails if x * y does not fit in 256 bits.
    pub fn mul(self, other: Wad) -> Result<Wad, MathError> {
        let product = self.0.checked_mul(other.0).ok_or(MathError::Overflow)?;
        Ok(Wad(product / ONE_RAW))
    }

    /// x * ONE / y, floored.
    pub fn div(self, other: Wad) -> Result<Wad, MathError> {
        if other.0.is_zero() {
            return Err(MathError::DivisionByZero);
        }
        let scaled = self.0.checked_mul(ONE_RAW).ok_or(MathError::Overflow)?;
        Ok(Wad(scaled / other.0))
    }

    pub fn mul_int(self, factor: u64) -> Result<Wad, MathError> {
        self.0
            .checked_mul(U256::from(factor))
            .map(Wad)
            .ok_or(MathError::Overflow)
    }

    pub fn div_int(self, divisor: u64) -> Result<Wad, MathError> {
        if divisor == 0 {
            return Err(MathError::DivisionByZero);
        }
        Ok(Wad(self.0 / U256::from(divisor)))
    }

    /// x * bps / 10_000, floored. the multiply is checked so a huge notional can't wrap into a tiny fee.
    pub fn mul_bps(self, bps: u32) -> Result<Wad, MathError> {
        let product = self
            .0
            .checked_mul(U256::from(bps))
            .ok_or(MathError::Overflow)?;
        Ok(Wad(product / U256::from(BASIS_POINTS)))
    }

    /// floor(sqrt(x)) in fixed point: isqrt(x * ONE).
    pub fn sqrt(self) -> Result<Wad, MathError> {
        let scaled = self.0.checked_mul(ONE_RAW).ok_or(MathError::Overflow)?;
        Ok(Wad(isqrt(scaled)))
    }

    pub fn ln(self) -> Result<SignedWad, MathError> {
        ln(self)
    }
}

impl fmt::Display for Wad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let int_part = self.0 / ONE_RAW;
        let frac_part = self.0 % ONE_RAW;
        if frac_part.is_zero() {
            return write!(f, "{}", int_part);
        }
        let frac = format!("{:0>18}", frac_part.low_u64());
        write!(f, "{}.{}", int_part, frac.trim_end_matches('0'))
    }
}

// 2.2: integer square root. msb estimate, fixed newton iterations, then nudge to the floor.
// result r satisfies r^2 <= x < (r+1)^2.
pub fn isqrt(x: U256) -> U256 {
    if x.is_zero() {
        return U256::zero();
    }
    // 2^ceil(bits/2) is always >= sqrt(x)
    let mut r = U256::one() << ((x.bits() + 1) / 2);
    for _ in 0..NEWTON_ITERATIONS {
        r = (r + x / r) >> 1;
    }

    loop {
        match r.checked_mul(r) {
            Some(sq) if sq <= x => break,
            _ => r -= U256::one(),
        }
    }
    loop {
        let next = r + U256::one();
        match next.checked_mul(next) {
            Some(sq) if sq <= x => r = next,
            _ => break,
        }
    }
    r
}

// 2.3: e^x. x = k*ln2 + r with r in [0, ln2), taylor series on r, then shift by k.
pub fn exp(x: SignedWad) -> Result<Wad, MathError> {
    let mag = x.mag;
    let quotient = mag / LN2_RAW;
    let remainder = mag % LN2_RAW;

    // k and r such that x = k * ln2 + r, 0 <= r < ln2
    let (k_negative, k_mag, r) = if !x.negative {
        (false, quotient, remainder)
    } else if remainder.is_zero() {
        (true, quotient, U256::zero())
    } else {
        (true, quotient + U256::one(), LN2_RAW - remainder)
    };

    let mut term = ONE_RAW;
    let mut sum = ONE_RAW;
    for i in 1..=EXP_TAYLOR_TERMS {
        term = term * r / ONE_RAW / U256::from(i);
        if term.is_zero() {
            break;
        }
        sum += term;
    }

    if k_negative {
        if k_mag >= U256::from(256u32) {
            return Ok(Wad::ZERO);
        }
        Ok(Wad(sum >> k_mag.low_u64() as usize))
    } else {
        if k_mag >= U256::from(256u32) {
            return Err(MathError::Overflow);
        }
        let shift = k_mag.low_u64() as usize;
        if sum.bits() + shift > 256 {
            return Err(MathError::Overflow);
        }
        Ok(Wad(sum << shift))
    }
}

// ln(x) = k*ln2 + ln(y), y in [1, 2). ln(y) from the atanh series on z = (y-1)/(y+1).
pub fn ln(x: Wad) -> Result<SignedWad, MathError> {
    if x.is_zero() {
        return Err(MathError::LogOfZero);
    }
    let raw = x.0;
    let (k_negative, k, y) = if raw >= ONE_RAW {
        let k = (raw / ONE_RAW).bits() - 1;
        (false, k, raw >> k)
    } else {
        let mut m = ONE_RAW.bits() - raw.bits();
        if (raw << m) < ONE_RAW {
            m += 1;
        }
        (true, m, raw << m)
    };

    let z = (y - ONE_RAW) * ONE_RAW / (y + ONE_RAW);
    let z_squared = z * z / ONE_RAW;
    let mut term = z;
    let mut series = U256::zero();
    let mut n = 1u64;
    while n < LN_SERIES_TERMS {
        series += term / U256::from(n);
        term = term * z_squared / ONE_RAW;
        if term.is_zero() {
            break;
        }
        n += 2;
    }
    let ln_y = SignedWad::from_wad(Wad(series * U256::from(2u32)));
    let k_ln2 = Wad(LN2_RAW * U256::from(k));
    let k_term = if k_negative {
        SignedWad::neg(k_ln2)
    } else {
        SignedWad::from_wad(k_ln2)
    };
    k_term.checked_add(ln_y)
}

/// 2.4: signed fixed point. sign flag + magnitude, never negative zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignedWad {
    negative: bool,
    mag: U256,
}

impl SignedWad {
    pub const ZERO: SignedWad = SignedWad {
        negative: false,
        mag: U256([0, 0, 0, 0]),
    };

    pub fn from_wad(value: Wad) -> Self {
        Self {
            negative: false,
            mag: value.0,
        }
    }

    pub fn neg(value: Wad) -> Self {
        Self {
            negative: !value.is_zero(),
            mag: value.0,
        }
    }

    pub fn from_parts(negative: bool, magnitude: Wad) -> Self {
        if negative {
            Self::neg(magnitude)
        } else {
            Self::from_wad(magnitude)
        }
    }

    pub fn from_int(units: i64) -> Self {
        Self::from_parts(units < 0, Wad::from_int(units.unsigned_abs()))
    }

    pub fn from_decimal(value: Decimal) -> Result<Self, MathError> {
        let magnitude = Wad::from_decimal(value.abs())?;
        Ok(Self::from_parts(value.is_sign_negative(), magnitude))
    }

    pub fn to_decimal(&self) -> Option<Decimal> {
        let magnitude = self.abs().to_decimal()?;
        Some(if self.negative { -magnitude } else { magnitude })
    }

    /// a - b without leaving the signed domain.
    pub fn difference(a: Wad, b: Wad) -> Self {
        if a >= b {
            Self::from_wad(Wad(a.0 - b.0))
        } else {
            Self::neg(Wad(b.0 - a.0))
        }
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    pub fn is_positive(&self) -> bool {
        !self.negative && !self.mag.is_zero()
    }

    pub fn is_zero(&self) -> bool {
        self.mag.is_zero()
    }

    pub fn abs(&self) -> Wad {
        Wad(self.mag)
    }

    /// max(self, 0)
    pub fn positive_part(&self) -> Wad {
        if self.negative {
            Wad::ZERO
        } else {
            Wad(self.mag)
        }
    }

    pub fn negated(self) -> Self {
        Self::from_parts(!self.negative, Wad(self.mag))
    }

    pub fn checked_add(self, other: SignedWad) -> Result<SignedWad, MathError> {
        if self.negative == other.negative {
            let mag = self.mag.checked_add(other.mag).ok_or(MathError::Overflow)?;
            return Ok(Self::from_parts(self.negative, Wad(mag)));
        }
        if self.mag >= other.mag {
            Ok(Self::from_parts(self.negative, Wad(self.mag - other.mag)))
        } else {
            Ok(Self::from_parts(other.negative, Wad(other.mag - self.mag)))
        }
    }

    pub fn checked_sub(self, other: SignedWad) -> Result<SignedWad, MathError> {
        self.checked_add(other.negated())
    }

    pub fn add_wad(self, other: Wad) -> Result<SignedWad, MathError> {
        self.checked_add(SignedWad::from_wad(other))
    }

    pub fn sub_wad(self, other: Wad) -> Result<SignedWad, MathError> {
        self.checked_add(SignedWad::neg(other))
    }

    pub fn mul_wad(self, factor: Wad) -> Result<SignedWad, MathError> {
        let mag = Wad(self.mag).mul(factor)?;
        Ok(Self::from_parts(self.negative, mag))
    }

    /// rounds toward zero
    pub fn div_int(self, divisor: u64) -> Result<SignedWad, MathError> {
        let mag = Wad(self.mag).div_int(divisor)?;
        Ok(Self::from_parts(self.negative, mag))
    }

    /// clamp into [-bound, bound]
    pub fn clamp_abs(self, bound: Wad) -> SignedWad {
        if self.mag > bound.0 {
            Self::from_parts(self.negative, bound)
        } else {
            self
        }
    }
}

impl From<Wad> for SignedWad {
    fn from(value: Wad) -> Self {
        SignedWad::from_wad(value)
    }
}

impl PartialOrd for SignedWad {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SignedWad {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.negative, other.negative) {
            (false, true) => Ordering::Greater,
            (true, false) => Ordering::Less,
            (false, false) => self.mag.cmp(&other.mag),
            (true, true) => other.mag.cmp(&self.mag),
        }
    }
}

impl fmt::Display for SignedWad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            write!(f, "-{}", Wad(self.mag))
        } else {
            write!(f, "{}", Wad(self.mag))
        }
    }
}
