// 7.0 config.rs: all market settings in one place. pricing, funding, fees, margins.
// human-readable decimals on the outside, validated and turned into fixed point by to_params().

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::funding::{FundingParams, DEFAULT_FUNDING_INTERVAL_MS, DEFAULT_PREMIUM_DIVISOR};
use crate::math::{MathError, Wad, BASIS_POINTS};
use crate::pricing::{BondingCurve, CurveShape, DynamicReserves, PricingMode};

// Complete configuration for one vAMM market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketConfig {
    // Human readable market name
    pub name: String,
    // Market symbol (e.g. "ETH-PERP")
    pub symbol: String,
    pub pricing: PricingConfig,
    pub funding: FundingConfig,
    // Fee on notional for opens, adds and closes
    pub trading_fee_bps: u32,
    // Liquidation penalty on notional
    pub liquidation_fee_bps: u32,
    // Liquidator's cut of the penalty, rest goes to insurance
    pub liquidator_share_bps: u32,
    // Account equity must stay at or above this share of reserved margin
    pub maintenance_margin_bps: u32,
    pub min_leverage: u32,
    pub max_leverage: u32,
    // Oracle prices older than this are rejected
    pub oracle_max_age_ms: i64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self::eth_perp()
    }
}

/** 7.1: price discovery settings. tagged by mode */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PricingConfig {
    DynamicReserves {
        // Virtual base; quote is seeded from the oracle when the market opens
        base_reserves: Decimal,
        // Net open interest is divided by this before it moves the base
        impact_divisor: u64,
    },
    BondingCurve {
        starting_price: Decimal,
        steepness: Decimal,
        exponent: Decimal,
        max_pump_multiplier: Decimal,
        virtual_base_reserves: Decimal,
        #[serde(default)]
        shape: CurveShape,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingConfig {
    pub interval_ms: i64,
    // Per-interval cap, 0.01 = 1%
    pub max_rate: Decimal,
    pub premium_divisor: u64,
}

impl Default for FundingConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_FUNDING_INTERVAL_MS,
            max_rate: dec!(0.01),
            premium_divisor: DEFAULT_PREMIUM_DIVISOR,
        }
    }
}

impl MarketConfig {
    pub fn eth_perp() -> Self {
        Self {
            name: "Ether Perpetual".to_string(),
            symbol: "ETH-PERP".to_string(),
            pricing: PricingConfig::DynamicReserves {
                base_reserves: dec!(1000000),
                impact_divisor: 100,
            },
            funding: FundingConfig::default(),
            trading_fee_bps: 30,     // 0.3%
            liquidation_fee_bps: 100, // 1%
            liquidator_share_bps: 5_000,
            maintenance_margin_bps: 500, // 5% of reserved
            min_leverage: 1,
            max_leverage: 100,
            oracle_max_age_ms: 300_000,
        }
    }

    // Launchpad style market: price only goes up with long demand, capped
    pub fn launch_pump() -> Self {
        Self {
            name: "Launch Pump".to_string(),
            symbol: "PUMP-PERP".to_string(),
            pricing: PricingConfig::BondingCurve {
                starting_price: dec!(0.0001),
                steepness: dec!(1000000),
                exponent: dec!(1),
                max_pump_multiplier: dec!(100),
                virtual_base_reserves: dec!(1000000000),
                shape: CurveShape::Linear,
            },
            funding: FundingConfig::default(),
            trading_fee_bps: 100,
            liquidation_fee_bps: 250,
            liquidator_share_bps: 5_000,
            maintenance_margin_bps: 1_000,
            min_leverage: 1,
            max_leverage: 10,
            oracle_max_age_ms: 300_000,
        }
    }

    pub fn testnet() -> Self {
        let mut config = Self::eth_perp();
        config.name = "Ether Perpetual Testnet".to_string();
        config.trading_fee_bps = 1; // minimal fee
        config.max_leverage = 20;
        config
    }

    pub fn mainnet_conservative() -> Self {
        let mut config = Self::eth_perp();
        config.max_leverage = 25;
        config.maintenance_margin_bps = 1_000;
        config.oracle_max_age_ms = 60_000;
        config
    }

    // Validate the configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.pricing {
            PricingConfig::DynamicReserves {
                base_reserves,
                impact_divisor,
            } => {
                if *base_reserves <= Decimal::ZERO {
                    return Err(ConfigError::InvalidPricing {
                        reason: "base reserves must be positive".to_string(),
                    });
                }
                if *impact_divisor == 0 {
                    return Err(ConfigError::InvalidPricing {
                        reason: "impact divisor must be positive".to_string(),
                    });
                }
            }
            PricingConfig::BondingCurve {
                starting_price,
                steepness,
                exponent,
                max_pump_multiplier,
                virtual_base_reserves,
                ..
            } => {
                if *starting_price <= Decimal::ZERO || *steepness <= Decimal::ZERO {
                    return Err(ConfigError::InvalidPricing {
                        reason: "starting price and steepness must be positive".to_string(),
                    });
                }
                if *exponent < Decimal::ZERO {
                    return Err(ConfigError::InvalidPricing {
                        reason: "exponent cannot be negative".to_string(),
                    });
                }
                if *max_pump_multiplier < Decimal::ONE {
                    return Err(ConfigError::InvalidPricing {
                        reason: "max pump multiplier must be at least 1".to_string(),
                    });
                }
                if *virtual_base_reserves <= Decimal::ZERO {
                    return Err(ConfigError::InvalidPricing {
                        reason: "virtual base reserves must be positive".to_string(),
                    });
                }
            }
        }

        if self.funding.interval_ms <= 0 || self.funding.premium_divisor == 0 {
            return Err(ConfigError::InvalidFunding {
                reason: "interval and premium divisor must be positive".to_string(),
            });
        }
        if self.funding.max_rate <= Decimal::ZERO || self.funding.max_rate > Decimal::ONE {
            return Err(ConfigError::InvalidFunding {
                reason: "max rate must be in (0, 1]".to_string(),
            });
        }

        if self.trading_fee_bps > 1_000 {
            return Err(ConfigError::InvalidFees {
                reason: "trading fee too high (>10%)".to_string(),
            });
        }
        if self.liquidation_fee_bps > BASIS_POINTS || self.liquidator_share_bps > BASIS_POINTS {
            return Err(ConfigError::InvalidFees {
                reason: "liquidation bps out of range".to_string(),
            });
        }

        if self.maintenance_margin_bps == 0 || self.maintenance_margin_bps >= BASIS_POINTS {
            return Err(ConfigError::InvalidMargin {
                reason: "maintenance margin must be between 0 and 100%".to_string(),
            });
        }
        if self.min_leverage == 0 || self.min_leverage > self.max_leverage {
            return Err(ConfigError::InvalidMargin {
                reason: "leverage bounds must satisfy 1 <= min <= max".to_string(),
            });
        }

        if self.oracle_max_age_ms <= 0 {
            return Err(ConfigError::InvalidOracle {
                reason: "oracle max age must be positive".to_string(),
            });
        }

        Ok(())
    }

    /// Validated fixed-point parameters.
    pub fn to_params(&self) -> Result<MarketParams, ConfigError> {
        self.validate()?;
        let pricing = match &self.pricing {
            PricingConfig::DynamicReserves {
                base_reserves,
                impact_divisor,
            } => PricingParams::DynamicReserves {
                base_reserves: Wad::from_decimal(*base_reserves)?,
                impact_divisor: *impact_divisor,
            },
            PricingConfig::BondingCurve {
                starting_price,
                steepness,
                exponent,
                max_pump_multiplier,
                virtual_base_reserves,
                shape,
            } => PricingParams::BondingCurve(BondingCurve {
                starting_price: Wad::from_decimal(*starting_price)?,
                steepness: Wad::from_decimal(*steepness)?,
                exponent: Wad::from_decimal(*exponent)?,
                max_pump_multiplier: Wad::from_decimal(*max_pump_multiplier)?,
                virtual_base_reserves: Wad::from_decimal(*virtual_base_reserves)?,
                shape: *shape,
            }),
        };

        Ok(MarketParams {
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            pricing,
            funding: FundingParams {
                interval_ms: self.funding.interval_ms,
                max_rate: Wad::from_decimal(self.funding.max_rate)?,
                premium_divisor: self.funding.premium_divisor,
            },
            trading_fee_bps: self.trading_fee_bps,
            liquidation_fee_bps: self.liquidation_fee_bps,
            liquidator_share_bps: self.liquidator_share_bps,
            maintenance_margin_bps: self.maintenance_margin_bps,
            min_leverage: self.min_leverage,
            max_leverage: self.max_leverage,
            oracle_max_age_ms: self.oracle_max_age_ms,
        })
    }
}

/// 7.2: the fixed-point form the engine runs on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketParams {
    pub name: String,
    pub symbol: String,
    pub pricing: PricingParams,
    pub funding: FundingParams,
    pub trading_fee_bps: u32,
    pub liquidation_fee_bps: u32,
    pub liquidator_share_bps: u32,
    pub maintenance_margin_bps: u32,
    pub min_leverage: u32,
    pub max_leverage: u32,
    pub oracle_max_age_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PricingParams {
    DynamicReserves { base_reserves: Wad, impact_divisor: u64 },
    BondingCurve(BondingCurve),
}

impl PricingParams {
    /// Dynamic reserves need the oracle price to seed the quote side; the curve ignores it.
    pub fn into_mode(&self, oracle_price: Wad) -> Result<PricingMode, MathError> {
        Ok(match self {
            PricingParams::DynamicReserves {
                base_reserves,
                impact_divisor,
            } => PricingMode::DynamicReserves(DynamicReserves::seeded(
                *base_reserves,
                oracle_price,
                *impact_divisor,
            )?),
            PricingParams::BondingCurve(curve) => PricingMode::BondingCurve(*curve),
        })
    }
}

// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid pricing config: {reason}")]
    InvalidPricing { reason: String },

    #[error("invalid funding config: {reason}")]
    InvalidFunding { reason: String },

    #[error("invalid fee config: {reason}")]
    InvalidFees { reason: String },

    #[error("invalid margin config: {reason}")]
    InvalidMargin { reason: String },

    #[error("invalid oracle config: {reason}")]
    InvalidOracle { reason: String },

    #[error("value out of fixed-point range: {0}")]
    Math(#[from] MathError),
}

// Environment presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Testnet,
    Mainnet,
}

impl Environment {
    pub fn config(&self) -> MarketConfig {
        match self {
            Environment::Development => MarketConfig::default(),
            Environment::Testnet => MarketConfig::testnet(),
            Environment::Mainnet => MarketConfig::mainnet_conservative(),
        }
    }
}
