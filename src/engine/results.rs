// 8.0.2: result types and errors for engine operations.

use crate::config::ConfigError;
use crate::math::{MathError, SignedWad, Wad};
use crate::oracle::OracleError;
use crate::types::{AccountId, PositionId, Timestamp};
use crate::vault::VaultError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundingResult {
    pub funding_rate: SignedWad,
    pub funding_index: SignedWad,
    pub premium_fraction: SignedWad,
    pub mark_price: Wad,
    pub index_price: Wad,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidationResult {
    pub owner: AccountId,
    pub liquidator: AccountId,
    // every position of the owner closed by this liquidation
    pub positions: Vec<PositionId>,
    pub exit_price: Wad,
    pub notional: Wad,
    pub realized_pnl: SignedWad,
    pub penalty: Wad,
    pub liquidator_reward: Wad,
    pub insurance_share: Wad,
    pub bad_debt: Wad,
}

/// Coarse error classes for callers that only need to know how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    InsufficientFunds,
    Slippage,
    Oracle,
    Arithmetic,
    Unauthorized,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("null address")]
    ZeroAddress,

    #[error("amount must be greater than zero")]
    ZeroAmount,

    #[error("leverage {leverage} outside [{min}, {max}]")]
    LeverageOutOfRange { leverage: u32, min: u32, max: u32 },

    #[error("close size {requested} exceeds position size {size}")]
    CloseSizeExceedsPosition { requested: Wad, size: Wad },

    #[error("position {0} not found")]
    PositionNotFound(PositionId),

    #[error("position {0} is not active")]
    PositionNotActive(PositionId),

    #[error("{caller} does not own position {position}")]
    NotPositionOwner { caller: AccountId, position: PositionId },

    #[error("execution price {price} outside [{min}, {max}]")]
    Slippage { price: Wad, min: Wad, max: Wad },

    #[error("oracle returned an unusable index price")]
    InvalidOraclePrice,

    #[error("oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("vault error: {0}")]
    Vault(#[from] VaultError),

    #[error("math error: {0}")]
    Math(#[from] MathError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::ZeroAddress
            | EngineError::ZeroAmount
            | EngineError::LeverageOutOfRange { .. }
            | EngineError::CloseSizeExceedsPosition { .. }
            | EngineError::PositionNotFound(_)
            | EngineError::PositionNotActive(_)
            | EngineError::Config(_) => ErrorKind::InvalidInput,
            EngineError::NotPositionOwner { .. } => ErrorKind::Unauthorized,
            EngineError::Slippage { .. } => ErrorKind::Slippage,
            EngineError::InvalidOraclePrice | EngineError::Oracle(_) => ErrorKind::Oracle,
            EngineError::Math(_) => ErrorKind::Arithmetic,
            EngineError::Vault(e) => match e {
                VaultError::Unauthorized { .. } => ErrorKind::Unauthorized,
                VaultError::InsufficientCollateral { .. }
                | VaultError::InsufficientAvailableMargin { .. }
                | VaultError::InsufficientReservedMargin { .. }
                | VaultError::InsufficientVaultReserves { .. }
                | VaultError::InsufficientFees { .. }
                | VaultError::Token(_) => ErrorKind::InsufficientFunds,
                VaultError::Math(_) => ErrorKind::Arithmetic,
                VaultError::ZeroAddress
                | VaultError::ZeroAmount
                | VaultError::MarginStillReserved
                | VaultError::NotLiquidatable(_)
                | VaultError::UnrepresentableAmount(_)
                | VaultError::UnsupportedTokenDecimals(_) => ErrorKind::InvalidInput,
            },
        }
    }
}
