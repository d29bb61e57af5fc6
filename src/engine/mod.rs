// 8.0: market engine. one vAMM market: margin vault, oracle, pricing, funding,
// position lifecycle and liquidation. every trade settles in one vault batch
// and nothing is committed unless that batch succeeds.

mod config;
mod core;
mod positions;
mod pricing;
mod funding;
mod liquidations;
mod results;

pub use config::{EngineConfig, DEFAULT_MARKET_ADDRESS};
pub use core::Engine;
pub use results::{EngineError, ErrorKind, FundingResult, LiquidationResult};
