// vamm-perps: perpetual futures on a virtual AMM.
// no order book and no counterparty: the mark price comes from open interest,
// margin lives in one vault, and every amount is 18-decimal fixed point.
// all computation is deterministic with no external I/O.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: AccountId, PositionId, Side, Timestamp
//   2.x  math.rs: Wad/SignedWad fixed point, sqrt, exp/ln
//   3.x  pricing.rs: open interest, dynamic reserves, bonding curve
//   4.x  vault.rs: collateral, margin ledger, liquidation settlement, insurance
//   5.x  funding.rs: hourly funding rate and index
//   6.x  position.rs: position records, pnl, the position book
//   7.x  config.rs: market presets, validation, fixed point params
//   8.x  engine/: market engine: open, add, close, funding, liquidation
//   9.x  oracle.rs: index price boundary + manual oracle
//   9.2  token.rs: collateral token boundary + in-memory token
//   11.x events.rs: state transition events for audit

// core modules
pub mod engine;
pub mod events;
pub mod funding;
pub mod math;
pub mod position;
pub mod pricing;
pub mod types;
pub mod vault;

// integration modules
pub mod config;
pub mod oracle;
pub mod token;

// re exports for convenience
pub use config::*;
pub use engine::*;
pub use events::*;
pub use funding::*;
pub use math::*;
pub use oracle::*;
pub use position::*;
pub use pricing::*;
pub use token::*;
pub use types::*;
pub use vault::*;
