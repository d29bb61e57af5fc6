//! Engine configuration options.

use crate::types::AccountId;

/// Address the engine acts as when it calls into the vault.
pub const DEFAULT_MARKET_ADDRESS: AccountId = AccountId(0x00ff_0000_0000_0001);

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// The market contract identity. must be authorized on the vault.
    pub market_address: AccountId,
    /// Maximum number of events to retain in memory.
    pub max_events: usize,
    /// Log every event at info instead of trace.
    pub verbose: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            market_address: DEFAULT_MARKET_ADDRESS,
            max_events: 100_000,
            verbose: false,
        }
    }
}
