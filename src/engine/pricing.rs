//! Price queries. nothing here mutates the engine.

use super::core::Engine;
use super::results::EngineError;
use crate::math::{SignedWad, Wad};
use crate::oracle::PriceOracle;
use crate::pricing::OpenInterest;
use crate::token::CollateralToken;
use crate::types::{PositionId, Side};

impl<O: PriceOracle, T: CollateralToken> Engine<O, T> {
    /// Current mark price from the pricing mode and open interest.
    pub fn mark_price(&self) -> Result<Wad, EngineError> {
        Ok(self.pricing.mark_price()?)
    }

    /// Oracle price at the engine clock.
    pub fn index_price_now(&self) -> Result<Wad, EngineError> {
        self.index_price()
    }

    /// |price after the trade - price now|
    pub fn price_impact(&self, size: Wad, side: Side) -> Result<Wad, EngineError> {
        Ok(self.pricing.price_impact(size, side)?)
    }

    /// (base, quote) virtual reserves. on a curve the quote side is mark * virtual base.
    pub fn virtual_reserves(&self) -> Result<(Wad, Wad), EngineError> {
        Ok(self.pricing.virtual_reserves()?)
    }

    pub fn open_interest(&self) -> OpenInterest {
        self.pricing.open_interest()
    }

    /// What closing the whole position would realize now, before fees and funding.
    /// the exit is priced with the position's size removed from the market.
    pub fn unrealized_pnl(&self, position_id: PositionId) -> Result<SignedWad, EngineError> {
        let position = self.active_position(position_id)?;
        let open_interest = self.pricing.after_decrease(position.side, position.size)?;
        let exit_price = self.pricing.price_at(&open_interest)?;
        Ok(position.unrealized_pnl(exit_price)?)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::MarketConfig;
    use crate::engine::{Engine, EngineConfig};
    use crate::math::{SignedWad, Wad};
    use crate::oracle::ManualOracle;
    use crate::token::InMemoryToken;
    use crate::types::{AccountId, Side, Timestamp};
    use crate::vault::Vault;
    use primitive_types::U256;

    const TRADER: AccountId = AccountId(10);
    const VAULT: AccountId = AccountId(2);

    fn setup_engine() -> Engine {
        let config = EngineConfig::default();
        let mut token = InMemoryToken::usdc();
        token.mint(TRADER, U256::from(1_000_000u64) * token.unit());
        token.approve(TRADER, VAULT, U256::MAX);
        let mut vault = Vault::new(token, VAULT, AccountId(1)).unwrap();
        vault.set_authorized(AccountId(1), config.market_address, true).unwrap();

        let now = Timestamp::from_secs(1_000);
        let oracle = ManualOracle::new(300_000).with_price(Wad::ONE, now);
        Engine::new(config, &MarketConfig::eth_perp(), oracle, vault, now).unwrap()
    }

    #[test]
    fn mark_starts_at_index() {
        let engine = setup_engine();
        assert_eq!(engine.mark_price().unwrap(), Wad::ONE);
        assert_eq!(engine.index_price_now().unwrap(), Wad::ONE);
        assert_eq!(engine.open_interest().total().unwrap(), Wad::ZERO);
    }

    #[test]
    fn fresh_position_has_no_pnl() {
        let mut engine = setup_engine();
        engine.deposit(TRADER, Wad::from_int(1000)).unwrap();
        let id = engine
            .open_position(TRADER, Wad::from_int(100), Side::Long, 10, Wad::ZERO, Wad::MAX)
            .unwrap();

        // removing the position restores the pre-trade mark it entered at
        assert_eq!(engine.unrealized_pnl(id).unwrap(), SignedWad::ZERO);
        assert!(engine.mark_price().unwrap() > Wad::ONE);
    }

    #[test]
    fn impact_is_symmetric_around_flat_market() {
        let engine = setup_engine();
        let size = Wad::from_int(10_000);
        let long = engine.price_impact(size, Side::Long).unwrap();
        let short = engine.price_impact(size, Side::Short).unwrap();
        assert!(!long.is_zero());
        // longs shrink the base, shorts grow it, so longs move the price more
        assert!(long > short);
    }
}
