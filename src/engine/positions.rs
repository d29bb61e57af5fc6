//! Position lifecycle: open, add, close.
//!
//! Every entry point follows the same order: validate, preview funding, price the
//! trade, run one vault batch, then commit funding, open interest and the record.
//! Nothing is written before the vault batch succeeds.

use super::core::Engine;
use super::results::EngineError;
use crate::events::{EventPayload, PositionClosedEvent, PositionIncreasedEvent, PositionOpenedEvent};
use crate::math::{SignedWad, Wad};
use crate::oracle::PriceOracle;
use crate::position::{calculate_pnl, Position};
use crate::token::CollateralToken;
use crate::types::{AccountId, PositionId, Side};
use crate::vault::MarginStep;

impl<O: PriceOracle, T: CollateralToken> Engine<O, T> {
    /// Open a new position of `collateral * leverage` at the current mark price.
    pub fn open_position(
        &mut self,
        trader: AccountId,
        collateral: Wad,
        side: Side,
        leverage: u32,
        min_price: Wad,
        max_price: Wad,
    ) -> Result<PositionId, EngineError> {
        if trader.is_null() {
            return Err(EngineError::ZeroAddress);
        }
        if collateral.is_zero() {
            return Err(EngineError::ZeroAmount);
        }
        self.check_leverage(leverage)?;

        let funding = self.preview_funding()?;
        let funding_index = self.funding_index_after(funding);

        let size = collateral.mul_int(leverage as u64)?;
        let price = self.pricing.mark_price()?;
        Self::check_slippage(price, min_price, max_price)?;
        let fee = size.mul_bps(self.params.trading_fee_bps)?;
        let open_interest = self.pricing.after_increase(side, size)?;

        let position = Position::new(
            self.positions.next_id(),
            trader,
            side,
            size,
            collateral,
            price,
            funding_index,
            self.current_time,
        );

        let steps = [MarginStep::Fee(fee), MarginStep::Reserve(collateral)];
        self.vault.settle(self.config.market_address, trader, &steps)?;

        // commit
        self.commit_funding(funding);
        self.pricing.commit(open_interest);
        let id = self.positions.insert(position);
        self.flush_vault_events();
        self.emit_event(EventPayload::PositionOpened(PositionOpenedEvent {
            position_id: id,
            owner: trader,
            side,
            size,
            margin: collateral,
            entry_price: price,
            fee,
        }));

        Ok(id)
    }

    /// Add `collateral * leverage` to an existing position. the entry price becomes the
    /// size-weighted average.
    pub fn add_to_position(
        &mut self,
        trader: AccountId,
        position_id: PositionId,
        collateral: Wad,
        leverage: u32,
        min_price: Wad,
        max_price: Wad,
    ) -> Result<(), EngineError> {
        if trader.is_null() {
            return Err(EngineError::ZeroAddress);
        }
        if collateral.is_zero() {
            return Err(EngineError::ZeroAmount);
        }
        self.check_leverage(leverage)?;
        let position = self.owned_active_position(trader, position_id)?.clone();

        let funding = self.preview_funding()?;
        let funding_index = self.funding_index_after(funding);
        let funding_step = self.funding_step(&position, funding_index)?;

        let added_size = collateral.mul_int(leverage as u64)?;
        let price = self.pricing.mark_price()?;
        Self::check_slippage(price, min_price, max_price)?;
        let fee = added_size.mul_bps(self.params.trading_fee_bps)?;
        let open_interest = self.pricing.after_increase(position.side, added_size)?;

        let mut next = position.increased(added_size, collateral, price, self.current_time)?;
        next.entry_funding_index = funding_index;

        let mut steps = Vec::with_capacity(3);
        steps.extend(funding_step);
        steps.push(MarginStep::Fee(fee));
        steps.push(MarginStep::Reserve(collateral));
        self.vault.settle(self.config.market_address, trader, &steps)?;

        // commit
        self.commit_funding(funding);
        self.pricing.commit(open_interest);
        let new_size = next.size;
        let new_entry_price = next.entry_price;
        self.positions.update(next);
        self.flush_vault_events();
        self.emit_event(EventPayload::PositionIncreased(PositionIncreasedEvent {
            position_id,
            owner: trader,
            added_size,
            added_margin: collateral,
            new_size,
            new_entry_price,
            fee,
        }));

        Ok(())
    }

    /// Close `size_to_close` of a position. returns realized pnl net of the close fee.
    /// the exit price is the mark once the closed size has left the market.
    pub fn close_position(
        &mut self,
        trader: AccountId,
        position_id: PositionId,
        size_to_close: Wad,
        min_price: Wad,
        max_price: Wad,
    ) -> Result<SignedWad, EngineError> {
        if trader.is_null() {
            return Err(EngineError::ZeroAddress);
        }
        if size_to_close.is_zero() {
            return Err(EngineError::ZeroAmount);
        }
        let position = self.owned_active_position(trader, position_id)?.clone();
        if size_to_close > position.size {
            return Err(EngineError::CloseSizeExceedsPosition {
                requested: size_to_close,
                size: position.size,
            });
        }

        let funding = self.preview_funding()?;
        let funding_index = self.funding_index_after(funding);
        let funding_step = self.funding_step(&position, funding_index)?;

        let open_interest = self.pricing.after_decrease(position.side, size_to_close)?;
        let exit_price = self.pricing.price_at(&open_interest)?;
        Self::check_slippage(exit_price, min_price, max_price)?;

        let raw_pnl = calculate_pnl(position.side, size_to_close, position.entry_price, exit_price)?;
        let fee = size_to_close.mul_bps(self.params.trading_fee_bps)?;
        let pnl = raw_pnl.sub_wad(fee)?;

        let (mut next, released) = position.reduced(size_to_close, self.current_time)?;
        next.entry_funding_index = funding_index;

        let mut steps = Vec::with_capacity(4);
        steps.extend(funding_step);
        steps.push(MarginStep::Pnl(raw_pnl));
        steps.push(MarginStep::Fee(fee));
        steps.push(MarginStep::Release(released));
        self.vault.settle(self.config.market_address, trader, &steps)?;

        // commit
        self.commit_funding(funding);
        self.pricing.commit(open_interest);
        let remaining_size = next.size;
        self.positions.update(next);
        self.flush_vault_events();
        self.emit_event(EventPayload::PositionClosed(PositionClosedEvent {
            position_id,
            owner: trader,
            closed_size: size_to_close,
            remaining_size,
            exit_price,
            pnl,
            fee,
            margin_released: released,
        }));

        Ok(pnl)
    }

    pub fn position(&self, position_id: PositionId) -> Option<&Position> {
        self.positions.get(position_id)
    }

    pub fn position_owner(&self, position_id: PositionId) -> Option<AccountId> {
        self.positions.owner_of(position_id)
    }

    /// Active positions of `owner`, in no particular order.
    pub fn positions_of(&self, owner: AccountId) -> Vec<&Position> {
        self.positions.active_positions(owner)
    }

    fn check_leverage(&self, leverage: u32) -> Result<(), EngineError> {
        let (min, max) = (self.params.min_leverage, self.params.max_leverage);
        if leverage < min || leverage > max {
            return Err(EngineError::LeverageOutOfRange { leverage, min, max });
        }
        Ok(())
    }

    pub(super) fn active_position(&self, position_id: PositionId) -> Result<&Position, EngineError> {
        let position = self
            .positions
            .get(position_id)
            .ok_or(EngineError::PositionNotFound(position_id))?;
        if !position.is_active {
            return Err(EngineError::PositionNotActive(position_id));
        }
        Ok(position)
    }

    fn owned_active_position(&self, trader: AccountId, position_id: PositionId) -> Result<&Position, EngineError> {
        let position = self
            .positions
            .get(position_id)
            .ok_or(EngineError::PositionNotFound(position_id))?;
        if position.owner != trader {
            return Err(EngineError::NotPositionOwner {
                caller: trader,
                position: position_id,
            });
        }
        if !position.is_active {
            return Err(EngineError::PositionNotActive(position_id));
        }
        Ok(position)
    }
}

