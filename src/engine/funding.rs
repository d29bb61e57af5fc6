//! Funding rate updates and lazy per-position settlement.

use super::core::Engine;
use super::results::{EngineError, FundingResult};
use crate::math::SignedWad;
use crate::oracle::PriceOracle;
use crate::token::CollateralToken;
use crate::types::PositionId;
use crate::vault::MarginStep;

impl<O: PriceOracle, T: CollateralToken> Engine<O, T> {
    /// Advance the funding index if an interval has passed. None when it is not due yet.
    pub fn update_funding(&mut self) -> Result<Option<FundingResult>, EngineError> {
        let Some(preview) = self.preview_funding()? else {
            return Ok(None);
        };
        self.commit_funding(Some(preview));
        Ok(Some(FundingResult {
            funding_rate: preview.state.funding_rate,
            funding_index: preview.state.funding_index,
            premium_fraction: preview.state.premium_fraction,
            mark_price: preview.mark_price,
            index_price: preview.index_price,
            updated_at: preview.state.last_funding_time,
        }))
    }

    /// Settle whatever funding `position_id` owes or is owed since its last touch.
    /// anyone can call this. returns the payment, positive when the owner received it.
    pub fn apply_funding_to_position(&mut self, position_id: PositionId) -> Result<SignedWad, EngineError> {
        let position = self.active_position(position_id)?.clone();

        let funding = self.preview_funding()?;
        let funding_index = self.funding_index_after(funding);
        if funding_index == position.entry_funding_index {
            self.commit_funding(funding);
            return Ok(SignedWad::ZERO);
        }
        let payment = position.pending_funding(funding_index)?;
        let step = MarginStep::Funding {
            payment,
            index: funding_index,
        };

        self.vault.settle(self.config.market_address, position.owner, &[step])?;

        // commit
        self.commit_funding(funding);
        let mut next = position;
        next.entry_funding_index = funding_index;
        next.last_interaction_time = self.current_time;
        self.positions.update(next);
        self.flush_vault_events();

        Ok(payment)
    }

    /// Funding `position_id` would settle right now, without touching anything.
    pub fn pending_funding(&self, position_id: PositionId) -> Result<SignedWad, EngineError> {
        let position = self.active_position(position_id)?;
        let index = self.funding_index_after(self.preview_funding()?);
        Ok(position.pending_funding(index)?)
    }
}
