//! Liquidation detection and execution.
//!
//! The vault resets a liquidated user's whole margin account, so liquidation is
//! account-wide: every active position of the owner is closed at once, at the
//! mark price once all of them have left the market.

use super::core::{Engine, FundingPreview};
use super::results::{EngineError, LiquidationResult};
use crate::events::{EventPayload, PositionLiquidatedEvent};
use crate::math::{SignedWad, Wad};
use crate::oracle::PriceOracle;
use crate::position::Position;
use crate::pricing::OpenInterest;
use crate::token::CollateralToken;
use crate::types::{AccountId, PositionId};
use crate::vault::{LiquidationTerms, MarginStep};

// everything a liquidation of one owner would do, computed without side effects
struct LiquidationPlan {
    funding: Option<FundingPreview>,
    positions: Vec<(Position, SignedWad)>,
    open_interest: OpenInterest,
    exit_price: Wad,
    notional: Wad,
    realized_pnl: SignedWad,
    steps: Vec<MarginStep>,
}

impl<O: PriceOracle, T: CollateralToken> Engine<O, T> {
    fn plan_liquidation(&self, owner: AccountId) -> Result<LiquidationPlan, EngineError> {
        let funding = self.preview_funding()?;
        let funding_index = self.funding_index_after(funding);

        let owned: Vec<Position> = self
            .positions
            .active_positions(owner)
            .into_iter()
            .cloned()
            .collect();

        let mut open_interest = self.pricing.open_interest();
        for position in &owned {
            open_interest = open_interest.decreased(position.side, position.size)?;
        }
        let exit_price = self.pricing.price_at(&open_interest)?;

        let mut steps = Vec::with_capacity(owned.len() * 2);
        let mut positions = Vec::with_capacity(owned.len());
        let mut notional = Wad::ZERO;
        let mut realized_pnl = SignedWad::ZERO;
        for position in owned {
            steps.extend(self.funding_step(&position, funding_index)?);
            let pnl = position.unrealized_pnl(exit_price)?;
            steps.push(MarginStep::Pnl(pnl));
            notional = notional.checked_add(position.notional_value(exit_price)?)?;
            realized_pnl = realized_pnl.checked_add(pnl)?;
            positions.push((position, pnl));
        }

        Ok(LiquidationPlan {
            funding,
            positions,
            open_interest,
            exit_price,
            notional,
            realized_pnl,
            steps,
        })
    }

    /// Whether the owner of `position_id` is under maintenance once funding and
    /// mark-to-market pnl are settled.
    pub fn is_liquidatable(&self, position_id: PositionId) -> Result<bool, EngineError> {
        let owner = self.active_position(position_id)?.owner;
        let plan = self.plan_liquidation(owner)?;
        let staged = self.vault.preview(owner, &plan.steps)?;
        Ok(staged.is_liquidatable(self.params.maintenance_margin_bps)?)
    }

    /// Liquidate the owner of `position_id`. anyone can call this; the liquidator
    /// is credited its share of the penalty as collateral.
    pub fn liquidate(
        &mut self,
        liquidator: AccountId,
        position_id: PositionId,
    ) -> Result<LiquidationResult, EngineError> {
        if liquidator.is_null() {
            return Err(EngineError::ZeroAddress);
        }
        let owner = self.active_position(position_id)?.owner;
        let plan = self.plan_liquidation(owner)?;

        let penalty = plan.notional.mul_bps(self.params.liquidation_fee_bps)?;
        let terms = LiquidationTerms {
            maintenance_margin_bps: self.params.maintenance_margin_bps,
            penalty,
            liquidator,
            liquidator_share_bps: self.params.liquidator_share_bps,
        };
        let outcome = self
            .vault
            .liquidate(self.config.market_address, owner, &plan.steps, terms)?;

        // commit
        self.commit_funding(plan.funding);
        self.pricing.commit(plan.open_interest);

        let mut ids = Vec::with_capacity(plan.positions.len());
        let mut liquidated = Vec::with_capacity(plan.positions.len());
        for (position, pnl) in plan.positions {
            ids.push(position.id);
            liquidated.push(PositionLiquidatedEvent {
                position_id: position.id,
                owner,
                liquidator,
                side: position.side,
                size: position.size,
                exit_price: plan.exit_price,
                pnl,
            });
            self.positions.update(position.closed_out(self.current_time));
        }

        self.flush_vault_events();
        for event in liquidated {
            self.emit_event(EventPayload::PositionLiquidated(event));
        }

        log::info!(
            "liquidated {} ({} positions) by {}: penalty {}, bad debt {}",
            owner,
            ids.len(),
            liquidator,
            outcome.penalty,
            outcome.bad_debt
        );

        Ok(LiquidationResult {
            owner,
            liquidator,
            positions: ids,
            exit_price: plan.exit_price,
            notional: plan.notional,
            realized_pnl: plan.realized_pnl,
            penalty: outcome.penalty,
            liquidator_reward: outcome.liquidator_reward,
            insurance_share: outcome.insurance_share,
            bad_debt: outcome.bad_debt,
        })
    }
}
