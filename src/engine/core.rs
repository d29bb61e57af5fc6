// 8.0 engine/core.rs: main engine. one market: its vault, oracle, pricing, funding and positions.

use super::config::EngineConfig;
use super::results::EngineError;
use crate::config::{MarketConfig, MarketParams};
use crate::events::{Event, EventId, EventPayload, FundingUpdatedEvent};
use crate::funding::FundingState;
use crate::math::{SignedWad, Wad};
use crate::oracle::{ManualOracle, PriceOracle};
use crate::position::{Position, PositionBook};
use crate::pricing::PricingEngine;
use crate::token::{CollateralToken, InMemoryToken};
use crate::types::{AccountId, Timestamp};
use crate::vault::{MarginStep, Vault, VaultError};

/** 8.1: main engine struct. all state lives here */
#[derive(Debug)]
pub struct Engine<O: PriceOracle = ManualOracle, T: CollateralToken = InMemoryToken> {
    pub(super) config: EngineConfig,
    pub(super) params: MarketParams,
    pub(super) vault: Vault<T>,
    pub(super) oracle: O,
    pub(super) pricing: PricingEngine,
    pub(super) funding: FundingState,
    pub(super) positions: PositionBook,
    pub(super) events: Vec<Event>,
    pub(super) next_event_id: u64,
    pub(super) current_time: Timestamp,
}

// a funding update that has been computed but not yet kept
#[derive(Debug, Clone, Copy)]
pub(super) struct FundingPreview {
    pub state: FundingState,
    pub mark_price: Wad,
    pub index_price: Wad,
}

impl<O: PriceOracle, T: CollateralToken> Engine<O, T> {
    /// Opens the market at `now`. the oracle must already serve a price: dynamic
    /// reserves are seeded from it so the first mark equals the index.
    pub fn new(
        config: EngineConfig,
        market: &MarketConfig,
        oracle: O,
        vault: Vault<T>,
        now: Timestamp,
    ) -> Result<Self, EngineError> {
        if config.market_address.is_null() {
            return Err(EngineError::ZeroAddress);
        }
        if !vault.is_authorized(config.market_address) {
            return Err(VaultError::Unauthorized {
                caller: config.market_address,
            }
            .into());
        }
        let params = market.to_params()?;
        let index_price = oracle.get_price(now)?;
        if index_price.is_zero() {
            return Err(EngineError::InvalidOraclePrice);
        }
        let pricing = PricingEngine::new(params.pricing.into_mode(index_price)?);

        log::info!(
            "market {} opened at {} (index {})",
            params.symbol,
            now.as_millis(),
            index_price
        );

        Ok(Self {
            config,
            params,
            vault,
            oracle,
            pricing,
            funding: FundingState::new(now),
            positions: PositionBook::new(),
            events: Vec::new(),
            next_event_id: 1,
            current_time: now,
        })
    }

    pub fn set_time(&mut self, timestamp: Timestamp) {
        self.current_time = timestamp;
    }

    pub fn time(&self) -> Timestamp {
        self.current_time
    }

    pub fn advance_time(&mut self, millis: i64) {
        self.current_time = self.current_time.plus_millis(millis);
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn params(&self) -> &MarketParams {
        &self.params
    }

    pub fn vault(&self) -> &Vault<T> {
        &self.vault
    }

    /// Direct vault access for admin work. vault-side checks still apply.
    pub fn vault_mut(&mut self) -> &mut Vault<T> {
        &mut self.vault
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn oracle_mut(&mut self) -> &mut O {
        &mut self.oracle
    }

    pub fn pricing(&self) -> &PricingEngine {
        &self.pricing
    }

    pub fn funding_state(&self) -> &FundingState {
        &self.funding
    }

    pub fn positions(&self) -> &PositionBook {
        &self.positions
    }

    pub fn deposit(&mut self, user: AccountId, amount: Wad) -> Result<(), EngineError> {
        self.vault.deposit_collateral(user, user, amount)?;
        self.flush_vault_events();
        Ok(())
    }

    pub fn withdraw(&mut self, user: AccountId, amount: Wad) -> Result<(), EngineError> {
        self.vault.withdraw_collateral(user, user, amount)?;
        self.flush_vault_events();
        Ok(())
    }

    /// Moves a flat account's pnl into withdrawable collateral.
    pub fn realize_pnl(&mut self, user: AccountId) -> Result<(), EngineError> {
        self.vault.realize_pnl(user, user)?;
        self.flush_vault_events();
        Ok(())
    }

    pub fn fund_insurance(&mut self, caller: AccountId, amount: Wad) -> Result<(), EngineError> {
        self.vault.fund_insurance(caller, amount)?;
        self.flush_vault_events();
        Ok(())
    }

    pub fn collect_fees(&mut self, caller: AccountId, to: AccountId, amount: Wad) -> Result<(), EngineError> {
        self.vault.collect_fees(caller, to, amount)?;
        self.flush_vault_events();
        Ok(())
    }

    pub fn recent_events(&self, count: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Index price at the engine clock. zero is never a usable price.
    pub(super) fn index_price(&self) -> Result<Wad, EngineError> {
        let price = self.oracle.get_price(self.current_time)?;
        if price.is_zero() {
            return Err(EngineError::InvalidOraclePrice);
        }
        Ok(price)
    }

    // the funding update this operation would perform, if one is due.
    // the oracle is only read when it is.
    pub(super) fn preview_funding(&self) -> Result<Option<FundingPreview>, EngineError> {
        if !self.funding.is_due(self.current_time, &self.params.funding) {
            return Ok(None);
        }
        let mark_price = self.pricing.mark_price()?;
        let index_price = self.index_price()?;
        let state = self
            .funding
            .advanced(mark_price, index_price, self.current_time, &self.params.funding)?;
        Ok(Some(FundingPreview {
            state,
            mark_price,
            index_price,
        }))
    }

    pub(super) fn funding_index_after(&self, preview: Option<FundingPreview>) -> SignedWad {
        preview
            .map(|p| p.state.funding_index)
            .unwrap_or(self.funding.funding_index)
    }

    pub(super) fn commit_funding(&mut self, preview: Option<FundingPreview>) {
        let Some(preview) = preview else {
            return;
        };
        self.funding = preview.state;
        log::info!(
            "funding updated: rate {} index {} (mark {}, index price {})",
            preview.state.funding_rate,
            preview.state.funding_index,
            preview.mark_price,
            preview.index_price
        );
        self.emit_event(EventPayload::FundingUpdated(FundingUpdatedEvent {
            funding_rate: preview.state.funding_rate,
            funding_index: preview.state.funding_index,
            premium_fraction: preview.state.premium_fraction,
            mark_price: preview.mark_price,
            index_price: preview.index_price,
        }));
    }

    /// Funding step that settles `position` up to `index`, if anything is owed.
    pub(super) fn funding_step(
        &self,
        position: &Position,
        index: SignedWad,
    ) -> Result<Option<MarginStep>, EngineError> {
        if index == position.entry_funding_index {
            return Ok(None);
        }
        let payment = position.pending_funding(index)?;
        Ok(Some(MarginStep::Funding { payment, index }))
    }

    pub(super) fn check_slippage(price: Wad, min_price: Wad, max_price: Wad) -> Result<(), EngineError> {
        if price < min_price || price > max_price {
            return Err(EngineError::Slippage {
                price,
                min: min_price,
                max: max_price,
            });
        }
        Ok(())
    }

    pub(super) fn flush_vault_events(&mut self) {
        for payload in self.vault.take_events() {
            self.emit_event(payload);
        }
    }

    pub(super) fn emit_event(&mut self, payload: EventPayload) {
        let event = Event::new(EventId(self.next_event_id), self.current_time, payload);
        self.next_event_id += 1;

        if self.config.verbose {
            log::info!("[event {}] {:?}", event.id.0, event.payload);
        } else {
            log::trace!("[event {}] {:?}", event.id.0, event.payload);
        }

        self.events.push(event);

        if self.events.len() > self.config.max_events {
            let drain_count = self.events.len() - self.config.max_events;
            self.events.drain(0..drain_count);
        }
    }
}
