// 11.0: every state change produces an event. the engine stamps them with an id and
// the engine clock; the vault queues its own payloads and the engine drains them.
// EventPayload lists all event types.

use crate::math::{SignedWad, Wad};
use crate::types::{AccountId, PositionId, Side, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventPayload {
    // Position events
    PositionOpened(PositionOpenedEvent),
    PositionIncreased(PositionIncreasedEvent),
    PositionClosed(PositionClosedEvent),
    PositionLiquidated(PositionLiquidatedEvent),
    AccountLiquidated(AccountLiquidatedEvent),

    // Funding events
    FundingUpdated(FundingUpdatedEvent),
    FundingApplied(FundingAppliedEvent),

    // Vault events
    CollateralDeposited(CollateralEvent),
    CollateralWithdrawn(CollateralEvent),
    MarginReserved(MarginEvent),
    MarginReleased(MarginEvent),
    PnlUpdated(PnlUpdatedEvent),
    FeeCharged(FeeChargedEvent),
    PnlRealized(PnlRealizedEvent),
    InsuranceFunded(InsuranceFundedEvent),
    FeesCollected(FeesCollectedEvent),
}

impl EventPayload {
    pub fn name(&self) -> &'static str {
        match self {
            EventPayload::PositionOpened(_) => "PositionOpened",
            EventPayload::PositionIncreased(_) => "PositionIncreased",
            EventPayload::PositionClosed(_) => "PositionClosed",
            EventPayload::PositionLiquidated(_) => "PositionLiquidated",
            EventPayload::AccountLiquidated(_) => "AccountLiquidated",
            EventPayload::FundingUpdated(_) => "FundingUpdated",
            EventPayload::FundingApplied(_) => "FundingApplied",
            EventPayload::CollateralDeposited(_) => "CollateralDeposited",
            EventPayload::CollateralWithdrawn(_) => "CollateralWithdrawn",
            EventPayload::MarginReserved(_) => "MarginReserved",
            EventPayload::MarginReleased(_) => "MarginReleased",
            EventPayload::PnlUpdated(_) => "PnlUpdated",
            EventPayload::FeeCharged(_) => "FeeCharged",
            EventPayload::PnlRealized(_) => "PnlRealized",
            EventPayload::InsuranceFunded(_) => "InsuranceFunded",
            EventPayload::FeesCollected(_) => "FeesCollected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionOpenedEvent {
    pub position_id: PositionId,
    pub owner: AccountId,
    pub side: Side,
    pub size: Wad,
    pub margin: Wad,
    pub entry_price: Wad,
    pub fee: Wad,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionIncreasedEvent {
    pub position_id: PositionId,
    pub owner: AccountId,
    pub added_size: Wad,
    pub added_margin: Wad,
    pub new_size: Wad,
    pub new_entry_price: Wad,
    pub fee: Wad,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionClosedEvent {
    pub position_id: PositionId,
    pub owner: AccountId,
    pub closed_size: Wad,
    pub remaining_size: Wad,
    pub exit_price: Wad,
    pub pnl: SignedWad, // net of the close fee
    pub fee: Wad,
    pub margin_released: Wad,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionLiquidatedEvent {
    pub position_id: PositionId,
    pub owner: AccountId,
    pub liquidator: AccountId,
    pub side: Side,
    pub size: Wad,
    pub exit_price: Wad,
    pub pnl: SignedWad,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountLiquidatedEvent {
    pub user: AccountId,
    pub liquidator: AccountId,
    pub penalty: Wad,
    pub liquidator_reward: Wad,
    pub insurance_share: Wad,
    pub bad_debt: Wad,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingUpdatedEvent {
    pub funding_rate: SignedWad,
    pub funding_index: SignedWad,
    pub premium_fraction: SignedWad,
    pub mark_price: Wad,
    pub index_price: Wad,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingAppliedEvent {
    pub user: AccountId,
    pub payment: SignedWad, // positive = received
    pub funding_index: SignedWad,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralEvent {
    pub user: AccountId,
    pub amount: Wad,
    pub new_collateral: Wad,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarginEvent {
    pub user: AccountId,
    pub amount: Wad,
    pub reserved_margin: Wad,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PnlUpdatedEvent {
    pub user: AccountId,
    pub delta: SignedWad,
    pub unrealized_pnl: SignedWad,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeChargedEvent {
    pub user: AccountId,
    pub amount: Wad,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PnlRealizedEvent {
    pub user: AccountId,
    pub amount: SignedWad,
    pub new_collateral: Wad,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsuranceFundedEvent {
    pub amount: Wad,
    pub balance: Wad,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeesCollectedEvent {
    pub to: AccountId,
    pub amount: Wad,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_with_payload_name() {
        let event = Event::new(
            EventId(7),
            Timestamp::from_millis(1000),
            EventPayload::CollateralDeposited(CollateralEvent {
                user: AccountId(1),
                amount: Wad::from_int(100),
                new_collateral: Wad::from_int(100),
            }),
        );

        assert_eq!(event.payload.name(), "CollateralDeposited");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("CollateralDeposited"));
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn closed_event_carries_signed_pnl() {
        let closed = PositionClosedEvent {
            position_id: PositionId(1),
            owner: AccountId(42),
            closed_size: Wad::from_int(1000),
            remaining_size: Wad::ZERO,
            exit_price: Wad::from_int(2000),
            pnl: SignedWad::neg(Wad::from_int(3)),
            fee: Wad::from_int(3),
            margin_released: Wad::from_int(100),
        };

        assert!(closed.pnl.is_negative());
        assert_eq!(closed.pnl.abs(), closed.fee);
    }
}
