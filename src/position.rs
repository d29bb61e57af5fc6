// 6.0: position records. pnl = size * (exit - entry), sign flipped for shorts.
// 6.1 has increase/reduce at the bottom of Position, 6.2 is the arena + per-owner index.

use crate::funding::calculate_funding_payment;
use crate::math::{MathError, SignedWad, Wad};
use crate::types::{AccountId, PositionId, Side, Timestamp};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub owner: AccountId,
    pub side: Side,
    pub size: Wad,
    // reserved collateral still attributed to this position
    pub margin: Wad,
    pub entry_price: Wad,
    pub entry_funding_index: SignedWad,
    pub opened_at: Timestamp,
    pub last_interaction_time: Timestamp,
    pub is_active: bool,
}

impl Position {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: PositionId,
        owner: AccountId,
        side: Side,
        size: Wad,
        margin: Wad,
        entry_price: Wad,
        funding_index: SignedWad,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id,
            owner,
            side,
            size,
            margin,
            entry_price,
            entry_funding_index: funding_index,
            opened_at: timestamp,
            last_interaction_time: timestamp,
            is_active: true,
        }
    }

    // paper gains/losses if the whole position exited at `exit_price`
    pub fn unrealized_pnl(&self, exit_price: Wad) -> Result<SignedWad, MathError> {
        calculate_pnl(self.side, self.size, self.entry_price, exit_price)
    }

    /// Funding owed to (positive) or by (negative) this position since its last settlement.
    pub fn pending_funding(&self, funding_index: SignedWad) -> Result<SignedWad, MathError> {
        let delta = funding_index.checked_sub(self.entry_funding_index)?;
        calculate_funding_payment(self.side, self.size, delta)
    }

    pub fn notional_value(&self, price: Wad) -> Result<Wad, MathError> {
        self.size.mul(price)
    }

    // 6.1: add size at `price`. the entry becomes the size-weighted average, floored.
    pub fn increased(
        &self,
        added_size: Wad,
        added_margin: Wad,
        price: Wad,
        now: Timestamp,
    ) -> Result<Position, MathError> {
        let new_size = self.size.checked_add(added_size)?;
        let old_value = self.size.mul(self.entry_price)?;
        let added_value = added_size.mul(price)?;
        let entry_price = old_value.checked_add(added_value)?.div(new_size)?;

        let mut next = self.clone();
        next.size = new_size;
        next.margin = self.margin.checked_add(added_margin)?;
        next.entry_price = entry_price;
        next.last_interaction_time = now;
        Ok(next)
    }

    /// Removes `close_size`. returns the reduced record and the margin to release:
    /// margin * close / size floored, or everything left on a full close.
    pub fn reduced(&self, close_size: Wad, now: Timestamp) -> Result<(Position, Wad), MathError> {
        let remaining = self.size.checked_sub(close_size)?;
        let release = if remaining.is_zero() {
            self.margin
        } else {
            proportional(self.margin, close_size, self.size)?
        };

        let mut next = self.clone();
        next.size = remaining;
        next.margin = self.margin.checked_sub(release)?;
        next.last_interaction_time = now;
        if remaining.is_zero() {
            next.is_active = false;
        }
        Ok((next, release))
    }

    /// Zeroed, inactive copy. used for liquidations.
    pub fn closed_out(&self, now: Timestamp) -> Position {
        let mut next = self.clone();
        next.size = Wad::ZERO;
        next.margin = Wad::ZERO;
        next.is_active = false;
        next.last_interaction_time = now;
        next
    }
}

pub fn calculate_pnl(side: Side, size: Wad, entry_price: Wad, exit_price: Wad) -> Result<SignedWad, MathError> {
    let amount = size.mul(entry_price.abs_diff(exit_price))?;
    let gained = match side {
        Side::Long => exit_price >= entry_price,
        Side::Short => exit_price <= entry_price,
    };
    Ok(SignedWad::from_parts(!gained, amount))
}

// floor(amount * part / whole) at full precision
fn proportional(amount: Wad, part: Wad, whole: Wad) -> Result<Wad, MathError> {
    if whole.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let product: U256 = amount
        .raw()
        .checked_mul(part.raw())
        .ok_or(MathError::Overflow)?;
    Ok(Wad::from_raw(product / whole.raw()))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct OwnerIndex {
    ids: Vec<PositionId>,
    slots: HashMap<PositionId, usize>,
}

impl OwnerIndex {
    fn insert(&mut self, id: PositionId) {
        if self.slots.contains_key(&id) {
            return;
        }
        self.slots.insert(id, self.ids.len());
        self.ids.push(id);
    }

    // O(1): the last id takes the removed one's slot
    fn remove(&mut self, id: PositionId) -> bool {
        let Some(slot) = self.slots.remove(&id) else {
            return false;
        };
        self.ids.swap_remove(slot);
        if let Some(moved) = self.ids.get(slot) {
            self.slots.insert(*moved, slot);
        }
        true
    }
}

/// 6.2: every position ever opened, plus each owner's active ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionBook {
    positions: HashMap<PositionId, Position>,
    owners: HashMap<AccountId, OwnerIndex>,
    next_id: u64,
}

impl Default for PositionBook {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionBook {
    pub fn new() -> Self {
        Self {
            positions: HashMap::new(),
            owners: HashMap::new(),
            next_id: 1,
        }
    }

    /// The id the next inserted position will get. ids are never reused.
    pub fn next_id(&self) -> PositionId {
        PositionId(self.next_id)
    }

    /// Stores a new position under `next_id()` and indexes it by owner.
    pub fn insert(&mut self, mut position: Position) -> PositionId {
        let id = self.next_id();
        self.next_id += 1;
        position.id = id;
        if position.is_active {
            self.owners.entry(position.owner).or_default().insert(id);
        }
        self.positions.insert(id, position);
        id
    }

    /// Replaces an existing record. an inactive replacement leaves the owner index.
    pub fn update(&mut self, position: Position) {
        if !position.is_active {
            if let Some(index) = self.owners.get_mut(&position.owner) {
                index.remove(position.id);
                if index.ids.is_empty() {
                    self.owners.remove(&position.owner);
                }
            }
        }
        self.positions.insert(position.id, position);
    }

    pub fn get(&self, id: PositionId) -> Option<&Position> {
        self.positions.get(&id)
    }

    pub fn owner_of(&self, id: PositionId) -> Option<AccountId> {
        self.positions.get(&id).map(|p| p.owner)
    }

    /// Active position ids for `owner`. order is unspecified.
    pub fn active_ids(&self, owner: AccountId) -> &[PositionId] {
        self.owners
            .get(&owner)
            .map(|index| index.ids.as_slice())
            .unwrap_or(&[])
    }

    pub fn active_positions(&self, owner: AccountId) -> Vec<&Position> {
        self.active_ids(owner)
            .iter()
            .filter_map(|id| self.positions.get(id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const ALICE: AccountId = AccountId(1);

    fn test_position(side: Side) -> Position {
        Position::new(
            PositionId(1),
            ALICE,
            side,
            Wad::from_int(10),
            Wad::from_int(100),
            Wad::from_int(2000),
            SignedWad::ZERO,
            Timestamp::from_millis(0),
        )
    }

    #[test]
    fn pnl_long_and_short() {
        let long = test_position(Side::Long);
        assert_eq!(long.unrealized_pnl(Wad::from_int(2100)).unwrap(), SignedWad::from_int(1000));
        assert_eq!(long.unrealized_pnl(Wad::from_int(1900)).unwrap(), SignedWad::from_int(-1000));

        let short = test_position(Side::Short);
        assert_eq!(short.unrealized_pnl(Wad::from_int(1900)).unwrap(), SignedWad::from_int(1000));
        assert_eq!(short.unrealized_pnl(Wad::from_int(2000)).unwrap(), SignedWad::ZERO);
    }

    #[test]
    fn pending_funding_uses_index_delta() {
        let long = test_position(Side::Long);
        let index = SignedWad::from_decimal(dec!(0.5)).unwrap();
        assert_eq!(long.pending_funding(index).unwrap(), SignedWad::from_int(-5));
        assert_eq!(long.pending_funding(SignedWad::ZERO).unwrap(), SignedWad::ZERO);
    }

    #[test]
    fn increase_averages_entry() {
        let position = test_position(Side::Long);
        let next = position
            .increased(Wad::from_int(10), Wad::from_int(50), Wad::from_int(2200), Timestamp::from_millis(5))
            .unwrap();
        assert_eq!(next.size, Wad::from_int(20));
        assert_eq!(next.margin, Wad::from_int(150));
        assert_eq!(next.entry_price, Wad::from_int(2100));
        assert_eq!(next.last_interaction_time, Timestamp::from_millis(5));
        assert_eq!(next.opened_at, position.opened_at);
    }

    #[test]
    fn partial_releases_sum_to_margin() {
        let mut position = test_position(Side::Long);
        position.margin = Wad::from_raw(U256::from(1_000_000_000_000_000_001u64));
        let now = Timestamp::from_millis(1);

        let (first, r1) = position.reduced(Wad::from_int(3), now).unwrap();
        let (second, r2) = first.reduced(Wad::from_int(3), now).unwrap();
        let (last, r3) = second.reduced(Wad::from_int(4), now).unwrap();

        assert!(!last.is_active);
        assert_eq!(last.margin, Wad::ZERO);
        assert_eq!(
            r1.checked_add(r2).unwrap().checked_add(r3).unwrap(),
            position.margin
        );
    }

    #[test]
    fn reduce_more_than_size_fails() {
        let position = test_position(Side::Short);
        assert_eq!(
            position.reduced(Wad::from_int(11), Timestamp::from_millis(0)),
            Err(MathError::Underflow)
        );
    }

    #[test]
    fn book_indexes_by_owner() {
        let mut book = PositionBook::new();
        let a = book.insert(test_position(Side::Long));
        let b = book.insert(test_position(Side::Short));
        let c = book.insert(test_position(Side::Long));
        assert_eq!((a, b, c), (PositionId(1), PositionId(2), PositionId(3)));
        assert_eq!(book.active_ids(ALICE).len(), 3);

        let closed = book.get(a).unwrap().closed_out(Timestamp::from_millis(9));
        book.update(closed);

        let mut ids = book.active_ids(ALICE).to_vec();
        ids.sort();
        assert_eq!(ids, vec![b, c]);
        // closed records stay queryable
        assert!(!book.get(a).unwrap().is_active);
        assert_eq!(book.owner_of(a), Some(ALICE));
        assert_eq!(book.next_id(), PositionId(4));
    }

    #[test]
    fn owner_index_swap_remove() {
        let mut index = OwnerIndex::default();
        for id in 1..=4 {
            index.insert(PositionId(id));
        }
        assert!(index.remove(PositionId(2)));
        assert!(!index.remove(PositionId(2)));
        assert_eq!(index.ids, vec![PositionId(1), PositionId(4), PositionId(3)]);
        assert_eq!(index.slots[&PositionId(4)], 1);

        assert!(index.remove(PositionId(3)));
        assert_eq!(index.ids, vec![PositionId(1), PositionId(4)]);
    }
}
