// 9.2 token.rs: the collateral token boundary. ERC-20 shaped.
// the vault only ever talks to this trait. InMemoryToken is the mocked ledger
// used by tests and the simulator: balances and allowances, no chain.

use crate::types::AccountId;
use primitive_types::U256;
use std::collections::HashMap;

/// Amounts are in the token's own units (e.g. 6 decimals for USDC).
pub trait CollateralToken {
    fn decimals(&self) -> u8;

    fn balance_of(&self, owner: AccountId) -> U256;

    /// Move `amount` out of `from`'s own balance. `from` is the caller.
    fn transfer(&mut self, from: AccountId, to: AccountId, amount: U256) -> Result<(), TokenError>;

    /// Move `amount` from `from` to `to` using `spender`'s allowance.
    fn transfer_from(
        &mut self,
        spender: AccountId,
        from: AccountId,
        to: AccountId,
        amount: U256,
    ) -> Result<(), TokenError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("insufficient token balance for {owner}: requested {requested}, available {available}")]
    InsufficientBalance {
        owner: AccountId,
        requested: U256,
        available: U256,
    },

    #[error("insufficient allowance from {owner} to {spender}: requested {requested}, allowed {allowed}")]
    InsufficientAllowance {
        owner: AccountId,
        spender: AccountId,
        requested: U256,
        allowed: U256,
    },

    #[error("transfer to the null address")]
    NullRecipient,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryToken {
    pub symbol: String,
    decimals: u8,
    balances: HashMap<AccountId, U256>,
    allowances: HashMap<(AccountId, AccountId), U256>,
    total_supply: U256,
}

impl InMemoryToken {
    pub fn new(symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            symbol: symbol.into(),
            decimals,
            balances: HashMap::new(),
            allowances: HashMap::new(),
            total_supply: U256::zero(),
        }
    }

    pub fn usdc() -> Self {
        Self::new("USDC", 6)
    }

    /// One whole token in base units.
    pub fn unit(&self) -> U256 {
        U256::exp10(self.decimals as usize)
    }

    pub fn mint(&mut self, to: AccountId, amount: U256) {
        *self.balances.entry(to).or_default() += amount;
        self.total_supply += amount;
    }

    pub fn approve(&mut self, owner: AccountId, spender: AccountId, amount: U256) {
        self.allowances.insert((owner, spender), amount);
    }

    pub fn allowance(&self, owner: AccountId, spender: AccountId) -> U256 {
        self.allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or_default()
    }

    pub fn total_supply(&self) -> U256 {
        self.total_supply
    }

    fn move_balance(&mut self, from: AccountId, to: AccountId, amount: U256) -> Result<(), TokenError> {
        if to.is_null() {
            return Err(TokenError::NullRecipient);
        }
        let available = self.balance_of(from);
        if available < amount {
            return Err(TokenError::InsufficientBalance {
                owner: from,
                requested: amount,
                available,
            });
        }
        self.balances.insert(from, available - amount);
        *self.balances.entry(to).or_default() += amount;
        Ok(())
    }
}

impl CollateralToken for InMemoryToken {
    fn decimals(&self) -> u8 {
        self.decimals
    }

    fn balance_of(&self, owner: AccountId) -> U256 {
        self.balances.get(&owner).copied().unwrap_or_default()
    }

    fn transfer(&mut self, from: AccountId, to: AccountId, amount: U256) -> Result<(), TokenError> {
        self.move_balance(from, to, amount)
    }

    fn transfer_from(
        &mut self,
        spender: AccountId,
        from: AccountId,
        to: AccountId,
        amount: U256,
    ) -> Result<(), TokenError> {
        let allowed = self.allowance(from, spender);
        if allowed < amount {
            return Err(TokenError::InsufficientAllowance {
                owner: from,
                spender,
                requested: amount,
                allowed,
            });
        }
        self.move_balance(from, to, amount)?;
        self.allowances.insert((from, spender), allowed - amount);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: AccountId = AccountId(1);
    const BOB: AccountId = AccountId(2);
    const VAULT: AccountId = AccountId(100);

    #[test]
    fn mint_and_transfer() {
        let mut token = InMemoryToken::usdc();
        token.mint(ALICE, U256::from(1_000u32));
        token.transfer(ALICE, BOB, U256::from(400u32)).unwrap();

        assert_eq!(token.balance_of(ALICE), U256::from(600u32));
        assert_eq!(token.balance_of(BOB), U256::from(400u32));
        assert_eq!(token.total_supply(), U256::from(1_000u32));
    }

    #[test]
    fn transfer_more_than_balance_fails() {
        let mut token = InMemoryToken::usdc();
        token.mint(ALICE, U256::from(10u32));
        let result = token.transfer(ALICE, BOB, U256::from(11u32));
        assert!(matches!(result, Err(TokenError::InsufficientBalance { .. })));
        assert_eq!(token.balance_of(ALICE), U256::from(10u32));
    }

    #[test]
    fn transfer_from_consumes_allowance() {
        let mut token = InMemoryToken::usdc();
        token.mint(ALICE, U256::from(1_000u32));
        token.approve(ALICE, VAULT, U256::from(500u32));

        token.transfer_from(VAULT, ALICE, VAULT, U256::from(300u32)).unwrap();
        assert_eq!(token.allowance(ALICE, VAULT), U256::from(200u32));
        assert_eq!(token.balance_of(VAULT), U256::from(300u32));

        let result = token.transfer_from(VAULT, ALICE, VAULT, U256::from(300u32));
        assert!(matches!(result, Err(TokenError::InsufficientAllowance { .. })));
    }

    #[test]
    fn unit_matches_decimals() {
        assert_eq!(InMemoryToken::usdc().unit(), U256::from(1_000_000u32));
    }
}
