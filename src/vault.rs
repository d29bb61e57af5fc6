// 4.0: the margin vault. holds every user's collateral and the per-user margin ledger.
// 4.1 MarginAccount, 4.2 MarginStep batches, 4.3 the Vault itself, 4.4 liquidation settlement.
//
// only authorized market contracts can move reserved margin, pnl or funding.
// users can only deposit for themselves and withdraw what is free.

use crate::events::{
    AccountLiquidatedEvent, CollateralEvent, EventPayload, FeeChargedEvent, FeesCollectedEvent,
    FundingAppliedEvent, InsuranceFundedEvent, MarginEvent, PnlRealizedEvent, PnlUpdatedEvent,
};
use crate::math::{MathError, SignedWad, Wad, BASIS_POINTS, WAD_DECIMALS};
use crate::token::{CollateralToken, InMemoryToken, TokenError};
use crate::types::AccountId;
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VaultError {
    #[error("null address")]
    ZeroAddress,

    #[error("amount must be greater than zero")]
    ZeroAmount,

    #[error("{caller} is not authorized for this vault operation")]
    Unauthorized { caller: AccountId },

    #[error("insufficient collateral: requested {requested}, collateral {collateral}")]
    InsufficientCollateral { requested: Wad, collateral: Wad },

    #[error("insufficient available margin: requested {requested}, available {available}")]
    InsufficientAvailableMargin { requested: Wad, available: Wad },

    #[error("insufficient reserved margin: requested {requested}, reserved {reserved}")]
    InsufficientReservedMargin { requested: Wad, reserved: Wad },

    #[error("vault token balance too low to pay out {requested}")]
    InsufficientVaultReserves { requested: Wad },

    #[error("insufficient protocol fees: requested {requested}, accrued {accrued}")]
    InsufficientFees { requested: Wad, accrued: Wad },

    #[error("margin is still reserved for open positions")]
    MarginStillReserved,

    #[error("account {0} is not liquidatable")]
    NotLiquidatable(AccountId),

    #[error("amount {0} is not representable in token units")]
    UnrepresentableAmount(Wad),

    #[error("collateral tokens with {0} decimals are not supported")]
    UnsupportedTokenDecimals(u8),

    #[error("token error: {0}")]
    Token(#[from] TokenError),

    #[error("math error: {0}")]
    Math(#[from] MathError),
}

/// 4.1: one user's margin ledger. all amounts in 18-decimal fixed point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarginAccount {
    pub collateral: Wad,
    pub reserved_margin: Wad,
    pub unrealized_pnl: SignedWad,
    pub last_funding_index: SignedWad,
}

impl MarginAccount {
    /// collateral + unrealized pnl
    pub fn total_value(&self) -> Result<SignedWad, MathError> {
        SignedWad::from_wad(self.collateral).checked_add(self.unrealized_pnl)
    }

    /// max(0, collateral + pnl - reserved). computed signed so it never underflows.
    pub fn available_margin(&self) -> Result<Wad, MathError> {
        Ok(self.total_value()?.sub_wad(self.reserved_margin)?.positive_part())
    }

    /// reserved > 0 and (total <= 0 or total * 10_000 < reserved * maintenance_bps)
    pub fn is_liquidatable(&self, maintenance_margin_bps: u32) -> Result<bool, MathError> {
        if self.reserved_margin.is_zero() {
            return Ok(false);
        }
        let total = self.total_value()?;
        if !total.is_positive() {
            return Ok(true);
        }
        let lhs = total.abs().mul_int(BASIS_POINTS as u64)?;
        let rhs = self.reserved_margin.mul_int(maintenance_margin_bps as u64)?;
        Ok(lhs < rhs)
    }

    pub fn has_reserved_margin(&self) -> bool {
        !self.reserved_margin.is_zero()
    }

    // applies one step in place, queuing the matching event. zero-sized steps are skipped.
    fn apply(
        &mut self,
        user: AccountId,
        step: &MarginStep,
        events: &mut Vec<EventPayload>,
    ) -> Result<Wad, VaultError> {
        match *step {
            MarginStep::Reserve(amount) => {
                if amount.is_zero() {
                    return Ok(Wad::ZERO);
                }
                let available = self.available_margin()?;
                if available < amount {
                    return Err(VaultError::InsufficientAvailableMargin {
                        requested: amount,
                        available,
                    });
                }
                self.reserved_margin = self.reserved_margin.checked_add(amount)?;
                events.push(EventPayload::MarginReserved(MarginEvent {
                    user,
                    amount,
                    reserved_margin: self.reserved_margin,
                }));
                Ok(Wad::ZERO)
            }
            MarginStep::Release(amount) => {
                if amount.is_zero() {
                    return Ok(Wad::ZERO);
                }
                if self.reserved_margin < amount {
                    return Err(VaultError::InsufficientReservedMargin {
                        requested: amount,
                        reserved: self.reserved_margin,
                    });
                }
                self.reserved_margin = self.reserved_margin.checked_sub(amount)?;
                events.push(EventPayload::MarginReleased(MarginEvent {
                    user,
                    amount,
                    reserved_margin: self.reserved_margin,
                }));
                Ok(Wad::ZERO)
            }
            MarginStep::Pnl(delta) => {
                self.unrealized_pnl = self.unrealized_pnl.checked_add(delta)?;
                events.push(EventPayload::PnlUpdated(PnlUpdatedEvent {
                    user,
                    delta,
                    unrealized_pnl: self.unrealized_pnl,
                }));
                Ok(Wad::ZERO)
            }
            MarginStep::Funding { payment, index } => {
                self.unrealized_pnl = self.unrealized_pnl.checked_add(payment)?;
                self.last_funding_index = index;
                events.push(EventPayload::FundingApplied(FundingAppliedEvent {
                    user,
                    payment,
                    funding_index: index,
                }));
                Ok(Wad::ZERO)
            }
            MarginStep::Fee(amount) => {
                if amount.is_zero() {
                    return Ok(Wad::ZERO);
                }
                self.unrealized_pnl = self.unrealized_pnl.sub_wad(amount)?;
                events.push(EventPayload::FeeCharged(FeeChargedEvent { user, amount }));
                Ok(amount)
            }
        }
    }
}

/// 4.2: one ledger mutation requested by a market contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarginStep {
    /// lock margin for a position. needs available >= amount.
    Reserve(Wad),
    /// unlock margin. needs reserved >= amount.
    Release(Wad),
    /// realized or marked pnl, no bound check.
    Pnl(SignedWad),
    /// funding settlement. positive payment = received.
    Funding { payment: SignedWad, index: SignedWad },
    /// trading fee, moved from the user's pnl into the protocol fee pool.
    Fee(Wad),
}

/// 4.4: what a liquidation charges and who gets paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidationTerms {
    pub maintenance_margin_bps: u32,
    pub penalty: Wad,
    pub liquidator: AccountId,
    pub liquidator_share_bps: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LiquidationOutcome {
    /// collateral + pnl after settlement steps, before the penalty
    pub equity: SignedWad,
    pub penalty: Wad,
    pub liquidator_reward: Wad,
    pub insurance_share: Wad,
    pub remaining_collateral: Wad,
    pub bad_debt: Wad,
    pub bad_debt_covered: Wad,
}

// balance plus running totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsuranceFund {
    pub balance: Wad,
    pub total_deposits: Wad,
    pub total_payouts: Wad,
}

impl InsuranceFund {
    pub fn deposit(&mut self, amount: Wad) -> Result<(), MathError> {
        self.balance = self.balance.checked_add(amount)?;
        self.total_deposits = self.total_deposits.checked_add(amount)?;
        Ok(())
    }

    /// pays out as much of `amount` as the balance allows. returns what was covered.
    pub fn cover_bad_debt(&mut self, amount: Wad) -> Result<Wad, MathError> {
        let covered = amount.min(self.balance);
        self.balance = self.balance.checked_sub(covered)?;
        self.total_payouts = self.total_payouts.checked_add(covered)?;
        Ok(covered)
    }
}

/// 4.3: the vault. generic over the collateral token so tests can use the in-memory ledger.
#[derive(Debug)]
pub struct Vault<T: CollateralToken = InMemoryToken> {
    token: T,
    address: AccountId,
    admin: AccountId,
    // 10^(18 - token decimals)
    scale: U256,
    authorized: HashSet<AccountId>,
    accounts: HashMap<AccountId, MarginAccount>,
    insurance_fund: InsuranceFund,
    protocol_fees: Wad,
    uncovered_bad_debt: Wad,
    events: Vec<EventPayload>,
}

impl<T: CollateralToken> Vault<T> {
    pub fn new(token: T, address: AccountId, admin: AccountId) -> Result<Self, VaultError> {
        if address.is_null() || admin.is_null() {
            return Err(VaultError::ZeroAddress);
        }
        let decimals = token.decimals();
        if decimals as u32 > WAD_DECIMALS {
            return Err(VaultError::UnsupportedTokenDecimals(decimals));
        }
        Ok(Self {
            token,
            address,
            admin,
            scale: U256::exp10((WAD_DECIMALS - decimals as u32) as usize),
            authorized: HashSet::new(),
            accounts: HashMap::new(),
            insurance_fund: InsuranceFund::default(),
            protocol_fees: Wad::ZERO,
            uncovered_bad_debt: Wad::ZERO,
            events: Vec::new(),
        })
    }

    pub fn address(&self) -> AccountId {
        self.address
    }

    pub fn admin(&self) -> AccountId {
        self.admin
    }

    pub fn token(&self) -> &T {
        &self.token
    }

    pub fn token_mut(&mut self) -> &mut T {
        &mut self.token
    }

    pub fn set_authorized(
        &mut self,
        caller: AccountId,
        contract: AccountId,
        authorized: bool,
    ) -> Result<(), VaultError> {
        self.ensure_admin(caller)?;
        if contract.is_null() {
            return Err(VaultError::ZeroAddress);
        }
        if authorized {
            self.authorized.insert(contract);
        } else {
            self.authorized.remove(&contract);
        }
        Ok(())
    }

    pub fn is_authorized(&self, contract: AccountId) -> bool {
        self.authorized.contains(&contract)
    }

    /// Zero-valued account for users the vault has never seen.
    pub fn account(&self, user: AccountId) -> MarginAccount {
        self.accounts.get(&user).copied().unwrap_or_default()
    }

    pub fn available_margin(&self, user: AccountId) -> Result<Wad, VaultError> {
        Ok(self.account(user).available_margin()?)
    }

    pub fn can_liquidate(&self, user: AccountId, maintenance_margin_bps: u32) -> Result<bool, VaultError> {
        Ok(self.account(user).is_liquidatable(maintenance_margin_bps)?)
    }

    pub fn insurance_fund(&self) -> &InsuranceFund {
        &self.insurance_fund
    }

    pub fn protocol_fees(&self) -> Wad {
        self.protocol_fees
    }

    pub fn uncovered_bad_debt(&self) -> Wad {
        self.uncovered_bad_debt
    }

    /// Queued events since the last drain.
    pub fn take_events(&mut self) -> Vec<EventPayload> {
        std::mem::take(&mut self.events)
    }

    // ledger Wad -> token base units. must be exact.
    pub fn to_token_units(&self, amount: Wad) -> Result<U256, VaultError> {
        let raw = amount.raw();
        if !(raw % self.scale).is_zero() {
            return Err(VaultError::UnrepresentableAmount(amount));
        }
        Ok(raw / self.scale)
    }

    pub fn from_token_units(&self, units: U256) -> Result<Wad, VaultError> {
        let raw = units.checked_mul(self.scale).ok_or(MathError::Overflow)?;
        Ok(Wad::from_raw(raw))
    }

    /// Tokens actually held, in ledger units.
    pub fn token_reserves(&self) -> Result<Wad, VaultError> {
        self.from_token_units(self.token.balance_of(self.address))
    }

    // 4.3.1: deposit. a user deposits for themselves by pulling tokens; an authorized
    // contract may credit a user whose tokens it already moved in.
    pub fn deposit_collateral(
        &mut self,
        caller: AccountId,
        user: AccountId,
        amount: Wad,
    ) -> Result<(), VaultError> {
        if user.is_null() || caller.is_null() {
            return Err(VaultError::ZeroAddress);
        }
        if amount.is_zero() {
            return Err(VaultError::ZeroAmount);
        }
        let mut account = self.account(user);
        account.collateral = account.collateral.checked_add(amount)?;

        if caller == user {
            let units = self.to_token_units(amount)?;
            self.token.transfer_from(self.address, user, self.address, units)?;
        } else {
            self.ensure_authorized(caller)?;
        }

        self.accounts.insert(user, account);
        self.events.push(EventPayload::CollateralDeposited(CollateralEvent {
            user,
            amount,
            new_collateral: account.collateral,
        }));
        Ok(())
    }

    // 4.3.2: withdraw. ledger first, then the transfer out.
    pub fn withdraw_collateral(
        &mut self,
        caller: AccountId,
        user: AccountId,
        amount: Wad,
    ) -> Result<(), VaultError> {
        self.try_withdraw(caller, user, amount).map_err(|e| {
            log::warn!("withdrawal of {} for {} rejected: {}", amount, user, e);
            e
        })
    }

    fn try_withdraw(&mut self, caller: AccountId, user: AccountId, amount: Wad) -> Result<(), VaultError> {
        if user.is_null() {
            return Err(VaultError::ZeroAddress);
        }
        if amount.is_zero() {
            return Err(VaultError::ZeroAmount);
        }
        if caller != user {
            return Err(VaultError::Unauthorized { caller });
        }

        let before = self.account(user);
        if amount > before.collateral {
            return Err(VaultError::InsufficientCollateral {
                requested: amount,
                collateral: before.collateral,
            });
        }
        let available = before.available_margin()?;
        if amount > available {
            return Err(VaultError::InsufficientAvailableMargin {
                requested: amount,
                available,
            });
        }
        let units = self.to_token_units(amount)?;
        if self.token.balance_of(self.address) < units {
            return Err(VaultError::InsufficientVaultReserves { requested: amount });
        }

        let mut after = before;
        after.collateral = before.collateral.checked_sub(amount)?;
        self.accounts.insert(user, after);

        if let Err(e) = self.token.transfer(self.address, user, units) {
            self.accounts.insert(user, before);
            return Err(e.into());
        }

        self.events.push(EventPayload::CollateralWithdrawn(CollateralEvent {
            user,
            amount,
            new_collateral: after.collateral,
        }));
        Ok(())
    }

    pub fn reserve_margin(&mut self, caller: AccountId, user: AccountId, amount: Wad) -> Result<(), VaultError> {
        if amount.is_zero() {
            return Err(VaultError::ZeroAmount);
        }
        self.settle(caller, user, &[MarginStep::Reserve(amount)]).map(|_| ())
    }

    pub fn release_margin(&mut self, caller: AccountId, user: AccountId, amount: Wad) -> Result<(), VaultError> {
        if amount.is_zero() {
            return Err(VaultError::ZeroAmount);
        }
        self.settle(caller, user, &[MarginStep::Release(amount)]).map(|_| ())
    }

    pub fn update_pnl(&mut self, caller: AccountId, user: AccountId, delta: SignedWad) -> Result<(), VaultError> {
        self.settle(caller, user, &[MarginStep::Pnl(delta)]).map(|_| ())
    }

    pub fn apply_funding(
        &mut self,
        caller: AccountId,
        user: AccountId,
        payment: SignedWad,
        index: SignedWad,
    ) -> Result<(), VaultError> {
        self.settle(caller, user, &[MarginStep::Funding { payment, index }])
            .map(|_| ())
    }

    /// The account as it would look after `steps`. nothing is committed.
    pub fn preview(&self, user: AccountId, steps: &[MarginStep]) -> Result<MarginAccount, VaultError> {
        let mut staged = self.account(user);
        let mut scratch = Vec::new();
        for step in steps {
            staged.apply(user, step, &mut scratch)?;
        }
        Ok(staged)
    }

    /// Applies every step to a staged copy of the account and commits only if all succeed.
    pub fn settle(
        &mut self,
        caller: AccountId,
        user: AccountId,
        steps: &[MarginStep],
    ) -> Result<MarginAccount, VaultError> {
        self.ensure_authorized(caller)?;
        if user.is_null() {
            return Err(VaultError::ZeroAddress);
        }

        let mut staged = self.account(user);
        let mut pending = Vec::with_capacity(steps.len());
        let mut fees = Wad::ZERO;
        for step in steps {
            let fee = staged.apply(user, step, &mut pending)?;
            fees = fees.checked_add(fee)?;
        }
        let protocol_fees = self.protocol_fees.checked_add(fees)?;

        self.accounts.insert(user, staged);
        self.protocol_fees = protocol_fees;
        self.events.extend(pending);
        Ok(staged)
    }

    // 4.4: liquidation. settle the final steps, require the staged account to be under
    // maintenance, then fold equity into collateral, take the penalty and reset.
    pub fn liquidate(
        &mut self,
        caller: AccountId,
        user: AccountId,
        settlement: &[MarginStep],
        terms: LiquidationTerms,
    ) -> Result<LiquidationOutcome, VaultError> {
        self.ensure_authorized(caller)?;
        if user.is_null() || terms.liquidator.is_null() {
            return Err(VaultError::ZeroAddress);
        }

        let mut staged = self.account(user);
        let mut pending = Vec::new();
        let mut fees = Wad::ZERO;
        for step in settlement {
            let fee = staged.apply(user, step, &mut pending)?;
            fees = fees.checked_add(fee)?;
        }
        if !staged.is_liquidatable(terms.maintenance_margin_bps)? {
            return Err(VaultError::NotLiquidatable(user));
        }

        let equity = staged.total_value()?;
        let mut outcome = LiquidationOutcome {
            equity,
            ..Default::default()
        };
        let mut insurance = self.insurance_fund;

        if equity.is_positive() {
            let equity = equity.abs();
            outcome.penalty = terms.penalty.min(equity);
            outcome.liquidator_reward = outcome.penalty.mul_bps(terms.liquidator_share_bps)?;
            outcome.insurance_share = outcome.penalty.checked_sub(outcome.liquidator_reward)?;
            outcome.remaining_collateral = equity.checked_sub(outcome.penalty)?;
            insurance.deposit(outcome.insurance_share)?;
        } else {
            outcome.bad_debt = equity.abs();
            outcome.bad_debt_covered = insurance.cover_bad_debt(outcome.bad_debt)?;
        }
        let uncovered = self
            .uncovered_bad_debt
            .checked_add(outcome.bad_debt.checked_sub(outcome.bad_debt_covered)?)?;
        let protocol_fees = self.protocol_fees.checked_add(fees)?;

        let reset = MarginAccount {
            collateral: outcome.remaining_collateral,
            reserved_margin: Wad::ZERO,
            unrealized_pnl: SignedWad::ZERO,
            last_funding_index: staged.last_funding_index,
        };
        let mut liquidator_account = if terms.liquidator == user {
            reset
        } else {
            self.account(terms.liquidator)
        };
        liquidator_account.collateral = liquidator_account
            .collateral
            .checked_add(outcome.liquidator_reward)?;

        // commit
        self.accounts.insert(user, reset);
        self.accounts.insert(terms.liquidator, liquidator_account);
        self.insurance_fund = insurance;
        self.uncovered_bad_debt = uncovered;
        self.protocol_fees = protocol_fees;
        self.events.extend(pending);
        self.events.push(EventPayload::AccountLiquidated(AccountLiquidatedEvent {
            user,
            liquidator: terms.liquidator,
            penalty: outcome.penalty,
            liquidator_reward: outcome.liquidator_reward,
            insurance_share: outcome.insurance_share,
            bad_debt: outcome.bad_debt,
        }));
        Ok(outcome)
    }

    /// Folds unrealized pnl into collateral once nothing is reserved. a shortfall
    /// below zero is bad debt and draws on the insurance fund.
    pub fn realize_pnl(&mut self, caller: AccountId, user: AccountId) -> Result<MarginAccount, VaultError> {
        if user.is_null() {
            return Err(VaultError::ZeroAddress);
        }
        if caller != user {
            self.ensure_authorized(caller)?;
        }
        let mut account = self.account(user);
        if account.has_reserved_margin() {
            return Err(VaultError::MarginStillReserved);
        }
        let pnl = account.unrealized_pnl;
        if pnl.is_zero() {
            return Ok(account);
        }

        let total = account.total_value()?;
        let mut insurance = self.insurance_fund;
        let mut uncovered = self.uncovered_bad_debt;
        if total.is_negative() {
            let shortfall = total.abs();
            let covered = insurance.cover_bad_debt(shortfall)?;
            uncovered = uncovered.checked_add(shortfall.checked_sub(covered)?)?;
        }
        account.collateral = total.positive_part();
        account.unrealized_pnl = SignedWad::ZERO;

        self.accounts.insert(user, account);
        self.insurance_fund = insurance;
        self.uncovered_bad_debt = uncovered;
        self.events.push(EventPayload::PnlRealized(PnlRealizedEvent {
            user,
            amount: pnl,
            new_collateral: account.collateral,
        }));
        Ok(account)
    }

    /// Anyone can top up the insurance fund from their own tokens.
    pub fn fund_insurance(&mut self, caller: AccountId, amount: Wad) -> Result<(), VaultError> {
        if caller.is_null() {
            return Err(VaultError::ZeroAddress);
        }
        if amount.is_zero() {
            return Err(VaultError::ZeroAmount);
        }
        let mut insurance = self.insurance_fund;
        insurance.deposit(amount)?;
        let units = self.to_token_units(amount)?;
        self.token.transfer_from(self.address, caller, self.address, units)?;
        self.insurance_fund = insurance;
        self.events.push(EventPayload::InsuranceFunded(InsuranceFundedEvent {
            amount,
            balance: insurance.balance,
        }));
        Ok(())
    }

    pub fn collect_fees(&mut self, caller: AccountId, to: AccountId, amount: Wad) -> Result<(), VaultError> {
        self.ensure_admin(caller)?;
        if to.is_null() {
            return Err(VaultError::ZeroAddress);
        }
        if amount.is_zero() {
            return Err(VaultError::ZeroAmount);
        }
        if amount > self.protocol_fees {
            return Err(VaultError::InsufficientFees {
                requested: amount,
                accrued: self.protocol_fees,
            });
        }
        let units = self.to_token_units(amount)?;
        if self.token.balance_of(self.address) < units {
            return Err(VaultError::InsufficientVaultReserves { requested: amount });
        }
        let before = self.protocol_fees;
        self.protocol_fees = before.checked_sub(amount)?;
        if let Err(e) = self.token.transfer(self.address, to, units) {
            self.protocol_fees = before;
            return Err(e.into());
        }
        self.events.push(EventPayload::FeesCollected(FeesCollectedEvent { to, amount }));
        Ok(())
    }

    fn ensure_authorized(&self, caller: AccountId) -> Result<(), VaultError> {
        if self.authorized.contains(&caller) {
            Ok(())
        } else {
            Err(VaultError::Unauthorized { caller })
        }
    }

    fn ensure_admin(&self, caller: AccountId) -> Result<(), VaultError> {
        if caller == self.admin {
            Ok(())
        } else {
            Err(VaultError::Unauthorized { caller })
        }
    }
}
