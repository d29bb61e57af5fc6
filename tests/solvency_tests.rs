//! Solvency invariant tests.
//!
//! These tests verify the ledger invariants the vault depends on: reserved
//! margin always matches the open positions, open interest always matches the
//! position book, and funding moves value between sides without creating any.

use primitive_types::U256;
use proptest::prelude::*;
use vamm_perps::*;

const ADMIN: AccountId = AccountId(1);
const VAULT: AccountId = AccountId(2);

fn setup_engine(traders: &[AccountId]) -> Engine {
    setup_with(MarketConfig::eth_perp(), traders)
}

fn setup_with(market: MarketConfig, traders: &[AccountId]) -> Engine {
    let config = EngineConfig::default();
    let mut token = InMemoryToken::usdc();
    let unit = token.unit();
    for &trader in traders {
        token.mint(trader, U256::from(10_000_000u64) * unit);
        token.approve(trader, VAULT, U256::MAX);
    }
    let mut vault = Vault::new(token, VAULT, ADMIN).unwrap();
    vault.set_authorized(ADMIN, config.market_address, true).unwrap();

    let now = Timestamp::from_secs(1_000);
    let oracle = ManualOracle::new(300_000).with_price(Wad::ONE, now);
    Engine::new(config, &market, oracle, vault, now).unwrap()
}

fn side_of(long: bool) -> Side {
    if long {
        Side::Long
    } else {
        Side::Short
    }
}

// reserved margin per user == sum of that user's active position margins
fn assert_margin_matches_positions(engine: &Engine, traders: &[AccountId]) {
    for &trader in traders {
        let mut expected = Wad::ZERO;
        for position in engine.positions_of(trader) {
            expected = expected.checked_add(position.margin).unwrap();
        }
        assert_eq!(engine.vault().account(trader).reserved_margin, expected);
    }
}

// open interest == sum of active sizes per side
fn assert_open_interest_matches_positions(engine: &Engine) {
    let mut long = Wad::ZERO;
    let mut short = Wad::ZERO;
    for position in engine.positions().iter().filter(|p| p.is_active) {
        match position.side {
            Side::Long => long = long.checked_add(position.size).unwrap(),
            Side::Short => short = short.checked_add(position.size).unwrap(),
        }
    }
    let oi = engine.open_interest();
    assert_eq!(oi.total_long, long);
    assert_eq!(oi.total_short, short);
}

proptest! {
    /// Reserved margin and open interest track the position book through opens
    /// and partial closes, and both return to zero once everything is closed.
    #[test]
    fn margin_and_open_interest_conserved(
        trades in proptest::collection::vec((0usize..4, 1u64..500, 1u32..20, any::<bool>()), 1..25),
        close_fractions in proptest::collection::vec(1u64..4, 25),
    ) {
        let traders: Vec<AccountId> = (10..14).map(AccountId).collect();
        let mut engine = setup_engine(&traders);
        for &trader in &traders {
            engine.deposit(trader, Wad::from_int(100_000)).unwrap();
        }

        let mut opened = Vec::new();
        for &(who, collateral, leverage, long) in &trades {
            let trader = traders[who];
            let id = engine
                .open_position(trader, Wad::from_int(collateral), side_of(long), leverage, Wad::ZERO, Wad::MAX)
                .unwrap();
            opened.push((trader, id));
        }
        assert_margin_matches_positions(&engine, &traders);
        assert_open_interest_matches_positions(&engine);

        // close a quarter, half or three quarters of each
        for (i, &(trader, id)) in opened.iter().enumerate() {
            let size = engine.position(id).unwrap().size;
            let part = size.mul_int(close_fractions[i]).unwrap().div_int(4).unwrap();
            engine.close_position(trader, id, part, Wad::ZERO, Wad::MAX).unwrap();
        }
        assert_margin_matches_positions(&engine, &traders);
        assert_open_interest_matches_positions(&engine);

        for &(trader, id) in &opened {
            let size = engine.position(id).unwrap().size;
            engine.close_position(trader, id, size, Wad::ZERO, Wad::MAX).unwrap();
        }
        for &trader in &traders {
            prop_assert_eq!(engine.vault().account(trader).reserved_margin, Wad::ZERO);
        }
        prop_assert_eq!(engine.open_interest(), OpenInterest::default());
        prop_assert_eq!(engine.mark_price().unwrap(), Wad::ONE);
    }

    /// Tokens held by the vault always equal what went in; trading only moves
    /// value around inside the ledger.
    #[test]
    fn token_reserves_match_deposits(
        deposits in proptest::collection::vec(1u64..50_000, 2..6),
        leverage in 1u32..50,
    ) {
        let traders: Vec<AccountId> = (10..10 + deposits.len() as u64).map(AccountId).collect();
        let mut engine = setup_engine(&traders);

        let mut total = Wad::ZERO;
        for (i, &amount) in deposits.iter().enumerate() {
            engine.deposit(traders[i], Wad::from_int(amount)).unwrap();
            total = total.checked_add(Wad::from_int(amount)).unwrap();
            let collateral = Wad::from_int(amount).div_int(2).unwrap();
            let side = side_of(i % 2 == 0);
            let id = engine.open_position(traders[i], collateral, side, leverage, Wad::ZERO, Wad::MAX).unwrap();
            let size = engine.position(id).unwrap().size;
            engine.close_position(traders[i], id, size, Wad::ZERO, Wad::MAX).unwrap();
        }
        prop_assert_eq!(engine.vault().token_reserves().unwrap(), total);
    }

    /// Equal and opposite positions settle equal and opposite funding.
    #[test]
    fn funding_is_zero_sum(
        collateral in 1u64..10_000,
        index_cents in 50u64..200,
    ) {
        let (alice, bob) = (AccountId(10), AccountId(11));
        let mut engine = setup_engine(&[alice, bob]);
        engine.deposit(alice, Wad::from_int(100_000)).unwrap();
        engine.deposit(bob, Wad::from_int(100_000)).unwrap();

        let long = engine.open_position(alice, Wad::from_int(collateral), Side::Long, 5, Wad::ZERO, Wad::MAX).unwrap();
        let short = engine.open_position(bob, Wad::from_int(collateral), Side::Short, 5, Wad::ZERO, Wad::MAX).unwrap();

        engine.advance_time(DEFAULT_FUNDING_INTERVAL_MS);
        let now = engine.time();
        engine.oracle_mut().set_price(Wad::from_ratio(index_cents, 100).unwrap(), now);

        let paid = engine.apply_funding_to_position(long).unwrap();
        let received = engine.apply_funding_to_position(short).unwrap();
        prop_assert_eq!(paid.checked_add(received).unwrap(), SignedWad::ZERO);
    }
}

#[test]
fn liquidation_books_bad_debt_against_insurance() {
    let (alice, bob, keeper) = (AccountId(10), AccountId(11), AccountId(12));
    let mut engine = setup_engine(&[alice, bob]);
    engine.fund_insurance(bob, Wad::from_int(1_000)).unwrap();

    // 100x short with one unit spare
    engine.deposit(alice, Wad::from_int(131)).unwrap();
    let id = engine
        .open_position(alice, Wad::from_int(100), Side::Short, 100, Wad::ZERO, Wad::MAX)
        .unwrap();

    // a 1m long lifts the mark past 1.01, more than alice's equity
    engine.deposit(bob, Wad::from_int(200_000)).unwrap();
    engine
        .open_position(bob, Wad::from_int(100_000), Side::Long, 10, Wad::ZERO, Wad::MAX)
        .unwrap();

    let result = engine.liquidate(keeper, id).unwrap();
    assert!(!result.bad_debt.is_zero());
    assert_eq!(result.penalty, Wad::ZERO);
    assert_eq!(result.liquidator_reward, Wad::ZERO);

    let insurance = engine.vault().insurance_fund();
    assert_eq!(
        insurance.balance,
        Wad::from_int(1_000).checked_sub(result.bad_debt).unwrap()
    );
    assert_eq!(insurance.total_payouts, result.bad_debt);
    assert_eq!(engine.vault().uncovered_bad_debt(), Wad::ZERO);
    assert_eq!(engine.vault().account(alice), MarginAccount::default());
}

#[test]
fn uncovered_bad_debt_is_tracked() {
    let (alice, bob, keeper) = (AccountId(10), AccountId(11), AccountId(12));
    let mut engine = setup_engine(&[alice, bob]);

    engine.deposit(alice, Wad::from_int(131)).unwrap();
    let id = engine
        .open_position(alice, Wad::from_int(100), Side::Short, 100, Wad::ZERO, Wad::MAX)
        .unwrap();
    engine.deposit(bob, Wad::from_int(200_000)).unwrap();
    engine
        .open_position(bob, Wad::from_int(100_000), Side::Long, 10, Wad::ZERO, Wad::MAX)
        .unwrap();

    let result = engine.liquidate(keeper, id).unwrap();
    assert_eq!(engine.vault().uncovered_bad_debt(), result.bad_debt);
    assert_eq!(engine.vault().insurance_fund().balance, Wad::ZERO);
}

#[test]
fn positive_equity_pays_penalty_split() {
    let (alice, bob, keeper) = (AccountId(10), AccountId(11), AccountId(12));
    // a 60% maintenance margin leaves room for the whole 1% penalty
    let mut market = MarketConfig::eth_perp();
    market.maintenance_margin_bps = 6_000;
    let mut engine = setup_with(market, &[alice, bob]);

    engine.deposit(alice, Wad::from_int(230)).unwrap();
    let id = engine
        .open_position(alice, Wad::from_int(200), Side::Long, 50, Wad::ZERO, Wad::MAX)
        .unwrap();
    engine.deposit(bob, Wad::from_int(200_000)).unwrap();
    engine
        .open_position(bob, Wad::from_int(100_000), Side::Short, 10, Wad::ZERO, Wad::MAX)
        .unwrap();
    assert!(engine.is_liquidatable(id).unwrap());

    let result = engine.liquidate(keeper, id).unwrap();
    assert_eq!(result.bad_debt, Wad::ZERO);
    assert_eq!(result.penalty, result.notional.mul_bps(100).unwrap());
    assert_eq!(
        result.liquidator_reward.checked_add(result.insurance_share).unwrap(),
        result.penalty
    );
    assert_eq!(result.liquidator_reward, result.penalty.mul_bps(5_000).unwrap());
    assert_eq!(engine.vault().account(keeper).collateral, result.liquidator_reward);
    assert_eq!(engine.vault().insurance_fund().balance, result.insurance_share);
    assert!(!engine.vault().account(alice).collateral.is_zero());
}
