//! Stress tests
//!
//! These tests push the engine through long sequences of trades, funding
//! intervals and liquidation cascades and check that it stays consistent.

use primitive_types::U256;
use vamm_perps::*;

const ADMIN: AccountId = AccountId(1);
const VAULT: AccountId = AccountId(2);

fn setup_engine(config: EngineConfig, traders: &[AccountId]) -> Engine {
    let mut token = InMemoryToken::usdc();
    let unit = token.unit();
    for &trader in traders {
        token.mint(trader, U256::from(100_000_000u64) * unit);
        token.approve(trader, VAULT, U256::MAX);
    }
    let mut vault = Vault::new(token, VAULT, ADMIN).unwrap();
    vault.set_authorized(ADMIN, config.market_address, true).unwrap();

    let now = Timestamp::from_secs(1_000);
    let oracle = ManualOracle::new(300_000).with_price(Wad::ONE, now);
    Engine::new(config, &MarketConfig::eth_perp(), oracle, vault, now).unwrap()
}

fn refresh_oracle(engine: &mut Engine, price: Wad) {
    let now = engine.time();
    engine.oracle_mut().set_price(price, now);
}

/// Tests rapid one-sided moves and cascading liquidations.
mod cascade_tests {
    use super::*;

    #[test]
    fn liquidation_cascade_keeps_books_consistent() {
        let whale = AccountId(99);
        let keeper = AccountId(98);
        let longs: Vec<AccountId> = (10..30).map(AccountId).collect();
        let mut all = longs.clone();
        all.push(whale);
        let mut engine = setup_engine(EngineConfig::default(), &all);
        engine.fund_insurance(whale, Wad::from_int(10_000)).unwrap();

        // 20 longs at rising leverage, each with a little spare collateral
        let mut ids = Vec::new();
        for (i, &trader) in longs.iter().enumerate() {
            let leverage = 20 + 4 * i as u32;
            engine.deposit(trader, Wad::from_int(150)).unwrap();
            let id = engine
                .open_position(trader, Wad::from_int(100), Side::Long, leverage, Wad::ZERO, Wad::MAX)
                .unwrap();
            ids.push(id);
        }

        // the whale dumps the mark
        engine.deposit(whale, Wad::from_int(1_000_000)).unwrap();
        engine
            .open_position(whale, Wad::from_int(300_000), Side::Short, 10, Wad::ZERO, Wad::MAX)
            .unwrap();

        let mut liquidated = 0;
        for &id in &ids {
            if engine.is_liquidatable(id).unwrap() {
                let result = engine.liquidate(keeper, id).unwrap();
                assert_eq!(result.positions, vec![id]);
                liquidated += 1;
            }
        }
        assert!(liquidated > 0);

        let mut total_long = Wad::ZERO;
        for &id in &ids {
            let position = engine.position(id).unwrap();
            if position.is_active {
                total_long = total_long.checked_add(position.size).unwrap();
            } else {
                let owner = position.owner;
                assert_eq!(engine.vault().account(owner).reserved_margin, Wad::ZERO);
            }
        }
        assert_eq!(engine.open_interest().total_long, total_long);
        assert_eq!(engine.open_interest().total_short, Wad::from_int(3_000_000));

        let insurance = engine.vault().insurance_fund();
        assert_eq!(
            insurance.balance,
            insurance.total_deposits.checked_sub(insurance.total_payouts).unwrap()
        );
    }

    #[test]
    fn closing_everything_after_chaos_returns_to_flat() {
        let traders: Vec<AccountId> = (10..60).map(AccountId).collect();
        let mut engine = setup_engine(EngineConfig::default(), &traders);

        let mut open = Vec::new();
        for (i, &trader) in traders.iter().enumerate() {
            engine.deposit(trader, Wad::from_int(50_000)).unwrap();
            let side = if i % 3 == 0 { Side::Short } else { Side::Long };
            let leverage = 1 + (i as u32 * 7) % 25;
            let collateral = Wad::from_int(100 + (i as u64 * 131) % 5_000);
            let id = engine
                .open_position(trader, collateral, side, leverage, Wad::ZERO, Wad::MAX)
                .unwrap();
            open.push((trader, id));
        }

        // interleave adds and partial closes
        for (i, &(trader, id)) in open.iter().enumerate() {
            if i % 2 == 0 {
                engine
                    .add_to_position(trader, id, Wad::from_int(50), 5, Wad::ZERO, Wad::MAX)
                    .unwrap();
            } else {
                let half = engine.position(id).unwrap().size.div_int(2).unwrap();
                engine
                    .close_position(trader, id, half, Wad::ZERO, Wad::MAX)
                    .unwrap();
            }
        }

        for &(trader, id) in &open {
            let size = engine.position(id).unwrap().size;
            engine
                .close_position(trader, id, size, Wad::ZERO, Wad::MAX)
                .unwrap();
            assert_eq!(engine.vault().account(trader).reserved_margin, Wad::ZERO);
        }
        assert_eq!(engine.open_interest(), OpenInterest::default());
        assert_eq!(engine.mark_price().unwrap(), Wad::ONE);
    }
}

/// Funding over many intervals.
mod funding_tests {
    use super::*;

    #[test]
    fn funding_accumulates_hour_by_hour() {
        let (alice, bob) = (AccountId(10), AccountId(11));
        let mut engine = setup_engine(EngineConfig::default(), &[alice, bob]);
        engine.deposit(alice, Wad::from_int(1_000_000)).unwrap();
        engine.deposit(bob, Wad::from_int(1_000_000)).unwrap();
        let long = engine
            .open_position(alice, Wad::from_int(100_000), Side::Long, 10, Wad::ZERO, Wad::MAX)
            .unwrap();

        let max_rate = engine.params().funding.max_rate;
        let mut expected_index = SignedWad::ZERO;
        for _ in 0..24 {
            engine.advance_time(DEFAULT_FUNDING_INTERVAL_MS);
            refresh_oracle(&mut engine, Wad::ONE);
            let result = engine.update_funding().unwrap().unwrap();
            assert!(result.funding_rate.is_positive());
            assert!(result.funding_rate.abs() <= max_rate);
            expected_index = expected_index.checked_add(result.funding_rate).unwrap();
            assert_eq!(result.funding_index, expected_index);

            // a second call in the same interval does nothing
            assert_eq!(engine.update_funding().unwrap(), None);
        }

        // the long pays, and settling matches the preview
        let pending = engine.pending_funding(long).unwrap();
        assert!(pending.is_negative());
        let paid = engine.apply_funding_to_position(long).unwrap();
        assert_eq!(paid, pending);
        assert_eq!(engine.pending_funding(long).unwrap(), SignedWad::ZERO);
        assert_eq!(engine.vault().account(alice).last_funding_index, expected_index);
    }

    #[test]
    fn missed_intervals_collapse_into_one_update() {
        let alice = AccountId(10);
        let mut engine = setup_engine(EngineConfig::default(), &[alice]);
        engine.deposit(alice, Wad::from_int(100_000)).unwrap();
        engine
            .open_position(alice, Wad::from_int(10_000), Side::Long, 10, Wad::ZERO, Wad::MAX)
            .unwrap();

        engine.advance_time(5 * DEFAULT_FUNDING_INTERVAL_MS);
        refresh_oracle(&mut engine, Wad::ONE);
        let result = engine.update_funding().unwrap().unwrap();
        assert_eq!(result.funding_index, result.funding_rate);
        assert_eq!(engine.funding_state().last_funding_time, engine.time());
        assert_eq!(engine.update_funding().unwrap(), None);
    }

    #[test]
    fn discount_to_index_flips_the_payer() {
        let bob = AccountId(11);
        let mut engine = setup_engine(EngineConfig::default(), &[bob]);
        engine.deposit(bob, Wad::from_int(100_000)).unwrap();
        let short = engine
            .open_position(bob, Wad::from_int(10_000), Side::Short, 10, Wad::ZERO, Wad::MAX)
            .unwrap();

        engine.advance_time(DEFAULT_FUNDING_INTERVAL_MS);
        refresh_oracle(&mut engine, Wad::ONE);
        let result = engine.update_funding().unwrap().unwrap();
        assert!(result.funding_rate.is_negative());
        // shorts pay when the mark trades below the index
        assert!(engine.pending_funding(short).unwrap().is_negative());
    }

    #[test]
    fn rate_is_clamped_on_a_dislocated_index() {
        let mut engine = setup_engine(EngineConfig::default(), &[]);
        engine.advance_time(DEFAULT_FUNDING_INTERVAL_MS);
        refresh_oracle(&mut engine, Wad::from_ratio(1, 2).unwrap());
        let result = engine.update_funding().unwrap().unwrap();
        assert_eq!(result.funding_rate, SignedWad::from_wad(engine.params().funding.max_rate));

        engine.advance_time(DEFAULT_FUNDING_INTERVAL_MS);
        refresh_oracle(&mut engine, Wad::from_int(2));
        let result = engine.update_funding().unwrap().unwrap();
        assert_eq!(result.funding_rate, SignedWad::neg(engine.params().funding.max_rate));
        assert_eq!(result.funding_index, SignedWad::ZERO);
    }
}

/// Event log limits.
mod event_tests {
    use super::*;

    #[test]
    fn event_log_is_bounded() {
        let alice = AccountId(10);
        let config = EngineConfig {
            max_events: 50,
            ..EngineConfig::default()
        };
        let mut engine = setup_engine(config, &[alice]);
        engine.deposit(alice, Wad::from_int(1_000_000)).unwrap();

        for _ in 0..100 {
            let id = engine
                .open_position(alice, Wad::from_int(10), Side::Long, 2, Wad::ZERO, Wad::MAX)
                .unwrap();
            engine
                .close_position(alice, id, Wad::from_int(20), Wad::ZERO, Wad::MAX)
                .unwrap();
        }
        assert_eq!(engine.events().len(), 50);
        assert_eq!(engine.recent_events(5).len(), 5);

        // ids keep counting past the ones that were dropped
        let last = engine.events().last().unwrap();
        assert!(last.id.0 > 500);
        assert_eq!(last.payload.name(), "PositionClosed");
    }
}
