//! vAMM perpetuals simulation.
//!
//! Walks one market through its lifecycle: deposits, open/add/close at the vAMM
//! mark price, hourly funding, account liquidation and a launchpad bonding curve.

use primitive_types::U256;
use vamm_perps::*;

const ADMIN: AccountId = AccountId(1);
const VAULT: AccountId = AccountId(2);

fn main() -> Result<(), EngineError> {
    println!("vAMM Perpetual Futures Simulation");
    println!("Single Market, Shared Vault, Full Lifecycle\n");

    scenario_1_round_trip()?;
    scenario_2_price_impact()?;
    scenario_3_funding()?;
    scenario_4_liquidation()?;
    scenario_5_bonding_curve()?;
    scenario_6_stress_test()?;

    println!("\nAll simulations completed successfully.");
    Ok(())
}

/// A market with `traders` funded and approved, oracle at `index_price`.
fn setup(market: &MarketConfig, traders: &[AccountId], index_price: Wad) -> Result<Engine, EngineError> {
    let config = EngineConfig::default();
    let mut token = InMemoryToken::usdc();
    let unit = token.unit();
    for &trader in traders {
        token.mint(trader, U256::from(10_000_000u64) * unit);
        token.approve(trader, VAULT, U256::MAX);
    }
    let mut vault = Vault::new(token, VAULT, ADMIN)?;
    vault.set_authorized(ADMIN, config.market_address, true)?;

    let now = Timestamp::now();
    let params = market.to_params()?;
    let oracle = ManualOracle::new(params.oracle_max_age_ms).with_price(index_price, now);
    Engine::new(config, market, oracle, vault, now)
}

fn print_account(engine: &Engine, name: &str, user: AccountId) -> Result<(), EngineError> {
    let account = engine.vault().account(user);
    println!(
        "  {}: collateral {}, reserved {}, pnl {}, available {}",
        name,
        account.collateral,
        account.reserved_margin,
        account.unrealized_pnl,
        account.available_margin()?
    );
    Ok(())
}

/// Open and immediately close: the trader pays the fee twice and nothing else.
fn scenario_1_round_trip() -> Result<(), EngineError> {
    println!("Scenario 1: Open and Close Round Trip\n");

    let alice = AccountId(10);
    let mut engine = setup(&MarketConfig::eth_perp(), &[alice], Wad::ONE)?;

    engine.deposit(alice, Wad::from_int(1000))?;
    println!("  Alice deposits 1000");

    let id = engine.open_position(alice, Wad::from_int(100), Side::Long, 10, Wad::ZERO, Wad::MAX)?;
    let position = engine.position(id).cloned();
    if let Some(p) = position {
        println!("  Alice opens {} LONG size {} @ {}", p.id, p.size, p.entry_price);
    }
    println!("  Mark after open: {}", engine.mark_price()?);

    let pnl = engine.close_position(alice, id, Wad::from_int(1000), Wad::ZERO, Wad::MAX)?;
    println!("  Alice closes, realized pnl {}", pnl);
    print_account(&engine, "Alice", alice)?;
    println!("  Protocol fees: {}\n", engine.vault().protocol_fees());
    Ok(())
}

/// Bigger trades move the mark further; longs move it more than shorts.
fn scenario_2_price_impact() -> Result<(), EngineError> {
    println!("Scenario 2: Price Impact\n");

    let engine = setup(&MarketConfig::eth_perp(), &[], Wad::ONE)?;
    for size in [1_000u64, 10_000, 100_000, 1_000_000] {
        let size = Wad::from_int(size);
        println!(
            "  size {}: long impact {}, short impact {}",
            size,
            engine.price_impact(size, Side::Long)?,
            engine.price_impact(size, Side::Short)?
        );
    }
    let (base, quote) = engine.virtual_reserves()?;
    println!("  Virtual reserves: base {}, quote {}\n", base, quote);
    Ok(())
}

/// A long-heavy market pays funding to the shorts each hour.
fn scenario_3_funding() -> Result<(), EngineError> {
    println!("Scenario 3: Hourly Funding\n");

    let (alice, bob) = (AccountId(10), AccountId(11));
    let mut engine = setup(&MarketConfig::eth_perp(), &[alice, bob], Wad::ONE)?;

    engine.deposit(alice, Wad::from_int(100_000))?;
    engine.deposit(bob, Wad::from_int(100_000))?;
    let long = engine.open_position(alice, Wad::from_int(50_000), Side::Long, 10, Wad::ZERO, Wad::MAX)?;
    let short = engine.open_position(bob, Wad::from_int(10_000), Side::Short, 10, Wad::ZERO, Wad::MAX)?;
    println!("  Alice long 500k, Bob short 100k. mark {}", engine.mark_price()?);

    for hour in 1..=3 {
        engine.advance_time(DEFAULT_FUNDING_INTERVAL_MS);
        let now = engine.time();
        engine.oracle_mut().set_price(Wad::ONE, now);
        if let Some(result) = engine.update_funding()? {
            println!(
                "  Hour {}: rate {}, index {}",
                hour, result.funding_rate, result.funding_index
            );
        }
    }

    let paid = engine.apply_funding_to_position(long)?;
    let received = engine.apply_funding_to_position(short)?;
    println!("  Alice settles {}, Bob settles {}", paid, received);
    print_account(&engine, "Alice", alice)?;
    print_account(&engine, "Bob", bob)?;
    println!();
    Ok(())
}

/// A 100x long is wiped out by a large short and liquidated by a keeper.
fn scenario_4_liquidation() -> Result<(), EngineError> {
    println!("Scenario 4: Liquidation\n");

    let (alice, bob, keeper) = (AccountId(10), AccountId(11), AccountId(12));
    let mut engine = setup(&MarketConfig::eth_perp(), &[alice, bob], Wad::ONE)?;
    engine.fund_insurance(bob, Wad::from_int(1_000))?;

    engine.deposit(alice, Wad::from_int(131))?;
    let id = engine.open_position(alice, Wad::from_int(100), Side::Long, 100, Wad::ZERO, Wad::MAX)?;
    println!("  Alice opens 100x LONG with 100 margin");

    engine.deposit(bob, Wad::from_int(200_000))?;
    engine.open_position(bob, Wad::from_int(100_000), Side::Short, 10, Wad::ZERO, Wad::MAX)?;
    println!("  Bob shorts 1m, mark falls to {}", engine.mark_price()?);
    println!("  Alice unrealized pnl {}", engine.unrealized_pnl(id)?);

    if engine.is_liquidatable(id)? {
        let result = engine.liquidate(keeper, id)?;
        println!(
            "  Keeper liquidates {} position(s) @ {}: penalty {}, reward {}, insurance {}, bad debt {}",
            result.positions.len(),
            result.exit_price,
            result.penalty,
            result.liquidator_reward,
            result.insurance_share,
            result.bad_debt
        );
    }
    print_account(&engine, "Alice", alice)?;
    print_account(&engine, "Keeper", keeper)?;
    println!("  Insurance fund: {}\n", engine.vault().insurance_fund().balance);
    Ok(())
}

/// Launchpad market: longs pump the curve, shorts leave it alone.
fn scenario_5_bonding_curve() -> Result<(), EngineError> {
    println!("Scenario 5: Bonding Curve\n");

    let (alice, bob) = (AccountId(10), AccountId(11));
    let mut engine = setup(&MarketConfig::launch_pump(), &[alice, bob], Wad::ONE)?;
    println!("  Starting price {}", engine.mark_price()?);

    engine.deposit(alice, Wad::from_int(1_000_000))?;
    engine.deposit(bob, Wad::from_int(1_000_000))?;
    for _ in 0..5 {
        engine.open_position(alice, Wad::from_int(100_000), Side::Long, 10, Wad::ZERO, Wad::MAX)?;
        println!("  Alice +1m long, price {}", engine.mark_price()?);
    }
    engine.open_position(bob, Wad::from_int(100_000), Side::Short, 10, Wad::ZERO, Wad::MAX)?;
    println!("  Bob 1m short, price {}\n", engine.mark_price()?);
    Ok(())
}

/// Many traders on both sides; the vault must stay solvent throughout.
fn scenario_6_stress_test() -> Result<(), EngineError> {
    println!("Scenario 6: Stress Test\n");

    let traders: Vec<AccountId> = (100..150).map(AccountId).collect();
    let mut engine = setup(&MarketConfig::eth_perp(), &traders, Wad::ONE)?;

    let mut open = Vec::new();
    for (i, &trader) in traders.iter().enumerate() {
        engine.deposit(trader, Wad::from_int(10_000))?;
        let side = if i % 3 == 0 { Side::Short } else { Side::Long };
        let leverage = 1 + (i as u32 % 20);
        let id = engine.open_position(trader, Wad::from_int(1_000), side, leverage, Wad::ZERO, Wad::MAX)?;
        open.push((trader, id));
    }
    let oi = engine.open_interest();
    println!("  {} positions, OI long {}, short {}", open.len(), oi.total_long, oi.total_short);
    println!("  Mark {}", engine.mark_price()?);

    for (trader, id) in open {
        let size = engine.position(id).map(|p| p.size).unwrap_or(Wad::ZERO);
        engine.close_position(trader, id, size, Wad::ZERO, Wad::MAX)?;
    }
    let oi = engine.open_interest();
    println!("  After closing all: OI long {}, short {}", oi.total_long, oi.total_short);
    println!("  Mark back to {}", engine.mark_price()?);
    println!(
        "  Vault holds {}, protocol fees {}, events {}",
        engine.vault().token_reserves()?,
        engine.vault().protocol_fees(),
        engine.events().len()
    );
    Ok(())
}
