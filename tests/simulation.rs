//! Simulation Tests - Config-driven Runs Against the JSONL Repository
//!
//! Replays scripted trade schedules from TOML through the full stack
//! (config loader, market, persistence) into a temporary data directory.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tempfile::TempDir;

use hyperdrive_sim::adapters::persistence::RepositoryImpl;
use hyperdrive_sim::config::loader::parse_config;
use hyperdrive_sim::ports::repository::Repository;
use hyperdrive_sim::usecases::Simulation;

/// Two days of four six-hour blocks with a one-day term, so positions
/// opened on day 0 mature at the first block of day 1.
const SCENARIO: &str = r#"
[simulation]
name = "lifecycle"
num_trading_days = 2
blocks_per_day = 4
seconds_per_block = 21600
num_agents = 3
agent_budget = 1000000.0

[market]
target_liquidity = 100000000.0
target_fixed_apr = 0.05
num_position_days = 1
trade_fee_percent = 0.05
redemption_fee_percent = 0.05
variable_apr = 0.05

[[trades]]
block = 0
agent = 1
action = "open_long"
amount = 100000.0

[[trades]]
block = 1
agent = 2
action = "open_short"
amount = 50000.0

[[trades]]
block = 2
agent = 3
action = "add_liquidity"
amount = 500000.0

[[trades]]
block = 3
agent = 3
action = "remove_liquidity"
amount = 1.0

[[trades]]
block = 5
agent = 1
action = "close_long"
amount = 1.0

[[trades]]
block = 6
agent = 2
action = "close_short"
amount = 50000.0

[[trades]]
block = 7
agent = 3
action = "redeem_withdrawal_shares"
amount = 1000000000.0
"#;

fn run(content: &str, dir: &TempDir) -> (Simulation<RepositoryImpl>, RepositoryImpl) {
    let config = parse_config(content).unwrap();
    let name = config.simulation.name.clone();
    let repo = RepositoryImpl::from_data_dir(dir.path(), &name).unwrap();
    let mut simulation = Simulation::from_config(&config, repo).unwrap();
    simulation.run().unwrap();
    let reader = RepositoryImpl::from_data_dir(dir.path(), &name).unwrap();
    (simulation, reader)
}

#[test]
fn test_lifecycle_run_persists_trades_and_snapshot() {
    let dir = TempDir::new().unwrap();
    let (simulation, repo) = run(SCENARIO, &dir);
    let report = simulation.report();

    assert_eq!(report.blocks, 8);
    assert_eq!(report.final_block_time, 7 * 21_600);
    assert!(report.share_price > Decimal::ONE, "share price must accrue");

    let trades = repo.load_trades().unwrap();
    assert_eq!(trades.len(), 7);
    assert_eq!(report.trades_succeeded + report.trades_failed, 7);
    assert!(trades[0].success, "open_long failed: {:?}", trades[0].error);
    assert!(trades[1].success, "open_short failed: {:?}", trades[1].error);
    assert!(trades[2].success, "add_liquidity failed: {:?}", trades[2].error);

    // The whole withdrawal-share balance was never held; redeeming it fails.
    let redeem = trades.last().unwrap();
    assert_eq!(redeem.action, "redeem_withdrawal_shares");
    assert!(!redeem.success);
    assert!(redeem.error.is_some());

    let day_one = repo.load_trades_range(4, 7).unwrap();
    assert_eq!(day_one.len(), 3);

    let snapshot = repo.load_latest_state().unwrap().unwrap();
    assert_eq!(snapshot.block_number, 7);
    assert_eq!(snapshot.wallets.len(), 4);
    assert_eq!(snapshot.market_state, *simulation.market().market_state());
}

#[test]
fn test_positions_mature_after_one_day_term() {
    let dir = TempDir::new().unwrap();
    let (simulation, _) = run(SCENARIO, &dir);
    let state = simulation.market().market_state();

    assert_eq!(state.longs_outstanding, Decimal::ZERO);
    assert_eq!(state.shorts_outstanding, Decimal::ZERO);
    assert!(state.checkpoints.contains_key(&86_400));

    // The short closed after maturity; the redemption fee is capped at the
    // interest its escrow earned.
    let short_trader = &simulation.wallets()[2];
    assert!(short_trader.shorts.is_empty());
    assert!(short_trader.balance < dec!(1_000_000));
}

#[test]
fn test_close_without_position_is_recorded_not_fatal() {
    let content = r#"
[simulation]
name = "orphan-close"
num_trading_days = 1
blocks_per_day = 2

[market]
target_liquidity = 1000000.0
target_fixed_apr = 0.05

[[trades]]
block = 1
agent = 2
action = "close_long"
amount = 10.0
"#;
    let dir = TempDir::new().unwrap();
    let (simulation, repo) = run(content, &dir);

    let trades = repo.load_trades().unwrap();
    assert_eq!(trades.len(), 1);
    assert!(!trades[0].success);
    assert_eq!(trades[0].mint_time, None);
    assert_eq!(simulation.report().trades_failed, 1);
    assert_eq!(simulation.wallets()[2].balance, dec!(10_000_000));
}
