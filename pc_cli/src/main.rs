//! Command-line driver for the pocket casino.
//!
//! Each invocation opens the configured store, plays or inspects one thing
//! against the shared balance, then flushes and exits.

mod commands;

use anyhow::Error;
use ctrlc::set_handler;
use log::info;
use pico_args::Arguments;
use pocket_casino::{Casino, CasinoConfig, StoreBackend, game::Assist};
use std::{ffi::OsString, path::PathBuf};

const HELP: &str = "\
Play the pocket casino from the terminal

USAGE:
  pc_cli [OPTIONS] <COMMAND> [ARGS]

COMMANDS:
  balance                  Show the balance and recent transactions
  variants                 List the slot variants and audit them for drift
  spin <VARIANT>           Spin a slot variant
  blackjack                Play one hand, hitting below 17
  craps <BET>              Place a bet (pass, dontpass, field, any7, hard6, place8, ...)
                           and roll until it resolves
  roulette <BET>           Bet on a number, red, black, odd, even, low, high or dozen1-3
  poker                    Play one hand of video poker, holding pairs
  default-wager [N]        Show or change the default wager

OPTIONS:
  --store      BACKEND     memory, file or postgres   [default: env CASINO_STORE or file]
  --state-file PATH        JSON state file            [default: env CASINO_STATE_FILE or pocket_casino.json]
  --variant-file PATH      Register an extra slot variant from JSON
  --wager      N           Credits per round          [default: the saved default wager]
  --count      N           Rounds to play             [default: 1]
  --seed       N           Seed every random source, for reproducible play
  --assist     MODE        Slot assist: off, repeat, retry or guarantee  [default: off]
  --history    N           Transactions shown by `balance`  [default: 10]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  DATABASE_URL             PostgreSQL connection string for the postgres store
  PERSIST_RETRY_BASE_MS    First retry delay of a failed write
  RECONCILE_INTERVAL_MS    Balance poll interval
  RUST_LOG                 Log filter, e.g. info or pocket_casino=debug
";

/// What to run
#[derive(Debug, PartialEq)]
enum Command {
    Balance,
    Variants,
    Spin { variant: String },
    Blackjack,
    Craps { bet: String },
    Roulette { bet: String },
    Poker,
    DefaultWager { wager: Option<u64> },
}

#[derive(Debug, PartialEq)]
struct Args {
    store: Option<StoreBackend>,
    state_file: Option<PathBuf>,
    variant_file: Option<PathBuf>,
    wager: Option<u64>,
    count: u32,
    seed: Option<u64>,
    assist: Assist,
    history: usize,
    command: Command,
}

/// Parse everything after the program name
fn parse_args(raw: Vec<OsString>) -> Result<Args, Error> {
    let mut pargs = Arguments::from_vec(raw);

    let store = pargs.opt_value_from_str("--store")?;
    let state_file = pargs.opt_value_from_os_str("--state-file", |s| {
        Ok::<_, std::convert::Infallible>(PathBuf::from(s))
    })?;
    let variant_file = pargs.opt_value_from_os_str("--variant-file", |s| {
        Ok::<_, std::convert::Infallible>(PathBuf::from(s))
    })?;
    let wager = pargs.opt_value_from_str("--wager")?;
    let count = pargs.opt_value_from_str("--count")?.unwrap_or(1);
    let seed = pargs.opt_value_from_str("--seed")?;
    let assist = pargs.opt_value_from_str("--assist")?.unwrap_or_default();
    let history = pargs.opt_value_from_str("--history")?.unwrap_or(10);

    let name: Option<String> = pargs.opt_free_from_str()?;
    let command = match name.as_deref() {
        Some("balance") | None => Command::Balance,
        Some("variants") => Command::Variants,
        Some("spin") => Command::Spin {
            variant: pargs.free_from_str()?,
        },
        Some("blackjack") => Command::Blackjack,
        Some("craps") => Command::Craps {
            bet: pargs.free_from_str()?,
        },
        Some("roulette") => Command::Roulette {
            bet: pargs.free_from_str()?,
        },
        Some("poker") => Command::Poker,
        Some("default-wager") => Command::DefaultWager {
            wager: pargs.opt_free_from_str()?,
        },
        Some(other) => anyhow::bail!("unknown command '{other}', see --help"),
    };

    let remaining = pargs.finish();
    if !remaining.is_empty() {
        anyhow::bail!("unexpected arguments: {:?}", remaining);
    }

    Ok(Args {
        store,
        state_file,
        variant_file,
        wager,
        count,
        seed,
        assist,
        history,
        command,
    })
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let raw: Vec<OsString> = std::env::args_os().skip(1).collect();

    // Help has a higher priority and should be handled separately.
    if raw.iter().any(|a| a == "-h" || a == "--help") {
        print!("{HELP}");
        std::process::exit(0);
    }

    let args = parse_args(raw)?;

    // Writes are queued in memory; an interrupt only loses what is still queued.
    set_handler(|| {
        log::warn!("Interrupted");
        std::process::exit(130);
    })?;

    env_logger::builder().format_target(false).init();

    let config = CasinoConfig::from_env(args.store, args.state_file.clone())?;
    info!("Using the {} store", config.backend);

    let mut casino = Casino::open(config).await?;
    if let Some(path) = &args.variant_file {
        let json = tokio::fs::read_to_string(path).await?;
        casino.load_variant(&json)?;
    }

    let result = commands::run(&casino, &args).await;
    casino.shutdown().await?;
    result
}
