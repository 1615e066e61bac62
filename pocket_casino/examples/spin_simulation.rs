//! Spin Simulation Example
//!
//! Estimates the return to player of every built-in slot variant by settling
//! a large number of random draws, then plays a short session against a real
//! ledger.

use pocket_casino::{
    Casino, CasinoConfig,
    engine::{DEFAULT_TOLERANCE, SlotVariant, draw},
};
use rand::{SeedableRng, rngs::StdRng};

const SPINS: u64 = 100_000;
const WAGER: u64 = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("=== Return to player over {} spins ===\n", SPINS);

    for variant in SlotVariant::presets(DEFAULT_TOLERANCE)? {
        let mut rng = StdRng::seed_from_u64(2024);
        let mut paid = 0u64;
        let mut hits = 0u64;

        for _ in 0..SPINS {
            let grid = draw(variant.paytable(), variant.reels(), variant.rows(), &mut rng)?;
            let outcome = variant.settle(&grid, WAGER, &[])?;
            if outcome.payout > 0 {
                hits += 1;
            }
            paid += outcome.payout;
        }

        let staked = SPINS * WAGER;
        println!(
            "{:<14} rtp {:>7.2}%  hit rate {:>6.2}%",
            variant.name(),
            paid as f64 * 100.0 / staked as f64,
            hits as f64 * 100.0 / SPINS as f64
        );
    }

    println!("\n=== Twenty spins of cyber ===\n");
    let casino = Casino::open(CasinoConfig::in_memory()).await?;
    let mut slots = casino.open_slots("cyber", Some(7)).await?;

    for spin in 1..=20 {
        let report = slots.spin(WAGER).await?;
        println!(
            "spin {:>2}: won {:>4}  balance {:>5}  {}{}",
            spin,
            report.outcome.payout,
            report.balance,
            if report.free_spin { "(free) " } else { "" },
            report.triggered.join(", ")
        );
    }

    casino.shutdown().await?;
    Ok(())
}
