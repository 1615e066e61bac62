//! Command implementations.
//!
//! Session errors are shown with their player-facing message; everything else
//! is passed up unchanged.

use crate::{Args, Command};
use anyhow::{Error, anyhow};
use pocket_casino::{
    Casino, GameKind, GameSession, SessionError,
    game::{
        BetResult, BlackjackSession, Card, CrapsBet, CrapsSession, RouletteBet, SlotSession,
        VideoPokerSession, blackjack::hand_value,
    },
};
use std::collections::HashMap;

/// Dealer-style strategy: hit below this total
const STAND_ON: u32 = 17;

fn player_error(err: SessionError) -> Error {
    anyhow!(err.client_message())
}

pub async fn run(casino: &Casino, args: &Args) -> Result<(), Error> {
    let wager = match args.wager {
        Some(wager) => wager,
        None => casino.default_wager().await,
    };
    let rounds = args.count;

    match &args.command {
        Command::Balance => return balance(casino, args.history).await,
        Command::Variants => {
            variants(casino);
            return Ok(());
        }
        Command::DefaultWager { wager } => return default_wager(casino, *wager).await,
        Command::Spin { variant } => spin(casino, variant, wager, rounds, args).await?,
        Command::Blackjack => blackjack(casino, wager, rounds, args.seed).await?,
        Command::Craps { bet } => craps(casino, bet, wager, rounds, args.seed).await?,
        Command::Roulette { bet } => roulette(casino, bet, wager, rounds, args.seed).await?,
        Command::Poker => poker(casino, wager, rounds, args.seed).await?,
    }

    println!("Balance: {}", casino.ledger().balance().await);
    Ok(())
}

fn round_header(round: u32, rounds: u32) {
    if rounds > 1 {
        println!("--- round {} ---", round + 1);
    }
}

async fn balance(casino: &Casino, history: usize) -> Result<(), Error> {
    println!("Balance:        {}", casino.ledger().balance().await);
    println!("Default wager:  {}", casino.default_wager().await);
    if let Some(game) = casino.last_active_game().await {
        println!("Last game:      {game}");
    }

    let transactions = casino.store().recent_transactions(history).await?;
    if !transactions.is_empty() {
        println!();
        for tx in transactions {
            println!(
                "{}  {:>+8}  {:>8}  {:<9} {}",
                tx.timestamp.format("%Y-%m-%d %H:%M:%S"),
                tx.delta,
                tx.balance_after,
                tx.cause,
                tx.game.as_deref().unwrap_or("")
            );
        }
    }
    Ok(())
}

fn variants(casino: &Casino) {
    for name in casino.variant_names() {
        if let Some(variant) = casino.variant(name) {
            println!("{variant}");
        }
    }

    let warnings = casino.audit();
    if !warnings.is_empty() {
        println!("\nDrift between comparable line sets:");
        for warning in warnings {
            println!("  {warning}");
        }
    }
}

async fn default_wager(casino: &Casino, wager: Option<u64>) -> Result<(), Error> {
    if let Some(wager) = wager {
        casino.set_default_wager(wager).await?;
    }
    println!("Default wager: {}", casino.default_wager().await);
    Ok(())
}

async fn spin(
    casino: &Casino,
    variant: &str,
    wager: u64,
    rounds: u32,
    args: &Args,
) -> Result<(), Error> {
    let mut slots = casino.open_slots(variant, args.seed).await?;
    slots
        .set_assist(args.assist)
        .map_err(|_| anyhow!("{variant} has no {} assist", args.assist))?;
    for round in 0..rounds {
        round_header(round, rounds);
        spin_once(&mut slots, wager).await?;
    }
    Ok(())
}

async fn spin_once(slots: &mut SlotSession, wager: u64) -> Result<(), Error> {
    let report = slots.spin(wager).await.map_err(player_error)?;

    println!("{}", report.grid.render(slots.variant().paytable()));
    for win in &report.outcome.wins {
        println!(
            "  {} line {}: {} x{} pays {}",
            win.line_set,
            win.result.line_id,
            slots.variant().paytable().name_of(win.result.symbol),
            win.result.run_length,
            win.amount
        );
    }
    if !report.glitched.is_empty() {
        println!("  {} cells glitched", report.glitched.len());
    }
    for boost in &report.boosts {
        println!("  {} x{}", boost.source, boost.factor);
    }
    for event in &report.triggered {
        println!("  triggered {event}");
    }
    println!(
        "Won {}{}",
        report.outcome.payout,
        if report.free_spin { " (free spin)" } else { "" }
    );
    Ok(())
}

fn show_hand(cards: &[Card]) -> String {
    cards.iter().map(|c| c.to_string().trim().to_string()).collect::<Vec<_>>().join(" ")
}

async fn blackjack(casino: &Casino, wager: u64, rounds: u32, seed: Option<u64>) -> Result<(), Error> {
    let GameSession::Blackjack(mut table) = casino.open_game(GameKind::Blackjack, seed).await? else {
        return Err(anyhow!("blackjack session unavailable"));
    };
    for round in 0..rounds {
        round_header(round, rounds);
        blackjack_hand(&mut table, wager).await?;
    }
    Ok(())
}

async fn blackjack_hand(table: &mut BlackjackSession, wager: u64) -> Result<(), Error> {
    let mut round = table.deal(wager).await.map_err(player_error)?;
    println!("Dealer shows {}", show_hand(&round.dealer));
    while round.outcome.is_none() {
        println!("You have {} ({})", show_hand(&round.player), hand_value(&round.player));
        round = if hand_value(&round.player) < STAND_ON {
            table.hit().await
        } else {
            table.stand().await
        }
        .map_err(player_error)?;
    }

    println!("You have {} ({})", show_hand(&round.player), hand_value(&round.player));
    println!("Dealer has {} ({})", show_hand(&round.dealer), hand_value(&round.dealer));
    if let Some(outcome) = round.outcome {
        println!("{outcome}: paid {}", round.payout);
    }
    Ok(())
}

async fn craps(
    casino: &Casino,
    bet: &str,
    wager: u64,
    rounds: u32,
    seed: Option<u64>,
) -> Result<(), Error> {
    let bet: CrapsBet = bet.parse().map_err(Error::msg)?;
    let GameSession::Craps(mut table) = casino.open_game(GameKind::Craps, seed).await? else {
        return Err(anyhow!("craps session unavailable"));
    };
    for round in 0..rounds {
        round_header(round, rounds);
        craps_bet(&mut table, bet, wager).await?;
    }
    Ok(())
}

/// Place `bet` and roll until it is taken down
async fn craps_bet(table: &mut CrapsSession, bet: CrapsBet, wager: u64) -> Result<(), Error> {
    table.place_bet(bet, wager).await.map_err(player_error)?;
    while table.bets().contains_key(&bet) {
        let outcome = table.roll().await.map_err(player_error)?;
        print!("Rolled {}+{} = {}", outcome.dice.0, outcome.dice.1, outcome.total);
        if let Some(point) = outcome.phase.point() {
            print!(" (point {point})");
        }
        println!();

        for settlement in outcome.settlements.iter().filter(|s| s.bet == bet) {
            match settlement.result {
                BetResult::Win(amount) => println!("{bet} wins, paid {amount}"),
                BetResult::Push => println!("{bet} pushes, stake returned"),
                BetResult::Lose => println!("{bet} loses"),
            }
        }
    }
    Ok(())
}

async fn roulette(
    casino: &Casino,
    bet: &str,
    wager: u64,
    rounds: u32,
    seed: Option<u64>,
) -> Result<(), Error> {
    let bet: RouletteBet = bet.parse().map_err(Error::msg)?;
    let GameSession::Roulette(mut wheel) = casino.open_game(GameKind::Roulette, seed).await? else {
        return Err(anyhow!("roulette session unavailable"));
    };

    for round in 0..rounds {
        round_header(round, rounds);
        wheel.place_bet(bet, wager).await.map_err(player_error)?;
        let result = wheel.spin().await.map_err(player_error)?;
        println!("The ball lands on {}", result.number);
        println!("{bet}: paid {}", result.payout);
    }
    Ok(())
}

/// Positions of every card whose value appears more than once
fn pairs_to_hold(hand: &[Card]) -> Vec<usize> {
    let mut counts: HashMap<u8, usize> = HashMap::new();
    for card in hand {
        *counts.entry(card.0).or_default() += 1;
    }
    hand.iter()
        .enumerate()
        .filter(|(_, card)| counts[&card.0] > 1)
        .map(|(i, _)| i)
        .collect()
}

async fn poker(casino: &Casino, wager: u64, rounds: u32, seed: Option<u64>) -> Result<(), Error> {
    let GameSession::VideoPoker(mut machine) = casino.open_game(GameKind::VideoPoker, seed).await?
    else {
        return Err(anyhow!("video poker session unavailable"));
    };
    for round in 0..rounds {
        round_header(round, rounds);
        poker_hand(&mut machine, wager).await?;
    }
    Ok(())
}

async fn poker_hand(machine: &mut VideoPokerSession, wager: u64) -> Result<(), Error> {
    let dealt = machine.deal(wager).await.map_err(player_error)?;
    let held = pairs_to_hold(&dealt.hand);
    println!("Dealt {}, holding {:?}", show_hand(&dealt.hand), held);

    let round = machine.draw(&held).await.map_err(player_error)?;
    println!("You have {}", show_hand(&round.hand));
    if let Some(rank) = round.player_rank {
        println!("  {rank}");
    }
    println!("Dealer has {}", show_hand(&round.dealer));
    if let Some(rank) = round.dealer_rank {
        println!("  {rank}");
    }
    println!("Paid {}", round.payout);
    Ok(())
}
