//! Five-card draw against a dealer hand, paid from a jacks-or-better table.

use super::{
    SessionError, SessionInfo, SessionResult,
    cards::{Card, Deck, Value},
    session_rng,
};
use crate::ledger::{Ledger, TransactionCause};
use rand::rngs::StdRng;
use serde::Serialize;
use std::{collections::BTreeMap, fmt};

const GAME: &str = "video_poker";
const HAND_SIZE: usize = 5;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum PokerHand {
    HighCard,
    /// Pair of tens or lower
    LowPair,
    /// Pair of jacks or better
    HighPair,
    TwoPair,
    ThreeOfAKind,
    Straight,
    Flush,
    FullHouse,
    FourOfAKind,
    StraightFlush,
    RoyalFlush,
}

impl PokerHand {
    /// Total returned per credit wagered
    pub fn multiplier(self) -> u64 {
        match self {
            Self::RoyalFlush => 250,
            Self::StraightFlush => 50,
            Self::FourOfAKind => 25,
            Self::FullHouse => 9,
            Self::Flush => 6,
            Self::Straight => 4,
            Self::ThreeOfAKind => 3,
            Self::TwoPair => 2,
            Self::HighPair => 1,
            Self::LowPair | Self::HighCard => 0,
        }
    }
}

impl fmt::Display for PokerHand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::HighCard => "high card",
            Self::LowPair => "low pair",
            Self::HighPair => "jacks or better",
            Self::TwoPair => "two pair",
            Self::ThreeOfAKind => "three of a kind",
            Self::Straight => "straight",
            Self::Flush => "flush",
            Self::FullHouse => "full house",
            Self::FourOfAKind => "four of a kind",
            Self::StraightFlush => "straight flush",
            Self::RoyalFlush => "royal flush",
        };
        write!(f, "{repr}")
    }
}

/// Rank a five-card hand
pub fn rank_hand(cards: &[Card]) -> PokerHand {
    let mut values: Vec<Value> = cards.iter().map(Card::high_value).collect();
    values.sort_unstable();

    let flush = cards.windows(2).all(|pair| pair[0].1 == pair[1].1);
    let wheel = values == [2, 3, 4, 5, 14];
    let straight = wheel
        || (values.windows(2).all(|pair| pair[1] == pair[0] + 1) && values.len() == HAND_SIZE);

    let mut counts: BTreeMap<Value, usize> = BTreeMap::new();
    for &value in &values {
        *counts.entry(value).or_default() += 1;
    }
    let mut groups: Vec<usize> = counts.values().copied().collect();
    groups.sort_unstable_by(|a, b| b.cmp(a));

    match (straight, flush) {
        (true, true) if values[0] == 10 => return PokerHand::RoyalFlush,
        (true, true) => return PokerHand::StraightFlush,
        _ => {}
    }
    match groups.as_slice() {
        [4, ..] => PokerHand::FourOfAKind,
        [3, 2] => PokerHand::FullHouse,
        _ if flush => PokerHand::Flush,
        _ if straight => PokerHand::Straight,
        [3, ..] => PokerHand::ThreeOfAKind,
        [2, 2, ..] => PokerHand::TwoPair,
        [2, ..] => {
            let high = counts.iter().any(|(&value, &count)| count == 2 && value >= 11);
            if high {
                PokerHand::HighPair
            } else {
                PokerHand::LowPair
            }
        }
        _ => PokerHand::HighCard,
    }
}

/// Whether a player hand beats (or ties) a dealer hand
fn beats(player: PokerHand, dealer: PokerHand) -> bool {
    let tier = |hand: PokerHand| match hand {
        PokerHand::LowPair | PokerHand::HighPair => PokerHand::LowPair,
        other => other,
    };
    tier(player) >= tier(dealer)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum PokerPhase {
    Betting,
    Holding,
    Resolved,
}

#[derive(Clone, Debug, Serialize)]
pub struct PokerRound {
    pub hand: Vec<Card>,
    pub stake: u64,
    /// Set once the draw is resolved
    pub player_rank: Option<PokerHand>,
    pub dealer: Vec<Card>,
    pub dealer_rank: Option<PokerHand>,
    pub payout: u64,
}

pub struct VideoPokerSession {
    ledger: Ledger,
    rng: StdRng,
    deck: Deck,
    phase: PokerPhase,
    hand: Vec<Card>,
    dealer: Vec<Card>,
    stake: u64,
    payout: u64,
}

impl VideoPokerSession {
    pub fn new(ledger: Ledger, seed: Option<u64>) -> Self {
        Self {
            ledger,
            rng: session_rng(seed),
            deck: Deck::default(),
            phase: PokerPhase::Betting,
            hand: Vec::with_capacity(HAND_SIZE),
            dealer: Vec::with_capacity(HAND_SIZE),
            stake: 0,
            payout: 0,
        }
    }

    pub fn state(&self) -> PokerPhase {
        self.phase
    }

    /// Debit the wager and deal five cards
    pub async fn deal(&mut self, wager: u64) -> SessionResult<PokerRound> {
        if self.phase == PokerPhase::Holding {
            return Err(SessionError::InvalidAction);
        }
        self.ledger.debit_for(wager, Some(GAME)).await?;

        self.deck.shuffle(&mut self.rng);
        self.stake = wager;
        self.payout = 0;
        self.dealer.clear();
        self.hand = (0..HAND_SIZE)
            .map(|_| self.deck.deal_card(&mut self.rng))
            .collect();
        self.phase = PokerPhase::Holding;
        Ok(self.round())
    }

    /// Keep the cards at `held` (0-4), replace the rest, then play the dealer
    ///
    /// # Errors
    ///
    /// * `SessionError::InvalidAction` - no hand has been dealt
    /// * `SessionError::InvalidHold` - a position outside the hand
    pub async fn draw(&mut self, held: &[usize]) -> SessionResult<PokerRound> {
        if self.phase != PokerPhase::Holding {
            return Err(SessionError::InvalidAction);
        }
        if let Some(&bad) = held.iter().find(|&&i| i >= HAND_SIZE) {
            return Err(SessionError::InvalidHold(bad));
        }

        for i in 0..HAND_SIZE {
            if !held.contains(&i) {
                self.hand[i] = self.deck.deal_card(&mut self.rng);
            }
        }
        self.dealer = (0..HAND_SIZE)
            .map(|_| self.deck.deal_card(&mut self.rng))
            .collect();

        let player = rank_hand(&self.hand);
        let dealer = rank_hand(&self.dealer);
        self.payout = if beats(player, dealer) {
            self.stake.saturating_mul(player.multiplier())
        } else {
            0
        };
        self.phase = PokerPhase::Resolved;
        log::debug!(
            "video poker: {} vs {} pays {}",
            player,
            dealer,
            self.payout
        );

        self.ledger
            .credit_for(self.payout, TransactionCause::Payout, Some(GAME))
            .await?;
        Ok(self.round())
    }

    pub fn round(&self) -> PokerRound {
        let resolved = self.phase == PokerPhase::Resolved;
        PokerRound {
            hand: self.hand.clone(),
            stake: self.stake,
            player_rank: resolved.then(|| rank_hand(&self.hand)),
            dealer: self.dealer.clone(),
            dealer_rank: resolved.then(|| rank_hand(&self.dealer)),
            payout: self.payout,
        }
    }
}

impl SessionInfo for VideoPokerSession {
    fn game_id(&self) -> String {
        GAME.to_string()
    }

    fn phase(&self) -> &'static str {
        match self.phase {
            PokerPhase::Betting => "betting",
            PokerPhase::Holding => "holding",
            PokerPhase::Resolved => "resolved",
        }
    }

    fn is_idle(&self) -> bool {
        self.phase != PokerPhase::Holding
    }
}
