//! Single-deck blackjack against the house.

use super::{
    SessionError, SessionInfo, SessionResult,
    cards::{Card, Deck},
    session_rng, winnings,
};
use crate::ledger::{Ledger, TransactionCause};
use rand::rngs::StdRng;
use serde::Serialize;
use std::fmt;

const GAME: &str = "blackjack";
const DEALER_STANDS_ON: u32 = 17;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum BlackjackPhase {
    Betting,
    PlayerTurn,
    DealerTurn,
    Resolved,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum HandOutcome {
    /// Two-card 21, paid 3:2
    Natural,
    Win,
    Push,
    Lose,
    /// Player went over 21; the dealer does not draw
    Bust,
}

impl fmt::Display for HandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Natural => "blackjack",
            Self::Win => "win",
            Self::Push => "push",
            Self::Lose => "lose",
            Self::Bust => "bust",
        };
        write!(f, "{repr}")
    }
}

/// Table as the player sees it after an action
#[derive(Clone, Debug, Serialize)]
pub struct BlackjackRound {
    pub player: Vec<Card>,
    /// Only the up card until the dealer plays
    pub dealer: Vec<Card>,
    pub stake: u64,
    pub outcome: Option<HandOutcome>,
    /// Credited back to the player, stake included
    pub payout: u64,
}

/// Best total of a hand: aces count 11 unless that busts
pub fn hand_value(cards: &[Card]) -> u32 {
    let mut total = 0;
    let mut soft_aces = 0;
    for card in cards {
        total += match card.0 {
            1 => {
                soft_aces += 1;
                11
            }
            v if v >= 10 => 10,
            v => u32::from(v),
        };
    }
    while total > 21 && soft_aces > 0 {
        total -= 10;
        soft_aces -= 1;
    }
    total
}

pub fn is_natural(cards: &[Card]) -> bool {
    cards.len() == 2 && hand_value(cards) == 21
}

pub struct BlackjackSession {
    ledger: Ledger,
    rng: StdRng,
    deck: Deck,
    phase: BlackjackPhase,
    player: Vec<Card>,
    dealer: Vec<Card>,
    stake: u64,
    outcome: Option<HandOutcome>,
    payout: u64,
}

impl BlackjackSession {
    pub fn new(ledger: Ledger, seed: Option<u64>) -> Self {
        let mut rng = session_rng(seed);
        let mut deck = Deck::default();
        deck.shuffle(&mut rng);
        Self {
            ledger,
            rng,
            deck,
            phase: BlackjackPhase::Betting,
            player: Vec::with_capacity(8),
            dealer: Vec::with_capacity(8),
            stake: 0,
            outcome: None,
            payout: 0,
        }
    }

    pub fn state(&self) -> BlackjackPhase {
        self.phase
    }

    /// Debit the wager and deal two cards each
    ///
    /// Naturals are settled immediately. Starting a new hand from `Resolved`
    /// returns the table to betting first.
    pub async fn deal(&mut self, wager: u64) -> SessionResult<BlackjackRound> {
        match self.phase {
            BlackjackPhase::Betting | BlackjackPhase::Resolved => {}
            _ => return Err(SessionError::InvalidAction),
        }
        self.ledger.debit_for(wager, Some(GAME)).await?;

        self.deck.shuffle(&mut self.rng);
        self.player.clear();
        self.dealer.clear();
        self.stake = wager;
        self.outcome = None;
        self.payout = 0;
        for _ in 0..2 {
            self.player.push(self.deck.deal_card(&mut self.rng));
            self.dealer.push(self.deck.deal_card(&mut self.rng));
        }
        self.phase = BlackjackPhase::PlayerTurn;

        match (is_natural(&self.player), is_natural(&self.dealer)) {
            (true, true) => self.settle(HandOutcome::Push).await?,
            (true, false) => self.settle(HandOutcome::Natural).await?,
            (false, true) => self.settle(HandOutcome::Lose).await?,
            (false, false) => {}
        }
        Ok(self.round())
    }

    pub async fn hit(&mut self) -> SessionResult<BlackjackRound> {
        if self.phase != BlackjackPhase::PlayerTurn {
            return Err(SessionError::InvalidAction);
        }
        self.player.push(self.deck.deal_card(&mut self.rng));
        if hand_value(&self.player) > 21 {
            self.settle(HandOutcome::Bust).await?;
        }
        Ok(self.round())
    }

    pub async fn stand(&mut self) -> SessionResult<BlackjackRound> {
        if self.phase != BlackjackPhase::PlayerTurn {
            return Err(SessionError::InvalidAction);
        }
        self.play_dealer().await?;
        Ok(self.round())
    }

    /// Double the stake, take exactly one card, then stand
    ///
    /// # Errors
    ///
    /// * `SessionError::InvalidAction` - not the player's first decision
    /// * `SessionError::Ledger` - the second stake could not be debited; the
    ///   hand continues unchanged
    pub async fn double_down(&mut self) -> SessionResult<BlackjackRound> {
        if self.phase != BlackjackPhase::PlayerTurn || self.player.len() != 2 {
            return Err(SessionError::InvalidAction);
        }
        self.ledger.debit_for(self.stake, Some(GAME)).await?;
        self.stake *= 2;

        self.player.push(self.deck.deal_card(&mut self.rng));
        if hand_value(&self.player) > 21 {
            self.settle(HandOutcome::Bust).await?;
        } else {
            self.play_dealer().await?;
        }
        Ok(self.round())
    }

    /// Current table view
    pub fn round(&self) -> BlackjackRound {
        let dealer = if self.phase == BlackjackPhase::Resolved {
            self.dealer.clone()
        } else {
            self.dealer.iter().take(1).copied().collect()
        };
        BlackjackRound {
            player: self.player.clone(),
            dealer,
            stake: self.stake,
            outcome: self.outcome,
            payout: self.payout,
        }
    }

    async fn play_dealer(&mut self) -> SessionResult<()> {
        self.phase = BlackjackPhase::DealerTurn;
        while hand_value(&self.dealer) < DEALER_STANDS_ON {
            self.dealer.push(self.deck.deal_card(&mut self.rng));
        }

        let player = hand_value(&self.player);
        let dealer = hand_value(&self.dealer);
        let outcome = if dealer > 21 || player > dealer {
            HandOutcome::Win
        } else if player == dealer {
            HandOutcome::Push
        } else {
            HandOutcome::Lose
        };
        self.settle(outcome).await
    }

    async fn settle(&mut self, outcome: HandOutcome) -> SessionResult<()> {
        let (payout, cause) = match outcome {
            HandOutcome::Natural => (winnings(self.stake, 3, 2), TransactionCause::Payout),
            HandOutcome::Win => (winnings(self.stake, 1, 1), TransactionCause::Payout),
            HandOutcome::Push => (self.stake, TransactionCause::Refund),
            HandOutcome::Lose | HandOutcome::Bust => (0, TransactionCause::Payout),
        };

        self.phase = BlackjackPhase::Resolved;
        self.outcome = Some(outcome);
        self.payout = payout;
        log::debug!(
            "blackjack: {} ({} vs {}) stake {} payout {}",
            outcome,
            hand_value(&self.player),
            hand_value(&self.dealer),
            self.stake,
            payout
        );
        self.ledger.credit_for(payout, cause, Some(GAME)).await?;
        Ok(())
    }

    #[cfg(test)]
    fn rig(&mut self, player: Vec<Card>, dealer: Vec<Card>, stake: u64) {
        self.player = player;
        self.dealer = dealer;
        self.stake = stake;
        self.outcome = None;
        self.payout = 0;
        self.phase = BlackjackPhase::PlayerTurn;
    }

    #[cfg(test)]
    fn stack_deck(&mut self, next: &[Card]) {
        let mut deck = Deck::default();
        deck.put_on_top(next);
        self.deck = deck;
    }
}

impl SessionInfo for BlackjackSession {
    fn game_id(&self) -> String {
        GAME.to_string()
    }

    fn phase(&self) -> &'static str {
        match self.phase {
            BlackjackPhase::Betting => "betting",
            BlackjackPhase::PlayerTurn => "player_turn",
            BlackjackPhase::DealerTurn => "dealer_turn",
            BlackjackPhase::Resolved => "resolved",
        }
    }

    fn is_idle(&self) -> bool {
        matches!(
            self.phase,
            BlackjackPhase::Betting | BlackjackPhase::Resolved
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::CasinoConfig,
        game::cards::Suit,
        ledger::{BalanceSnapshot, LedgerError},
        store::MemoryStore,
    };
    use chrono::Utc;
    use std::sync::Arc;

    fn c(value: u8) -> Card {
        Card(value, Suit::Spade)
    }

    fn session(balance: u64) -> BlackjackSession {
        let opening = BalanceSnapshot {
            balance,
            written_at: Utc::now(),
        };
        let (ledger, worker) =
            Ledger::open(Arc::new(MemoryStore::new()), opening, &CasinoConfig::in_memory());
        tokio::spawn(worker.run());
        BlackjackSession::new(ledger, Some(11))
    }

    #[test]
    fn test_hand_values() {
        assert_eq!(hand_value(&[c(1), c(13)]), 21);
        assert_eq!(hand_value(&[c(1), c(1), c(9)]), 21);
        assert_eq!(hand_value(&[c(1), c(5), c(10)]), 16);
        assert_eq!(hand_value(&[c(12), c(11), c(2)]), 22);
        assert!(is_natural(&[c(10), c(1)]));
        assert!(!is_natural(&[c(10), c(5), c(6)]));
    }

    #[tokio::test]
    async fn test_actions_outside_a_hand_are_rejected() {
        let mut table = session(100);
        assert_eq!(table.hit().await.unwrap_err(), SessionError::InvalidAction);
        assert_eq!(table.stand().await.unwrap_err(), SessionError::InvalidAction);
        assert_eq!(
            table.double_down().await.unwrap_err(),
            SessionError::InvalidAction
        );
        assert_eq!(table.ledger.balance().await, 100);
    }

    #[tokio::test]
    async fn test_deal_debits_and_hides_hole_card() {
        let mut table = session(100);
        let round = table.deal(10).await.unwrap();

        assert_eq!(round.player.len(), 2);
        if round.outcome.is_none() {
            assert_eq!(round.dealer.len(), 1);
            assert_eq!(table.ledger.balance().await, 90);
            assert_eq!(table.deal(10).await.unwrap_err(), SessionError::InvalidAction);
        }
    }

    #[tokio::test]
    async fn test_insufficient_funds_does_not_deal() {
        let mut table = session(5);
        assert!(matches!(
            table.deal(10).await,
            Err(SessionError::Ledger(LedgerError::InsufficientFunds { .. }))
        ));
        assert_eq!(table.state(), BlackjackPhase::Betting);
    }

    #[tokio::test]
    async fn test_natural_pays_three_to_two() {
        let mut table = session(100);
        table.ledger.debit(10).await.unwrap();
        table.rig(vec![c(1), c(13)], vec![c(9), c(8)], 10);
        table.settle(HandOutcome::Natural).await.unwrap();

        assert_eq!(table.round().payout, 25);
        assert_eq!(table.ledger.balance().await, 115);
    }

    #[tokio::test]
    async fn test_dealer_draws_to_seventeen() {
        let mut table = session(100);
        table.ledger.debit(10).await.unwrap();
        table.rig(vec![c(10), c(8)], vec![c(10), c(2)], 10);
        table.stack_deck(&[c(3), c(5)]);

        let round = table.stand().await.unwrap();
        // 12 + 3 = 15, + 5 = 20
        assert_eq!(hand_value(&round.dealer), 20);
        assert_eq!(round.outcome, Some(HandOutcome::Lose));
        assert_eq!(table.ledger.balance().await, 90);
    }

    #[tokio::test]
    async fn test_equal_totals_push() {
        let mut table = session(100);
        table.ledger.debit(10).await.unwrap();
        table.rig(vec![c(10), c(8)], vec![c(10), c(8)], 10);

        let round = table.stand().await.unwrap();
        assert_eq!(round.outcome, Some(HandOutcome::Push));
        assert_eq!(table.ledger.balance().await, 100);
        let last = table.ledger.history(1).await;
        assert_eq!(last[0].cause, TransactionCause::Refund);
    }

    #[tokio::test]
    async fn test_bust_skips_dealer() {
        let mut table = session(100);
        table.ledger.debit(10).await.unwrap();
        table.rig(vec![c(10), c(8)], vec![c(10), c(2)], 10);
        table.stack_deck(&[c(9)]);

        let round = table.hit().await.unwrap();
        assert_eq!(round.outcome, Some(HandOutcome::Bust));
        assert_eq!(round.dealer.len(), 2);
        assert_eq!(table.ledger.balance().await, 90);
    }

    #[tokio::test]
    async fn test_double_down_doubles_stake() {
        let mut table = session(100);
        table.ledger.debit(10).await.unwrap();
        table.rig(vec![c(5), c(6)], vec![c(10), c(7)], 10);
        table.stack_deck(&[c(10)]);

        let round = table.double_down().await.unwrap();
        assert_eq!(round.player.len(), 3);
        assert_eq!(round.stake, 20);
        assert_eq!(round.outcome, Some(HandOutcome::Win));
        assert_eq!(table.ledger.balance().await, 120);
    }

    #[tokio::test]
    async fn test_double_down_without_funds_keeps_hand() {
        let mut table = session(10);
        table.ledger.debit(10).await.unwrap();
        table.rig(vec![c(5), c(6)], vec![c(10), c(7)], 10);

        assert!(table.double_down().await.is_err());
        assert_eq!(table.state(), BlackjackPhase::PlayerTurn);
        assert_eq!(table.round().stake, 10);
    }
}
