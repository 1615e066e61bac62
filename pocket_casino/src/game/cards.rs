use rand::{Rng, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Suit {
    Club,
    Spade,
    Diamond,
    Heart,
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Club, Suit::Spade, Suit::Diamond, Suit::Heart];
}

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Club => "♣",
            Self::Spade => "♠",
            Self::Diamond => "♦",
            Self::Heart => "♥",
        };
        write!(f, "{repr}")
    }
}

/// Placeholder for card values.
pub type Value = u8;

/// A card is a value (ace=1 ... king=13) and a suit.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Card(pub Value, pub Suit);

impl Card {
    pub fn is_ace(&self) -> bool {
        self.0 == 1
    }

    /// Value with aces high (ace=14), as poker ranks them
    pub fn high_value(&self) -> Value {
        if self.is_ace() { 14 } else { self.0 }
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let value = match self.0 {
            1 | 14 => "A",
            11 => "J",
            12 => "Q",
            13 => "K",
            v => &v.to_string(),
        };
        let repr = format!("{value}/{}", self.1);
        write!(f, "{repr:>4}")
    }
}

/// A single 52-card deck, reshuffled when it runs out
#[derive(Debug)]
pub struct Deck {
    cards: Vec<Card>,
    pub deck_idx: usize,
}

impl Deck {
    pub fn deal_card<R: Rng>(&mut self, rng: &mut R) -> Card {
        if self.deck_idx >= self.cards.len() {
            self.shuffle(rng);
        }
        let card = self.cards[self.deck_idx];
        self.deck_idx += 1;
        card
    }

    pub fn shuffle<R: Rng>(&mut self, rng: &mut R) {
        self.cards.shuffle(rng);
        self.deck_idx = 0;
    }

    pub fn remaining(&self) -> usize {
        self.cards.len() - self.deck_idx
    }

    /// Move `cards` to the top in the given order and reset the deal position
    #[cfg(test)]
    pub(crate) fn put_on_top(&mut self, cards: &[Card]) {
        self.cards.retain(|card| !cards.contains(card));
        let mut stacked = cards.to_vec();
        stacked.append(&mut self.cards);
        self.cards = stacked;
        self.deck_idx = 0;
    }
}

impl Default for Deck {
    fn default() -> Self {
        let cards = (1u8..14u8)
            .flat_map(|value| Suit::ALL.into_iter().map(move |suit| Card(value, suit)))
            .collect();
        Self { cards, deck_idx: 0 }
    }
}
