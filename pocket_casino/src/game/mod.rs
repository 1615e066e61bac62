//! Game sessions.
//!
//! Each session owns its own random source and round state and holds a clone of
//! the shared [`Ledger`](crate::ledger::Ledger). Every round follows the same
//! contract: debit the stake, resolve with the game's rules, credit winnings.
//! Actions that do not fit the current phase fail with
//! [`SessionError::InvalidAction`] and leave the balance untouched.

pub mod blackjack;
pub mod cards;
pub mod craps;
pub mod roulette;
pub mod slots;
pub mod video_poker;

use crate::{engine::EngineError, ledger::LedgerError};
use enum_dispatch::enum_dispatch;
use rand::{SeedableRng, rngs::StdRng};
use std::fmt;
use thiserror::Error;

pub use blackjack::{BlackjackPhase, BlackjackRound, BlackjackSession, HandOutcome};
pub use cards::{Card, Deck, Suit, Value};
pub use craps::{BetResult, CrapsBet, CrapsPhase, CrapsSession, RollOutcome, Settlement};
pub use roulette::{RoulettePhase, RouletteBet, RouletteSession, SpinResult};
pub use slots::{Assist, Boost, SlotPhase, SlotSession, SpinReport};
pub use video_poker::{PokerHand, PokerPhase, PokerRound, VideoPokerSession};

/// Errors from game sessions
#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    #[error("invalid action")]
    InvalidAction,
    #[error("can't place {0} now")]
    BetNotAllowed(String),
    #[error("no bets placed")]
    NoBets,
    #[error("no card at position {0}")]
    InvalidHold(usize),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl SessionError {
    /// Get a message suitable for showing to the player
    pub fn client_message(&self) -> String {
        match self {
            SessionError::Ledger(err) => err.client_message(),
            SessionError::Engine(_) => "Game unavailable".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// The kinds of game a casino can open
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum GameKind {
    Slots,
    Blackjack,
    Craps,
    Roulette,
    VideoPoker,
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Slots => "slots",
            Self::Blackjack => "blackjack",
            Self::Craps => "craps",
            Self::Roulette => "roulette",
            Self::VideoPoker => "video_poker",
        };
        write!(f, "{repr}")
    }
}

/// What every session can report about itself
#[enum_dispatch]
pub trait SessionInfo {
    /// Identifier recorded on the session's transactions
    fn game_id(&self) -> String;

    /// Name of the current phase
    fn phase(&self) -> &'static str;

    /// True between rounds, when no stake is outstanding
    fn is_idle(&self) -> bool;
}

/// Any open game session
#[enum_dispatch(SessionInfo)]
pub enum GameSession {
    Slots(SlotSession),
    Blackjack(BlackjackSession),
    Craps(CrapsSession),
    Roulette(RouletteSession),
    VideoPoker(VideoPokerSession),
}

impl GameSession {
    pub fn kind(&self) -> GameKind {
        match self {
            Self::Slots(_) => GameKind::Slots,
            Self::Blackjack(_) => GameKind::Blackjack,
            Self::Craps(_) => GameKind::Craps,
            Self::Roulette(_) => GameKind::Roulette,
            Self::VideoPoker(_) => GameKind::VideoPoker,
        }
    }
}

/// Random source for a session: seeded for replays and tests, else from the OS
pub(crate) fn session_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

/// `stake` plus `stake * numerator / denominator`, floored
pub(crate) fn winnings(stake: u64, numerator: u64, denominator: u64) -> u64 {
    let profit = u128::from(stake) * u128::from(numerator) / u128::from(denominator.max(1));
    stake.saturating_add(u64::try_from(profit).unwrap_or(u64::MAX))
}
