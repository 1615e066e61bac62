//! Single-zero roulette.

use super::{SessionError, SessionInfo, SessionResult, session_rng, winnings};
use crate::ledger::{Ledger, TransactionCause};
use rand::{Rng, rngs::StdRng};
use serde::Serialize;
use std::{fmt, str::FromStr};

const GAME: &str = "roulette";

const RED: [u8; 18] = [
    1, 3, 5, 7, 9, 12, 14, 16, 18, 19, 21, 23, 25, 27, 30, 32, 34, 36,
];

pub fn is_red(number: u8) -> bool {
    RED.contains(&number)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum RoulettePhase {
    Betting,
    Spinning,
    Resolved,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
pub enum RouletteBet {
    /// Single number, 0 included
    Straight(u8),
    Red,
    Black,
    Odd,
    Even,
    /// 1-18
    Low,
    /// 19-36
    High,
    /// 1 = 1-12, 2 = 13-24, 3 = 25-36
    Dozen(u8),
}

impl RouletteBet {
    fn is_valid(self) -> bool {
        match self {
            Self::Straight(n) => n <= 36,
            Self::Dozen(d) => (1..=3).contains(&d),
            _ => true,
        }
    }

    pub fn wins_on(self, number: u8) -> bool {
        if number == 0 {
            return self == Self::Straight(0);
        }
        match self {
            Self::Straight(n) => n == number,
            Self::Red => is_red(number),
            Self::Black => !is_red(number),
            Self::Odd => number % 2 == 1,
            Self::Even => number % 2 == 0,
            Self::Low => number <= 18,
            Self::High => number >= 19,
            Self::Dozen(d) => (number - 1) / 12 + 1 == d,
        }
    }

    /// Winnings per unit staked
    pub fn odds(self) -> u64 {
        match self {
            Self::Straight(_) => 35,
            Self::Dozen(_) => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for RouletteBet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Straight(n) => write!(f, "{n}"),
            Self::Red => write!(f, "red"),
            Self::Black => write!(f, "black"),
            Self::Odd => write!(f, "odd"),
            Self::Even => write!(f, "even"),
            Self::Low => write!(f, "low"),
            Self::High => write!(f, "high"),
            Self::Dozen(d) => write!(f, "dozen{d}"),
        }
    }
}

impl FromStr for RouletteBet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bet = match s {
            "red" => Self::Red,
            "black" => Self::Black,
            "odd" => Self::Odd,
            "even" => Self::Even,
            "low" => Self::Low,
            "high" => Self::High,
            other => {
                if let Some(d) = other.strip_prefix("dozen") {
                    Self::Dozen(d.parse().map_err(|_| format!("bad dozen '{other}'"))?)
                } else {
                    Self::Straight(
                        other
                            .parse()
                            .map_err(|_| format!("unknown roulette bet '{other}'"))?,
                    )
                }
            }
        };
        if bet.is_valid() {
            Ok(bet)
        } else {
            Err(format!("no such bet '{s}'"))
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct SpinResult {
    pub number: u8,
    /// Each bet with the amount credited for it, stake included
    pub bets: Vec<(RouletteBet, u64, u64)>,
    pub payout: u64,
    pub balance: u64,
}

pub struct RouletteSession {
    ledger: Ledger,
    rng: StdRng,
    phase: RoulettePhase,
    bets: Vec<(RouletteBet, u64)>,
    last: Option<u8>,
}

impl RouletteSession {
    pub fn new(ledger: Ledger, seed: Option<u64>) -> Self {
        Self {
            ledger,
            rng: session_rng(seed),
            phase: RoulettePhase::Betting,
            bets: Vec::new(),
            last: None,
        }
    }

    pub fn state(&self) -> RoulettePhase {
        self.phase
    }

    pub fn last_number(&self) -> Option<u8> {
        self.last
    }

    /// Debit a bet for the next spin
    pub async fn place_bet(&mut self, bet: RouletteBet, amount: u64) -> SessionResult<u64> {
        if !bet.is_valid() {
            return Err(SessionError::BetNotAllowed(bet.to_string()));
        }
        match self.phase {
            RoulettePhase::Betting => {}
            RoulettePhase::Resolved => self.phase = RoulettePhase::Betting,
            RoulettePhase::Spinning => return Err(SessionError::InvalidAction),
        }

        let balance = self.ledger.debit_for(amount, Some(GAME)).await?;
        self.bets.push((bet, amount));
        Ok(balance)
    }

    pub async fn spin(&mut self) -> SessionResult<SpinResult> {
        let number = self.rng.random_range(0..=36);
        self.spin_to(number).await
    }

    /// Resolve the placed bets against a known number
    ///
    /// # Errors
    ///
    /// * `SessionError::NoBets` - nothing placed since the last spin
    /// * `SessionError::InvalidAction` - number above 36
    pub async fn spin_to(&mut self, number: u8) -> SessionResult<SpinResult> {
        if number > 36 {
            return Err(SessionError::InvalidAction);
        }
        if self.phase != RoulettePhase::Betting || self.bets.is_empty() {
            return Err(SessionError::NoBets);
        }

        self.phase = RoulettePhase::Spinning;
        let bets: Vec<(RouletteBet, u64, u64)> = self
            .bets
            .drain(..)
            .map(|(bet, stake)| {
                let credited = if bet.wins_on(number) {
                    winnings(stake, bet.odds(), 1)
                } else {
                    0
                };
                (bet, stake, credited)
            })
            .collect();
        let payout: u64 = bets.iter().map(|&(_, _, credited)| credited).sum();

        self.last = Some(number);
        self.phase = RoulettePhase::Resolved;
        log::debug!("roulette: {} with {} bets pays {}", number, bets.len(), payout);

        let balance = self
            .ledger
            .credit_for(payout, TransactionCause::Payout, Some(GAME))
            .await?;
        Ok(SpinResult {
            number,
            bets,
            payout,
            balance,
        })
    }
}

impl SessionInfo for RouletteSession {
    fn game_id(&self) -> String {
        GAME.to_string()
    }

    fn phase(&self) -> &'static str {
        match self.phase {
            RoulettePhase::Betting => "betting",
            RoulettePhase::Spinning => "spinning",
            RoulettePhase::Resolved => "resolved",
        }
    }

    fn is_idle(&self) -> bool {
        self.bets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::CasinoConfig, ledger::BalanceSnapshot, store::MemoryStore};
    use chrono::Utc;
    use std::sync::Arc;

    fn wheel(balance: u64) -> RouletteSession {
        let opening = BalanceSnapshot {
            balance,
            written_at: Utc::now(),
        };
        let (ledger, worker) =
            Ledger::open(Arc::new(MemoryStore::new()), opening, &CasinoConfig::in_memory());
        tokio::spawn(worker.run());
        RouletteSession::new(ledger, Some(5))
    }

    #[test]
    fn test_bet_coverage() {
        assert!(RouletteBet::Red.wins_on(1));
        assert!(RouletteBet::Black.wins_on(2));
        assert!(RouletteBet::Dozen(3).wins_on(36));
        assert!(RouletteBet::Dozen(1).wins_on(12));
        assert!(!RouletteBet::Dozen(1).wins_on(13));
        assert!(RouletteBet::High.wins_on(19));
        assert!(RouletteBet::Straight(0).wins_on(0));
        for bet in [
            RouletteBet::Red,
            RouletteBet::Black,
            RouletteBet::Odd,
            RouletteBet::Even,
            RouletteBet::Low,
            RouletteBet::High,
            RouletteBet::Dozen(1),
        ] {
            assert!(!bet.wins_on(0), "{bet} should lose on zero");
        }
    }

    #[tokio::test]
    async fn test_straight_pays_thirty_five_to_one() {
        let mut roulette = wheel(100);
        roulette.place_bet(RouletteBet::Straight(17), 10).await.unwrap();
        roulette.place_bet(RouletteBet::Red, 10).await.unwrap();

        let result = roulette.spin_to(17).await.unwrap();
        // 17 is black
        assert_eq!(result.payout, 360);
        assert_eq!(result.balance, 440);
        assert_eq!(roulette.state(), RoulettePhase::Resolved);
        assert!(roulette.is_idle());
    }

    #[tokio::test]
    async fn test_zero_loses_outside_bets() {
        let mut roulette = wheel(100);
        roulette.place_bet(RouletteBet::Even, 10).await.unwrap();
        roulette.place_bet(RouletteBet::Dozen(1), 10).await.unwrap();

        let result = roulette.spin_to(0).await.unwrap();
        assert_eq!(result.payout, 0);
        assert_eq!(result.balance, 80);
    }

    #[tokio::test]
    async fn test_spin_needs_bets() {
        let mut roulette = wheel(100);
        assert_eq!(roulette.spin().await.unwrap_err(), SessionError::NoBets);

        roulette.place_bet(RouletteBet::Dozen(2), 10).await.unwrap();
        let result = roulette.spin_to(13).await.unwrap();
        assert_eq!(result.payout, 30);
        assert_eq!(roulette.spin_to(13).await.unwrap_err(), SessionError::NoBets);
    }

    #[test]
    fn test_bet_parsing() {
        assert_eq!("red".parse::<RouletteBet>(), Ok(RouletteBet::Red));
        assert_eq!("dozen2".parse::<RouletteBet>(), Ok(RouletteBet::Dozen(2)));
        assert_eq!("0".parse::<RouletteBet>(), Ok(RouletteBet::Straight(0)));
        assert!("37".parse::<RouletteBet>().is_err());
        assert!("dozen4".parse::<RouletteBet>().is_err());
        assert!("green".parse::<RouletteBet>().is_err());
    }
}
