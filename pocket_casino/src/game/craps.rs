//! Craps table with line, field, proposition, hardway and place bets.

use super::{SessionError, SessionInfo, SessionResult, session_rng, winnings};
use crate::ledger::{Ledger, TransactionCause};
use rand::{Rng, rngs::StdRng};
use serde::Serialize;
use std::{collections::BTreeMap, fmt, str::FromStr};

const GAME: &str = "craps";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum CrapsPhase {
    ComeOut,
    Point(u8),
}

impl CrapsPhase {
    pub fn point(self) -> Option<u8> {
        match self {
            Self::ComeOut => None,
            Self::Point(point) => Some(point),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum CrapsBet {
    Pass,
    DontPass,
    /// One roll: 2, 3, 4, 9, 10, 11, 12
    Field,
    /// One roll: any seven
    AnySeven,
    /// 4, 6, 8 or 10 rolled as a pair before the easy way
    Hard(u8),
    /// 4, 5, 6, 8, 9 or 10 while a point is on; any seven loses it
    Place(u8),
}

impl CrapsBet {
    fn is_valid(self) -> bool {
        match self {
            Self::Hard(n) => matches!(n, 4 | 6 | 8 | 10),
            Self::Place(n) => matches!(n, 4 | 5 | 6 | 8 | 9 | 10),
            _ => true,
        }
    }

    /// Winnings ratio as (numerator, denominator)
    fn odds(self, total: u8) -> (u64, u64) {
        match self {
            Self::Pass | Self::DontPass => (1, 1),
            Self::Field if total == 2 || total == 12 => (2, 1),
            Self::Field => (1, 1),
            Self::AnySeven => (4, 1),
            Self::Hard(4 | 10) => (7, 1),
            Self::Hard(_) => (9, 1),
            Self::Place(4 | 10) => (9, 5),
            Self::Place(5 | 9) => (7, 5),
            Self::Place(_) => (29, 25),
        }
    }
}

impl fmt::Display for CrapsBet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "pass"),
            Self::DontPass => write!(f, "dont_pass"),
            Self::Field => write!(f, "field"),
            Self::AnySeven => write!(f, "any7"),
            Self::Hard(n) => write!(f, "hard{n}"),
            Self::Place(n) => write!(f, "place{n}"),
        }
    }
}

impl FromStr for CrapsBet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bet = match s {
            "pass" => Self::Pass,
            "dont_pass" | "dontpass" => Self::DontPass,
            "field" => Self::Field,
            "any7" | "any_seven" => Self::AnySeven,
            other => {
                let number = |prefix: &str| {
                    other
                        .strip_prefix(prefix)
                        .and_then(|n| n.parse::<u8>().ok())
                };
                if let Some(n) = number("hard") {
                    Self::Hard(n)
                } else if let Some(n) = number("place") {
                    Self::Place(n)
                } else {
                    return Err(format!("unknown craps bet '{other}'"));
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

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum BetResult {
    /// Credited amount, stake included
    Win(u64),
    Lose,
    Push,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Settlement {
    pub bet: CrapsBet,
    pub stake: u64,
    pub result: BetResult,
}

#[derive(Clone, Debug, Serialize)]
pub struct RollOutcome {
    pub dice: (u8, u8),
    pub total: u8,
    /// Bets resolved by this roll; unresolved bets stay on the table
    pub settlements: Vec<Settlement>,
    pub phase: CrapsPhase,
    pub balance: u64,
}

pub struct CrapsSession {
    ledger: Ledger,
    rng: StdRng,
    phase: CrapsPhase,
    bets: BTreeMap<CrapsBet, u64>,
}

impl CrapsSession {
    pub fn new(ledger: Ledger, seed: Option<u64>) -> Self {
        Self {
            ledger,
            rng: session_rng(seed),
            phase: CrapsPhase::ComeOut,
            bets: BTreeMap::new(),
        }
    }

    pub fn state(&self) -> CrapsPhase {
        self.phase
    }

    pub fn bets(&self) -> &BTreeMap<CrapsBet, u64> {
        &self.bets
    }

    /// Debit `amount` and add it to the bet
    ///
    /// # Errors
    ///
    /// * `SessionError::BetNotAllowed` - unknown number, or a line bet while a point is on
    /// * `SessionError::Ledger` - the stake could not be debited
    pub async fn place_bet(&mut self, bet: CrapsBet, amount: u64) -> SessionResult<u64> {
        let line_bet = matches!(bet, CrapsBet::Pass | CrapsBet::DontPass);
        if !bet.is_valid() || (line_bet && self.phase != CrapsPhase::ComeOut) {
            return Err(SessionError::BetNotAllowed(bet.to_string()));
        }

        let balance = self.ledger.debit_for(amount, Some(GAME)).await?;
        *self.bets.entry(bet).or_default() += amount;
        Ok(balance)
    }

    /// Take a bet down and refund its stake
    ///
    /// # Errors
    ///
    /// * `SessionError::NoBets` - nothing is riding on `bet`
    /// * `SessionError::Ledger` - the refund could not be credited; the bet stays up
    pub async fn remove_bet(&mut self, bet: CrapsBet) -> SessionResult<u64> {
        let Some(&stake) = self.bets.get(&bet) else {
            return Err(SessionError::NoBets);
        };

        let balance = self
            .ledger
            .credit_for(stake, TransactionCause::Refund, Some(GAME))
            .await?;
        self.bets.remove(&bet);
        log::debug!("craps: took down {} ({})", bet, stake);
        Ok(balance)
    }

    /// Roll two dice and settle
    pub async fn roll(&mut self) -> SessionResult<RollOutcome> {
        let d1 = self.rng.random_range(1..=6);
        let d2 = self.rng.random_range(1..=6);
        self.roll_with(d1, d2).await
    }

    /// Settle a known roll
    ///
    /// # Errors
    ///
    /// * `SessionError::InvalidAction` - a die outside 1..=6
    pub async fn roll_with(&mut self, d1: u8, d2: u8) -> SessionResult<RollOutcome> {
        if !(1..=6).contains(&d1) || !(1..=6).contains(&d2) {
            return Err(SessionError::InvalidAction);
        }
        let total = d1 + d2;
        let hard = d1 == d2;

        let mut settlements = Vec::new();
        for (&bet, &stake) in &self.bets {
            let result = match resolve(bet, self.phase, total, hard) {
                Some(Outcome::Win) => {
                    let (numerator, denominator) = bet.odds(total);
                    BetResult::Win(winnings(stake, numerator, denominator))
                }
                Some(Outcome::Lose) => BetResult::Lose,
                Some(Outcome::Push) => BetResult::Push,
                None => continue,
            };
            settlements.push(Settlement { bet, stake, result });
        }
        for settlement in &settlements {
            self.bets.remove(&settlement.bet);
        }

        self.phase = match self.phase {
            CrapsPhase::ComeOut if matches!(total, 4 | 5 | 6 | 8 | 9 | 10) => {
                CrapsPhase::Point(total)
            }
            CrapsPhase::Point(point) if total == point || total == 7 => CrapsPhase::ComeOut,
            unchanged => unchanged,
        };

        let (won, pushed) = settlements
            .iter()
            .fold((0u64, 0u64), |(won, pushed), s| match s.result {
                BetResult::Win(amount) => (won.saturating_add(amount), pushed),
                BetResult::Push => (won, pushed.saturating_add(s.stake)),
                BetResult::Lose => (won, pushed),
            });

        self.ledger
            .credit_for(won, TransactionCause::Payout, Some(GAME))
            .await?;
        let balance = self
            .ledger
            .credit_for(pushed, TransactionCause::Refund, Some(GAME))
            .await?;

        log::debug!(
            "craps: rolled {}+{}={}, {} settled, point {:?}",
            d1,
            d2,
            total,
            settlements.len(),
            self.phase.point()
        );

        Ok(RollOutcome {
            dice: (d1, d2),
            total,
            settlements,
            phase: self.phase,
            balance,
        })
    }
}

enum Outcome {
    Win,
    Lose,
    Push,
}

/// How a bet fares on a roll; `None` leaves it working
fn resolve(bet: CrapsBet, phase: CrapsPhase, total: u8, hard: bool) -> Option<Outcome> {
    use Outcome::{Lose, Push, Win};

    match (bet, phase) {
        (CrapsBet::Pass, CrapsPhase::ComeOut) => match total {
            7 | 11 => Some(Win),
            2 | 3 | 12 => Some(Lose),
            _ => None,
        },
        (CrapsBet::Pass, CrapsPhase::Point(point)) => match total {
            t if t == point => Some(Win),
            7 => Some(Lose),
            _ => None,
        },
        (CrapsBet::DontPass, CrapsPhase::ComeOut) => match total {
            7 | 11 => Some(Lose),
            2 | 3 => Some(Win),
            12 => Some(Push),
            _ => None,
        },
        (CrapsBet::DontPass, CrapsPhase::Point(point)) => match total {
            t if t == point => Some(Lose),
            7 => Some(Win),
            _ => None,
        },
        (CrapsBet::Field, _) => match total {
            2 | 3 | 4 | 9 | 10 | 11 | 12 => Some(Win),
            _ => Some(Lose),
        },
        (CrapsBet::AnySeven, _) => Some(if total == 7 { Win } else { Lose }),
        (CrapsBet::Hard(n), _) if total == n => Some(if hard { Win } else { Lose }),
        (CrapsBet::Hard(_), _) => None,
        // Off on the come-out, except that a seven still takes them.
        (CrapsBet::Place(_), CrapsPhase::ComeOut) => (total == 7).then_some(Lose),
        (CrapsBet::Place(n), CrapsPhase::Point(_)) => match total {
            t if t == n => Some(Win),
            7 => Some(Lose),
            _ => None,
        },
    }
}

impl SessionInfo for CrapsSession {
    fn game_id(&self) -> String {
        GAME.to_string()
    }

    fn phase(&self) -> &'static str {
        match self.phase {
            CrapsPhase::ComeOut => "come_out",
            CrapsPhase::Point(_) => "point",
        }
    }

    fn is_idle(&self) -> bool {
        self.bets.is_empty()
    }
}
