//! Slot machine session.
//!
//! `Idle → Wagering → Drawing → Evaluating → Settled → Idle`. The variant
//! supplies everything game specific; this module only sequences the round and
//! runs the bonus events, draw multipliers and assists of variants that enable
//! them.

use super::{SessionError, SessionInfo, SessionResult, session_rng};
use crate::{
    engine::{
        ActiveModifier, AssistRules, BonusRules, Cell, Expiry, Grid, ModifierChain,
        ModifierEffect, ModifierStage, SlotVariant, SpinOutcome, draw, draw_repeating,
    },
    ledger::{Ledger, TransactionCause},
};
use rand::{Rng, rngs::StdRng, seq::index};
use serde::Serialize;
use std::{fmt, str::FromStr, sync::Arc};

/// Source names of the bonus modifiers
pub mod sources {
    pub const VIRUS_GLITCH: &str = "virus_glitch";
    pub const KEY_GLITCH: &str = "key_glitch";
    pub const MULTIPLIER_GLITCH: &str = "multiplier_glitch";
    pub const VIRUS: &str = "virus";
    pub const MEMORY_LEAK: &str = "memory_leak";
    pub const KERNEL_PANIC: &str = "kernel_panic";
    pub const OVERCLOCK: &str = "overclock";
    pub const FIREWALL: &str = "firewall";
    pub const STEALTH_MODE: &str = "stealth_mode";
    pub const BACKDOOR: &str = "backdoor";
    pub const REPEAT_ASSIST: &str = "repeat_assist";
    pub const EXTRA_ATTEMPTS: &str = "extra_attempts";
    pub const GUARANTEED_WIN: &str = "guaranteed_win";
}

const BACKDOOR_FREE_SPINS: u32 = 5;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum SlotPhase {
    Idle,
    Wagering,
    Drawing,
    Evaluating,
    Settled,
}

impl SlotPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Wagering => "wagering",
            Self::Drawing => "drawing",
            Self::Evaluating => "evaluating",
            Self::Settled => "settled",
        }
    }
}

impl fmt::Display for SlotPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Assist a player has opted into; only variants with assist rules accept one
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub enum Assist {
    #[default]
    Off,
    /// Cells tend to repeat their neighbour, at a reduced payout
    Repeat,
    /// Free spins after a losing streak
    Retry,
    /// A forced win after a longer losing streak
    Guarantee,
}

impl Assist {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Repeat => "repeat",
            Self::Retry => "retry",
            Self::Guarantee => "guarantee",
        }
    }
}

impl fmt::Display for Assist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Assist {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(Self::Off),
            "repeat" => Ok(Self::Repeat),
            "retry" => Ok(Self::Retry),
            "guarantee" => Ok(Self::Guarantee),
            other => Err(format!("unknown assist '{other}'")),
        }
    }
}

/// A draw multiplier that hit
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Boost {
    pub source: String,
    pub factor: f64,
}

/// Everything that happened during one spin
#[derive(Clone, Debug, Serialize)]
pub struct SpinReport {
    /// Grid as evaluated, glitched and frozen cells voided
    pub grid: Grid,
    pub outcome: SpinOutcome,
    pub wager: u64,
    /// True when the spin used a free spin instead of a debit
    pub free_spin: bool,
    pub glitched: Vec<Cell>,
    /// Draw multipliers applied to this spin
    pub boosts: Vec<Boost>,
    /// Bonus events triggered at the end of the spin
    pub triggered: Vec<&'static str>,
    pub balance: u64,
}

impl SpinReport {
    /// Credits won minus credits staked
    pub fn net(&self) -> i64 {
        let staked = if self.free_spin { 0 } else { self.wager };
        i64::try_from(self.outcome.payout)
            .unwrap_or(i64::MAX)
            .saturating_sub(i64::try_from(staked).unwrap_or(i64::MAX))
    }
}

pub struct SlotSession {
    variant: Arc<SlotVariant>,
    ledger: Ledger,
    rng: StdRng,
    phase: SlotPhase,
    modifiers: ModifierChain,
    free_spins: u32,
    /// Cells voided while a kernel panic is active
    frozen: Vec<Cell>,
    assist: Assist,
    /// Consecutive settled spins without a payout
    losses: u32,
    /// The next fresh draw is forced to win
    guaranteed: bool,
}

struct Resolved {
    grid: Grid,
    outcome: SpinOutcome,
    glitched: Vec<Cell>,
    boosts: Vec<Boost>,
}

impl SlotSession {
    pub fn new(variant: Arc<SlotVariant>, ledger: Ledger, seed: Option<u64>) -> Self {
        Self {
            variant,
            ledger,
            rng: session_rng(seed),
            phase: SlotPhase::Idle,
            modifiers: ModifierChain::new(),
            free_spins: 0,
            frozen: Vec::new(),
            assist: Assist::Off,
            losses: 0,
            guaranteed: false,
        }
    }

    pub fn variant(&self) -> &SlotVariant {
        &self.variant
    }

    pub fn modifiers(&self) -> &ModifierChain {
        &self.modifiers
    }

    pub fn free_spins(&self) -> u32 {
        self.free_spins
    }

    /// Activate a modifier outside the bonus events, e.g. a purchased boost
    pub fn activate(&mut self, modifier: ActiveModifier) -> SessionResult<()> {
        self.modifiers.activate(modifier)?;
        Ok(())
    }

    pub fn assist(&self) -> Assist {
        self.assist
    }

    pub fn losses(&self) -> u32 {
        self.losses
    }

    /// True when the next fresh draw is forced to win
    pub fn win_guaranteed(&self) -> bool {
        self.guaranteed
    }

    /// Opt into an assist, resetting the losing streak
    ///
    /// # Errors
    ///
    /// * `SessionError::InvalidAction` - mid-spin, or the variant offers no assists
    pub fn set_assist(&mut self, assist: Assist) -> SessionResult<()> {
        if self.phase != SlotPhase::Idle
            || (assist != Assist::Off && self.variant.assists().is_none())
        {
            return Err(SessionError::InvalidAction);
        }
        self.assist = assist;
        self.losses = 0;
        self.guaranteed = false;
        Ok(())
    }

    fn assist_rules(&self) -> Option<AssistRules> {
        self.variant.assists().copied()
    }

    /// Grant free spins; they are used before any debit
    pub fn grant_free_spins(&mut self, count: u32) {
        self.free_spins = self.free_spins.saturating_add(count);
    }

    /// Spin with a freshly drawn grid, shaped by the active assist
    pub async fn spin(&mut self, wager: u64) -> SessionResult<SpinReport> {
        let variant = Arc::clone(&self.variant);
        let rules = self.assist_rules();
        let repeat = rules.filter(|_| self.assist == Assist::Repeat);
        let forced = rules.filter(|_| self.guaranteed);

        self.play(wager, move |rng| {
            let (table, reels, rows) = (variant.paytable(), variant.reels(), variant.rows());
            let grid = match repeat {
                Some(rules) => draw_repeating(table, reels, rows, rules.repeat_chance, rng)?,
                None => draw(table, reels, rows, rng)?,
            };
            let Some(rules) = forced else {
                return Ok(grid);
            };
            let pick = rng.random_range(0..rules.guarantee_symbols);
            Ok(match table.entries().get(pick) {
                Some(entry) => grid.with_row(rows / 2, entry.symbol),
                None => grid,
            })
        })
        .await
    }

    /// Spin on a predetermined grid, e.g. replaying a recorded draw
    pub async fn spin_grid(&mut self, wager: u64, grid: Grid) -> SessionResult<SpinReport> {
        if grid.reels() != self.variant.reels() || grid.rows() != self.variant.rows() {
            return Err(crate::engine::EngineError::InvalidGrid {
                reels: grid.reels(),
                rows: grid.rows(),
            }
            .into());
        }
        self.play(wager, move |_| Ok(grid)).await
    }

    async fn play<F>(&mut self, wager: u64, produce: F) -> SessionResult<SpinReport>
    where
        F: FnOnce(&mut StdRng) -> crate::engine::EngineResult<Grid>,
    {
        if self.phase != SlotPhase::Idle {
            return Err(SessionError::InvalidAction);
        }

        let played = self.play_round(wager, produce).await;
        if played.is_err() {
            // Draw-scoped effects end with the draw, paid out or not.
            self.modifiers.clear_draw();
        }
        self.phase = SlotPhase::Idle;
        played
    }

    async fn play_round<F>(&mut self, wager: u64, produce: F) -> SessionResult<SpinReport>
    where
        F: FnOnce(&mut StdRng) -> crate::engine::EngineResult<Grid>,
    {
        let game = self.game_id();
        self.phase = SlotPhase::Wagering;
        let free_spin = self.free_spins > 0;
        if free_spin {
            self.free_spins -= 1;
        } else {
            self.ledger.debit_for(wager, Some(&game)).await?;
        }

        let resolved = match self.resolve(wager, produce) {
            Ok(resolved) => resolved,
            Err(err) => {
                if free_spin {
                    self.free_spins += 1;
                } else {
                    self.ledger
                        .credit_for(wager, TransactionCause::Refund, Some(&game))
                        .await?;
                }
                return Err(err);
            }
        };

        let Resolved {
            grid,
            outcome,
            glitched,
            boosts,
        } = resolved;

        self.phase = SlotPhase::Settled;
        let balance = if outcome.payout > 0 {
            self.ledger
                .credit_for(outcome.payout, TransactionCause::Payout, Some(&game))
                .await?
        } else {
            self.ledger.balance().await
        };

        self.modifiers.tick();
        if !self.modifiers.is_active(sources::KERNEL_PANIC) {
            self.frozen.clear();
        }
        let mut triggered = self.roll_triggers();
        triggered.extend(self.record_streak(outcome.payout > 0, free_spin));

        log::debug!(
            "{}: wager {} base {} payout {} ({} wins)",
            game,
            wager,
            outcome.base,
            outcome.payout,
            outcome.wins.len()
        );

        Ok(SpinReport {
            grid,
            outcome,
            wager,
            free_spin,
            glitched,
            boosts,
            triggered,
            balance,
        })
    }

    fn resolve<F>(&mut self, wager: u64, produce: F) -> SessionResult<Resolved>
    where
        F: FnOnce(&mut StdRng) -> crate::engine::EngineResult<Grid>,
    {
        self.phase = SlotPhase::Drawing;
        let drawn = produce(&mut self.rng)?;
        let glitched = self.roll_glitches()?;
        let boosts = self.roll_boosts()?;
        self.apply_assist()?;

        let mut voided = glitched.clone();
        voided.extend_from_slice(&self.frozen);
        let grid = drawn.masked(&voided);

        self.phase = SlotPhase::Evaluating;
        let outcome = self.variant.settle(&grid, wager, self.modifiers.active())?;
        Ok(Resolved {
            grid,
            outcome,
            glitched,
            boosts,
        })
    }

    /// Roll each draw multiplier of the variant
    fn roll_boosts(&mut self) -> SessionResult<Vec<Boost>> {
        let variant = Arc::clone(&self.variant);
        let mut boosts = Vec::new();

        for multiplier in variant.multipliers() {
            if self.rng.random::<f64>() >= multiplier.chance {
                continue;
            }
            let factor = multiplier.pick(self.rng.random::<f64>());
            self.modifiers.activate(ActiveModifier::new(
                &multiplier.name,
                ModifierStage::SpecialMode,
                ModifierEffect::Multiplicative(factor),
                Expiry::ThisDraw,
            ))?;
            boosts.push(Boost {
                source: multiplier.name.clone(),
                factor,
            });
        }
        Ok(boosts)
    }

    /// Payout factors of the active assist for this draw
    fn apply_assist(&mut self) -> SessionResult<()> {
        let Some(rules) = self.assist_rules() else {
            return Ok(());
        };
        let factor = if self.guaranteed {
            Some((sources::GUARANTEED_WIN, rules.guarantee_payout))
        } else if self.assist == Assist::Repeat {
            Some((sources::REPEAT_ASSIST, rules.repeat_payout))
        } else {
            None
        };

        if let Some((source, factor)) = factor {
            self.modifiers.activate(ActiveModifier::new(
                source,
                ModifierStage::SpecialMode,
                ModifierEffect::Multiplicative(factor),
                Expiry::ThisDraw,
            ))?;
        }
        Ok(())
    }

    /// Track the losing streak of paid spins and grant what the active assist earns
    fn record_streak(&mut self, won: bool, free_spin: bool) -> Option<&'static str> {
        let rules = self.assist_rules()?;
        if won {
            self.losses = 0;
            self.guaranteed = false;
            return None;
        }
        if free_spin {
            return None;
        }
        self.losses = self.losses.saturating_add(1);

        let earned = match self.assist {
            Assist::Retry if self.losses >= rules.retry_after && self.free_spins == 0 => {
                self.grant_free_spins(rules.retry_spins);
                self.losses = 0;
                Some(sources::EXTRA_ATTEMPTS)
            }
            Assist::Guarantee if self.losses >= rules.guarantee_after && !self.guaranteed => {
                self.guaranteed = true;
                Some(sources::GUARANTEED_WIN)
            }
            _ => None,
        };
        if let Some(source) = earned {
            log::info!("{}: {} earned", self.game_id(), source);
        }
        earned
    }

    fn bonuses(&self) -> Option<BonusRules> {
        self.variant.bonuses().copied()
    }

    fn random_cells(&mut self, count: usize) -> Vec<Cell> {
        let rows = self.variant.rows();
        let total = self.variant.reels() * rows;
        index::sample(&mut self.rng, total, count.min(total))
            .into_iter()
            .map(|i| Cell::new(i / rows, i % rows))
            .collect()
    }

    /// Glitch 1-3 cells and queue their one-draw effects
    fn roll_glitches(&mut self) -> SessionResult<Vec<Cell>> {
        let Some(bonuses) = self.bonuses() else {
            return Ok(Vec::new());
        };
        if self.modifiers.is_active(sources::FIREWALL)
            || self.rng.random::<f64>() >= bonuses.glitch_chance
        {
            return Ok(Vec::new());
        }

        let count = self.rng.random_range(1..=3);
        let cells = self.random_cells(count);
        for &cell in &cells {
            match self.rng.random_range(0..4) {
                0 => {
                    self.modifiers.activate(ActiveModifier::glitch(
                        sources::VIRUS_GLITCH,
                        ModifierEffect::Additive(-20),
                        cell,
                    ))?;
                    self.modifiers.activate(ActiveModifier::glitch(
                        sources::VIRUS_GLITCH,
                        ModifierEffect::FloorAtZero,
                        cell,
                    ))?;
                }
                1 => self.modifiers.activate(ActiveModifier::glitch(
                    sources::KEY_GLITCH,
                    ModifierEffect::Additive(50),
                    cell,
                ))?,
                2 => self.modifiers.activate(ActiveModifier::glitch(
                    sources::MULTIPLIER_GLITCH,
                    ModifierEffect::Multiplicative(2.0),
                    cell,
                ))?,
                // Refresh glitch: the cell is voided, the payout untouched.
                _ => {}
            }
        }
        Ok(cells)
    }

    /// Debuffs, power-ups and hidden modes, effective from the next spin
    fn roll_triggers(&mut self) -> Vec<&'static str> {
        let Some(bonuses) = self.bonuses() else {
            return Vec::new();
        };
        let mut triggered = Vec::new();

        if !self.modifiers.has_stage(ModifierStage::Debuff)
            && self.rng.random::<f64>() < bonuses.debuff_chance
        {
            let source = match self.rng.random_range(0..3) {
                0 => {
                    self.push(
                        sources::VIRUS,
                        ModifierStage::Debuff,
                        ModifierEffect::Multiplicative(0.5),
                        3,
                    );
                    sources::VIRUS
                }
                1 => {
                    self.push(
                        sources::MEMORY_LEAK,
                        ModifierStage::Debuff,
                        ModifierEffect::Additive(-5),
                        4,
                    );
                    sources::MEMORY_LEAK
                }
                _ => {
                    let count = self.rng.random_range(2..=4);
                    self.frozen = self.random_cells(count);
                    self.push(
                        sources::KERNEL_PANIC,
                        ModifierStage::Debuff,
                        ModifierEffect::Multiplicative(1.0),
                        2,
                    );
                    sources::KERNEL_PANIC
                }
            };
            triggered.push(source);
        }

        if !self.modifiers.has_stage(ModifierStage::PowerUp)
            && self.rng.random::<f64>() < bonuses.power_up_chance
        {
            let source = if self.rng.random_bool(0.5) {
                self.push(
                    sources::OVERCLOCK,
                    ModifierStage::PowerUp,
                    ModifierEffect::Multiplicative(3.0),
                    3,
                );
                sources::OVERCLOCK
            } else {
                self.push(
                    sources::FIREWALL,
                    ModifierStage::PowerUp,
                    ModifierEffect::Multiplicative(1.0),
                    5,
                );
                sources::FIREWALL
            };
            triggered.push(source);
        }

        if !self.modifiers.has_stage(ModifierStage::SpecialMode)
            && self.free_spins == 0
            && self.rng.random::<f64>() < bonuses.hidden_mode_chance
        {
            let source = if self.rng.random_bool(0.5) {
                self.push(
                    sources::STEALTH_MODE,
                    ModifierStage::SpecialMode,
                    ModifierEffect::Multiplicative(5.0),
                    1,
                );
                sources::STEALTH_MODE
            } else {
                self.grant_free_spins(BACKDOOR_FREE_SPINS);
                self.push(
                    sources::BACKDOOR,
                    ModifierStage::SpecialMode,
                    ModifierEffect::Multiplicative(1.5),
                    BACKDOOR_FREE_SPINS,
                );
                sources::BACKDOOR
            };
            triggered.push(source);
        }

        for source in &triggered {
            log::info!("{}: {} activated", self.game_id(), source);
        }
        triggered
    }

    fn push(&mut self, source: &str, stage: ModifierStage, effect: ModifierEffect, spins: u32) {
        let modifier = ActiveModifier::new(source, stage, effect, Expiry::Spins(spins));
        if let Err(err) = self.modifiers.activate(modifier) {
            log::warn!("{}: could not activate {}: {}", self.game_id(), source, err);
        }
    }
}

impl SessionInfo for SlotSession {
    fn game_id(&self) -> String {
        format!("slots/{}", self.variant.name())
    }

    fn phase(&self) -> &'static str {
        self.phase.as_str()
    }

    fn is_idle(&self) -> bool {
        self.phase == SlotPhase::Idle
    }
}
