//! Payout calculation: tiered line payouts followed by an ordered modifier chain.
//!
//! The base amount of a match is `wager * symbol value * tier(run length)`,
//! floored per line when the tier is a fraction, summed across all matches. Active modifiers are then applied stage by stage
//! in a fixed order:
//!
//! 1. [`ModifierStage::Glitch`]: effects tied to cells of this draw
//! 2. [`ModifierStage::PowerUp`]: multiplicative boosts
//! 3. [`ModifierStage::Debuff`]: reductions
//! 4. [`ModifierStage::SpecialMode`]: whole-draw multipliers
//!
//! Within a stage, effects apply in activation order. Multiplications are
//! floored to whole credits and the final amount is clamped at zero.

use super::{
    errors::{EngineError, EngineResult},
    evaluator::MatchResult,
    generator::Cell,
    paytable::SymbolId,
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// One step of a tier table: runs of at least `min_run` pay `multiplier / divisor`
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TierStep {
    pub min_run: usize,
    pub multiplier: u64,
    #[serde(default = "whole", skip_serializing_if = "is_whole")]
    pub divisor: u64,
}

fn whole() -> u64 {
    1
}

fn is_whole(divisor: &u64) -> bool {
    *divisor == 1
}

impl TierStep {
    fn amount(&self, unit: u64) -> u64 {
        unit.saturating_mul(self.multiplier) / self.divisor
    }
}

/// Step function from run length to multiplier
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(try_from = "Vec<TierStep>", into = "Vec<TierStep>")]
pub struct TierTable {
    /// Sorted by `min_run`, strictly increasing
    steps: Vec<TierStep>,
}

impl TierTable {
    /// Build from `(min_run, multiplier)` pairs in any order
    ///
    /// # Errors
    ///
    /// * `EngineError::InvalidPayoutRule` - empty table, a zero run length or a
    ///   run length listed twice
    pub fn new(steps: &[(usize, u64)]) -> EngineResult<Self> {
        let steps: Vec<_> = steps.iter().map(|&(run, mul)| (run, mul, 1)).collect();
        Self::fractional(&steps)
    }

    /// Build from `(min_run, multiplier, divisor)` triples, e.g. half value for
    /// three of four
    pub fn fractional(steps: &[(usize, u64, u64)]) -> EngineResult<Self> {
        Self::try_from(
            steps
                .iter()
                .map(|&(min_run, multiplier, divisor)| TierStep {
                    min_run,
                    multiplier,
                    divisor,
                })
                .collect::<Vec<_>>(),
        )
    }

    /// 3 → 1×, 4 → 5×, 5 → 10×
    pub fn standard() -> Self {
        Self {
            steps: vec![
                TierStep {
                    min_run: 3,
                    multiplier: 1,
                    divisor: 1,
                },
                TierStep {
                    min_run: 4,
                    multiplier: 5,
                    divisor: 1,
                },
                TierStep {
                    min_run: 5,
                    multiplier: 10,
                    divisor: 1,
                },
            ],
        }
    }

    /// Same multiplier for any match
    pub fn flat(multiplier: u64) -> Self {
        Self {
            steps: vec![TierStep {
                min_run: 1,
                multiplier,
                divisor: 1,
            }],
        }
    }

    fn step(&self, run_length: usize) -> Option<&TierStep> {
        self.steps.iter().rev().find(|step| step.min_run <= run_length)
    }

    /// Multiplier for a run, before any divisor; zero below the first step
    pub fn multiplier(&self, run_length: usize) -> u64 {
        self.step(run_length).map_or(0, |step| step.multiplier)
    }

    /// `unit` scaled by the step for a run, floored
    pub fn amount(&self, run_length: usize, unit: u64) -> u64 {
        self.step(run_length).map_or(0, |step| step.amount(unit))
    }

    pub fn steps(&self) -> &[TierStep] {
        &self.steps
    }
}

impl TryFrom<Vec<TierStep>> for TierTable {
    type Error = EngineError;

    fn try_from(mut steps: Vec<TierStep>) -> Result<Self, Self::Error> {
        if steps.is_empty() {
            return Err(EngineError::InvalidPayoutRule(
                "tier table has no steps".to_string(),
            ));
        }
        steps.sort_by_key(|step| step.min_run);

        if steps.first().is_some_and(|step| step.min_run == 0) {
            return Err(EngineError::InvalidPayoutRule(
                "tier run length must be at least 1".to_string(),
            ));
        }
        if steps.iter().any(|step| step.divisor == 0) {
            return Err(EngineError::InvalidPayoutRule(
                "tier divisor must be at least 1".to_string(),
            ));
        }
        if steps.windows(2).any(|w| w[0].min_run == w[1].min_run) {
            return Err(EngineError::InvalidPayoutRule(
                "tier run length listed twice".to_string(),
            ));
        }

        Ok(Self { steps })
    }
}

impl From<TierTable> for Vec<TierStep> {
    fn from(table: TierTable) -> Self {
        table.steps
    }
}

impl fmt::Display for TierTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let steps: Vec<String> = self
            .steps
            .iter()
            .map(|s| match s.divisor {
                1 => format!("{}→{}x", s.min_run, s.multiplier),
                d => format!("{}→{}/{}x", s.min_run, s.multiplier, d),
            })
            .collect();
        write!(f, "{}", steps.join(" "))
    }
}

/// Tier table for a line set, with optional per-line replacements
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TierSchedule {
    pub default: TierTable,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub overrides: BTreeMap<u32, TierTable>,
}

impl TierSchedule {
    pub fn uniform(table: TierTable) -> Self {
        Self {
            default: table,
            overrides: BTreeMap::new(),
        }
    }

    pub fn with_override(mut self, line_id: u32, table: TierTable) -> Self {
        self.overrides.insert(line_id, table);
        self
    }

    fn table(&self, line_id: u32) -> &TierTable {
        self.overrides.get(&line_id).unwrap_or(&self.default)
    }

    pub fn multiplier(&self, line_id: u32, run_length: usize) -> u64 {
        self.table(line_id).multiplier(run_length)
    }

    pub fn amount(&self, line_id: u32, run_length: usize, unit: u64) -> u64 {
        self.table(line_id).amount(run_length, unit)
    }
}

/// What a modifier does to the running amount
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ModifierEffect {
    /// Multiply, then floor to whole credits
    Multiplicative(f64),
    /// Add (or subtract) a flat amount
    Additive(i64),
    /// Raise a negative running amount to zero
    FloorAtZero,
}

impl ModifierEffect {
    fn apply(self, amount: i128) -> i128 {
        match self {
            ModifierEffect::Multiplicative(factor) => (amount as f64 * factor).floor() as i128,
            ModifierEffect::Additive(delta) => amount + i128::from(delta),
            ModifierEffect::FloorAtZero => amount.max(0),
        }
    }

    fn validate(self) -> EngineResult<()> {
        match self {
            ModifierEffect::Multiplicative(factor) if !factor.is_finite() || factor < 0.0 => Err(
                EngineError::InvalidPayoutRule(format!("multiplier {factor} is not usable")),
            ),
            _ => Ok(()),
        }
    }
}

/// Application stage; declaration order is application order
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifierStage {
    Glitch,
    PowerUp,
    Debuff,
    SpecialMode,
}

impl ModifierStage {
    pub const ORDER: [ModifierStage; 4] = [
        ModifierStage::Glitch,
        ModifierStage::PowerUp,
        ModifierStage::Debuff,
        ModifierStage::SpecialMode,
    ];
}

/// When a modifier stops applying
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Expiry {
    /// Applies to this many more settled spins
    Spins(u32),
    /// Applies to the current draw only
    ThisDraw,
}

/// A modifier currently in effect
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ActiveModifier {
    /// Name of what activated it; re-activating the same source refreshes it
    pub source: String,
    pub stage: ModifierStage,
    pub effect: ModifierEffect,
    pub expiry: Expiry,
    /// Grid cell a glitch is tied to
    pub cell: Option<Cell>,
}

impl ActiveModifier {
    pub fn new(source: &str, stage: ModifierStage, effect: ModifierEffect, expiry: Expiry) -> Self {
        Self {
            source: source.to_string(),
            stage,
            effect,
            expiry,
            cell: None,
        }
    }

    /// One-draw effect tied to a glitched cell
    pub fn glitch(source: &str, effect: ModifierEffect, cell: Cell) -> Self {
        Self {
            cell: Some(cell),
            ..Self::new(source, ModifierStage::Glitch, effect, Expiry::ThisDraw)
        }
    }
}

/// Ordered list of active modifiers owned by one game session
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModifierChain {
    active: Vec<ActiveModifier>,
}

impl ModifierChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a modifier, or refresh the expiry of one from the same source
    ///
    /// Draw-scoped modifiers always stack: one glitched cell is one effect.
    ///
    /// # Errors
    ///
    /// * `EngineError::InvalidPayoutRule` - negative or non-finite multiplier
    pub fn activate(&mut self, modifier: ActiveModifier) -> EngineResult<()> {
        modifier.effect.validate()?;

        if modifier.expiry != Expiry::ThisDraw {
            let existing = self
                .active
                .iter_mut()
                .find(|m| m.source == modifier.source && m.expiry != Expiry::ThisDraw);
            if let Some(existing) = existing {
                existing.expiry = modifier.expiry;
                return Ok(());
            }
        }

        self.active.push(modifier);
        Ok(())
    }

    /// Count down after a settled spin; drops expired and draw-scoped modifiers
    pub fn tick(&mut self) {
        self.active.retain_mut(|modifier| match &mut modifier.expiry {
            Expiry::ThisDraw => false,
            Expiry::Spins(remaining) => {
                *remaining = remaining.saturating_sub(1);
                *remaining > 0
            }
        });
    }

    /// Drop draw-scoped modifiers without counting down the others, e.g. when
    /// a draw is abandoned
    pub fn clear_draw(&mut self) {
        self.active.retain(|m| m.expiry != Expiry::ThisDraw);
    }

    pub fn clear_stage(&mut self, stage: ModifierStage) {
        self.active.retain(|m| m.stage != stage);
    }

    pub fn clear_all(&mut self) {
        self.active.clear();
    }

    pub fn is_active(&self, source: &str) -> bool {
        self.active.iter().any(|m| m.source == source)
    }

    pub fn has_stage(&self, stage: ModifierStage) -> bool {
        self.active.iter().any(|m| m.stage == stage)
    }

    pub fn active(&self) -> &[ActiveModifier] {
        &self.active
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

/// Sum of `wager * value * tier` across matches, saturating
pub fn base_amount<F>(matches: &[MatchResult], wager: u64, value_of: F, tiers: &TierSchedule) -> u64
where
    F: Fn(SymbolId) -> u64,
{
    matches.iter().fold(0u64, |total, m| {
        let unit = wager.saturating_mul(value_of(m.symbol));
        total.saturating_add(tiers.amount(m.line_id, m.run_length, unit))
    })
}

/// Apply modifiers to a base amount in stage order; never negative
pub fn apply_modifiers(base: u64, modifiers: &[ActiveModifier]) -> u64 {
    let mut amount = i128::from(base);

    for stage in ModifierStage::ORDER {
        for modifier in modifiers.iter().filter(|m| m.stage == stage) {
            amount = modifier.effect.apply(amount);
        }
    }

    u64::try_from(amount.max(0)).unwrap_or(u64::MAX)
}

/// Credits won by a draw
pub fn compute_payout<F>(
    matches: &[MatchResult],
    wager: u64,
    value_of: F,
    tiers: &TierSchedule,
    modifiers: &[ActiveModifier],
) -> u64
where
    F: Fn(SymbolId) -> u64,
{
    apply_modifiers(base_amount(matches, wager, value_of, tiers), modifiers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn four_of_value_five() -> Vec<MatchResult> {
        vec![MatchResult {
            line_id: 0,
            symbol: SymbolId(3),
            run_length: 4,
            cells: Vec::new(),
        }]
    }

    fn value_five(_: SymbolId) -> u64 {
        5
    }

    fn power_up(factor: f64) -> ActiveModifier {
        ActiveModifier::new(
            "overclock",
            ModifierStage::PowerUp,
            ModifierEffect::Multiplicative(factor),
            Expiry::Spins(3),
        )
    }

    fn debuff(factor: f64) -> ActiveModifier {
        ActiveModifier::new(
            "virus",
            ModifierStage::Debuff,
            ModifierEffect::Multiplicative(factor),
            Expiry::Spins(3),
        )
    }

    #[test]
    fn test_tier_lookup() {
        let tiers = TierTable::standard();
        assert_eq!(tiers.multiplier(2), 0);
        assert_eq!(tiers.multiplier(3), 1);
        assert_eq!(tiers.multiplier(4), 5);
        assert_eq!(tiers.multiplier(5), 10);
        assert_eq!(tiers.multiplier(9), 10);
        assert_eq!(TierTable::flat(12).multiplier(7), 12);
    }

    #[test]
    fn test_tier_table_validation() {
        assert!(TierTable::new(&[]).is_err());
        assert!(TierTable::new(&[(0, 1)]).is_err());
        assert!(TierTable::new(&[(3, 1), (3, 2)]).is_err());

        let unsorted = TierTable::new(&[(5, 15), (3, 1), (4, 5)]).unwrap();
        assert_eq!(unsorted.multiplier(5), 15);
        assert_eq!(unsorted.to_string(), "3→1x 4→5x 5→15x");
    }

    #[test]
    fn test_fractional_tiers_floor_per_line() {
        let tiers = TierTable::fractional(&[(3, 1, 2), (4, 1, 1)]).unwrap();
        assert_eq!(tiers.amount(3, 150), 75);
        assert_eq!(tiers.amount(3, 75), 37);
        assert_eq!(tiers.amount(4, 75), 75);
        assert_eq!(tiers.amount(2, 75), 0);
        assert_eq!(tiers.to_string(), "3→1/2x 4→1x");
        assert!(TierTable::fractional(&[(3, 1, 0)]).is_err());

        let json = serde_json::to_string(&tiers).unwrap();
        assert_eq!(
            json,
            r#"[{"min_run":3,"multiplier":1,"divisor":2},{"min_run":4,"multiplier":1}]"#
        );
    }

    #[test]
    fn test_tier_table_json_is_validated() {
        let table: TierTable =
            serde_json::from_str(r#"[{"min_run":3,"multiplier":2},{"min_run":4,"multiplier":8}]"#)
                .unwrap();
        assert_eq!(table.multiplier(4), 8);
        assert!(serde_json::from_str::<TierTable>("[]").is_err());
    }

    #[test]
    fn test_schedule_override() {
        let schedule = TierSchedule::uniform(TierTable::flat(5)).with_override(2, TierTable::flat(12));
        assert_eq!(schedule.multiplier(0, 10), 5);
        assert_eq!(schedule.multiplier(2, 10), 12);
    }

    #[test]
    fn test_base_payout_example() {
        let tiers = TierSchedule::uniform(TierTable::standard());
        assert_eq!(
            compute_payout(&four_of_value_five(), 10, value_five, &tiers, &[]),
            250
        );
    }

    #[test]
    fn test_power_up_then_debuff() {
        let tiers = TierSchedule::uniform(TierTable::standard());
        let modifiers = [power_up(2.0), debuff(0.5)];
        assert_eq!(
            compute_payout(&four_of_value_five(), 10, value_five, &tiers, &modifiers),
            250
        );
    }

    #[test]
    fn test_stage_order_beats_activation_order() {
        let bonus = ActiveModifier::glitch(
            "key",
            ModifierEffect::Additive(100),
            Cell::new(0, 0),
        );
        // Activated debuff-first, applied glitch, power-up, debuff.
        let modifiers = [debuff(0.5), power_up(2.0), bonus];
        // (250 + 100) * 2 * 0.5
        assert_eq!(apply_modifiers(250, &modifiers), 350);
    }

    #[test]
    fn test_order_within_stage_matters() {
        let flat = ActiveModifier::new(
            "memory_leak",
            ModifierStage::Debuff,
            ModifierEffect::Additive(100),
            Expiry::Spins(1),
        );

        // (250 * 2 + 100) * 0.5
        let add_first = [power_up(2.0), flat.clone(), debuff(0.5)];
        assert_eq!(apply_modifiers(250, &add_first), 300);

        // 250 * 2 * 0.5 + 100
        let add_last = [power_up(2.0), debuff(0.5), flat];
        assert_eq!(apply_modifiers(250, &add_last), 350);
    }

    #[test]
    fn test_multiplication_floors() {
        assert_eq!(apply_modifiers(251, &[debuff(0.5)]), 125);
        assert_eq!(apply_modifiers(3, &[power_up(1.5)]), 4);
    }

    #[test]
    fn test_result_never_negative() {
        let virus = ActiveModifier::glitch("virus", ModifierEffect::Additive(-20), Cell::new(1, 1));
        assert_eq!(apply_modifiers(5, &[virus.clone()]), 0);

        let floor = ActiveModifier::glitch("virus", ModifierEffect::FloorAtZero, Cell::new(1, 1));
        let key = ActiveModifier::glitch("key", ModifierEffect::Additive(50), Cell::new(2, 1));
        // Floored before the key bonus: 0 + 50.
        assert_eq!(apply_modifiers(5, &[virus, floor, key]), 50);
    }

    #[test]
    fn test_chain_refreshes_same_source() {
        let mut chain = ModifierChain::new();
        chain.activate(power_up(3.0)).unwrap();
        chain.tick();
        chain.tick();
        assert!(matches!(chain.active()[0].expiry, Expiry::Spins(1)));

        chain.activate(power_up(3.0)).unwrap();
        assert_eq!(chain.active().len(), 1);
        assert!(matches!(chain.active()[0].expiry, Expiry::Spins(3)));
    }

    #[test]
    fn test_chain_tick_expires() {
        let mut chain = ModifierChain::new();
        chain.activate(power_up(3.0)).unwrap();
        chain
            .activate(ActiveModifier::glitch(
                "multiplier",
                ModifierEffect::Multiplicative(2.0),
                Cell::new(0, 0),
            ))
            .unwrap();
        chain
            .activate(ActiveModifier::glitch(
                "multiplier",
                ModifierEffect::Multiplicative(2.0),
                Cell::new(1, 0),
            ))
            .unwrap();
        assert_eq!(chain.active().len(), 3);

        chain.tick();
        assert_eq!(chain.active().len(), 1);
        chain.tick();
        chain.tick();
        assert!(chain.is_empty());
    }

    #[test]
    fn test_chain_rejects_bad_multiplier() {
        let mut chain = ModifierChain::new();
        assert!(chain.activate(power_up(f64::INFINITY)).is_err());
        assert!(chain.activate(debuff(-1.0)).is_err());
        assert!(chain.is_empty());
    }

    #[test]
    fn test_chain_clear_draw_keeps_timed_modifiers() {
        let mut chain = ModifierChain::new();
        chain.activate(power_up(3.0)).unwrap();
        chain
            .activate(ActiveModifier::glitch(
                "key",
                ModifierEffect::Additive(50),
                Cell::new(0, 0),
            ))
            .unwrap();

        chain.clear_draw();
        assert_eq!(chain.active().len(), 1);
        assert!(matches!(chain.active()[0].expiry, Expiry::Spins(3)));
    }

    #[test]
    fn test_chain_clear_stage() {
        let mut chain = ModifierChain::new();
        chain.activate(power_up(3.0)).unwrap();
        chain.activate(debuff(0.5)).unwrap();

        chain.clear_stage(ModifierStage::Debuff);
        assert!(chain.is_active("overclock"));
        assert!(!chain.has_stage(ModifierStage::Debuff));

        chain.clear_all();
        assert!(chain.is_empty());
    }
}
