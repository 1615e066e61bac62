//! Slot variants: one parametrized engine, many configurations.
//!
//! A variant is a grid shape, a paytable, one or more line sets (lines + match
//! policy + tier schedule) and optional bonus, multiplier and assist rules.
//! Everything that differs between machines is data here; there is no
//! per-machine code path.

use super::{
    errors::{EngineError, EngineResult},
    evaluator::{LineDefinition, LineShape, MatchPolicy, MatchResult, evaluate},
    generator::{Cell, Grid},
    paytable::{Paytable, PaytableEntry, SymbolId},
    payout::{ActiveModifier, TierSchedule, TierTable, apply_modifiers, base_amount},
};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt};

/// Lines evaluated together under one policy and tier schedule
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct LineSet {
    pub name: String,
    pub policy: MatchPolicy,
    pub lines: Vec<LineDefinition>,
    pub tiers: TierSchedule,
    /// Pays only when no earlier line set of the variant paid
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fallback: bool,
}

/// Per-spin chances of the bonus events a variant supports
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct BonusRules {
    /// Chance that 1-3 cells glitch on a spin
    pub glitch_chance: f64,
    /// Chance of a power-up when none is active
    pub power_up_chance: f64,
    /// Chance of a debuff when none is active
    pub debuff_chance: f64,
    /// Chance of entering a hidden mode when none is active
    pub hidden_mode_chance: f64,
}

impl BonusRules {
    fn validate(&self) -> EngineResult<()> {
        let chances = [
            self.glitch_chance,
            self.power_up_chance,
            self.debuff_chance,
            self.hidden_mode_chance,
        ];
        if chances.iter().any(|c| !(0.0..=1.0).contains(c)) {
            return Err(EngineError::Definition(
                "bonus chances must lie within [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

/// A chance to multiply the payout of the current draw, e.g. a rainbow bonus
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct DrawMultiplier {
    pub name: String,
    pub chance: f64,
    /// `(factor, weight)` pairs; weights are relative
    pub factors: Vec<(f64, f64)>,
}

impl DrawMultiplier {
    fn validate(&self) -> EngineResult<()> {
        if !(0.0..=1.0).contains(&self.chance) {
            return Err(EngineError::Definition(format!(
                "multiplier '{}' chance must lie within [0, 1]",
                self.name
            )));
        }
        let usable = |&(factor, weight): &(f64, f64)| {
            factor.is_finite() && factor >= 0.0 && weight.is_finite() && weight > 0.0
        };
        if self.factors.is_empty() || !self.factors.iter().all(usable) {
            return Err(EngineError::Definition(format!(
                "multiplier '{}' needs positive weights and usable factors",
                self.name
            )));
        }
        Ok(())
    }

    /// Factor for a uniform sample `u` in `[0, 1)`
    pub fn pick(&self, u: f64) -> f64 {
        let total: f64 = self.factors.iter().map(|&(_, weight)| weight).sum();
        let target = u * total;
        let mut cumulative = 0.0;
        for &(factor, weight) in &self.factors {
            cumulative += weight;
            if target < cumulative {
                return factor;
            }
        }
        self.factors.last().map_or(1.0, |&(factor, _)| factor)
    }
}

/// Help a player can opt into on machines that offer it
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct AssistRules {
    /// Repeat: chance a cell copies its left neighbour while drawing
    pub repeat_chance: f64,
    /// Repeat: payout factor while active
    pub repeat_payout: f64,
    /// Retry: consecutive losses that earn free spins
    pub retry_after: u32,
    pub retry_spins: u32,
    /// Guarantee: consecutive losses after which the next draw fills the
    /// middle row with one symbol
    pub guarantee_after: u32,
    /// Guarantee: payout factor on the forced draw
    pub guarantee_payout: f64,
    /// Guarantee: the forced symbol is one of this many first paytable entries
    pub guarantee_symbols: usize,
}

impl AssistRules {
    fn validate(&self, symbols: usize) -> EngineResult<()> {
        let factors = [self.repeat_payout, self.guarantee_payout];
        if !(0.0..=1.0).contains(&self.repeat_chance)
            || factors.iter().any(|f| !f.is_finite() || *f < 0.0)
        {
            return Err(EngineError::Definition(
                "assist chances and factors are out of range".to_string(),
            ));
        }
        if self.retry_after == 0
            || self.guarantee_after == 0
            || self.guarantee_symbols == 0
            || self.guarantee_symbols > symbols
        {
            return Err(EngineError::Definition(
                "assist thresholds must be at least 1 and fit the paytable".to_string(),
            ));
        }
        Ok(())
    }
}

/// Unvalidated variant description, as stored in JSON
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct VariantDefinition {
    pub name: String,
    pub reels: usize,
    pub rows: usize,
    pub paytable: Vec<PaytableEntry>,
    pub line_sets: Vec<LineSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bonuses: Option<BonusRules>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub multipliers: Vec<DrawMultiplier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assists: Option<AssistRules>,
}

/// A line that paid out
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LineWin {
    pub line_set: String,
    pub result: MatchResult,
    /// Tiered amount for this line before modifiers
    pub amount: u64,
}

/// Result of evaluating one grid
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SpinOutcome {
    pub wins: Vec<LineWin>,
    /// Sum of line amounts
    pub base: u64,
    /// Amount after modifiers
    pub payout: u64,
}

/// A validated, playable slot configuration
#[derive(Clone, Debug)]
pub struct SlotVariant {
    name: String,
    reels: usize,
    rows: usize,
    paytable: Paytable,
    line_sets: Vec<LineSet>,
    bonuses: Option<BonusRules>,
    multipliers: Vec<DrawMultiplier>,
    assists: Option<AssistRules>,
}

impl SlotVariant {
    /// Validate a definition
    ///
    /// # Errors
    ///
    /// * `EngineError::InvalidPaytable` / `MalformedPaytable` - bad paytable
    /// * `EngineError::InvalidGrid` - zero reels or rows
    /// * `EngineError::LineOutOfBounds` / `InvalidLine` - a line does not fit the grid
    /// * `EngineError::Definition` - no line sets, duplicate line ids, bad bonus,
    ///   multiplier or assist rules
    pub fn from_definition(definition: VariantDefinition, tolerance: f64) -> EngineResult<Self> {
        let paytable = Paytable::new(definition.paytable, tolerance)?;

        if definition.reels == 0 || definition.rows == 0 {
            return Err(EngineError::InvalidGrid {
                reels: definition.reels,
                rows: definition.rows,
            });
        }

        if definition.line_sets.is_empty() {
            return Err(EngineError::Definition(format!(
                "variant '{}' has no line sets",
                definition.name
            )));
        }

        for set in &definition.line_sets {
            let mut ids = HashSet::new();
            for line in &set.lines {
                line.resolve(definition.reels, definition.rows)?;
                if !ids.insert(line.id) {
                    return Err(EngineError::Definition(format!(
                        "line id {} repeated in '{}'",
                        line.id, set.name
                    )));
                }
            }
        }

        if let Some(bonuses) = &definition.bonuses {
            bonuses.validate()?;
        }
        for multiplier in &definition.multipliers {
            multiplier.validate()?;
        }
        if let Some(assists) = &definition.assists {
            assists.validate(paytable.len())?;
        }

        Ok(Self {
            name: definition.name,
            reels: definition.reels,
            rows: definition.rows,
            paytable,
            line_sets: definition.line_sets,
            bonuses: definition.bonuses,
            multipliers: definition.multipliers,
            assists: definition.assists,
        })
    }

    /// Parse and validate a JSON definition
    pub fn from_json(json: &str, tolerance: f64) -> EngineResult<Self> {
        let definition: VariantDefinition = serde_json::from_str(json)?;
        Self::from_definition(definition, tolerance)
    }

    /// Built-in variant by name
    pub fn preset(name: &str, tolerance: f64) -> EngineResult<Self> {
        let definition = match name {
            "classic" => classic(),
            "advanced" => advanced(),
            "egyptian" => egyptian(),
            "ghost_pirate" => ghost_pirate(),
            "cyber" => cyber(),
            "special_ed" => special_ed(),
            "lucky_charm" => lucky_charm(),
            other => return Err(EngineError::UnknownVariant(other.to_string())),
        };
        Self::from_definition(definition, tolerance)
    }

    /// Names accepted by [`SlotVariant::preset`]
    pub fn preset_names() -> &'static [&'static str] {
        &[
            "classic",
            "advanced",
            "egyptian",
            "ghost_pirate",
            "cyber",
            "special_ed",
            "lucky_charm",
        ]
    }

    /// Every built-in variant
    pub fn presets(tolerance: f64) -> EngineResult<Vec<Self>> {
        Self::preset_names()
            .iter()
            .map(|name| Self::preset(name, tolerance))
            .collect()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn reels(&self) -> usize {
        self.reels
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn paytable(&self) -> &Paytable {
        &self.paytable
    }

    pub fn line_sets(&self) -> &[LineSet] {
        &self.line_sets
    }

    pub fn bonuses(&self) -> Option<&BonusRules> {
        self.bonuses.as_ref()
    }

    pub fn multipliers(&self) -> &[DrawMultiplier] {
        &self.multipliers
    }

    pub fn assists(&self) -> Option<&AssistRules> {
        self.assists.as_ref()
    }

    /// Definition equivalent to this variant, e.g. for export
    pub fn to_definition(&self) -> VariantDefinition {
        VariantDefinition {
            name: self.name.clone(),
            reels: self.reels,
            rows: self.rows,
            paytable: self.paytable.entries().to_vec(),
            line_sets: self.line_sets.clone(),
            bonuses: self.bonuses,
            multipliers: self.multipliers.clone(),
            assists: self.assists,
        }
    }

    /// Evaluate every line set and apply modifiers
    ///
    /// A fallback line set is skipped once an earlier set has paid.
    pub fn settle(
        &self,
        grid: &Grid,
        wager: u64,
        modifiers: &[ActiveModifier],
    ) -> EngineResult<SpinOutcome> {
        let mut wins = Vec::new();

        for set in &self.line_sets {
            if set.fallback && !wins.is_empty() {
                continue;
            }
            for result in evaluate(grid, &set.lines, set.policy)? {
                let amount = base_amount(
                    std::slice::from_ref(&result),
                    wager,
                    |symbol| self.paytable.value_of(symbol),
                    &set.tiers,
                );
                wins.push(LineWin {
                    line_set: set.name.clone(),
                    result,
                    amount,
                });
            }
        }

        let base = wins.iter().fold(0u64, |sum, w| sum.saturating_add(w.amount));
        Ok(SpinOutcome {
            payout: apply_modifiers(base, modifiers),
            base,
            wins,
        })
    }
}

impl fmt::Display for SlotVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}x{}, {} symbols, {} lines)",
            self.name,
            self.reels,
            self.rows,
            self.paytable.len(),
            self.line_sets.iter().map(|s| s.lines.len()).sum::<usize>()
        )
    }
}

/// A difference between variants that may be unintended
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DriftWarning {
    pub reference: String,
    pub other: String,
    pub detail: String,
}

impl fmt::Display for DriftWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} vs {}: {}", self.reference, self.other, self.detail)
    }
}

/// Compare variants and report parameters that differ between comparable line sets
///
/// Line sets are comparable when they share a policy kind and line geometry
/// (paths vs. cell sets). Tier tables that differ within such a group are
/// reported, as are path line sets that use different run policies. Nothing is
/// changed: each variant keeps its own parameters. Each finding is also logged.
pub fn audit_variants(variants: &[SlotVariant]) -> Vec<DriftWarning> {
    struct Entry<'a> {
        label: String,
        set: &'a LineSet,
        paths: bool,
    }

    let entries: Vec<Entry> = variants
        .iter()
        .flat_map(|variant| {
            variant.line_sets.iter().map(move |set| Entry {
                label: format!("{}/{}", variant.name, set.name),
                set,
                paths: set
                    .lines
                    .iter()
                    .all(|line| matches!(line.shape, LineShape::Path { .. })),
            })
        })
        .collect();

    let mut warnings = Vec::new();

    for (i, entry) in entries.iter().enumerate() {
        // Compare against the first earlier entry of the same group only.
        let reference = entries[..i].iter().find(|earlier| {
            earlier.paths == entry.paths
                && std::mem::discriminant(&earlier.set.policy)
                    == std::mem::discriminant(&entry.set.policy)
        });
        let reference =
            reference.filter(|earlier| earlier.set.tiers.default != entry.set.tiers.default);
        if let Some(reference) = reference {
            warnings.push(DriftWarning {
                reference: reference.label.clone(),
                other: entry.label.clone(),
                detail: format!(
                    "tiers {} vs {}",
                    reference.set.tiers.default, entry.set.tiers.default
                ),
            });
        }

        if entry.paths {
            let first_path = entries[..i].iter().find(|earlier| earlier.paths);
            if let Some(first) = first_path.filter(|f| f.set.policy != entry.set.policy) {
                warnings.push(DriftWarning {
                    reference: first.label.clone(),
                    other: entry.label.clone(),
                    detail: format!(
                        "paylines matched {:?} vs {:?}",
                        first.set.policy, entry.set.policy
                    ),
                });
            }
        }
    }

    for warning in &warnings {
        log::warn!("Variant drift: {}", warning);
    }
    warnings
}

fn entries(rows: &[(&str, u64, f64)]) -> Vec<PaytableEntry> {
    rows.iter()
        .enumerate()
        .map(|(id, &(name, value, probability))| {
            PaytableEntry::new(id as u16, name, value, probability)
        })
        .collect()
}

fn paths(first_id: u32, rows: &[&[usize]]) -> Vec<LineDefinition> {
    rows.iter()
        .enumerate()
        .map(|(i, rows)| LineDefinition::path(first_id + i as u32, rows))
        .collect()
}

fn tiers(steps: &[(usize, u64)]) -> TierSchedule {
    TierSchedule::uniform(TierTable::new(steps).unwrap_or_else(|_| TierTable::standard()))
}

/// Row/column pairs to cells
fn pattern(first_id: u32, coordinates: &[(usize, usize)]) -> LineDefinition {
    LineDefinition::cells(
        first_id,
        coordinates
            .iter()
            .map(|&(row, reel)| Cell::new(reel, row))
            .collect(),
    )
}

/// Three reels, one line, three of a kind pays the symbol value
pub fn classic() -> VariantDefinition {
    VariantDefinition {
        name: "classic".to_string(),
        reels: 3,
        rows: 1,
        paytable: entries(&[
            ("cherry", 10, 0.25),
            ("lemon", 15, 0.20),
            ("orange", 20, 0.17),
            ("watermelon", 25, 0.15),
            ("grapes", 30, 0.10),
            ("bell", 40, 0.08),
            ("diamond", 50, 0.04),
            ("seven", 100, 0.01),
        ]),
        line_sets: vec![LineSet {
            name: "line".to_string(),
            policy: MatchPolicy::ContiguousFromLeft,
            lines: vec![LineDefinition::straight(0, 0, 3)],
            tiers: tiers(&[(3, 1)]),
            fallback: false,
        }],
        bonuses: None,
        multipliers: Vec::new(),
        assists: None,
    }
}

/// 5x3, nine left-anchored paylines
pub fn advanced() -> VariantDefinition {
    VariantDefinition {
        name: "advanced".to_string(),
        reels: 5,
        rows: 3,
        paytable: entries(&[
            ("cherry", 1, 0.20),
            ("lemon", 2, 0.18),
            ("orange", 3, 0.16),
            ("grapes", 5, 0.14),
            ("watermelon", 8, 0.10),
            ("bell", 10, 0.08),
            ("star", 15, 0.06),
            ("diamond", 25, 0.04),
            ("seven", 50, 0.03),
            ("jackpot", 100, 0.01),
        ]),
        line_sets: vec![LineSet {
            name: "paylines".to_string(),
            policy: MatchPolicy::ContiguousFromLeft,
            lines: paths(
                0,
                &[
                    &[0, 0, 0, 0, 0],
                    &[1, 1, 1, 1, 1],
                    &[2, 2, 2, 2, 2],
                    &[0, 0, 1, 2, 2],
                    &[2, 2, 1, 0, 0],
                    &[0, 1, 2, 1, 0],
                    &[2, 1, 0, 1, 2],
                    &[0, 2, 0, 2, 0],
                    &[2, 0, 2, 0, 2],
                ],
            ),
            tiers: tiers(&[(3, 1), (4, 5), (5, 10)]),
            fallback: false,
        }],
        bonuses: None,
        multipliers: Vec::new(),
        assists: None,
    }
}

/// 5x4 with rows, zigzags, partial diagonals and column counts
pub fn egyptian() -> VariantDefinition {
    let mut lines = paths(
        0,
        &[
            &[0, 0, 0, 0, 0],
            &[1, 1, 1, 1, 1],
            &[2, 2, 2, 2, 2],
            &[3, 3, 3, 3, 3],
            &[0, 1, 2, 3],
            &[3, 2, 1, 0],
        ],
    );
    lines.push(LineDefinition::path_from(6, 1, &[0, 1, 2, 3]));
    lines.push(LineDefinition::path_from(7, 1, &[3, 2, 1, 0]));
    lines.extend(paths(
        8,
        &[
            &[0, 1, 3, 1, 0],
            &[3, 2, 0, 2, 3],
            &[0, 3, 0, 3, 0],
            &[3, 0, 3, 0, 3],
            &[0, 1, 0, 1, 0],
            &[3, 2, 3, 2, 3],
        ],
    ));

    VariantDefinition {
        name: "egyptian".to_string(),
        reels: 5,
        rows: 4,
        paytable: entries(&[
            ("coin", 1, 0.20),
            ("papyrus", 2, 0.18),
            ("crystal", 4, 0.16),
            ("camel", 6, 0.14),
            ("crocodile", 8, 0.10),
            ("snake", 10, 0.08),
            ("eye", 15, 0.06),
            ("vase", 20, 0.04),
            ("ankh", 40, 0.03),
            ("treasure", 70, 0.009),
            ("pyramid", 100, 0.001),
        ]),
        line_sets: vec![
            LineSet {
                name: "paylines".to_string(),
                policy: MatchPolicy::ContiguousFromLeft,
                lines,
                tiers: tiers(&[(3, 1), (4, 5), (5, 15)]),
                fallback: false,
            },
            LineSet {
                name: "columns".to_string(),
                policy: MatchPolicy::Majority { min_count: Some(3) },
                lines: (0..5)
                    .map(|reel| LineDefinition::column(20 + reel as u32, reel, 4))
                    .collect(),
                tiers: tiers(&[(3, 2), (4, 8)]),
                fallback: false,
            },
        ],
        bonuses: None,
        multipliers: Vec::new(),
        assists: None,
    }
}

/// 5x3, nine paylines that pay the best run anywhere on the line
pub fn ghost_pirate() -> VariantDefinition {
    VariantDefinition {
        name: "ghost_pirate".to_string(),
        reels: 5,
        rows: 3,
        paytable: entries(&[
            ("ghost", 2, 0.20),
            ("pirate_flag", 3, 0.18),
            ("dagger", 5, 0.16),
            ("trident", 8, 0.12),
            ("anchor", 10, 0.10),
            ("compass", 15, 0.09),
            ("parrot", 20, 0.07),
            ("diamond", 30, 0.04),
            ("crown", 50, 0.03),
            ("treasure", 100, 0.01),
        ]),
        line_sets: vec![LineSet {
            name: "paylines".to_string(),
            policy: MatchPolicy::BestWindow,
            lines: paths(
                0,
                &[
                    &[0, 0, 0, 0, 0],
                    &[1, 1, 1, 1, 1],
                    &[2, 2, 2, 2, 2],
                    &[0, 0, 1, 2, 2],
                    &[2, 2, 1, 0, 0],
                    &[0, 1, 0, 1, 0],
                    &[2, 1, 2, 1, 2],
                    &[0, 1, 2, 1, 0],
                    &[2, 1, 0, 1, 2],
                ],
            ),
            tiers: tiers(&[(3, 1), (4, 5), (5, 10)]),
            fallback: false,
        }],
        bonuses: None,
        multipliers: Vec::new(),
        assists: None,
    }
}

/// 5x4 with rows, columns, three special patterns, glitches and modifiers
pub fn cyber() -> VariantDefinition {
    let edges: Vec<(usize, usize)> = (0..5)
        .map(|col| (0, col))
        .chain([(1, 0), (2, 0)])
        .chain((0..5).map(|col| (3, col)))
        .collect();
    let mainframe: Vec<(usize, usize)> = (0..4)
        .map(|row| (row, 0))
        .chain((0..4).map(|row| (row, 4)))
        .chain([(1, 1), (1, 2), (1, 3), (2, 1), (2, 2), (2, 3)])
        .collect();
    let exploit = [
        (0, 0),
        (0, 4),
        (3, 0),
        (3, 4),
        (1, 1),
        (1, 3),
        (2, 1),
        (2, 3),
        (1, 2),
        (2, 2),
    ];

    VariantDefinition {
        name: "cyber".to_string(),
        reels: 5,
        rows: 4,
        paytable: entries(&[
            ("floppy", 1, 0.20),
            ("pager", 2, 0.18),
            ("cassette", 3, 0.15),
            ("computer", 5, 0.12),
            ("lock", 8, 0.10),
            ("power", 12, 0.08),
            ("network", 15, 0.07),
            ("robot", 25, 0.05),
            ("invader", 40, 0.03),
            ("satellite", 75, 0.015),
            ("decrypt", 150, 0.005),
        ]),
        line_sets: vec![
            LineSet {
                name: "rows".to_string(),
                policy: MatchPolicy::BestWindow,
                lines: (0..4)
                    .map(|row| LineDefinition::straight(row as u32, row, 5))
                    .collect(),
                tiers: tiers(&[(3, 1), (4, 3), (5, 10)]),
                fallback: false,
            },
            LineSet {
                name: "columns".to_string(),
                policy: MatchPolicy::BestWindow,
                lines: (0..5)
                    .map(|reel| LineDefinition::column(10 + reel as u32, reel, 4))
                    .collect(),
                tiers: tiers(&[(3, 1), (4, 2)]),
                fallback: false,
            },
            LineSet {
                name: "patterns".to_string(),
                policy: MatchPolicy::Majority { min_count: None },
                lines: vec![
                    pattern(20, &edges),
                    pattern(21, &mainframe),
                    pattern(22, &exploit),
                ],
                tiers: TierSchedule::uniform(TierTable::flat(5))
                    .with_override(21, TierTable::flat(8))
                    .with_override(22, TierTable::flat(12)),
                    fallback: false,
            },
        ],
        bonuses: Some(BonusRules {
            glitch_chance: 0.10,
            power_up_chance: 0.03,
            debuff_chance: 0.05,
            hidden_mode_chance: 0.01,
        }),
        multipliers: Vec::new(),
        assists: None,
    }
}

/// 5x3 rows paying the best run, with opt-in assists
///
/// Runs of 3, 4 and 5 pay 1x, 2x and 3x the symbol value.
pub fn special_ed() -> VariantDefinition {
    VariantDefinition {
        name: "special_ed".to_string(),
        reels: 5,
        rows: 3,
        paytable: entries(&[
            ("notebook", 1, 0.20),
            ("pencil", 2, 0.18),
            ("puzzle", 4, 0.16),
            ("brain", 6, 0.14),
            ("teddy", 8, 0.10),
            ("focus", 10, 0.08),
            ("star", 15, 0.06),
            ("trophy", 20, 0.04),
            ("graduation", 40, 0.03),
            ("meds", 50, 0.009),
            ("rainbow", 100, 0.001),
        ]),
        line_sets: vec![LineSet {
            name: "rows".to_string(),
            policy: MatchPolicy::BestWindow,
            lines: (0..3)
                .map(|row| LineDefinition::straight(row as u32, row, 5))
                .collect(),
            tiers: tiers(&[(3, 1), (4, 2), (5, 3)]),
            fallback: false,
        }],
        bonuses: None,
        multipliers: Vec::new(),
        assists: Some(AssistRules {
            repeat_chance: 0.4,
            repeat_payout: 0.8,
            retry_after: 4,
            retry_spins: 2,
            guarantee_after: 6,
            guarantee_payout: 1.5,
            guarantee_symbols: 5,
        }),
    }
}

/// Four reels, one row: three or four of a kind, three clovers of either
/// kind, plus rainbow and wheel multipliers on the draw
pub fn lucky_charm() -> VariantDefinition {
    let line = || vec![LineDefinition::straight(0, 0, 4)];
    let fractional = |steps: &[(usize, u64, u64)]| {
        TierSchedule::uniform(
            TierTable::fractional(steps).unwrap_or_else(|_| TierTable::standard()),
        )
    };

    VariantDefinition {
        name: "lucky_charm".to_string(),
        reels: 4,
        rows: 1,
        paytable: entries(&[
            ("clover", 10, 0.25),
            ("four_leaf_clover", 15, 0.20),
            ("rainbow", 20, 0.17),
            ("gold_coin", 25, 0.15),
            ("puzzle", 30, 0.10),
            ("crystal_ball", 40, 0.08),
            ("money_bag", 50, 0.04),
            ("leprechaun_hat", 100, 0.01),
        ]),
        line_sets: vec![
            LineSet {
                name: "kinds".to_string(),
                policy: MatchPolicy::Majority { min_count: Some(3) },
                lines: line(),
                tiers: fractional(&[(3, 1, 2), (4, 1, 1)]),
                fallback: false,
            },
            LineSet {
                name: "clovers".to_string(),
                policy: MatchPolicy::Group {
                    first: SymbolId(0),
                    last: SymbolId(1),
                    min_count: 3,
                },
                lines: line(),
                tiers: fractional(&[(3, 1, 2)]),
                fallback: true,
            },
        ],
        bonuses: None,
        multipliers: vec![
            DrawMultiplier {
                name: "rainbow".to_string(),
                chance: 0.10,
                factors: vec![(2.0, 0.60), (3.0, 0.25), (5.0, 0.10), (10.0, 0.05)],
            },
            DrawMultiplier {
                name: "wheel".to_string(),
                chance: 1.0 / 26.0,
                factors: vec![(2.0, 1.0), (3.0, 1.0), (5.0, 1.0), (10.0, 1.0)],
            },
        ],
        assists: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{
        paytable::{DEFAULT_TOLERANCE, SymbolId},
        payout::{Expiry, ModifierEffect, ModifierStage},
    };

    #[test]
    fn test_all_presets_are_valid() {
        let variants = SlotVariant::presets(DEFAULT_TOLERANCE).unwrap();
        assert_eq!(variants.len(), SlotVariant::preset_names().len());

        let cyber = SlotVariant::preset("cyber", DEFAULT_TOLERANCE).unwrap();
        assert_eq!((cyber.reels(), cyber.rows()), (5, 4));
        assert!(cyber.bonuses().is_some());
        assert_eq!(cyber.line_sets()[2].lines.len(), 3);
    }

    #[test]
    fn test_unknown_preset() {
        assert_eq!(
            SlotVariant::preset("atlantis", DEFAULT_TOLERANCE).unwrap_err(),
            EngineError::UnknownVariant("atlantis".to_string())
        );
    }

    #[test]
    fn test_invalid_paytable_makes_variant_unplayable() {
        let mut definition = classic();
        definition.paytable[0].probability = 0.256;
        assert!(matches!(
            SlotVariant::from_definition(definition, DEFAULT_TOLERANCE),
            Err(EngineError::InvalidPaytable { .. })
        ));
    }

    #[test]
    fn test_line_outside_grid_is_rejected() {
        let mut definition = classic();
        definition.line_sets[0]
            .lines
            .push(LineDefinition::path(1, &[0, 1, 0]));
        assert!(matches!(
            SlotVariant::from_definition(definition, DEFAULT_TOLERANCE),
            Err(EngineError::LineOutOfBounds { line_id: 1, .. })
        ));
    }

    #[test]
    fn test_json_line_with_huge_start_reel_is_rejected() {
        let mut definition = classic();
        definition.line_sets[0]
            .lines
            .push(LineDefinition::path_from(9, usize::MAX, &[0, 0]));
        let json = serde_json::to_string(&definition).unwrap();

        assert!(matches!(
            SlotVariant::from_json(&json, DEFAULT_TOLERANCE),
            Err(EngineError::LineOutOfBounds { line_id: 9, .. })
        ));
    }

    #[test]
    fn test_duplicate_line_ids_are_rejected() {
        let mut definition = advanced();
        definition.line_sets[0].lines[1].id = 0;
        assert!(matches!(
            SlotVariant::from_definition(definition, DEFAULT_TOLERANCE),
            Err(EngineError::Definition(_))
        ));
    }

    #[test]
    fn test_json_roundtrip_preserves_variant() {
        let variant = SlotVariant::preset("egyptian", DEFAULT_TOLERANCE).unwrap();
        let json = serde_json::to_string(&variant.to_definition()).unwrap();
        let loaded = SlotVariant::from_json(&json, DEFAULT_TOLERANCE).unwrap();
        assert_eq!(loaded.to_definition(), variant.to_definition());
    }

    #[test]
    fn test_malformed_json_is_a_definition_error() {
        assert!(matches!(
            SlotVariant::from_json("{\"name\": 3}", DEFAULT_TOLERANCE),
            Err(EngineError::Definition(_))
        ));
    }

    #[test]
    fn test_classic_three_of_a_kind() {
        let variant = SlotVariant::preset("classic", DEFAULT_TOLERANCE).unwrap();
        let bell = SymbolId(5);
        let grid = Grid::from_rows(vec![vec![bell, bell, bell]]).unwrap();

        let outcome = variant.settle(&grid, 10, &[]).unwrap();
        assert_eq!(outcome.base, 400);
        assert_eq!(outcome.payout, 400);
        assert_eq!(outcome.wins.len(), 1);
    }

    #[test]
    fn test_egyptian_rows_and_columns_add_up() {
        let variant = SlotVariant::preset("egyptian", DEFAULT_TOLERANCE).unwrap();
        let coin = SymbolId(0);
        let camel = SymbolId(3);
        let eye = SymbolId(6);
        // Row 0 is five coins; reel 4 column holds three coins.
        let grid = Grid::from_rows(vec![
            vec![coin, coin, coin, coin, coin],
            vec![camel, eye, camel, eye, coin],
            vec![eye, camel, eye, camel, coin],
            vec![camel, eye, eye, camel, camel],
        ])
        .unwrap();

        let outcome = variant.settle(&grid, 10, &[]).unwrap();
        let row_win = outcome
            .wins
            .iter()
            .find(|w| w.line_set == "paylines" && w.result.line_id == 0)
            .unwrap();
        assert_eq!(row_win.amount, 150);

        let column_win = outcome
            .wins
            .iter()
            .find(|w| w.line_set == "columns" && w.result.line_id == 24)
            .unwrap();
        assert_eq!(column_win.result.run_length, 3);
        assert_eq!(column_win.amount, 20);

        assert_eq!(
            outcome.base,
            outcome.wins.iter().map(|w| w.amount).sum::<u64>()
        );
    }

    #[test]
    fn test_cyber_pattern_pays_flat_multiplier() {
        let variant = SlotVariant::preset("cyber", DEFAULT_TOLERANCE).unwrap();
        let robot = SymbolId(7);
        let floppy = SymbolId(0);
        let pager = SymbolId(1);
        // Border of robots with an alternating interior.
        let grid = Grid::from_rows(vec![
            vec![robot, robot, robot, robot, robot],
            vec![robot, floppy, pager, floppy, pager],
            vec![robot, pager, floppy, pager, floppy],
            vec![robot, robot, robot, robot, robot],
        ])
        .unwrap();

        let outcome = variant.settle(&grid, 1, &[]).unwrap();
        let firewall = outcome
            .wins
            .iter()
            .find(|w| w.line_set == "patterns" && w.result.line_id == 20)
            .unwrap();
        assert_eq!(firewall.result.symbol, robot);
        assert_eq!(firewall.result.run_length, 12);
        assert_eq!(firewall.amount, 25 * 5);
    }

    #[test]
    fn test_lucky_charm_kinds_and_clovers() {
        let variant = SlotVariant::preset("lucky_charm", DEFAULT_TOLERANCE).unwrap();
        let settle = |symbols: [u16; 4]| {
            let row = symbols.iter().map(|&s| SymbolId(s)).collect();
            variant
                .settle(&Grid::from_rows(vec![row]).unwrap(), 10, &[])
                .unwrap()
        };

        // Three of four pays half the symbol value.
        let outcome = settle([0, 0, 0, 7]);
        assert_eq!(outcome.payout, 50);
        assert_eq!(outcome.wins.len(), 1);
        assert_eq!(outcome.wins[0].line_set, "kinds");

        assert_eq!(settle([1, 1, 1, 1]).payout, 150);
        assert_eq!(settle([1, 7, 1, 1]).payout, 75);

        // Mixed clovers only pay when nothing else did.
        let outcome = settle([0, 1, 1, 7]);
        assert_eq!(outcome.payout, 50);
        assert_eq!(outcome.wins[0].line_set, "clovers");
        assert_eq!(settle([0, 1, 2, 7]).payout, 0);
    }

    #[test]
    fn test_special_ed_pays_run_length_minus_two() {
        let variant = SlotVariant::preset("special_ed", DEFAULT_TOLERANCE).unwrap();
        let star = SymbolId(6);
        let pencil = SymbolId(1);
        let grid = Grid::from_rows(vec![
            vec![pencil, star, star, star, star],
            vec![SymbolId(0), SymbolId(2), SymbolId(0), SymbolId(2), SymbolId(0)],
            vec![pencil; 5],
        ])
        .unwrap();

        // 10 * 15 * 2 + 10 * 2 * 3
        assert_eq!(variant.settle(&grid, 10, &[]).unwrap().payout, 360);
        assert!(variant.assists().is_some());
    }

    #[test]
    fn test_draw_multiplier_pick_follows_weights() {
        let variant = SlotVariant::preset("lucky_charm", DEFAULT_TOLERANCE).unwrap();
        let rainbow = &variant.multipliers()[0];
        assert_eq!(rainbow.pick(0.0), 2.0);
        assert_eq!(rainbow.pick(0.59), 2.0);
        assert_eq!(rainbow.pick(0.6), 3.0);
        assert_eq!(rainbow.pick(0.9), 5.0);
        assert_eq!(rainbow.pick(0.99), 10.0);
    }

    #[test]
    fn test_bad_multiplier_and_assist_rules_are_rejected() {
        let mut definition = lucky_charm();
        definition.multipliers[0].factors.clear();
        assert!(matches!(
            SlotVariant::from_definition(definition, DEFAULT_TOLERANCE),
            Err(EngineError::Definition(_))
        ));

        let mut definition = special_ed();
        if let Some(assists) = definition.assists.as_mut() {
            assists.guarantee_symbols = 12;
        }
        assert!(matches!(
            SlotVariant::from_definition(definition, DEFAULT_TOLERANCE),
            Err(EngineError::Definition(_))
        ));
    }

    #[test]
    fn test_settle_applies_modifiers_after_lines() {
        let variant = SlotVariant::preset("classic", DEFAULT_TOLERANCE).unwrap();
        let cherry = SymbolId(0);
        let grid = Grid::from_rows(vec![vec![cherry, cherry, cherry]]).unwrap();
        let boost = ActiveModifier::new(
            "overclock",
            ModifierStage::PowerUp,
            ModifierEffect::Multiplicative(3.0),
            Expiry::Spins(3),
        );

        let outcome = variant.settle(&grid, 10, &[boost]).unwrap();
        assert_eq!(outcome.base, 100);
        assert_eq!(outcome.payout, 300);
    }

    #[test]
    fn test_audit_flags_tier_and_policy_drift() {
        let variants = SlotVariant::presets(DEFAULT_TOLERANCE).unwrap();
        let warnings = audit_variants(&variants);

        // Path line sets are all compared with the first one, classic's.
        assert!(warnings.iter().any(|w| w.reference == "classic/line"
            && w.other == "egyptian/paylines"
            && w.detail.contains("5→15x")));
        // cyber rows pay 4-in-a-row 3x where ghost_pirate pays 5x.
        assert!(warnings.iter().any(|w| w.reference == "ghost_pirate/paylines"
            && w.other == "cyber/rows"));
        // ghost_pirate matches its paylines anywhere, advanced from the left.
        assert!(warnings.iter().any(|w| w.other == "ghost_pirate/paylines"
            && w.detail.contains("BestWindow")));
    }

    #[test]
    fn test_audit_is_quiet_for_identical_variants() {
        let variant = SlotVariant::preset("advanced", DEFAULT_TOLERANCE).unwrap();
        assert!(audit_variants(&[variant.clone(), variant]).is_empty());
    }
}
