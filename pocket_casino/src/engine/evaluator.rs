//! Payline and pattern matching.
//!
//! A line is an ordered list of grid cells. How a line matches depends on the
//! [`MatchPolicy`] of the line set it belongs to:
//!
//! - `ContiguousFromLeft`: identical symbols counted from the first cell
//! - `BestWindow`: the longest run of identical symbols starting anywhere
//! - `Majority`: the most frequent symbol among the cells, in any order
//! - `Group`: cells holding any symbol of an id range, counted together
//!
//! Every qualifying line is reported on its own; callers add the payouts.

use super::{
    errors::{EngineError, EngineResult},
    generator::{Cell, Grid},
    paytable::SymbolId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Shortest run that counts as a match for run-based policies
pub const MIN_RUN: usize = 3;

/// Geometry of a line
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LineShape {
    /// One row index per reel, starting at `start_reel`
    Path { start_reel: usize, rows: Vec<usize> },
    /// Arbitrary cells; order matters for run-based policies only
    Cells { cells: Vec<Cell> },
}

/// A payline or pattern
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct LineDefinition {
    pub id: u32,
    #[serde(flatten)]
    pub shape: LineShape,
}

impl LineDefinition {
    /// Path across consecutive reels beginning at reel 0
    pub fn path(id: u32, rows: &[usize]) -> Self {
        Self::path_from(id, 0, rows)
    }

    /// Path beginning at `start_reel`, e.g. a diagonal that skips the first reel
    pub fn path_from(id: u32, start_reel: usize, rows: &[usize]) -> Self {
        Self {
            id,
            shape: LineShape::Path {
                start_reel,
                rows: rows.to_vec(),
            },
        }
    }

    /// Straight line across `reels` reels on one row
    pub fn straight(id: u32, row: usize, reels: usize) -> Self {
        Self::path(id, &vec![row; reels])
    }

    /// Every row of one reel, top to bottom
    pub fn column(id: u32, reel: usize, rows: usize) -> Self {
        Self::cells(id, (0..rows).map(|row| Cell::new(reel, row)).collect())
    }

    pub fn cells(id: u32, cells: Vec<Cell>) -> Self {
        Self {
            id,
            shape: LineShape::Cells { cells },
        }
    }

    /// Resolve to grid cells, checking bounds
    ///
    /// # Errors
    ///
    /// * `EngineError::InvalidLine` - the line has no cells
    /// * `EngineError::LineOutOfBounds` - a cell lies outside the grid
    pub fn resolve(&self, reels: usize, rows: usize) -> EngineResult<Vec<Cell>> {
        let cells: Vec<Cell> = match &self.shape {
            LineShape::Path { start_reel, rows } => rows
                .iter()
                .enumerate()
                .map(|(offset, &row)| {
                    start_reel
                        .checked_add(offset)
                        .map(|reel| Cell::new(reel, row))
                        .ok_or(EngineError::LineOutOfBounds {
                            line_id: self.id,
                            reel: *start_reel,
                            row,
                        })
                })
                .collect::<EngineResult<_>>()?,
            LineShape::Cells { cells } => cells.clone(),
        };

        if cells.is_empty() {
            return Err(EngineError::InvalidLine {
                line_id: self.id,
                reason: "no cells".to_string(),
            });
        }

        if let Some(outside) = cells.iter().find(|c| c.reel >= reels || c.row >= rows) {
            return Err(EngineError::LineOutOfBounds {
                line_id: self.id,
                reel: outside.reel,
                row: outside.row,
            });
        }

        Ok(cells)
    }
}

/// How a line is matched
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Run of identical symbols anchored at the line's first cell
    ContiguousFromLeft,
    /// Longest run of identical symbols starting at any cell; earliest start wins ties
    BestWindow,
    /// Most frequent symbol among the cells
    ///
    /// Triggers when its count reaches `min_count`, or half the cells (rounded
    /// down) when unset. Symbols tied for most frequent resolve to the lowest
    /// id. A void cell anywhere in the line prevents a match.
    Majority { min_count: Option<usize> },
    /// Cells holding a symbol with id in `first..=last`, in any order
    ///
    /// Matches when at least `min_count` cells qualify. The match is reported
    /// under `first`, so it pays that symbol's value.
    Group {
        first: SymbolId,
        last: SymbolId,
        min_count: usize,
    },
}

/// A matched line
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct MatchResult {
    pub line_id: u32,
    pub symbol: SymbolId,
    /// Run length, or the majority count for `Majority`
    pub run_length: usize,
    /// Cells that formed the match
    pub cells: Vec<Cell>,
}

/// Evaluate every line against a grid
///
/// # Errors
///
/// Fails if any line is empty or leaves the grid.
pub fn evaluate(
    grid: &Grid,
    lines: &[LineDefinition],
    policy: MatchPolicy,
) -> EngineResult<Vec<MatchResult>> {
    let mut matches = Vec::new();

    for line in lines {
        let cells = line.resolve(grid.reels(), grid.rows())?;
        let symbols: Vec<SymbolId> = cells
            .iter()
            .map(|&cell| grid.get(cell).unwrap_or(SymbolId::VOID))
            .collect();

        let found = match policy {
            MatchPolicy::ContiguousFromLeft => run_at(&symbols, 0)
                .filter(|&(_, len)| len >= MIN_RUN)
                .map(|(symbol, len)| (symbol, len, cells[..len].to_vec())),
            MatchPolicy::BestWindow => best_window(&symbols)
                .map(|(start, symbol, len)| (symbol, len, cells[start..start + len].to_vec())),
            MatchPolicy::Majority { min_count } => {
                majority(&symbols, min_count).map(|(symbol, count)| {
                    let winners = cells
                        .iter()
                        .zip(&symbols)
                        .filter(|&(_, &s)| s == symbol)
                        .map(|(&cell, _)| cell)
                        .collect();
                    (symbol, count, winners)
                })
            }
            MatchPolicy::Group {
                first,
                last,
                min_count,
            } => {
                let winners: Vec<Cell> = cells
                    .iter()
                    .zip(&symbols)
                    .filter(|&(_, s)| (first..=last).contains(s))
                    .map(|(&cell, _)| cell)
                    .collect();
                (winners.len() >= min_count.max(1)).then(|| (first, winners.len(), winners))
            }
        };

        if let Some((symbol, run_length, cells)) = found {
            matches.push(MatchResult {
                line_id: line.id,
                symbol,
                run_length,
                cells,
            });
        }
    }

    Ok(matches)
}

/// Symbol and length of the run starting at `start`; void starts no run
fn run_at(symbols: &[SymbolId], start: usize) -> Option<(SymbolId, usize)> {
    let first = *symbols.get(start)?;
    if first.is_void() {
        return None;
    }
    let len = symbols[start..].iter().take_while(|&&s| s == first).count();
    Some((first, len))
}

fn best_window(symbols: &[SymbolId]) -> Option<(usize, SymbolId, usize)> {
    let mut best: Option<(usize, SymbolId, usize)> = None;

    for start in 0..=symbols.len().saturating_sub(MIN_RUN) {
        let Some((symbol, len)) = run_at(symbols, start) else {
            continue;
        };
        if len >= MIN_RUN && best.is_none_or(|(_, _, best_len)| len > best_len) {
            best = Some((start, symbol, len));
        }
    }

    best
}

fn majority(symbols: &[SymbolId], min_count: Option<usize>) -> Option<(SymbolId, usize)> {
    if symbols.iter().any(|s| s.is_void()) {
        return None;
    }

    let mut counts: BTreeMap<SymbolId, usize> = BTreeMap::new();
    for &symbol in symbols {
        *counts.entry(symbol).or_default() += 1;
    }

    // Ascending ids with a strict comparison keep the lowest id on ties.
    let mut winner: Option<(SymbolId, usize)> = None;
    for (symbol, count) in counts {
        if winner.is_none_or(|(_, best)| count > best) {
            winner = Some((symbol, count));
        }
    }

    let threshold = min_count.unwrap_or(symbols.len() / 2).max(1);
    winner.filter(|&(_, count)| count >= threshold)
}
