//! Weighted outcome generation.

use super::{
    errors::{EngineError, EngineResult},
    paytable::{Paytable, SymbolId},
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Grid coordinate: reel (column) and row
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Cell {
    pub reel: usize,
    pub row: usize,
}

impl Cell {
    pub const fn new(reel: usize, row: usize) -> Self {
        Self { reel, row }
    }
}

/// Drawn symbols, `reels` columns by `rows` rows
///
/// A grid is never modified after it is produced; masking cells creates a new one.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Grid {
    reels: usize,
    rows: usize,
    /// Reel-major: `cells[reel * rows + row]`
    cells: Vec<SymbolId>,
}

impl Grid {
    /// Build a grid from row-major symbols (`rows[row][reel]`), as a grid is read on screen
    pub fn from_rows(rows: Vec<Vec<SymbolId>>) -> EngineResult<Self> {
        let row_count = rows.len();
        let reel_count = rows.first().map_or(0, Vec::len);
        if row_count == 0 || reel_count == 0 || rows.iter().any(|r| r.len() != reel_count) {
            return Err(EngineError::InvalidGrid {
                reels: reel_count,
                rows: row_count,
            });
        }

        let mut cells = Vec::with_capacity(reel_count * row_count);
        for reel in 0..reel_count {
            for row in &rows {
                cells.push(row[reel]);
            }
        }

        Ok(Self {
            reels: reel_count,
            rows: row_count,
            cells,
        })
    }

    pub fn reels(&self) -> usize {
        self.reels
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn contains(&self, cell: Cell) -> bool {
        cell.reel < self.reels && cell.row < self.rows
    }

    pub fn get(&self, cell: Cell) -> Option<SymbolId> {
        self.contains(cell)
            .then(|| self.cells[cell.reel * self.rows + cell.row])
    }

    /// All symbols of one row, left to right
    pub fn row(&self, row: usize) -> Vec<SymbolId> {
        (0..self.reels)
            .filter_map(|reel| self.get(Cell::new(reel, row)))
            .collect()
    }

    /// Number of cells holding `symbol`
    pub fn count(&self, symbol: SymbolId) -> usize {
        self.cells.iter().filter(|&&s| s == symbol).count()
    }

    /// Copy with the given cells blanked out; out-of-range cells are ignored
    pub fn masked(&self, cells: &[Cell]) -> Grid {
        let mut masked = self.clone();
        for &cell in cells {
            if self.contains(cell) {
                masked.cells[cell.reel * self.rows + cell.row] = SymbolId::VOID;
            }
        }
        masked
    }

    /// Copy with every cell of `row` set to `symbol`
    pub fn with_row(&self, row: usize, symbol: SymbolId) -> Grid {
        let mut filled = self.clone();
        if row < self.rows {
            for reel in 0..self.reels {
                filled.cells[reel * self.rows + row] = symbol;
            }
        }
        filled
    }

    /// Render rows using paytable names
    pub fn render(&self, paytable: &Paytable) -> String {
        let width = paytable
            .entries()
            .iter()
            .map(|e| e.name.len())
            .max()
            .unwrap_or(4);

        (0..self.rows)
            .map(|row| {
                self.row(row)
                    .into_iter()
                    .map(|symbol| format!("{:^width$}", paytable.name_of(symbol)))
                    .collect::<Vec<_>>()
                    .join(" | ")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..self.rows {
            let symbols: Vec<String> = self.row(row).iter().map(ToString::to_string).collect();
            writeln!(f, "{}", symbols.join(" "))?;
        }
        Ok(())
    }
}

/// Draw a fresh grid, each cell independently from the paytable's distribution
///
/// # Errors
///
/// * `EngineError::InvalidGrid` - zero reels or rows
pub fn draw<R: Rng>(
    paytable: &Paytable,
    reels: usize,
    rows: usize,
    rng: &mut R,
) -> EngineResult<Grid> {
    if reels == 0 || rows == 0 {
        return Err(EngineError::InvalidGrid { reels, rows });
    }

    let cells = (0..reels * rows)
        .map(|_| paytable.pick(rng.random::<f64>()))
        .collect();

    Ok(Grid { reels, rows, cells })
}

/// Draw where each cell past the first reel repeats its left neighbour with
/// probability `repeat_chance`, else is drawn from the paytable
///
/// # Errors
///
/// * `EngineError::InvalidGrid` - zero reels or rows
pub fn draw_repeating<R: Rng>(
    paytable: &Paytable,
    reels: usize,
    rows: usize,
    repeat_chance: f64,
    rng: &mut R,
) -> EngineResult<Grid> {
    if reels == 0 || rows == 0 {
        return Err(EngineError::InvalidGrid { reels, rows });
    }

    let mut cells: Vec<SymbolId> = Vec::with_capacity(reels * rows);
    for reel in 0..reels {
        for row in 0..rows {
            let symbol = if reel > 0 && rng.random::<f64>() < repeat_chance {
                cells[(reel - 1) * rows + row]
            } else {
                paytable.pick(rng.random::<f64>())
            };
            cells.push(symbol);
        }
    }

    Ok(Grid { reels, rows, cells })
}
