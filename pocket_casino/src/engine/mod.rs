//! Outcome and payout engine.
//!
//! Pure functions from a paytable and a random source to a grid, from a grid
//! and line definitions to matches, and from matches and modifiers to a payout.
//! Nothing here touches the ledger; game sessions wire the two together.

pub mod errors;
pub mod evaluator;
pub mod generator;
pub mod payout;
pub mod paytable;
pub mod variants;

pub use errors::{EngineError, EngineResult};
pub use evaluator::{LineDefinition, LineShape, MIN_RUN, MatchPolicy, MatchResult, evaluate};
pub use generator::{Cell, Grid, draw, draw_repeating};
pub use payout::{
    ActiveModifier, Expiry, ModifierChain, ModifierEffect, ModifierStage, TierSchedule, TierStep,
    TierTable, apply_modifiers, base_amount, compute_payout,
};
pub use paytable::{DEFAULT_TOLERANCE, Paytable, PaytableEntry, SymbolId};
pub use variants::{
    AssistRules, BonusRules, DrawMultiplier, DriftWarning, LineSet, LineWin, SlotVariant,
    SpinOutcome, VariantDefinition, audit_variants,
};
