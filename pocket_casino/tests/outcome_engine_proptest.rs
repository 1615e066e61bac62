/// Property-based tests for the outcome engine and the ledger using proptest
///
/// These tests check the invariants that must hold for any draw, any
/// modifier chain and any sequence of wagers.
use chrono::Utc;
use pocket_casino::{
    CasinoConfig, LedgerError,
    engine::{
        ActiveModifier, DEFAULT_TOLERANCE, Expiry, Grid, LineDefinition, MIN_RUN, MatchPolicy,
        ModifierEffect, ModifierStage, Paytable, PaytableEntry, SlotVariant, SymbolId,
        apply_modifiers, draw, evaluate,
    },
    ledger::{BalanceSnapshot, Ledger},
    store::MemoryStore,
};
use proptest::prelude::*;
use rand::{SeedableRng, rngs::StdRng};
use std::sync::Arc;

// Weights in 1..100, normalized into probabilities
fn paytable_strategy() -> impl Strategy<Value = Paytable> {
    prop::collection::vec(1u32..100, 1..12).prop_map(|weights| {
        let total: u32 = weights.iter().sum();
        let entries = weights
            .iter()
            .enumerate()
            .map(|(i, &w)| {
                PaytableEntry::new(i as u16, &format!("s{i}"), i as u64 + 1, f64::from(w) / f64::from(total))
            })
            .collect();
        Paytable::new(entries, DEFAULT_TOLERANCE).unwrap()
    })
}

fn modifier_strategy() -> impl Strategy<Value = ActiveModifier> {
    let effect = prop_oneof![
        (0.0f64..10.0).prop_map(ModifierEffect::Multiplicative),
        (-1000i64..1000).prop_map(ModifierEffect::Additive),
        Just(ModifierEffect::FloorAtZero),
    ];
    let stage = prop_oneof![
        Just(ModifierStage::Glitch),
        Just(ModifierStage::PowerUp),
        Just(ModifierStage::Debuff),
        Just(ModifierStage::SpecialMode),
    ];
    (stage, effect).prop_map(|(stage, effect)| {
        ActiveModifier::new("prop", stage, effect, Expiry::Spins(1))
    })
}

// Wager operations: true debits, false credits
fn operations_strategy() -> impl Strategy<Value = Vec<(bool, u64)>> {
    prop::collection::vec((any::<bool>(), 0u64..500), 0..60)
}

fn ledger(balance: u64) -> Ledger {
    let opening = BalanceSnapshot {
        balance,
        written_at: Utc::now(),
    };
    let (ledger, worker) =
        Ledger::open(Arc::new(MemoryStore::new()), opening, &CasinoConfig::in_memory());
    tokio::spawn(worker.run());
    ledger
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn test_pick_always_returns_a_table_symbol(table in paytable_strategy(), u in 0.0f64..1.0) {
        let symbol = table.pick(u);
        prop_assert!(table.entry(symbol).is_some(), "picked {} outside the table", symbol);
    }

    #[test]
    fn test_draw_fills_every_cell(table in paytable_strategy(), seed in any::<u64>(), reels in 1usize..7, rows in 1usize..5) {
        let mut rng = StdRng::seed_from_u64(seed);
        let grid = draw(&table, reels, rows, &mut rng).unwrap();

        prop_assert_eq!(grid.reels(), reels);
        prop_assert_eq!(grid.rows(), rows);
        for row in 0..rows {
            for symbol in grid.row(row) {
                prop_assert!(table.entry(symbol).is_some());
            }
        }
    }

    #[test]
    fn test_contiguous_matches_are_real_runs(seed in any::<u64>()) {
        let variant = SlotVariant::preset("advanced", DEFAULT_TOLERANCE).unwrap();
        let mut rng = StdRng::seed_from_u64(seed);
        let grid = draw(variant.paytable(), variant.reels(), variant.rows(), &mut rng).unwrap();
        let lines = &variant.line_sets()[0].lines;

        for m in evaluate(&grid, lines, MatchPolicy::ContiguousFromLeft).unwrap() {
            prop_assert!(m.run_length >= MIN_RUN);
            prop_assert_eq!(m.cells.len(), m.run_length);
            for cell in &m.cells {
                prop_assert_eq!(grid.get(*cell), Some(m.symbol));
            }
        }
    }

    #[test]
    fn test_void_row_never_matches(len in 1usize..8, policy_idx in 0usize..3) {
        let grid = Grid::from_rows(vec![vec![SymbolId::VOID; len]]).unwrap();
        let policy = match policy_idx {
            0 => MatchPolicy::ContiguousFromLeft,
            1 => MatchPolicy::BestWindow,
            _ => MatchPolicy::Majority { min_count: None },
        };
        let lines = [LineDefinition::straight(0, 0, len)];
        prop_assert!(evaluate(&grid, &lines, policy).unwrap().is_empty());
    }

    #[test]
    fn test_modifiers_never_go_negative(base in 0u64..1_000_000, chain in prop::collection::vec(modifier_strategy(), 0..8)) {
        // A negative running amount must clamp, not wrap around.
        let amount = apply_modifiers(base, &chain);
        let additive: i64 = chain
            .iter()
            .filter_map(|m| match m.effect {
                ModifierEffect::Additive(delta) if delta > 0 => Some(delta),
                _ => None,
            })
            .sum();
        let bound = (base as f64 + additive as f64) * 10f64.powi(chain.len() as i32);
        prop_assert!((amount as f64) <= bound + 1.0);
    }

    #[test]
    fn test_settle_is_deterministic(seed in any::<u64>(), wager in 1u64..100) {
        for name in SlotVariant::preset_names() {
            let variant = SlotVariant::preset(name, DEFAULT_TOLERANCE).unwrap();
            let mut rng = StdRng::seed_from_u64(seed);
            let grid = draw(variant.paytable(), variant.reels(), variant.rows(), &mut rng).unwrap();

            let first = variant.settle(&grid, wager, &[]).unwrap();
            let second = variant.settle(&grid, wager, &[]).unwrap();
            prop_assert_eq!(first.payout, second.payout);
            prop_assert_eq!(first.base, first.payout);
        }
    }

    #[test]
    fn test_balance_never_negative(start in 0u64..2000, ops in operations_strategy()) {
        let rt = runtime();
        rt.block_on(async {
            let ledger = ledger(start);
            let mut expected = start;

            for (is_debit, amount) in ops {
                if is_debit {
                    match ledger.debit(amount).await {
                        Ok(balance) => {
                            expected -= amount;
                            assert_eq!(balance, expected);
                        }
                        Err(LedgerError::InsufficientFunds { available, required }) => {
                            assert_eq!(available, expected);
                            assert!(required > available);
                        }
                        Err(LedgerError::InvalidAmount(0)) => assert_eq!(amount, 0),
                        Err(e) => panic!("unexpected {e}"),
                    }
                } else {
                    expected += amount;
                    assert_eq!(ledger.credit(amount).await.unwrap(), expected);
                }
            }
            assert_eq!(ledger.balance().await, expected);
        });
    }

    #[test]
    fn test_debit_then_credit_restores(start in 1u64..10_000, fraction in 0.0f64..1.0) {
        let rt = runtime();
        rt.block_on(async {
            let ledger = ledger(start);
            let amount = ((start as f64 * fraction) as u64).max(1);

            ledger.debit(amount).await.unwrap();
            ledger.credit(amount).await.unwrap();
            assert_eq!(ledger.balance().await, start);

            let history = ledger.history(10).await;
            assert_eq!(history.len(), 2);
            assert_eq!(history[0].delta + history[1].delta, 0);
        });
    }
}

#[test]
fn test_floor_at_zero_clamps_debuff() {
    let chain = [
        ActiveModifier::new(
            "leak",
            ModifierStage::Debuff,
            ModifierEffect::Additive(-500),
            Expiry::Spins(1),
        ),
        ActiveModifier::new(
            "boost",
            ModifierStage::PowerUp,
            ModifierEffect::Multiplicative(2.0),
            Expiry::Spins(1),
        ),
    ];
    // Power-ups apply before debuffs: 100 * 2 - 500 clamps to zero.
    assert_eq!(apply_modifiers(100, &chain), 0);
}
