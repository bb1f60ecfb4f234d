//! FEFO allocator tests
//!
//! Covers consumption ordering (expiry ascending, undated last), partial
//! allocation on short stock, and allocation invariants as properties.

use chrono::NaiveDate;
use proptest::prelude::*;
use uuid::Uuid;

use shared::fefo::{allocate, clamp_out, expiry_rank, fefo_order, pick_return_target, BatchOnHand};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn batch(quantity: i32, expires_at: Option<NaiveDate>) -> BatchOnHand {
    BatchOnHand {
        id: Uuid::new_v4(),
        quantity,
        expires_at,
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[test]
fn consumes_across_batches_in_expiry_order() {
    let b1 = batch(10, Some(date(2025, 1, 31)));
    let b2 = batch(10, Some(date(2026, 6, 30)));

    let plan = allocate(12, &[b2.clone(), b1.clone()]);

    assert_eq!(plan.len(), 2);
    assert_eq!((plan[0].batch_id, plan[0].quantity), (b1.id, 10));
    assert_eq!((plan[1].batch_id, plan[1].quantity), (b2.id, 2));
}

#[test]
fn undated_batch_is_never_taken_while_dated_stock_remains() {
    let undated = batch(100, None);
    let dated = batch(6, Some(date(2027, 12, 1)));

    let plan = allocate(6, &[undated.clone(), dated.clone()]);

    assert_eq!(plan.len(), 1);
    assert_eq!(plan[0].batch_id, dated.id);
}

#[test]
fn undated_batch_absorbs_the_overflow() {
    let undated = batch(100, None);
    let dated = batch(6, Some(date(2027, 12, 1)));

    let plan = allocate(10, &[undated.clone(), dated.clone()]);

    assert_eq!(plan.len(), 2);
    assert_eq!((plan[0].batch_id, plan[0].quantity), (dated.id, 6));
    assert_eq!((plan[1].batch_id, plan[1].quantity), (undated.id, 4));
}

#[test]
fn short_stock_yields_a_partial_plan_without_error() {
    let b = batch(4, Some(date(2025, 3, 1)));

    let plan = allocate(9, &[b.clone()]);

    let total: i32 = plan.iter().map(|a| a.quantity).sum();
    assert_eq!(total, 4);
}

#[test]
fn no_stock_yields_an_empty_plan() {
    assert!(allocate(5, &[]).is_empty());
}

#[test]
fn expiry_rank_sorts_none_last() {
    assert!(expiry_rank(Some(date(2099, 12, 31))) < expiry_rank(None));
}

#[test]
fn ties_keep_creation_order() {
    let first = batch(5, Some(date(2025, 6, 1)));
    let second = batch(5, Some(date(2025, 6, 1)));

    let ordered = fefo_order(&[first.clone(), second.clone()]);
    assert_eq!(ordered[0].id, first.id);
    assert_eq!(ordered[1].id, second.id);
}

#[test]
fn return_target_is_the_soonest_expiring_batch_even_when_empty() {
    let empty_soon = batch(0, Some(date(2025, 2, 1)));
    let full_late = batch(40, Some(date(2026, 2, 1)));

    assert_eq!(
        pick_return_target(&[full_late, empty_soon.clone()]),
        Some(empty_soon.id)
    );
}

// ============================================================================
// Property-Based Tests
// ============================================================================

fn batch_strategy() -> impl Strategy<Value = BatchOnHand> {
    (0i32..=200, proptest::option::of(0i64..=2000)).prop_map(|(quantity, day_offset)| BatchOnHand {
        id: Uuid::new_v4(),
        quantity,
        expires_at: day_offset
            .map(|o| date(2025, 1, 1) + chrono::Duration::days(o)),
    })
}

fn batches_strategy() -> impl Strategy<Value = Vec<BatchOnHand>> {
    prop::collection::vec(batch_strategy(), 0..12)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Total allocated is exactly min(need, total available stock).
    #[test]
    fn prop_allocation_total_is_min_of_need_and_stock(
        need in 1i32..=500,
        batches in batches_strategy()
    ) {
        let available: i32 = batches.iter().map(|b| b.quantity.max(0)).sum();
        let plan = allocate(need, &batches);
        let allocated: i32 = plan.iter().map(|a| a.quantity).sum();

        prop_assert_eq!(allocated, need.min(available));
    }

    /// No batch is debited past what it holds, and no debit is zero.
    #[test]
    fn prop_debits_are_positive_and_within_batch_quantity(
        need in 1i32..=500,
        batches in batches_strategy()
    ) {
        let plan = allocate(need, &batches);

        for debit in &plan {
            let source = batches.iter().find(|b| b.id == debit.batch_id).unwrap();
            prop_assert!(debit.quantity > 0);
            prop_assert!(debit.quantity <= source.quantity);
        }
    }

    /// Each batch appears at most once in a plan.
    #[test]
    fn prop_no_batch_is_visited_twice(
        need in 1i32..=500,
        batches in batches_strategy()
    ) {
        let plan = allocate(need, &batches);
        let mut seen = std::collections::HashSet::new();

        for debit in &plan {
            prop_assert!(seen.insert(debit.batch_id));
        }
    }

    /// Debits come out in expiry order, undated batches last.
    #[test]
    fn prop_plan_respects_expiry_order(
        need in 1i32..=500,
        batches in batches_strategy()
    ) {
        let plan = allocate(need, &batches);
        let ranks: Vec<_> = plan
            .iter()
            .map(|a| {
                let b = batches.iter().find(|b| b.id == a.batch_id).unwrap();
                expiry_rank(b.expires_at)
            })
            .collect();

        prop_assert!(ranks.windows(2).all(|w| w[0] <= w[1]));
    }

    /// A batch with a null expiry is only debited once every dated batch
    /// with stock is exhausted by the plan.
    #[test]
    fn prop_undated_only_after_dated_is_drained(
        need in 1i32..=500,
        batches in batches_strategy()
    ) {
        let plan = allocate(need, &batches);
        let undated_hit = plan.iter().any(|a| {
            batches
                .iter()
                .find(|b| b.id == a.batch_id)
                .unwrap()
                .expires_at
                .is_none()
        });

        if undated_hit {
            for b in batches.iter().filter(|b| b.expires_at.is_some() && b.quantity > 0) {
                let debited: i32 = plan
                    .iter()
                    .filter(|a| a.batch_id == b.id)
                    .map(|a| a.quantity)
                    .sum();
                prop_assert_eq!(debited, b.quantity);
            }
        }
    }

    /// The clamp never removes more than the batch holds and never goes
    /// negative.
    #[test]
    fn prop_clamp_bounds(available in 0i32..=1000, requested in 0i32..=1000) {
        let taken = clamp_out(available, requested);

        prop_assert!(taken >= 0);
        prop_assert!(taken <= available);
        prop_assert!(taken <= requested);
        if requested <= available {
            prop_assert_eq!(taken, requested);
        } else {
            prop_assert_eq!(taken, available);
        }
    }
}
