//! First-Expired-First-Out batch allocation
//!
//! Pure planning logic: given a snapshot of a drug's open batches, decide
//! which batches a debit or credit should touch. Callers execute the plan
//! against storage; nothing here performs side effects.

use chrono::NaiveDate;
use uuid::Uuid;

/// Snapshot of one batch considered for allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOnHand {
    pub id: Uuid,
    pub quantity: i32,
    pub expires_at: Option<NaiveDate>,
}

/// One planned debit against a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub batch_id: Uuid,
    pub quantity: i32,
}

/// Sort key for consumption order: expiry ascending, undated batches last.
pub fn expiry_rank(expires_at: Option<NaiveDate>) -> NaiveDate {
    expires_at.unwrap_or(NaiveDate::MAX)
}

/// Order batches for consumption. Ties keep the input order, so callers
/// that load batches in creation order get oldest-first within a date.
pub fn fefo_order(batches: &[BatchOnHand]) -> Vec<BatchOnHand> {
    let mut ordered = batches.to_vec();
    ordered.sort_by_key(|b| expiry_rank(b.expires_at));
    ordered
}

/// Plan debits covering `need` units across `batches` in FEFO order.
///
/// Each visited batch contributes `min(batch.quantity, need_remaining)`.
/// When total stock cannot cover the need the plan is partial; the
/// shortfall is not an error here, the caller decides what it means.
pub fn allocate(need: i32, batches: &[BatchOnHand]) -> Vec<Allocation> {
    let mut plan = Vec::new();
    if need <= 0 {
        return plan;
    }

    let mut remaining = need;
    for batch in fefo_order(batches) {
        if remaining == 0 {
            break;
        }
        let take = batch.quantity.min(remaining);
        if take <= 0 {
            continue;
        }
        plan.push(Allocation {
            batch_id: batch.id,
            quantity: take,
        });
        remaining -= take;
    }

    plan
}

/// Pick the batch a return or credit lands in: the soonest-expiring one,
/// regardless of its current quantity. Returns `None` when the drug has no
/// open batch at all.
pub fn pick_return_target(batches: &[BatchOnHand]) -> Option<Uuid> {
    batches
        .iter()
        .min_by_key(|b| expiry_rank(b.expires_at))
        .map(|b| b.id)
}

/// Debit actually applied by a floored OUT: never more than what the batch
/// holds, never negative.
pub fn clamp_out(available: i32, requested: i32) -> i32 {
    requested.min(available).max(0)
}
