//! Prescription flow tests
//!
//! Walks the prescription write paths (insert, quantity edit, delete)
//! against an in-memory batch store, checking the delta classification,
//! the FEFO consumption on increases, and the single-batch return rule on
//! decreases and deletes.

use chrono::NaiveDate;
use uuid::Uuid;

use shared::fefo::{allocate, pick_return_target, BatchOnHand};
use shared::models::{quantity_delta, MovementDirection, MovementSource, QuantityDelta};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[derive(Debug, Clone)]
struct TestBatch {
    id: Uuid,
    lot_code: String,
    quantity: i32,
    expires_at: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
struct TestMovement {
    batch_id: Uuid,
    direction: MovementDirection,
    source: MovementSource,
    source_id: Option<Uuid>,
    quantity: i32,
}

#[derive(Debug, Clone)]
struct Line {
    record_id: Uuid,
    quantity: i32,
    deleted: bool,
}

/// One drug's stock plus one prescription line, driven the way the
/// service drives the engine.
#[derive(Debug)]
struct Dispensary {
    batches: Vec<TestBatch>,
    ledger: Vec<TestMovement>,
    line: Option<Line>,
}

impl Dispensary {
    fn new() -> Self {
        Self {
            batches: Vec::new(),
            ledger: Vec::new(),
            line: None,
        }
    }

    fn with_batch(mut self, lot_code: &str, quantity: i32, expires_at: Option<NaiveDate>) -> Self {
        self.batches.push(TestBatch {
            id: Uuid::new_v4(),
            lot_code: lot_code.to_string(),
            quantity,
            expires_at,
        });
        self
    }

    fn on_hand(&self) -> Vec<BatchOnHand> {
        self.batches
            .iter()
            .map(|b| BatchOnHand {
                id: b.id,
                quantity: b.quantity,
                expires_at: b.expires_at,
            })
            .collect()
    }

    fn batch_mut(&mut self, id: Uuid) -> &mut TestBatch {
        self.batches.iter_mut().find(|b| b.id == id).unwrap()
    }

    fn batch_by_lot(&self, lot_code: &str) -> Option<&TestBatch> {
        self.batches.iter().find(|b| b.lot_code == lot_code)
    }

    fn consume(&mut self, need: i32, source: MovementSource, source_id: Uuid) {
        for debit in allocate(need, &self.on_hand()) {
            self.batch_mut(debit.batch_id).quantity -= debit.quantity;
            self.ledger.push(TestMovement {
                batch_id: debit.batch_id,
                direction: MovementDirection::Out,
                source,
                source_id: Some(source_id),
                quantity: debit.quantity,
            });
        }
    }

    fn credit_return(&mut self, quantity: i32, source: MovementSource, source_id: Uuid) {
        let batch_id = match pick_return_target(&self.on_hand()) {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4();
                self.batches.push(TestBatch {
                    id,
                    lot_code: format!("RET-{}", self.batches.len()),
                    quantity: 0,
                    expires_at: None,
                });
                id
            }
        };
        self.batch_mut(batch_id).quantity += quantity;
        self.ledger.push(TestMovement {
            batch_id,
            direction: MovementDirection::In,
            source,
            source_id: Some(source_id),
            quantity,
        });
    }

    /// Prescription insert: record the line, dispense in FEFO order.
    fn insert_line(&mut self, record_id: Uuid, quantity: i32) {
        self.line = Some(Line {
            record_id,
            quantity,
            deleted: false,
        });
        if quantity > 0 {
            self.consume(quantity, MovementSource::Prescription, record_id);
        }
    }

    /// Prescription quantity edit: classify the delta, consume or return.
    fn update_line(&mut self, new_quantity: i32) {
        let line = self.line.as_mut().expect("line exists");
        let old_quantity = line.quantity;
        let record_id = line.record_id;
        line.quantity = new_quantity;

        match quantity_delta(old_quantity, new_quantity) {
            QuantityDelta::Consume(delta) => {
                self.consume(delta, MovementSource::PrescriptionAdjust, record_id)
            }
            QuantityDelta::Return(delta) => {
                self.credit_return(delta, MovementSource::PrescriptionAdjust, record_id)
            }
            QuantityDelta::Unchanged => {}
        }
    }

    /// Prescription delete: soft-delete the line, return its full
    /// quantity under the prescription source.
    fn delete_line(&mut self) {
        let line = self.line.as_mut().expect("line exists");
        line.deleted = true;
        let quantity = line.quantity;
        let record_id = line.record_id;
        if quantity > 0 {
            self.credit_return(quantity, MovementSource::Prescription, record_id);
        }
    }

    fn total_on_hand(&self) -> i32 {
        self.batches.iter().map(|b| b.quantity).sum()
    }
}

// ============================================================================
// Insert path
// ============================================================================

#[test]
fn insert_dispenses_in_fefo_order_across_batches() {
    let mut d = Dispensary::new()
        .with_batch("B1", 10, Some(date(2025, 1, 31)))
        .with_batch("B2", 10, Some(date(2026, 6, 30)));
    let record_id = Uuid::new_v4();

    d.insert_line(record_id, 12);

    assert_eq!(d.batch_by_lot("B1").unwrap().quantity, 0);
    assert_eq!(d.batch_by_lot("B2").unwrap().quantity, 8);
    assert_eq!(d.ledger.len(), 2);
    assert!(d
        .ledger
        .iter()
        .all(|m| m.source == MovementSource::Prescription && m.source_id == Some(record_id)));
}

#[test]
fn insert_with_zero_quantity_touches_nothing() {
    let mut d = Dispensary::new().with_batch("B1", 10, None);

    d.insert_line(Uuid::new_v4(), 0);

    assert!(d.ledger.is_empty());
    assert_eq!(d.total_on_hand(), 10);
}

#[test]
fn insert_with_no_stock_records_the_line_without_movements() {
    let mut d = Dispensary::new();

    d.insert_line(Uuid::new_v4(), 5);

    assert!(d.line.is_some());
    assert!(d.ledger.is_empty());
    assert!(d.batches.is_empty());
}

// ============================================================================
// Update path
// ============================================================================

#[test]
fn increase_consumes_the_delta_as_an_adjustment() {
    let mut d = Dispensary::new().with_batch("B1", 20, Some(date(2025, 5, 1)));
    let record_id = Uuid::new_v4();
    d.insert_line(record_id, 5);

    d.update_line(9);

    assert_eq!(d.batch_by_lot("B1").unwrap().quantity, 11);
    let last = d.ledger.last().unwrap();
    assert_eq!(last.direction, MovementDirection::Out);
    assert_eq!(last.source, MovementSource::PrescriptionAdjust);
    assert_eq!(last.quantity, 4);
}

#[test]
fn increase_walks_fefo_across_batches() {
    let mut d = Dispensary::new()
        .with_batch("SOON", 2, Some(date(2025, 1, 1)))
        .with_batch("LATE", 20, Some(date(2026, 1, 1)));
    let record_id = Uuid::new_v4();
    d.insert_line(record_id, 0);

    d.update_line(5);

    assert_eq!(d.batch_by_lot("SOON").unwrap().quantity, 0);
    assert_eq!(d.batch_by_lot("LATE").unwrap().quantity, 17);
}

#[test]
fn decrease_deposits_into_the_single_soonest_expiring_batch() {
    let mut d = Dispensary::new()
        .with_batch("SOON", 10, Some(date(2025, 1, 1)))
        .with_batch("LATE", 10, Some(date(2026, 1, 1)));
    let record_id = Uuid::new_v4();
    d.insert_line(record_id, 8);
    let ledger_before = d.ledger.len();

    d.update_line(3);

    // One IN movement against one batch, not a spread.
    assert_eq!(d.ledger.len(), ledger_before + 1);
    let deposit = d.ledger.last().unwrap();
    assert_eq!(deposit.direction, MovementDirection::In);
    assert_eq!(deposit.source, MovementSource::PrescriptionAdjust);
    assert_eq!(deposit.quantity, 5);
    assert_eq!(deposit.batch_id, d.batch_by_lot("SOON").unwrap().id);
    assert_eq!(d.batch_by_lot("SOON").unwrap().quantity, 7);
}

#[test]
fn decrease_without_batches_creates_one_ret_batch() {
    let mut d = Dispensary::new();
    let record_id = Uuid::new_v4();
    d.insert_line(record_id, 3);

    d.update_line(0);

    assert_eq!(d.batches.len(), 1);
    let batch = &d.batches[0];
    assert!(batch.lot_code.starts_with("RET-"));
    assert_eq!(batch.quantity, 3);
    assert_eq!(d.ledger.len(), 1);
    assert_eq!(d.ledger[0].direction, MovementDirection::In);
    assert_eq!(d.ledger[0].quantity, 3);
}

#[test]
fn unchanged_quantity_is_a_no_op() {
    let mut d = Dispensary::new().with_batch("B1", 10, None);
    d.insert_line(Uuid::new_v4(), 4);
    let ledger_before = d.ledger.len();
    let on_hand_before = d.total_on_hand();

    d.update_line(4);

    assert_eq!(d.ledger.len(), ledger_before);
    assert_eq!(d.total_on_hand(), on_hand_before);
}

// ============================================================================
// Delete path
// ============================================================================

#[test]
fn delete_returns_the_full_quantity_with_prescription_source() {
    let mut d = Dispensary::new()
        .with_batch("SOON", 10, Some(date(2025, 3, 1)))
        .with_batch("LATE", 10, Some(date(2026, 3, 1)));
    let record_id = Uuid::new_v4();
    d.insert_line(record_id, 7);

    d.delete_line();

    assert!(d.line.as_ref().unwrap().deleted);
    let deposit = d.ledger.last().unwrap();
    assert_eq!(deposit.direction, MovementDirection::In);
    assert_eq!(deposit.source, MovementSource::Prescription);
    assert_eq!(deposit.source_id, Some(record_id));
    assert_eq!(deposit.quantity, 7);
    assert_eq!(deposit.batch_id, d.batch_by_lot("SOON").unwrap().id);
    assert_eq!(d.total_on_hand(), 20);
}

#[test]
fn delete_with_no_batches_creates_a_ret_batch() {
    let mut d = Dispensary::new();
    let record_id = Uuid::new_v4();
    d.insert_line(record_id, 6);

    d.delete_line();

    assert_eq!(d.batches.len(), 1);
    assert!(d.batches[0].lot_code.starts_with("RET-"));
    assert_eq!(d.batches[0].quantity, 6);
}

#[test]
fn insert_then_edit_then_delete_round_trip_conserves_stock() {
    let mut d = Dispensary::new()
        .with_batch("B1", 10, Some(date(2025, 1, 31)))
        .with_batch("B2", 10, Some(date(2026, 6, 30)));
    let record_id = Uuid::new_v4();

    d.insert_line(record_id, 12);
    d.update_line(15);
    d.update_line(9);
    d.delete_line();

    // Everything dispensed went back; total stock is what was received.
    assert_eq!(d.total_on_hand(), 20);

    let ins: i32 = d
        .ledger
        .iter()
        .filter(|m| m.direction == MovementDirection::In)
        .map(|m| m.quantity)
        .sum();
    let outs: i32 = d
        .ledger
        .iter()
        .filter(|m| m.direction == MovementDirection::Out)
        .map(|m| m.quantity)
        .sum();
    assert_eq!(ins, outs);
}
