//! Stock engine models: batches, the movement ledger, and the projection

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of a stock movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementDirection {
    In,
    Out,
}

impl MovementDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementDirection::In => "in",
            MovementDirection::Out => "out",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "in" => Some(MovementDirection::In),
            "out" => Some(MovementDirection::Out),
            _ => None,
        }
    }
}

/// What caused a stock movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementSource {
    Purchase,
    Prescription,
    PrescriptionAdjust,
    Adjustment,
}

impl MovementSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementSource::Purchase => "purchase",
            MovementSource::Prescription => "prescription",
            MovementSource::PrescriptionAdjust => "prescription_adjust",
            MovementSource::Adjustment => "adjustment",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "purchase" => Some(MovementSource::Purchase),
            "prescription" => Some(MovementSource::Prescription),
            "prescription_adjust" => Some(MovementSource::PrescriptionAdjust),
            "adjustment" => Some(MovementSource::Adjustment),
            _ => None,
        }
    }
}

/// One receipt lot of a drug
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrugBatch {
    pub id: Uuid,
    pub drug_id: Uuid,
    pub lot_code: String,
    pub quantity: i32,
    pub expires_at: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Immutable ledger entry recording one quantity change and its cause.
/// Ordering by `created_at` ascending is the replay/audit order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: Uuid,
    pub drug_id: Uuid,
    pub batch_id: Uuid,
    pub direction: MovementDirection,
    pub source: MovementSource,
    /// Purchase id or medical-record id; absent for manual adjustments
    pub source_id: Option<Uuid>,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

/// Read-only per-drug aggregation, recomputed from batch state on read
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockLevel {
    pub drug_id: Uuid,
    pub total_quantity: i64,
    /// Soonest expiry among batches that still hold stock
    pub nearest_expiry: Option<NaiveDate>,
}

/// Effect of editing a prescription line's quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityDelta {
    /// Additional units to consume from stock
    Consume(i32),
    /// Units to put back into stock
    Return(i32),
    Unchanged,
}

/// Classify a quantity edit into the stock effect it requires.
pub fn quantity_delta(old_quantity: i32, new_quantity: i32) -> QuantityDelta {
    match new_quantity - old_quantity {
        0 => QuantityDelta::Unchanged,
        d if d > 0 => QuantityDelta::Consume(d),
        d => QuantityDelta::Return(-d),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_round_trip() {
        for dir in [MovementDirection::In, MovementDirection::Out] {
            assert_eq!(MovementDirection::from_str(dir.as_str()), Some(dir));
        }
        assert_eq!(MovementDirection::from_str("sideways"), None);
    }

    #[test]
    fn source_round_trip() {
        for source in [
            MovementSource::Purchase,
            MovementSource::Prescription,
            MovementSource::PrescriptionAdjust,
            MovementSource::Adjustment,
        ] {
            assert_eq!(MovementSource::from_str(source.as_str()), Some(source));
        }
        assert_eq!(MovementSource::from_str("audit"), None);
    }

    #[test]
    fn delta_classification() {
        assert_eq!(quantity_delta(5, 9), QuantityDelta::Consume(4));
        assert_eq!(quantity_delta(9, 5), QuantityDelta::Return(4));
        assert_eq!(quantity_delta(7, 7), QuantityDelta::Unchanged);
        assert_eq!(quantity_delta(0, 3), QuantityDelta::Consume(3));
        assert_eq!(quantity_delta(3, 0), QuantityDelta::Return(3));
    }
}
