//! Purchase order models

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a purchase order. Inventory is credited only on the
/// transition into `Finalized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    Draft,
    Finalized,
    Cancelled,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Draft => "draft",
            PurchaseStatus::Finalized => "finalized",
            PurchaseStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(PurchaseStatus::Draft),
            "finalized" => Some(PurchaseStatus::Finalized),
            "cancelled" => Some(PurchaseStatus::Cancelled),
            _ => None,
        }
    }

    /// Whether a status change is allowed. Finalized and cancelled are
    /// terminal; in particular there is no re-finalization.
    pub fn can_transition(&self, to: PurchaseStatus) -> bool {
        matches!(
            (self, to),
            (PurchaseStatus::Draft, PurchaseStatus::Finalized)
                | (PurchaseStatus::Draft, PurchaseStatus::Cancelled)
        )
    }
}

/// A purchase order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Purchase {
    pub id: Uuid,
    pub supplier: String,
    pub note: Option<String>,
    pub status: PurchaseStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One line of a purchase order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseItem {
    pub id: Uuid,
    pub purchase_id: Uuid,
    pub drug_id: Uuid,
    pub quantity: i32,
    pub unit_cost: Option<Decimal>,
    /// Assigned at insertion when the supplier did not provide one
    pub lot_code: Option<String>,
    pub expires_at: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

/// A purchase order with its lines
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseWithItems {
    #[serde(flatten)]
    pub purchase: Purchase,
    pub items: Vec<PurchaseItem>,
}
