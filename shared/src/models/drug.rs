//! Drug master data models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A drug in the pharmacy catalogue. Referenced by batches, movements,
/// purchases, and prescriptions; never mutated by the stock engine itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Drug {
    pub id: Uuid,
    pub name: String,
    /// Unit of measure shown everywhere a quantity appears
    pub unit: String,
    pub unit_price: Decimal,
    /// Threshold under which the drug counts as low stock
    pub min_stock: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A drug paired with its projected stock, for catalogue and low-stock views
#[derive(Debug, Clone, Serialize)]
pub struct DrugWithStock {
    #[serde(flatten)]
    pub drug: Drug,
    pub total_quantity: i64,
    pub nearest_expiry: Option<chrono::NaiveDate>,
}
