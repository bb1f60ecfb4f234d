//! Prescription line models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One drug line on a medical record's prescription. The record itself is
/// managed elsewhere; only its id is carried here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescriptionItem {
    pub id: Uuid,
    pub record_id: Uuid,
    pub drug_id: Uuid,
    pub quantity: i32,
    pub dosage_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
