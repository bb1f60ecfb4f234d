//! Prescription line service: dispensing, edits, and returns
//!
//! Every write here is one transaction covering both the line row and its
//! stock effects: inserts consume in FEFO order, quantity increases consume
//! the delta, decreases and deletes put stock back into the
//! soonest-expiring batch.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{quantity_delta, MovementSource, PrescriptionItem, QuantityDelta};
use crate::services::stock::StockService;
use shared::validation::validate_line_quantity;

/// Prescription service for line CRUD and the linked stock effects
#[derive(Clone)]
pub struct PrescriptionService {
    db: PgPool,
}

/// Input for creating a prescription line
#[derive(Debug, Deserialize)]
pub struct CreatePrescriptionInput {
    pub record_id: Uuid,
    pub drug_id: Uuid,
    pub quantity: i32,
    pub dosage_note: Option<String>,
}

/// Input for updating a prescription line's quantity
#[derive(Debug, Deserialize)]
pub struct UpdatePrescriptionInput {
    pub quantity: i32,
}

type PrescriptionRow = (
    Uuid,
    Uuid,
    Uuid,
    i32,
    Option<String>,
    DateTime<Utc>,
    DateTime<Utc>,
);

fn item_from_row(row: PrescriptionRow) -> PrescriptionItem {
    PrescriptionItem {
        id: row.0,
        record_id: row.1,
        drug_id: row.2,
        quantity: row.3,
        dosage_note: row.4,
        created_at: row.5,
        updated_at: row.6,
    }
}

impl PrescriptionService {
    /// Create a new PrescriptionService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Record a prescription line and dispense its quantity from stock in
    /// FEFO order. A short allocation does not fail the write.
    pub async fn create_item(&self, input: CreatePrescriptionInput) -> AppResult<PrescriptionItem> {
        validate_line_quantity(input.quantity).map_err(|message| AppError::Validation {
            field: "quantity".to_string(),
            message: message.to_string(),
        })?;

        let drug_exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM drugs WHERE id = $1 AND deleted_at IS NULL)",
        )
        .bind(input.drug_id)
        .fetch_one(&self.db)
        .await?;

        if !drug_exists {
            return Err(AppError::NotFound("Drug".to_string()));
        }

        let mut tx = self.db.begin().await?;

        let row = sqlx::query_as::<_, PrescriptionRow>(
            r#"
            INSERT INTO prescription_items (record_id, drug_id, quantity, dosage_note)
            VALUES ($1, $2, $3, $4)
            RETURNING id, record_id, drug_id, quantity, dosage_note, created_at, updated_at
            "#,
        )
        .bind(input.record_id)
        .bind(input.drug_id)
        .bind(input.quantity)
        .bind(&input.dosage_note)
        .fetch_one(&mut *tx)
        .await?;

        let item = item_from_row(row);

        if item.quantity > 0 {
            StockService::consume_fefo(
                &mut tx,
                item.drug_id,
                item.quantity,
                MovementSource::Prescription,
                Some(item.record_id),
            )
            .await?;
        }

        tx.commit().await?;

        tracing::info!(item_id = %item.id, record_id = %item.record_id,
            drug_id = %item.drug_id, quantity = item.quantity, "prescription line dispensed");

        Ok(item)
    }

    /// Change a line's quantity. An increase consumes the delta in FEFO
    /// order; a decrease returns the difference into the soonest-expiring
    /// batch. Both sides of the edit use the adjustment source so the
    /// ledger distinguishes edits from the original dispense.
    pub async fn update_item(
        &self,
        item_id: Uuid,
        input: UpdatePrescriptionInput,
    ) -> AppResult<PrescriptionItem> {
        validate_line_quantity(input.quantity).map_err(|message| AppError::Validation {
            field: "quantity".to_string(),
            message: message.to_string(),
        })?;

        let mut tx = self.db.begin().await?;

        let old_quantity = sqlx::query_scalar::<_, i32>(
            r#"
            SELECT quantity
            FROM prescription_items
            WHERE id = $1 AND deleted_at IS NULL
            FOR UPDATE
            "#,
        )
        .bind(item_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Prescription item".to_string()))?;

        let row = sqlx::query_as::<_, PrescriptionRow>(
            r#"
            UPDATE prescription_items
            SET quantity = $1, updated_at = NOW()
            WHERE id = $2
            RETURNING id, record_id, drug_id, quantity, dosage_note, created_at, updated_at
            "#,
        )
        .bind(input.quantity)
        .bind(item_id)
        .fetch_one(&mut *tx)
        .await?;

        let item = item_from_row(row);

        match quantity_delta(old_quantity, item.quantity) {
            QuantityDelta::Consume(delta) => {
                StockService::consume_fefo(
                    &mut tx,
                    item.drug_id,
                    delta,
                    MovementSource::PrescriptionAdjust,
                    Some(item.record_id),
                )
                .await?;
            }
            QuantityDelta::Return(delta) => {
                StockService::credit_return(
                    &mut tx,
                    item.drug_id,
                    delta,
                    MovementSource::PrescriptionAdjust,
                    Some(item.record_id),
                )
                .await?;
            }
            QuantityDelta::Unchanged => {}
        }

        tx.commit().await?;

        tracing::info!(item_id = %item.id, old_quantity, new_quantity = item.quantity,
            "prescription line updated");

        Ok(item)
    }

    /// Soft-delete a line and return its full quantity to stock, tagged
    /// with the prescription source like the original dispense.
    pub async fn delete_item(&self, item_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        let row = sqlx::query_as::<_, (Uuid, Uuid, i32)>(
            r#"
            SELECT record_id, drug_id, quantity
            FROM prescription_items
            WHERE id = $1 AND deleted_at IS NULL
            FOR UPDATE
            "#,
        )
        .bind(item_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Prescription item".to_string()))?;

        let (record_id, drug_id, quantity) = row;

        sqlx::query("UPDATE prescription_items SET deleted_at = NOW() WHERE id = $1")
            .bind(item_id)
            .execute(&mut *tx)
            .await?;

        if quantity > 0 {
            StockService::credit_return(
                &mut tx,
                drug_id,
                quantity,
                MovementSource::Prescription,
                Some(record_id),
            )
            .await?;
        }

        tx.commit().await?;

        tracing::info!(item_id = %item_id, drug_id = %drug_id, quantity,
            "prescription line deleted and stock returned");

        Ok(())
    }

    /// List the non-deleted lines of one medical record.
    pub async fn list_for_record(&self, record_id: Uuid) -> AppResult<Vec<PrescriptionItem>> {
        let rows = sqlx::query_as::<_, PrescriptionRow>(
            r#"
            SELECT id, record_id, drug_id, quantity, dosage_note, created_at, updated_at
            FROM prescription_items
            WHERE record_id = $1 AND deleted_at IS NULL
            ORDER BY created_at
            "#,
        )
        .bind(record_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(item_from_row).collect())
    }
}
