//! Drug master-data service
//!
//! The stock engine references drugs but never mutates them; this service
//! owns the catalogue itself.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Drug, DrugWithStock};
use shared::validation::{
    validate_drug_name, validate_min_stock, validate_unit, validate_unit_price,
};

/// Drug service for catalogue management
#[derive(Clone)]
pub struct DrugService {
    db: PgPool,
}

/// Input for creating a drug
#[derive(Debug, Deserialize)]
pub struct CreateDrugInput {
    pub name: String,
    pub unit: String,
    pub unit_price: Decimal,
    pub min_stock: Option<i32>,
    pub is_active: Option<bool>,
}

/// Input for updating a drug
#[derive(Debug, Deserialize)]
pub struct UpdateDrugInput {
    pub name: Option<String>,
    pub unit: Option<String>,
    pub unit_price: Option<Decimal>,
    pub min_stock: Option<i32>,
    pub is_active: Option<bool>,
}

type DrugRow = (
    Uuid,
    String,
    String,
    Decimal,
    i32,
    bool,
    DateTime<Utc>,
    DateTime<Utc>,
);

fn drug_from_row(row: DrugRow) -> Drug {
    Drug {
        id: row.0,
        name: row.1,
        unit: row.2,
        unit_price: row.3,
        min_stock: row.4,
        is_active: row.5,
        created_at: row.6,
        updated_at: row.7,
    }
}

fn validation_error(field: &str, message: &str) -> AppError {
    AppError::Validation {
        field: field.to_string(),
        message: message.to_string(),
    }
}

impl DrugService {
    /// Create a new DrugService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create a drug. Names are unique among non-deleted drugs.
    pub async fn create(&self, input: CreateDrugInput) -> AppResult<Drug> {
        validate_drug_name(&input.name).map_err(|m| validation_error("name", m))?;
        validate_unit(&input.unit).map_err(|m| validation_error("unit", m))?;
        validate_unit_price(input.unit_price).map_err(|m| validation_error("unit_price", m))?;

        let min_stock = input.min_stock.unwrap_or(0);
        validate_min_stock(min_stock).map_err(|m| validation_error("min_stock", m))?;

        let name = input.name.trim();

        let name_taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM drugs WHERE LOWER(name) = LOWER($1) AND deleted_at IS NULL)",
        )
        .bind(name)
        .fetch_one(&self.db)
        .await?;

        if name_taken {
            return Err(AppError::DuplicateEntry("name".to_string()));
        }

        let row = sqlx::query_as::<_, DrugRow>(
            r#"
            INSERT INTO drugs (name, unit, unit_price, min_stock, is_active)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, unit, unit_price, min_stock, is_active, created_at, updated_at
            "#,
        )
        .bind(name)
        .bind(input.unit.trim())
        .bind(input.unit_price)
        .bind(min_stock)
        .bind(input.is_active.unwrap_or(true))
        .fetch_one(&self.db)
        .await?;

        Ok(drug_from_row(row))
    }

    /// List non-deleted drugs, name ascending.
    pub async fn list(&self) -> AppResult<Vec<Drug>> {
        let rows = sqlx::query_as::<_, DrugRow>(
            r#"
            SELECT id, name, unit, unit_price, min_stock, is_active, created_at, updated_at
            FROM drugs
            WHERE deleted_at IS NULL
            ORDER BY name
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(drug_from_row).collect())
    }

    /// Get a drug by id.
    pub async fn get(&self, drug_id: Uuid) -> AppResult<Drug> {
        let row = sqlx::query_as::<_, DrugRow>(
            r#"
            SELECT id, name, unit, unit_price, min_stock, is_active, created_at, updated_at
            FROM drugs
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(drug_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Drug".to_string()))?;

        Ok(drug_from_row(row))
    }

    /// Update a drug; absent fields keep their current value.
    pub async fn update(&self, drug_id: Uuid, input: UpdateDrugInput) -> AppResult<Drug> {
        let existing = self.get(drug_id).await?;

        let name = input.name.unwrap_or(existing.name);
        let unit = input.unit.unwrap_or(existing.unit);
        let unit_price = input.unit_price.unwrap_or(existing.unit_price);
        let min_stock = input.min_stock.unwrap_or(existing.min_stock);
        let is_active = input.is_active.unwrap_or(existing.is_active);

        validate_drug_name(&name).map_err(|m| validation_error("name", m))?;
        validate_unit(&unit).map_err(|m| validation_error("unit", m))?;
        validate_unit_price(unit_price).map_err(|m| validation_error("unit_price", m))?;
        validate_min_stock(min_stock).map_err(|m| validation_error("min_stock", m))?;

        let name = name.trim();

        let name_taken = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM drugs
                WHERE LOWER(name) = LOWER($1) AND id <> $2 AND deleted_at IS NULL
            )
            "#,
        )
        .bind(name)
        .bind(drug_id)
        .fetch_one(&self.db)
        .await?;

        if name_taken {
            return Err(AppError::DuplicateEntry("name".to_string()));
        }

        let row = sqlx::query_as::<_, DrugRow>(
            r#"
            UPDATE drugs
            SET name = $1, unit = $2, unit_price = $3, min_stock = $4, is_active = $5,
                updated_at = NOW()
            WHERE id = $6
            RETURNING id, name, unit, unit_price, min_stock, is_active, created_at, updated_at
            "#,
        )
        .bind(name)
        .bind(unit.trim())
        .bind(unit_price)
        .bind(min_stock)
        .bind(is_active)
        .bind(drug_id)
        .fetch_one(&self.db)
        .await?;

        Ok(drug_from_row(row))
    }

    /// Soft-delete a drug. Its batches and ledger rows remain for audit.
    pub async fn delete(&self, drug_id: Uuid) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE drugs
            SET deleted_at = NOW(), is_active = FALSE, updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(drug_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Drug".to_string()));
        }

        tracing::info!(drug_id = %drug_id, "drug deleted");

        Ok(())
    }

    /// Drugs whose projected stock sits at or below their minimum-stock
    /// threshold.
    pub async fn low_stock(&self) -> AppResult<Vec<DrugWithStock>> {
        let rows = sqlx::query_as::<_, (
            Uuid,
            String,
            String,
            Decimal,
            i32,
            bool,
            DateTime<Utc>,
            DateTime<Utc>,
            i64,
            Option<NaiveDate>,
        )>(
            r#"
            SELECT d.id, d.name, d.unit, d.unit_price, d.min_stock, d.is_active,
                   d.created_at, d.updated_at,
                   COALESCE(SUM(b.quantity), 0) AS total_quantity,
                   MIN(CASE WHEN b.quantity > 0 THEN b.expires_at END) AS nearest_expiry
            FROM drugs d
            LEFT JOIN drug_batches b ON b.drug_id = d.id AND b.deleted_at IS NULL
            WHERE d.deleted_at IS NULL AND d.is_active = TRUE
            GROUP BY d.id
            HAVING COALESCE(SUM(b.quantity), 0) <= d.min_stock
            ORDER BY d.name
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| DrugWithStock {
                drug: drug_from_row((r.0, r.1, r.2, r.3, r.4, r.5, r.6, r.7)),
                total_quantity: r.8,
                nearest_expiry: r.9,
            })
            .collect())
    }
}
