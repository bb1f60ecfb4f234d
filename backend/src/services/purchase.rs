//! Purchase order service: drafting, receiving, and inventory crediting
//!
//! Inventory is credited on the transition into `finalized`. Items added
//! to an already-finalized purchase are credited immediately, in the same
//! transaction as their insert.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Purchase, PurchaseItem, PurchaseStatus, PurchaseWithItems};
use crate::services::stock::{generate_lot_code, StockService};
use shared::validation::{validate_lot_code, validate_positive_quantity};

/// Purchase service for order lifecycle and receiving
#[derive(Clone)]
pub struct PurchaseService {
    db: PgPool,
}

/// Input for creating a purchase order
#[derive(Debug, Deserialize)]
pub struct CreatePurchaseInput {
    pub supplier: String,
    pub note: Option<String>,
    #[serde(default)]
    pub items: Vec<PurchaseItemInput>,
}

/// Input for one purchase line
#[derive(Debug, Deserialize)]
pub struct PurchaseItemInput {
    pub drug_id: Uuid,
    pub quantity: i32,
    pub unit_cost: Option<Decimal>,
    pub lot_code: Option<String>,
    pub expires_at: Option<NaiveDate>,
}

type PurchaseRow = (
    Uuid,
    String,
    Option<String>,
    String,
    DateTime<Utc>,
    DateTime<Utc>,
);

type PurchaseItemRow = (
    Uuid,
    Uuid,
    Uuid,
    i32,
    Option<Decimal>,
    Option<String>,
    Option<NaiveDate>,
    DateTime<Utc>,
);

fn purchase_from_row(row: PurchaseRow) -> AppResult<Purchase> {
    let status = PurchaseStatus::from_str(&row.3)
        .ok_or_else(|| AppError::Internal(format!("unknown purchase status '{}'", row.3)))?;

    Ok(Purchase {
        id: row.0,
        supplier: row.1,
        note: row.2,
        status,
        created_at: row.4,
        updated_at: row.5,
    })
}

fn item_from_row(row: PurchaseItemRow) -> PurchaseItem {
    PurchaseItem {
        id: row.0,
        purchase_id: row.1,
        drug_id: row.2,
        quantity: row.3,
        unit_cost: row.4,
        lot_code: row.5,
        expires_at: row.6,
        created_at: row.7,
    }
}

impl PurchaseService {
    /// Create a new PurchaseService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create a draft purchase order, optionally with initial items.
    pub async fn create(&self, input: CreatePurchaseInput) -> AppResult<PurchaseWithItems> {
        if input.supplier.trim().is_empty() {
            return Err(AppError::Validation {
                field: "supplier".to_string(),
                message: "Supplier cannot be empty".to_string(),
            });
        }

        let mut tx = self.db.begin().await?;

        let purchase_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO purchases (supplier, note)
            VALUES ($1, $2)
            RETURNING id
            "#,
        )
        .bind(input.supplier.trim())
        .bind(&input.note)
        .fetch_one(&mut *tx)
        .await?;

        for item in &input.items {
            Self::insert_item(&mut tx, purchase_id, PurchaseStatus::Draft, item).await?;
        }

        tx.commit().await?;

        tracing::info!(purchase_id = %purchase_id, items = input.items.len(), "purchase drafted");

        self.get_with_items(purchase_id).await
    }

    /// List purchase orders, newest first.
    pub async fn list(&self) -> AppResult<Vec<Purchase>> {
        let rows = sqlx::query_as::<_, PurchaseRow>(
            r#"
            SELECT id, supplier, note, status, created_at, updated_at
            FROM purchases
            WHERE deleted_at IS NULL
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(purchase_from_row).collect()
    }

    /// Get a purchase order with its items.
    pub async fn get_with_items(&self, purchase_id: Uuid) -> AppResult<PurchaseWithItems> {
        let row = sqlx::query_as::<_, PurchaseRow>(
            r#"
            SELECT id, supplier, note, status, created_at, updated_at
            FROM purchases
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(purchase_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Purchase".to_string()))?;

        let purchase = purchase_from_row(row)?;

        let items = sqlx::query_as::<_, PurchaseItemRow>(
            r#"
            SELECT id, purchase_id, drug_id, quantity, unit_cost, lot_code, expires_at, created_at
            FROM purchase_items
            WHERE purchase_id = $1 AND deleted_at IS NULL
            ORDER BY created_at
            "#,
        )
        .bind(purchase_id)
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(item_from_row)
        .collect();

        Ok(PurchaseWithItems { purchase, items })
    }

    /// Add an item to an existing purchase. Against a finalized purchase
    /// the batch/ledger credit happens here, in the same transaction.
    pub async fn add_item(
        &self,
        purchase_id: Uuid,
        input: PurchaseItemInput,
    ) -> AppResult<PurchaseItem> {
        let mut tx = self.db.begin().await?;

        let status = Self::lock_purchase_status(&mut tx, purchase_id).await?;
        if status == PurchaseStatus::Cancelled {
            return Err(AppError::InvalidStateTransition(
                "Cannot add items to a cancelled purchase".to_string(),
            ));
        }

        let item = Self::insert_item(&mut tx, purchase_id, status, &input).await?;

        tx.commit().await?;

        Ok(item)
    }

    /// Finalize a draft purchase: flip the status, then credit every
    /// non-deleted item into the batch store and ledger. The transition
    /// guard makes the crediting fire exactly once per purchase.
    pub async fn finalize(&self, purchase_id: Uuid) -> AppResult<PurchaseWithItems> {
        let mut tx = self.db.begin().await?;

        let status = Self::lock_purchase_status(&mut tx, purchase_id).await?;
        if !status.can_transition(PurchaseStatus::Finalized) {
            return Err(AppError::InvalidStateTransition(format!(
                "Purchase is {} and cannot be finalized",
                status.as_str()
            )));
        }

        sqlx::query("UPDATE purchases SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(PurchaseStatus::Finalized.as_str())
            .bind(purchase_id)
            .execute(&mut *tx)
            .await?;

        let items = sqlx::query_as::<_, (Uuid, Uuid, i32, Option<String>, Option<NaiveDate>)>(
            r#"
            SELECT id, drug_id, quantity, lot_code, expires_at
            FROM purchase_items
            WHERE purchase_id = $1 AND deleted_at IS NULL
            ORDER BY created_at
            "#,
        )
        .bind(purchase_id)
        .fetch_all(&mut *tx)
        .await?;

        for (item_id, drug_id, quantity, lot_code, expires_at) in items {
            let lot_code = match lot_code {
                Some(code) => code,
                // Normally assigned at insertion; backfill keeps older
                // rows receivable.
                None => Self::assign_lot_code(&mut tx, item_id, drug_id).await?,
            };

            StockService::credit_purchase_item(
                &mut tx, purchase_id, drug_id, &lot_code, quantity, expires_at,
            )
            .await?;
        }

        tx.commit().await?;

        tracing::info!(purchase_id = %purchase_id, "purchase finalized and stock credited");

        self.get_with_items(purchase_id).await
    }

    /// Cancel a draft purchase. No inventory effects; finalized purchases
    /// cannot be cancelled.
    pub async fn cancel(&self, purchase_id: Uuid) -> AppResult<Purchase> {
        let mut tx = self.db.begin().await?;

        let status = Self::lock_purchase_status(&mut tx, purchase_id).await?;
        if !status.can_transition(PurchaseStatus::Cancelled) {
            return Err(AppError::InvalidStateTransition(format!(
                "Purchase is {} and cannot be cancelled",
                status.as_str()
            )));
        }

        let row = sqlx::query_as::<_, PurchaseRow>(
            r#"
            UPDATE purchases
            SET status = $1, updated_at = NOW()
            WHERE id = $2
            RETURNING id, supplier, note, status, created_at, updated_at
            "#,
        )
        .bind(PurchaseStatus::Cancelled.as_str())
        .bind(purchase_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        purchase_from_row(row)
    }

    /// Insert one purchase line. A missing lot code is synthesized here,
    /// once, so the line always carries the code its batch will use.
    async fn insert_item(
        conn: &mut PgConnection,
        purchase_id: Uuid,
        status: PurchaseStatus,
        input: &PurchaseItemInput,
    ) -> AppResult<PurchaseItem> {
        validate_positive_quantity(input.quantity).map_err(|message| AppError::Validation {
            field: "quantity".to_string(),
            message: message.to_string(),
        })?;

        if let Some(code) = &input.lot_code {
            validate_lot_code(code).map_err(|message| AppError::Validation {
                field: "lot_code".to_string(),
                message: message.to_string(),
            })?;
        }

        let drug_exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM drugs WHERE id = $1 AND deleted_at IS NULL)",
        )
        .bind(input.drug_id)
        .fetch_one(&mut *conn)
        .await?;

        if !drug_exists {
            return Err(AppError::NotFound("Drug".to_string()));
        }

        let lot_code = match &input.lot_code {
            Some(code) => code.clone(),
            None => generate_lot_code("PO", input.drug_id),
        };

        let row = sqlx::query_as::<_, PurchaseItemRow>(
            r#"
            INSERT INTO purchase_items (purchase_id, drug_id, quantity, unit_cost, lot_code, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, purchase_id, drug_id, quantity, unit_cost, lot_code, expires_at, created_at
            "#,
        )
        .bind(purchase_id)
        .bind(input.drug_id)
        .bind(input.quantity)
        .bind(input.unit_cost)
        .bind(&lot_code)
        .bind(input.expires_at)
        .fetch_one(&mut *conn)
        .await?;

        let item = item_from_row(row);

        // Lines recorded while the order is still a draft wait for the
        // finalize transition; against a finalized order the credit lands
        // now.
        if status == PurchaseStatus::Finalized {
            StockService::credit_purchase_item(
                conn,
                purchase_id,
                item.drug_id,
                &lot_code,
                item.quantity,
                item.expires_at,
            )
            .await?;
        }

        Ok(item)
    }

    /// Assign a generated lot code to an item that has none. Idempotent:
    /// the guard only fires while the code is null.
    async fn assign_lot_code(
        conn: &mut PgConnection,
        item_id: Uuid,
        drug_id: Uuid,
    ) -> AppResult<String> {
        let code = generate_lot_code("PO", drug_id);

        let assigned = sqlx::query_scalar::<_, String>(
            r#"
            UPDATE purchase_items
            SET lot_code = $1
            WHERE id = $2 AND lot_code IS NULL
            RETURNING lot_code
            "#,
        )
        .bind(&code)
        .bind(item_id)
        .fetch_optional(&mut *conn)
        .await?;

        match assigned {
            Some(code) => Ok(code),
            // Someone assigned one between the read and this update; use
            // the persisted value.
            None => {
                let existing = sqlx::query_scalar::<_, Option<String>>(
                    "SELECT lot_code FROM purchase_items WHERE id = $1",
                )
                .bind(item_id)
                .fetch_one(&mut *conn)
                .await?;

                existing.ok_or_else(|| {
                    AppError::Internal(format!("lot code missing on purchase item {}", item_id))
                })
            }
        }
    }

    async fn lock_purchase_status(
        conn: &mut PgConnection,
        purchase_id: Uuid,
    ) -> AppResult<PurchaseStatus> {
        let status = sqlx::query_scalar::<_, String>(
            r#"
            SELECT status
            FROM purchases
            WHERE id = $1 AND deleted_at IS NULL
            FOR UPDATE
            "#,
        )
        .bind(purchase_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Purchase".to_string()))?;

        PurchaseStatus::from_str(&status)
            .ok_or_else(|| AppError::Internal(format!("unknown purchase status '{}'", status)))
    }
}
