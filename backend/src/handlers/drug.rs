//! HTTP handlers for drug catalogue endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Drug, DrugBatch, DrugWithStock, StockLevel, StockMovement};
use crate::services::drug::{CreateDrugInput, UpdateDrugInput};
use crate::services::stock::MovementQuery;
use crate::services::{DrugService, StockService};
use crate::AppState;
use shared::types::PaginatedResponse;

/// List all drugs
pub async fn list_drugs(State(state): State<AppState>) -> AppResult<Json<Vec<Drug>>> {
    let service = DrugService::new(state.db);
    let drugs = service.list().await?;
    Ok(Json(drugs))
}

/// Create a drug
pub async fn create_drug(
    State(state): State<AppState>,
    Json(input): Json<CreateDrugInput>,
) -> AppResult<Json<Drug>> {
    let service = DrugService::new(state.db);
    let drug = service.create(input).await?;
    Ok(Json(drug))
}

/// Get a drug by id
pub async fn get_drug(
    State(state): State<AppState>,
    Path(drug_id): Path<Uuid>,
) -> AppResult<Json<Drug>> {
    let service = DrugService::new(state.db);
    let drug = service.get(drug_id).await?;
    Ok(Json(drug))
}

/// Update a drug
pub async fn update_drug(
    State(state): State<AppState>,
    Path(drug_id): Path<Uuid>,
    Json(input): Json<UpdateDrugInput>,
) -> AppResult<Json<Drug>> {
    let service = DrugService::new(state.db);
    let drug = service.update(drug_id, input).await?;
    Ok(Json(drug))
}

/// Soft-delete a drug
pub async fn delete_drug(
    State(state): State<AppState>,
    Path(drug_id): Path<Uuid>,
) -> AppResult<Json<()>> {
    let service = DrugService::new(state.db);
    service.delete(drug_id).await?;
    Ok(Json(()))
}

/// List drugs at or below their minimum-stock threshold
pub async fn list_low_stock_drugs(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<DrugWithStock>>> {
    let service = DrugService::new(state.db);
    let drugs = service.low_stock().await?;
    Ok(Json(drugs))
}

/// Get the stock projection for a drug
pub async fn get_drug_stock(
    State(state): State<AppState>,
    Path(drug_id): Path<Uuid>,
) -> AppResult<Json<StockLevel>> {
    let service = StockService::new(state.db);
    let level = service.stock_level(drug_id).await?;
    Ok(Json(level))
}

/// List a drug's open batches in consumption order
pub async fn list_drug_batches(
    State(state): State<AppState>,
    Path(drug_id): Path<Uuid>,
) -> AppResult<Json<Vec<DrugBatch>>> {
    let service = StockService::new(state.db);
    let batches = service.batches_for_drug(drug_id).await?;
    Ok(Json(batches))
}

/// List a drug's stock movements, newest first
pub async fn list_drug_movements(
    State(state): State<AppState>,
    Path(drug_id): Path<Uuid>,
    Query(query): Query<MovementQuery>,
) -> AppResult<Json<PaginatedResponse<StockMovement>>> {
    let service = StockService::new(state.db);
    let movements = service
        .list_movements(MovementQuery {
            drug_id: Some(drug_id),
            ..query
        })
        .await?;
    Ok(Json(movements))
}
