//! HTTP handlers for prescription line endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::PrescriptionItem;
use crate::services::prescription::{CreatePrescriptionInput, UpdatePrescriptionInput};
use crate::services::PrescriptionService;
use crate::AppState;

/// Record a prescription line and dispense it from stock
pub async fn create_prescription_item(
    State(state): State<AppState>,
    Json(input): Json<CreatePrescriptionInput>,
) -> AppResult<Json<PrescriptionItem>> {
    let service = PrescriptionService::new(state.db);
    let item = service.create_item(input).await?;
    Ok(Json(item))
}

/// Update a prescription line's quantity
pub async fn update_prescription_item(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
    Json(input): Json<UpdatePrescriptionInput>,
) -> AppResult<Json<PrescriptionItem>> {
    let service = PrescriptionService::new(state.db);
    let item = service.update_item(item_id, input).await?;
    Ok(Json(item))
}

/// Delete a prescription line, returning its quantity to stock
pub async fn delete_prescription_item(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
) -> AppResult<Json<()>> {
    let service = PrescriptionService::new(state.db);
    service.delete_item(item_id).await?;
    Ok(Json(()))
}

/// List the prescription lines of a medical record
pub async fn list_record_prescriptions(
    State(state): State<AppState>,
    Path(record_id): Path<Uuid>,
) -> AppResult<Json<Vec<PrescriptionItem>>> {
    let service = PrescriptionService::new(state.db);
    let items = service.list_for_record(record_id).await?;
    Ok(Json(items))
}
