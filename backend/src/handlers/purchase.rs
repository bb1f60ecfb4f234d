//! HTTP handlers for purchase order endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Purchase, PurchaseItem, PurchaseWithItems};
use crate::services::purchase::{CreatePurchaseInput, PurchaseItemInput};
use crate::services::PurchaseService;
use crate::AppState;

/// List purchase orders
pub async fn list_purchases(State(state): State<AppState>) -> AppResult<Json<Vec<Purchase>>> {
    let service = PurchaseService::new(state.db);
    let purchases = service.list().await?;
    Ok(Json(purchases))
}

/// Create a draft purchase order
pub async fn create_purchase(
    State(state): State<AppState>,
    Json(input): Json<CreatePurchaseInput>,
) -> AppResult<Json<PurchaseWithItems>> {
    let service = PurchaseService::new(state.db);
    let purchase = service.create(input).await?;
    Ok(Json(purchase))
}

/// Get a purchase order with its items
pub async fn get_purchase(
    State(state): State<AppState>,
    Path(purchase_id): Path<Uuid>,
) -> AppResult<Json<PurchaseWithItems>> {
    let service = PurchaseService::new(state.db);
    let purchase = service.get_with_items(purchase_id).await?;
    Ok(Json(purchase))
}

/// Add an item to a purchase order
pub async fn add_purchase_item(
    State(state): State<AppState>,
    Path(purchase_id): Path<Uuid>,
    Json(input): Json<PurchaseItemInput>,
) -> AppResult<Json<PurchaseItem>> {
    let service = PurchaseService::new(state.db);
    let item = service.add_item(purchase_id, input).await?;
    Ok(Json(item))
}

/// Finalize a purchase order, crediting its items into stock
pub async fn finalize_purchase(
    State(state): State<AppState>,
    Path(purchase_id): Path<Uuid>,
) -> AppResult<Json<PurchaseWithItems>> {
    let service = PurchaseService::new(state.db);
    let purchase = service.finalize(purchase_id).await?;
    Ok(Json(purchase))
}

/// Cancel a draft purchase order
pub async fn cancel_purchase(
    State(state): State<AppState>,
    Path(purchase_id): Path<Uuid>,
) -> AppResult<Json<Purchase>> {
    let service = PurchaseService::new(state.db);
    let purchase = service.cancel(purchase_id).await?;
    Ok(Json(purchase))
}
