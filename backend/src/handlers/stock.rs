//! HTTP handlers for stock endpoints

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Serialize;

use crate::error::AppResult;
use crate::models::{StockLevel, StockMovement};
use crate::services::stock::{AdjustStockInput, MovementQuery};
use crate::services::StockService;
use crate::AppState;
use shared::types::PaginatedResponse;

/// List stock levels for all drugs
pub async fn list_stock_levels(State(state): State<AppState>) -> AppResult<Json<Vec<StockLevel>>> {
    let service = StockService::new(state.db);
    let levels = service.stock_levels().await?;
    Ok(Json(levels))
}

/// Apply a manual stock adjustment
pub async fn adjust_stock(
    State(state): State<AppState>,
    Json(input): Json<AdjustStockInput>,
) -> AppResult<Json<AdjustStockResponse>> {
    let service = StockService::new(state.db);
    let movement = service.adjust(input).await?;
    Ok(Json(AdjustStockResponse {
        applied: movement.is_some(),
        movement,
    }))
}

/// List stock movements, newest first
pub async fn list_movements(
    State(state): State<AppState>,
    Query(query): Query<MovementQuery>,
) -> AppResult<Json<PaginatedResponse<StockMovement>>> {
    let service = StockService::new(state.db);
    let movements = service.list_movements(query).await?;
    Ok(Json(movements))
}

/// Response for a manual adjustment; `applied` is false when the request
/// was a silent no-op
#[derive(Debug, Serialize)]
pub struct AdjustStockResponse {
    pub applied: bool,
    pub movement: Option<StockMovement>,
}
