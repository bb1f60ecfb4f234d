//! Route definitions for the Clinic Pharmacy Inventory Platform

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Drug catalogue
        .nest("/drugs", drug_routes())
        // Purchase orders
        .nest("/purchases", purchase_routes())
        // Prescription lines
        .nest("/prescriptions", prescription_routes())
        // Stock: levels, adjustments, ledger
        .nest("/stock", stock_routes())
}

/// Drug catalogue routes
fn drug_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_drugs).post(handlers::create_drug))
        .route("/low-stock", get(handlers::list_low_stock_drugs))
        .route(
            "/:drug_id",
            get(handlers::get_drug)
                .put(handlers::update_drug)
                .delete(handlers::delete_drug),
        )
        .route("/:drug_id/stock", get(handlers::get_drug_stock))
        .route("/:drug_id/batches", get(handlers::list_drug_batches))
        .route("/:drug_id/movements", get(handlers::list_drug_movements))
}

/// Purchase order routes
fn purchase_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_purchases).post(handlers::create_purchase),
        )
        .route("/:purchase_id", get(handlers::get_purchase))
        .route("/:purchase_id/items", post(handlers::add_purchase_item))
        .route("/:purchase_id/finalize", post(handlers::finalize_purchase))
        .route("/:purchase_id/cancel", post(handlers::cancel_purchase))
}

/// Prescription line routes
fn prescription_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_prescription_item))
        .route(
            "/:item_id",
            put(handlers::update_prescription_item).delete(handlers::delete_prescription_item),
        )
        .route(
            "/records/:record_id",
            get(handlers::list_record_prescriptions),
        )
}

/// Stock routes
fn stock_routes() -> Router<AppState> {
    Router::new()
        .route("/levels", get(handlers::list_stock_levels))
        .route("/adjustments", post(handlers::adjust_stock))
        .route("/movements", get(handlers::list_movements))
}
