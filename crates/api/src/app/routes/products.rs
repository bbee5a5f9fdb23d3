use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use restock_infra::{CodeUpdate, ManualProduct};

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_products))
        .route("/manual", post(create_manual_product))
        .route("/:id", get(get_product).put(update_codes))
        .route("/:id/history", get(product_history))
}

pub async fn list_products(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.reconciliation.list_products().await {
        Ok(products) => Json(products).into_response(),
        Err(e) => errors::reconcile_error_to_response(e),
    }
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match dto::parse_product_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    match services.reconciliation.get_product(id).await {
        Ok(product) => Json(product).into_response(),
        Err(e) => errors::reconcile_error_to_response(e),
    }
}

/// Set or clear SKU/UPC. Per-field collisions come back in `rejected` with a 200.
pub async fn update_codes(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<CodeUpdate>,
) -> axum::response::Response {
    let id = match dto::parse_product_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    match services.reconciliation.update_codes(id, body).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => errors::reconcile_error_to_response(e),
    }
}

pub async fn create_manual_product(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<ManualProduct>,
) -> axum::response::Response {
    match services.reconciliation.create_manual_product(body).await {
        Ok(product) => (StatusCode::CREATED, Json(product)).into_response(),
        Err(e) => errors::reconcile_error_to_response(e),
    }
}

pub async fn product_history(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match dto::parse_product_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    match services.reconciliation.product_history(id).await {
        Ok(history) => Json(history).into_response(),
        Err(e) => errors::reconcile_error_to_response(e),
    }
}
