use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    response::IntoResponse,
    routing::get,
};

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_batches))
        .route("/:id", axum::routing::patch(rename_batch))
        .route("/:id/products", get(batch_products))
}

pub async fn list_batches(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.reconciliation.list_batches().await {
        Ok(batches) => Json(batches).into_response(),
        Err(e) => errors::reconcile_error_to_response(e),
    }
}

pub async fn batch_products(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match dto::parse_batch_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    match services.reconciliation.batch_details(id).await {
        Ok(details) => Json(details).into_response(),
        Err(e) => errors::reconcile_error_to_response(e),
    }
}

pub async fn rename_batch(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::RenameBatchRequest>,
) -> axum::response::Response {
    let id = match dto::parse_batch_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    match services.reconciliation.rename_batch(id, &body.label).await {
        Ok(batch) => Json(batch).into_response(),
        Err(e) => errors::reconcile_error_to_response(e),
    }
}
