//! Document ingestion and bulk catalog edits.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};

use crate::app::dto::{self, DocumentFormat};
use crate::app::errors;
use crate::app::routes::{batches, products};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/upload", post(upload_document))
        .route("/update-prices", post(update_prices))
        .route("/merge", post(merge_products))
        .nest("/products", products::router())
        .nest("/batches", batches::router())
}

/// Reconcile one uploaded document. The raw body is the document itself.
pub async fn upload_document(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::UploadQuery>,
    body: Bytes,
) -> axum::response::Response {
    let Some(label) = query.label.filter(|l| !l.trim().is_empty()) else {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "missing_label",
            "the label query parameter is required",
        );
    };
    let format = query
        .format
        .unwrap_or_else(|| DocumentFormat::from_label(&label));

    match services
        .reconciliation
        .reconcile_document(&label, &body, services.extractor(format))
        .await
    {
        Ok(report) => Json(report).into_response(),
        Err(e) => errors::reconcile_error_to_response(e),
    }
}

pub async fn update_prices(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::UpdatePricesRequest>,
) -> axum::response::Response {
    match services
        .reconciliation
        .update_selling_prices(body.updates)
        .await
    {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => errors::reconcile_error_to_response(e),
    }
}

pub async fn merge_products(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::MergeProductsRequest>,
) -> axum::response::Response {
    match services
        .reconciliation
        .merge_products(body.keep_id, body.discard_id)
        .await
    {
        Ok(product) => Json(product).into_response(),
        Err(e) => errors::reconcile_error_to_response(e),
    }
}
