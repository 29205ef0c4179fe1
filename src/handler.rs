use std::sync::Arc;

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use tracing::info;

use crate::db::Database;
use crate::error::HiliteError;
use crate::pages;
use crate::unpack_error;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub color: String,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
}

pub fn success<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse { data })).into_response()
}

pub fn no_content() -> Response {
    (StatusCode::NO_CONTENT, ()).into_response()
}

pub fn error_response(err: &HiliteError) -> Response {
    let status = match err {
        HiliteError::PageNotFound(_) | HiliteError::HighlightNotFound(_) => StatusCode::NOT_FOUND,
        HiliteError::StorageFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %unpack_error(err), "request failed");
    } else {
        tracing::warn!(error = %err, "request rejected");
    }
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            kind: err.kind(),
        }),
    )
        .into_response()
}

pub async fn healthcheck() -> impl IntoResponse {
    info!("got healthcheck request");
    Json(ApiResponse { data: "ok" })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(healthcheck))
        .nest("/pages", pages::routes())
        .with_state(state)
}
