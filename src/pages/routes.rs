use axum::{
    Router,
    routing::{delete, get, post, put},
};

use super::handler;
use crate::handler::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handler::dashboard))
        .route("/", delete(handler::delete_page))
        .route("/message", post(handler::message))
        .route("/highlights", get(handler::list_highlights))
        .route("/highlights/:id", delete(handler::delete_highlight))
        .route("/active", put(handler::set_active))
}
