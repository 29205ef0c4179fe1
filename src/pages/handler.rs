use axum::{
    Json,
    extract::{Path, Query, State},
    response::Response,
};
use serde::{Deserialize, Serialize};

use crate::applier::{Highlighter, Page};
use crate::error::HiliteError;
use crate::handler::{AppState, error_response, no_content, success};
use crate::message::{Dispatcher, Request, Response as MessageResponse};
use crate::model::PageUrl;
use crate::panel;
use crate::store::HighlightStore;

// ============================================================================
// Payloads
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct MessageBody {
    pub url: String,
    pub html: String,
    pub request: Request,
}

#[derive(Debug, Serialize)]
pub struct MessageReply {
    pub response: MessageResponse,
    pub html: String,
}

#[derive(Debug, Deserialize)]
pub struct DashboardParams {
    pub q: Option<String>,
    /// Page the panel was opened on, flagged in the listing.
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub url: String,
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ActiveBody {
    pub url: String,
    pub id: Option<String>,
}

fn parse_url(raw: &str) -> Result<PageUrl, Response> {
    PageUrl::parse(raw).map_err(|e| error_response(&e))
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn message(State(state): State<AppState>, Json(body): Json<MessageBody>) -> Response {
    let url = match parse_url(&body.url) {
        Ok(url) => url,
        Err(resp) => return resp,
    };

    let mut page = Page::parse(url, &body.html).with_color(state.color.as_str());
    let response = Dispatcher::new(state.db.as_ref())
        .dispatch(&mut page, body.request)
        .await;

    success(MessageReply {
        response,
        html: page.to_html(),
    })
}

pub async fn dashboard(State(state): State<AppState>, Query(params): Query<DashboardParams>) -> Response {
    let current = match params.url.as_deref().map(PageUrl::parse).transpose() {
        Ok(current) => current,
        Err(e) => return error_response(&e),
    };

    match state.db.get_all().await {
        Ok(pages) => success(panel::dashboard(
            &pages,
            params.q.as_deref().unwrap_or_default(),
            current.as_ref(),
        )),
        Err(e) => error_response(&HiliteError::storage(e)),
    }
}

pub async fn list_highlights(State(state): State<AppState>, Query(params): Query<PageParams>) -> Response {
    let url = match parse_url(&params.url) {
        Ok(url) => url,
        Err(resp) => return resp,
    };

    match state.db.get(&url).await {
        Ok(record) => success(panel::page_list(
            &url,
            record.as_ref(),
            params.q.as_deref().unwrap_or_default(),
        )),
        Err(e) => error_response(&HiliteError::storage(e)),
    }
}

pub async fn delete_page(State(state): State<AppState>, Query(params): Query<PageParams>) -> Response {
    let url = match parse_url(&params.url) {
        Ok(url) => url,
        Err(resp) => return resp,
    };

    match Highlighter::new(state.db.as_ref()).delete_page(&url).await {
        Ok(()) => no_content(),
        Err(e) => error_response(&e),
    }
}

pub async fn delete_highlight(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<PageParams>,
) -> Response {
    let url = match parse_url(&params.url) {
        Ok(url) => url,
        Err(resp) => return resp,
    };

    match Highlighter::new(state.db.as_ref())
        .delete_highlight(&url, &id, None)
        .await
    {
        Ok(_) => no_content(),
        Err(e) => error_response(&e),
    }
}

pub async fn set_active(State(state): State<AppState>, Json(body): Json<ActiveBody>) -> Response {
    let url = match parse_url(&body.url) {
        Ok(url) => url,
        Err(resp) => return resp,
    };

    match state.db.set_active(&url, body.id.as_deref()).await {
        Ok(true) => no_content(),
        Ok(false) => match body.id {
            Some(id) => error_response(&HiliteError::HighlightNotFound(id)),
            None => error_response(&HiliteError::PageNotFound(url.to_string())),
        },
        Err(e) => error_response(&HiliteError::storage(e)),
    }
}
