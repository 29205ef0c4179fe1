//! Request/response payloads exchanged with a page and their dispatch.
//!
//! Every failure is turned into a [`Response::Error`] here; nothing past
//! this boundary sees a `HiliteError`.

use serde::{Deserialize, Serialize};

use crate::applier::{ApplyOutcome, Highlighter, Page};
use crate::error::{HiliteError, Result};
use crate::locator::Locator;
use crate::model::Highlight;
use crate::selection::Selection;
use crate::store::HighlightStore;
use crate::unpack_error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    /// Captures the `occurrence`-th match of `text` in the page body.
    Capture {
        text: String,
        #[serde(default = "first_occurrence")]
        occurrence: usize,
    },
    Apply {
        locator: Locator,
    },
    ClearActive,
    Restore,
}

fn first_occurrence() -> usize {
    1
}

impl Request {
    pub fn action(&self) -> &'static str {
        match self {
            Request::Capture { .. } => "capture",
            Request::Apply { .. } => "apply",
            Request::ClearActive => "clearActive",
            Request::Restore => "restore",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Response {
    Success {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        highlight: Option<Highlight>,
        #[serde(skip_serializing_if = "Option::is_none")]
        outcome: Option<ApplyOutcome>,
    },
    Error {
        kind: &'static str,
        message: String,
    },
}

impl Response {
    fn success(message: impl Into<String>) -> Self {
        Response::Success {
            message: message.into(),
            highlight: None,
            outcome: None,
        }
    }

    fn applied(outcome: ApplyOutcome) -> Self {
        let message = match outcome {
            ApplyOutcome::Marked => "Highlight applied",
            ApplyOutcome::AlreadyActive => "Highlight already active",
            ApplyOutcome::Stale => "Highlight not found in page",
        };
        Response::Success {
            message: message.to_string(),
            highlight: None,
            outcome: Some(outcome),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success { .. })
    }
}

impl From<&HiliteError> for Response {
    fn from(err: &HiliteError) -> Self {
        Response::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

pub struct Dispatcher<'a, S> {
    highlighter: Highlighter<'a, S>,
}

impl<'a, S: HighlightStore> Dispatcher<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            highlighter: Highlighter::new(store),
        }
    }

    pub async fn dispatch(&self, page: &mut Page, request: Request) -> Response {
        let action = request.action();
        let result = match request {
            Request::Capture { text, occurrence } => self.capture(page, &text, occurrence).await,
            Request::Apply { locator } => self.apply(page, &locator),
            Request::ClearActive => self.clear_active(page).await,
            Request::Restore => self.restore(page).await,
        };

        match result {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(action, url = %page.url(), error = %unpack_error(&err), "request failed");
                Response::from(&err)
            }
        }
    }

    async fn capture(&self, page: &mut Page, text: &str, occurrence: usize) -> Result<Response> {
        let selection = Selection::find_text(page.document(), text.trim(), occurrence)
            .ok_or(HiliteError::EmptySelection)?;
        let highlight = self.highlighter.capture(page, &selection).await?;
        Ok(Response::Success {
            message: "Highlight saved".to_string(),
            highlight: Some(highlight),
            outcome: Some(ApplyOutcome::Marked),
        })
    }

    fn apply(&self, page: &mut Page, locator: &Locator) -> Result<Response> {
        match page.apply(locator) {
            ApplyOutcome::Stale => Err(HiliteError::LocatorStale(locator.to_string())),
            outcome => Ok(Response::applied(outcome)),
        }
    }

    async fn clear_active(&self, page: &mut Page) -> Result<Response> {
        let cleared = self.highlighter.clear_active(page).await?;
        Ok(if cleared {
            Response::success("Highlight cleared")
        } else {
            Response::success("No active highlight")
        })
    }

    async fn restore(&self, page: &mut Page) -> Result<Response> {
        Ok(match self.highlighter.restore(page).await? {
            Some(outcome) => Response::applied(outcome),
            None => Response::success("No active highlight"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::marker::MARKER_ATTR;
    use crate::model::PageUrl;
    use crate::store::FailingStore;

    const PAGE: &str = "<html><body><div><p>One fish.</p><p>Two fish.</p><p>Red fish.</p></div></body></html>";

    fn page() -> Page {
        Page::parse(PageUrl::parse("https://example.com/fish").unwrap(), PAGE)
    }

    #[test]
    fn requests_are_tagged_by_action() {
        let capture: Request = serde_json::from_str(r#"{"action":"capture","text":"Red"}"#).unwrap();
        assert_eq!(
            capture,
            Request::Capture {
                text: "Red".to_string(),
                occurrence: 1
            }
        );

        let clear: Request = serde_json::from_str(r#"{"action":"clearActive"}"#).unwrap();
        assert_eq!(clear, Request::ClearActive);

        let apply: Request = serde_json::from_str(r#"{"action":"apply","locator":"//div[1]/p[2]"}"#).unwrap();
        assert_eq!(apply.action(), "apply");

        assert!(serde_json::from_str::<Request>(r#"{"action":"explode"}"#).is_err());
    }

    #[test]
    fn error_responses_carry_the_kind() {
        let response = Response::from(&HiliteError::EmptySelection);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["kind"], "emptySelection");
    }

    #[tokio::test]
    async fn capture_then_restore_on_a_new_load() {
        let db = Database::open_in_memory().await.unwrap();
        let dispatcher = Dispatcher::new(&db);

        let mut first = page();
        let response = dispatcher
            .dispatch(
                &mut first,
                Request::Capture {
                    text: "Red fish".to_string(),
                    occurrence: 1,
                },
            )
            .await;
        let Response::Success {
            highlight: Some(highlight),
            ..
        } = response.clone()
        else {
            panic!("capture failed: {response:?}");
        };
        assert_eq!(highlight.locator.as_str(), "/html[1]/body[1]/div[1]/p[3]");

        let mut second = page();
        let restored = dispatcher.dispatch(&mut second, Request::Restore).await;
        assert_eq!(restored, Response::applied(ApplyOutcome::Marked));
        assert_eq!(second.document().find_by_attr(MARKER_ATTR, "true").len(), 1);
    }

    #[tokio::test]
    async fn failures_become_error_responses() {
        let db = Database::open_in_memory().await.unwrap();
        let dispatcher = Dispatcher::new(&db);
        let mut page = page();

        let missing = dispatcher
            .dispatch(
                &mut page,
                Request::Capture {
                    text: "Blue fish".to_string(),
                    occurrence: 1,
                },
            )
            .await;
        assert!(matches!(missing, Response::Error { kind: "emptySelection", .. }));

        let stale = dispatcher
            .dispatch(
                &mut page,
                Request::Apply {
                    locator: Locator::new("//div[1]/p[7]"),
                },
            )
            .await;
        assert!(matches!(stale, Response::Error { kind: "locatorStale", .. }));

        let malformed = dispatcher
            .dispatch(
                &mut page,
                Request::Apply {
                    locator: Locator::new("p[1"),
                },
            )
            .await;
        assert!(!malformed.is_success());
    }

    #[tokio::test]
    async fn storage_failures_are_reported_not_raised() {
        let dispatcher = Dispatcher::new(&FailingStore);
        let mut page = page();
        page.apply(&Locator::new("//div[1]/p[2]"));
        let before = page.to_html();

        let response = dispatcher
            .dispatch(
                &mut page,
                Request::Capture {
                    text: "Red fish".to_string(),
                    occurrence: 1,
                },
            )
            .await;
        assert!(matches!(response, Response::Error { kind: "storageFailure", .. }));
        assert_eq!(page.to_html(), before);

        let restored = dispatcher.dispatch(&mut page, Request::Restore).await;
        assert!(matches!(restored, Response::Error { kind: "storageFailure", .. }));
    }

    #[tokio::test]
    async fn clear_active_without_a_record_still_succeeds() {
        let db = Database::open_in_memory().await.unwrap();
        let dispatcher = Dispatcher::new(&db);
        let mut page = page();

        page.apply(&Locator::new("//div[1]/p[1]"));
        let response = dispatcher.dispatch(&mut page, Request::ClearActive).await;
        assert_eq!(response, Response::success("Highlight cleared"));
        assert_eq!(page.marked(), None);
    }
}
