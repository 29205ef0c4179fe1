//! HTTP surface for the browser extension.
//!
//! The extension posts the page it is showing together with a request; the
//! service answers with the dispatch result and the page as it should now
//! look. Panel reads and store-only edits get their own routes.

mod handler;
mod routes;

pub use routes::routes;
