use std::error::Error;

pub mod applier;
pub mod config;
pub mod db;
pub mod dom;
pub mod error;
pub mod handler;
pub mod locator;
pub mod marker;
pub mod message;
pub mod model;
pub mod pages;
pub mod panel;
pub mod selection;
pub mod store;

pub fn unpack_error(err: &dyn Error) -> String {
    let mut parts = Vec::new();
    parts.push(err.to_string());
    let mut current = err.source();
    while let Some(source) = current {
        parts.push(source.to_string());
        current = source.source();
    }
    parts.join(": ")
}
