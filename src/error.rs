use std::error::Error as StdError;

use thiserror::Error;

pub type Result<T, E = HiliteError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum HiliteError {
    #[error("LocatorStale: no node matches {0}")]
    LocatorStale(String),
    #[error("EmptySelection")]
    EmptySelection,
    #[error("StorageFailure: {0}")]
    StorageFailure(#[source] Box<dyn StdError + Send + Sync + 'static>),
    #[error("InvalidLocator: {locator}: {reason}")]
    InvalidLocator { locator: String, reason: String },
    #[error("Unlocatable: {0}")]
    Unlocatable(&'static str),
    #[error("InvalidUrl: {url}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("PageNotFound: {0}")]
    PageNotFound(String),
    #[error("HighlightNotFound: {0}")]
    HighlightNotFound(String),
}

impl HiliteError {
    pub fn storage(error: anyhow::Error) -> Self {
        HiliteError::StorageFailure(error.into())
    }

    /// Stable, wire-friendly name of the error kind.
    pub fn kind(&self) -> &'static str {
        use HiliteError::*;
        match self {
            LocatorStale(_) => "locatorStale",
            EmptySelection => "emptySelection",
            StorageFailure(_) => "storageFailure",
            InvalidLocator { .. } => "invalidLocator",
            Unlocatable(_) => "unlocatable",
            InvalidUrl { .. } => "invalidUrl",
            PageNotFound(_) => "pageNotFound",
            HighlightNotFound(_) => "highlightNotFound",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_failure_keeps_the_cause_chain() {
        let err = HiliteError::storage(anyhow::anyhow!("disk full"));
        assert_eq!(err.kind(), "storageFailure");
        assert!(err.source().is_some());
        assert!(crate::unpack_error(&err).starts_with("StorageFailure: disk full"));
    }
}
