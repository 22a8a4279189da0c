//! # contract: the I/O seams of the pipeline
//!
//! The core never talks to the network directly. Everything that leaves the
//! process goes through one of the two traits below:
//!
//! - [`PageFetcher`]: GETs a URL and returns its body as text (report pages,
//!   the HTML template, the stylesheet).
//! - [`ReasoningClient`]: sends one [`ReasoningRequest`] to the reasoning
//!   service and returns the raw completion text, unparsed.
//!
//! Real implementations live in the binary crate; tests use the `mockall`
//! mocks exported behind the `test-export-mocks` feature.

use async_trait::async_trait;

use mockall::{automock, predicate::*};

/// Failure to retrieve a page. Terminal for the report being processed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("GET {url} returned HTTP {status}")]
    Status { status: u16, url: String },

    #[error("transport error: {0}")]
    Transport(String),
}

/// Failure to obtain a completion from the reasoning service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReasoningError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("reasoning service returned HTTP {0}: {1}")]
    Status(u16, String),

    #[error("reasoning service returned an empty completion")]
    EmptyResponse,
}

/// Everything the reasoning service needs for one analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasoningRequest {
    /// Fixed system instruction (role, schema, rules).
    pub system: String,
    /// JSON-serialized user payload.
    pub user: String,
}

/// Fetches text documents over whatever transport the orchestrator chose.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch `url`, following redirects. Non-success statuses are errors.
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError>;
}

/// Sends a request to the reasoning service and returns the raw completion.
///
/// Implementors must not try to parse or repair the answer; that belongs to
/// [`crate::analyze`], which also owns the retry policy.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ReasoningClient: Send + Sync {
    async fn complete(&self, request: &ReasoningRequest) -> Result<String, ReasoningError>;
}
