//! HTTP page retrieval and probing.
//!
//! The stages and the root URL cache depend only on the [`PageFetcher`]
//! and [`UrlProber`] traits; the reqwest-backed implementations live in
//! [`http`].

mod http;
mod parse;
mod types;

use async_trait::async_trait;

pub use http::{HttpPageFetcher, HttpProber, DEFAULT_USER_AGENT};
pub use parse::{parse_html, ParsedHtml};
pub use types::{FetchError, FetchedPage, ProbeResponse};

/// Retrieves a page body. Non-2xx responses are errors.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

/// Issues a single request without following redirects.
#[async_trait]
pub trait UrlProber: Send + Sync {
    async fn probe(&self, url: &str) -> Result<ProbeResponse, FetchError>;
}
