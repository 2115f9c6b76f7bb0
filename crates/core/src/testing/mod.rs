//! Mock collaborators and fixtures for tests.
//!
//! Every external service the pipeline talks to has a mock here that
//! records its calls and can be told to fail.
//!
//! # Example
//!
//! ```rust,ignore
//! use sourcecollector_core::testing::{MockPageFetcher, MockRelevanceClassifier};
//!
//! let fetcher = MockPageFetcher::new();
//! fetcher.set_page("https://city.gov", "<title>City</title>").await;
//!
//! let classifier = MockRelevanceClassifier::with_verdicts(&[true, false]);
//! ```

mod mock_agency_source;
mod mock_classifier;
mod mock_fetch;

pub use mock_agency_source::MockAgencySource;
pub use mock_classifier::{
    MockAgencyIdentifier, MockDuplicateChecker, MockRecordTypeClassifier, MockRegistrar,
    MockRelevanceClassifier, MOCK_MODEL,
};
pub use mock_fetch::{MockPageFetcher, MockProber};

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::lifecycle::{LifecycleError, LifecycleManager};
    use crate::urls::{ArtifactStore, BatchId, HtmlContent, UrlId, WebMetadata};

    /// A small HTML page with the given title.
    pub fn html_page(title: &str) -> String {
        format!(
            "<html><head><title>{title}</title>\
             <meta name=\"description\" content=\"About {title}\"></head>\
             <body><h1>{title}</h1></body></html>"
        )
    }

    pub fn html_content(title: &str) -> HtmlContent {
        HtmlContent {
            html: html_page(title),
            title: Some(title.to_string()),
            description: Some(format!("About {title}")),
            h1: Some(title.to_string()),
            root_page_title: None,
        }
    }

    pub fn ok_metadata() -> WebMetadata {
        WebMetadata {
            status_code: Some(200),
            content_type: Some("text/html".to_string()),
            error: None,
        }
    }

    /// Register `url`, mark it probed and store a page titled `title`.
    pub fn seed_html_url(
        lifecycle: &LifecycleManager,
        artifacts: &dyn ArtifactStore,
        batch_id: Option<BatchId>,
        url: &str,
        title: &str,
    ) -> Result<UrlId, LifecycleError> {
        let id = lifecycle.register_discovered(url, batch_id)?.url_id();
        artifacts.record_web_metadata(id, &ok_metadata())?;
        artifacts.store_html(id, &html_content(title))?;
        Ok(id)
    }
}
