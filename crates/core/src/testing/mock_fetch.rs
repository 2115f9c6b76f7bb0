//! Mock page fetcher and prober.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::fetch::{FetchError, FetchedPage, PageFetcher, ProbeResponse, UrlProber};

/// Mock implementation of [`PageFetcher`].
///
/// Serves configured HTML by exact URL; anything else is a 404. Every call
/// is recorded, including failed ones.
#[derive(Debug, Clone, Default)]
pub struct MockPageFetcher {
    pages: Arc<RwLock<HashMap<String, String>>>,
    fetched: Arc<RwLock<Vec<String>>>,
    /// If set, the next fetch fails with this error.
    next_error: Arc<RwLock<Option<FetchError>>>,
    delay: Arc<RwLock<Option<Duration>>>,
}

impl MockPageFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_page(&self, url: &str, html: &str) {
        self.pages
            .write()
            .await
            .insert(url.to_string(), html.to_string());
    }

    pub async fn set_next_error(&self, error: FetchError) {
        *self.next_error.write().await = Some(error);
    }

    /// Sleep this long before answering.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = Some(delay);
    }

    pub async fn fetched_urls(&self) -> Vec<String> {
        self.fetched.read().await.clone()
    }

    pub async fn fetch_count(&self) -> usize {
        self.fetched.read().await.len()
    }
}

#[async_trait]
impl PageFetcher for MockPageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        self.fetched.write().await.push(url.to_string());

        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }

        match self.pages.read().await.get(url) {
            Some(body) => Ok(FetchedPage {
                final_url: url.to_string(),
                status: 200,
                content_type: Some("text/html".to_string()),
                body: body.clone(),
            }),
            None => Err(FetchError::Status(404)),
        }
    }
}

/// Mock implementation of [`UrlProber`].
///
/// Unconfigured URLs answer `200 text/html`.
#[derive(Debug, Clone, Default)]
pub struct MockProber {
    responses: Arc<RwLock<HashMap<String, Result<ProbeResponse, FetchError>>>>,
    probed: Arc<RwLock<Vec<String>>>,
}

impl MockProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_status(&self, url: &str, status_code: u16) {
        self.set_response(url, status_code, None).await;
    }

    /// Answer `url` with a redirect to `location`.
    pub async fn set_redirect(&self, url: &str, location: &str) {
        self.set_response(url, 301, Some(location)).await;
    }

    pub async fn set_response(&self, url: &str, status_code: u16, location: Option<&str>) {
        let response = ProbeResponse {
            url: url.to_string(),
            status_code,
            content_type: Some("text/html".to_string()),
            location: location.map(str::to_string),
        };
        self.responses
            .write()
            .await
            .insert(url.to_string(), Ok(response));
    }

    /// Every probe of `url` fails with `error`.
    pub async fn set_error(&self, url: &str, error: FetchError) {
        self.responses
            .write()
            .await
            .insert(url.to_string(), Err(error));
    }

    pub async fn probed_urls(&self) -> Vec<String> {
        self.probed.read().await.clone()
    }
}

#[async_trait]
impl UrlProber for MockProber {
    async fn probe(&self, url: &str) -> Result<ProbeResponse, FetchError> {
        self.probed.write().await.push(url.to_string());
        match self.responses.read().await.get(url) {
            Some(result) => result.clone(),
            None => Ok(ProbeResponse {
                url: url.to_string(),
                status_code: 200,
                content_type: Some("text/html".to_string()),
                location: None,
            }),
        }
    }
}
