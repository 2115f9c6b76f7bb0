//! reqwest-backed fetcher and prober.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::Client;
use tracing::debug;

use crate::config::HttpConfig;

use super::{FetchError, FetchedPage, PageFetcher, ProbeResponse, UrlProber};

/// Browser-like user agent; several agency sites refuse unknown clients.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Fetches full pages, following redirects.
pub struct HttpPageFetcher {
    client: Client,
}

impl HttpPageFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let final_url = response.url().to_string();
        let content_type = header_string(response.headers().get(CONTENT_TYPE));
        let body = response.text().await?;

        debug!(url, bytes = body.len(), "Fetched page");

        Ok(FetchedPage {
            final_url,
            status: status.as_u16(),
            content_type,
            body,
        })
    }
}

/// Probes URLs with redirects disabled so the `Location` can be recorded.
pub struct HttpProber {
    client: Client,
}

impl HttpProber {
    pub fn new(config: &HttpConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.probe_timeout_secs))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl UrlProber for HttpProber {
    async fn probe(&self, url: &str) -> Result<ProbeResponse, FetchError> {
        let response = self.client.get(url).send().await?;
        let status_code = response.status().as_u16();
        let content_type = header_string(response.headers().get(CONTENT_TYPE));
        let location = if response.status().is_redirection() {
            header_string(response.headers().get(LOCATION))
        } else {
            None
        };

        debug!(url, status_code, ?location, "Probed URL");

        Ok(ProbeResponse {
            url: url.to_string(),
            status_code,
            content_type,
            location,
        })
    }
}

fn header_string(value: Option<&reqwest::header::HeaderValue>) -> Option<String> {
    value
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clients_build_from_default_config() {
        let config = HttpConfig::default();
        assert!(HttpPageFetcher::new(&config).is_ok());
        assert!(HttpProber::new(&config).is_ok());
    }

    #[tokio::test]
    async fn test_invalid_url_is_not_transient() {
        let fetcher = HttpPageFetcher::new(&HttpConfig::default()).unwrap();
        let err = fetcher.fetch("not a url").await.unwrap_err();
        assert!(!err.is_transient(), "unexpected transient error: {err:?}");
    }
}
