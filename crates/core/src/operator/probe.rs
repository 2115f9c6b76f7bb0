//! Probe stage: one request per URL without following redirects.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::dedup::Deduplicator;
use crate::fetch::{ProbeResponse, UrlProber};
use crate::lifecycle::LifecycleManager;
use crate::store::StoreError;
use crate::task::{TaskId, TaskType};
use crate::urls::{canonicalize, resolve_location, ArtifactStore, UrlId, UrlRecord, WebMetadata};

use super::harness::StageProcessor;
use super::types::StageError;

pub enum ProbeOutcome {
    Response(ProbeResponse),
    /// The request failed in a way retrying will not fix.
    Unreachable(String),
}

pub struct ProbeStage {
    artifacts: Arc<dyn ArtifactStore>,
    lifecycle: Arc<LifecycleManager>,
    prober: Arc<dyn UrlProber>,
}

impl ProbeStage {
    pub fn new(
        artifacts: Arc<dyn ArtifactStore>,
        lifecycle: Arc<LifecycleManager>,
        prober: Arc<dyn UrlProber>,
    ) -> Self {
        Self {
            artifacts,
            lifecycle,
            prober,
        }
    }

    /// Resolve `location` to the URL it points at, registering it when new.
    /// A self-redirect resolves to the source URL.
    fn redirect_destination(&self, url: &UrlRecord, location: &str) -> Result<UrlId, StageError> {
        let target = resolve_location(&url.url, location).ok_or_else(|| {
            StageError::Permanent(format!("unusable redirect location {:?}", location))
        })?;

        if comparable(&target) == comparable(&url.url) {
            // No new content was resolved; the URL stays pending.
            debug!(url_id = url.id, "Self-redirect");
            return Ok(url.id);
        }
        Ok(self
            .lifecycle
            .register_discovered(&target, url.batch_id)?
            .url_id())
    }
}

/// Form used to decide whether two URLs are the same after normalization.
fn comparable(raw: &str) -> String {
    let canonical = Deduplicator::canonical(raw).unwrap_or_else(|_| canonicalize(raw));
    match url::Url::parse(&canonical) {
        Ok(parsed) => canonicalize(parsed.as_str()),
        Err(_) => canonical,
    }
}

#[async_trait]
impl StageProcessor for ProbeStage {
    type Item = UrlRecord;
    type Output = ProbeOutcome;

    fn task_type(&self) -> TaskType {
        TaskType::Probe
    }

    fn fetch_eligible(&self, limit: usize) -> Result<Vec<UrlRecord>, StoreError> {
        self.artifacts.urls_without_probe(limit)
    }

    fn url_id(item: &UrlRecord) -> UrlId {
        item.id
    }

    async fn process(&self, url: &UrlRecord) -> Result<ProbeOutcome, StageError> {
        match self.prober.probe(&url.url).await {
            Ok(response) => Ok(ProbeOutcome::Response(response)),
            Err(e) if e.is_transient() => Err(StageError::Retryable(e.to_string())),
            Err(e) => Ok(ProbeOutcome::Unreachable(e.to_string())),
        }
    }

    fn commit(
        &self,
        _task_id: TaskId,
        url: UrlRecord,
        outcome: ProbeOutcome,
    ) -> Result<(), StageError> {
        match outcome {
            ProbeOutcome::Unreachable(error) => {
                let metadata = WebMetadata {
                    status_code: None,
                    content_type: None,
                    error: Some(error),
                };
                self.artifacts.record_web_metadata(url.id, &metadata)?;
                Ok(())
            }
            ProbeOutcome::Response(response) => {
                // Resolve first so an unusable location leaves no artifacts.
                let destination = match response.location.as_deref() {
                    Some(location) if response.is_redirect() => {
                        Some(self.redirect_destination(&url, location)?)
                    }
                    _ => None,
                };
                let metadata = WebMetadata {
                    status_code: Some(response.status_code),
                    content_type: response.content_type.clone(),
                    error: None,
                };
                self.artifacts.record_web_metadata(url.id, &metadata)?;
                if let Some(destination) = destination {
                    self.artifacts.record_redirect(url.id, destination)?;
                    if destination != url.id {
                        info!(url_id = url.id, destination_id = destination, "Recorded redirect");
                    }
                }
                Ok(())
            }
        }
    }
}
