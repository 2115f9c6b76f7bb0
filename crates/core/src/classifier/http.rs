//! JSON-over-HTTP classifier client.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ClassifierConfig;
use crate::fetch::FetchError;
use crate::metrics::{EXTERNAL_SERVICE_DURATION, EXTERNAL_SERVICE_REQUESTS};

use super::{
    ClassifierError, ClassifierInput, RecordTypeClassifier, RecordTypeVerdict,
    RelevanceClassifier, RelevanceVerdict,
};

/// Client for a classifier service exposing `POST {endpoint}/relevancy`
/// and `POST {endpoint}/record-type`.
pub struct HttpClassifier {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct ClassifyRequest<'a> {
    inputs: &'a [ClassifierInput],
}

#[derive(Debug, Deserialize)]
struct ClassifyResponse<T> {
    results: Vec<T>,
}

impl HttpClassifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self, ClassifierError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ClassifierError::Permanent(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    async fn post<T: DeserializeOwned>(
        &self,
        operation: &str,
        inputs: &[ClassifierInput],
    ) -> Result<Vec<T>, ClassifierError> {
        let started = Instant::now();
        let result = self.send::<T>(operation, inputs).await;

        EXTERNAL_SERVICE_DURATION
            .with_label_values(&["classifier", operation])
            .observe(started.elapsed().as_secs_f64());
        let status = if result.is_ok() { "success" } else { "error" };
        EXTERNAL_SERVICE_REQUESTS
            .with_label_values(&["classifier", operation, status])
            .inc();

        result
    }

    async fn send<T: DeserializeOwned>(
        &self,
        operation: &str,
        inputs: &[ClassifierInput],
    ) -> Result<Vec<T>, ClassifierError> {
        let mut request = self
            .client
            .post(format!("{}/{}", self.endpoint, operation))
            .json(&ClassifyRequest { inputs });
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(FetchError::from)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("{} returned {}: {}", operation, status.as_u16(), body);
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                ClassifierError::Transient(message)
            } else {
                ClassifierError::Permanent(message)
            });
        }

        let parsed: ClassifyResponse<T> = response
            .json()
            .await
            .map_err(|e| ClassifierError::Permanent(format!("malformed response: {e}")))?;
        debug!(operation, results = parsed.results.len(), "Classifier responded");
        Ok(parsed.results)
    }
}

#[async_trait]
impl RelevanceClassifier for HttpClassifier {
    async fn classify_relevance(
        &self,
        input: &ClassifierInput,
    ) -> Result<RelevanceVerdict, ClassifierError> {
        let mut results: Vec<RelevanceVerdict> =
            self.post("relevancy", std::slice::from_ref(input)).await?;
        if results.len() != 1 {
            return Err(ClassifierError::Permanent(format!(
                "expected 1 relevancy result, got {}",
                results.len()
            )));
        }
        Ok(results.remove(0))
    }
}

#[async_trait]
impl RecordTypeClassifier for HttpClassifier {
    async fn classify_record_types(
        &self,
        inputs: &[ClassifierInput],
    ) -> Result<Vec<RecordTypeVerdict>, ClassifierError> {
        self.post("record-type", inputs).await
    }
}
