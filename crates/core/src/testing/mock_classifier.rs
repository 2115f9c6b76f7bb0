//! Mock classifier collaborators.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::annotation::RecordType;
use crate::classifier::{
    AgencyIdentifier, AgencySuggestion, ClassifierError, ClassifierInput, DataSourceRegistrar,
    DataSourceSubmission, DuplicateChecker, RecordTypeClassifier, RecordTypeVerdict,
    RelevanceClassifier, RelevanceVerdict,
};
use crate::urls::UrlRecord;

pub const MOCK_MODEL: &str = "mock-model";

/// Mock implementation of [`RelevanceClassifier`].
///
/// Per-URL verdicts win; otherwise queued verdicts are handed out in call
/// order; otherwise the URL is relevant.
#[derive(Debug, Clone, Default)]
pub struct MockRelevanceClassifier {
    by_url: Arc<RwLock<HashMap<String, bool>>>,
    queue: Arc<RwLock<VecDeque<bool>>>,
    errors: Arc<RwLock<VecDeque<ClassifierError>>>,
    inputs: Arc<RwLock<Vec<ClassifierInput>>>,
}

impl MockRelevanceClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue verdicts returned in call order.
    pub fn with_verdicts(verdicts: &[bool]) -> Self {
        Self {
            queue: Arc::new(RwLock::new(verdicts.iter().copied().collect())),
            ..Self::default()
        }
    }

    pub async fn set_verdict(&self, url: &str, is_relevant: bool) {
        self.by_url.write().await.insert(url.to_string(), is_relevant);
    }

    /// Fail the next call. Repeated calls queue several failures.
    pub async fn push_error(&self, error: ClassifierError) {
        self.errors.write().await.push_back(error);
    }

    pub async fn recorded_inputs(&self) -> Vec<ClassifierInput> {
        self.inputs.read().await.clone()
    }
}

#[async_trait]
impl RelevanceClassifier for MockRelevanceClassifier {
    async fn classify_relevance(
        &self,
        input: &ClassifierInput,
    ) -> Result<RelevanceVerdict, ClassifierError> {
        self.inputs.write().await.push(input.clone());
        if let Some(error) = self.errors.write().await.pop_front() {
            return Err(error);
        }

        let by_url = self.by_url.read().await.get(&input.url).copied();
        let is_relevant = match by_url {
            Some(v) => v,
            None => self.queue.write().await.pop_front().unwrap_or(true),
        };
        Ok(RelevanceVerdict {
            is_relevant,
            confidence: Some(0.9),
            model_name: Some(MOCK_MODEL.to_string()),
        })
    }
}

/// Mock implementation of [`RecordTypeClassifier`].
#[derive(Debug, Clone, Default)]
pub struct MockRecordTypeClassifier {
    by_url: Arc<RwLock<HashMap<String, RecordType>>>,
    /// Return this many results regardless of the input count.
    result_count: Arc<RwLock<Option<usize>>>,
    next_error: Arc<RwLock<Option<ClassifierError>>>,
    calls: Arc<RwLock<Vec<Vec<ClassifierInput>>>>,
}

impl MockRecordTypeClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_record_type(&self, url: &str, record_type: RecordType) {
        self.by_url.write().await.insert(url.to_string(), record_type);
    }

    pub async fn set_result_count(&self, count: usize) {
        *self.result_count.write().await = Some(count);
    }

    pub async fn set_next_error(&self, error: ClassifierError) {
        *self.next_error.write().await = Some(error);
    }

    pub async fn recorded_calls(&self) -> Vec<Vec<ClassifierInput>> {
        self.calls.read().await.clone()
    }
}

#[async_trait]
impl RecordTypeClassifier for MockRecordTypeClassifier {
    async fn classify_record_types(
        &self,
        inputs: &[ClassifierInput],
    ) -> Result<Vec<RecordTypeVerdict>, ClassifierError> {
        self.calls.write().await.push(inputs.to_vec());
        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }

        let by_url = self.by_url.read().await;
        let mut verdicts: Vec<RecordTypeVerdict> = inputs
            .iter()
            .map(|input| RecordTypeVerdict {
                record_type: by_url.get(&input.url).copied().unwrap_or(RecordType::Other),
                confidence: Some(0.8),
                model_name: Some(MOCK_MODEL.to_string()),
            })
            .collect();
        if let Some(count) = *self.result_count.read().await {
            let filler = verdicts.first().cloned().unwrap_or(RecordTypeVerdict {
                record_type: RecordType::Other,
                confidence: None,
                model_name: None,
            });
            verdicts.resize(count, filler);
        }
        Ok(verdicts)
    }
}

/// Mock implementation of [`AgencyIdentifier`]. Unconfigured URLs get no
/// suggestions.
#[derive(Debug, Clone, Default)]
pub struct MockAgencyIdentifier {
    by_url: Arc<RwLock<HashMap<String, Vec<AgencySuggestion>>>>,
    next_error: Arc<RwLock<Option<ClassifierError>>>,
}

impl MockAgencyIdentifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_suggestions(&self, url: &str, suggestions: Vec<AgencySuggestion>) {
        self.by_url.write().await.insert(url.to_string(), suggestions);
    }

    pub async fn set_next_error(&self, error: ClassifierError) {
        *self.next_error.write().await = Some(error);
    }
}

#[async_trait]
impl AgencyIdentifier for MockAgencyIdentifier {
    async fn identify_agencies(
        &self,
        url: &UrlRecord,
    ) -> Result<Vec<AgencySuggestion>, ClassifierError> {
        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }
        Ok(self
            .by_url
            .read()
            .await
            .get(&url.url)
            .cloned()
            .unwrap_or_default())
    }
}

/// Mock implementation of [`DuplicateChecker`].
#[derive(Debug, Clone, Default)]
pub struct MockDuplicateChecker {
    duplicates: Arc<RwLock<Vec<String>>>,
    next_error: Arc<RwLock<Option<ClassifierError>>>,
}

impl MockDuplicateChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `url` as already registered upstream.
    pub async fn add_duplicate(&self, url: &str) {
        self.duplicates.write().await.push(url.to_string());
    }

    pub async fn set_next_error(&self, error: ClassifierError) {
        *self.next_error.write().await = Some(error);
    }
}

#[async_trait]
impl DuplicateChecker for MockDuplicateChecker {
    async fn is_duplicate(&self, url: &str) -> Result<bool, ClassifierError> {
        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }
        Ok(self.duplicates.read().await.iter().any(|d| d == url))
    }
}

/// Mock implementation of [`DataSourceRegistrar`]. Hands out ids from 1000.
#[derive(Debug, Clone, Default)]
pub struct MockRegistrar {
    submissions: Arc<RwLock<Vec<DataSourceSubmission>>>,
    next_error: Arc<RwLock<Option<ClassifierError>>>,
}

impl MockRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_next_error(&self, error: ClassifierError) {
        *self.next_error.write().await = Some(error);
    }

    pub async fn recorded_submissions(&self) -> Vec<DataSourceSubmission> {
        self.submissions.read().await.clone()
    }
}

#[async_trait]
impl DataSourceRegistrar for MockRegistrar {
    async fn register(&self, submission: &DataSourceSubmission) -> Result<i64, ClassifierError> {
        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }
        let mut submissions = self.submissions.write().await;
        submissions.push(submission.clone());
        Ok(999 + submissions.len() as i64)
    }
}
