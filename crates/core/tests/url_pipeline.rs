//! URL pipeline integration tests.
//!
//! These tests drive ingestion and the stage operators against a real
//! SQLite store with mock collaborators:
//! - Duplicate detection across batches
//! - Probe redirects, including self-redirects
//! - Relevancy annotation end to end
//! - Validation gating on the URL name
//! - Root page title caching

use std::sync::Arc;

use serde_json::json;

use sourcecollector_core::{
    annotation::{
        AnnotationKind, AnnotationOrigin, AnnotationStore, AnnotationValue, ValidationSource,
        ValidationStatus,
    },
    lifecycle::{LifecycleManager, TransitionOutcome},
    operator::{
        HtmlStage, MiscMetadataStage, OperatorConfig, ProbeStage, RelevancyStage, TaskOperator,
    },
    root_cache::RootUrlCache,
    store::SqliteStore,
    task::{TaskStatus, TaskStore},
    testing::{fixtures, MockPageFetcher, MockProber, MockRelevanceClassifier, MOCK_MODEL},
    urls::{ArtifactStore, CollectedUrl, CollectorType, UrlFilter, UrlStatus, UrlStore},
};

/// Shared store and lifecycle for one test.
struct TestHarness {
    store: Arc<SqliteStore>,
    lifecycle: Arc<LifecycleManager>,
}

impl TestHarness {
    fn new() -> Self {
        let store = Arc::new(SqliteStore::in_memory().expect("in-memory store"));
        let lifecycle = Arc::new(LifecycleManager::from_store(store.clone()));
        Self { store, lifecycle }
    }

    fn config() -> OperatorConfig {
        OperatorConfig {
            retry_backoff_ms: 1,
            ..Default::default()
        }
    }

    fn operator<P>(&self, stage: P) -> TaskOperator<P>
    where
        P: sourcecollector_core::operator::StageProcessor,
    {
        TaskOperator::new(stage, self.lifecycle.clone(), self.store.clone(), Self::config())
    }

    fn seed_html(&self, url: &str, title: &str) -> i64 {
        let batch = self
            .lifecycle
            .register_batch(CollectorType::CommonCrawler, 1)
            .unwrap();
        fixtures::seed_html_url(&self.lifecycle, self.store.as_ref(), Some(batch.id), url, title)
            .unwrap()
    }
}

#[tokio::test]
async fn test_relevancy_end_to_end() {
    let h = TestHarness::new();
    let first = h.seed_html("https://springfield.gov/police/arrests", "Arrest Logs");
    let second = h.seed_html("https://springfield.gov/parks", "Parks and Recreation");

    let classifier = MockRelevanceClassifier::with_verdicts(&[true, false]);
    let operator = h.operator(RelevancyStage::new(
        h.store.clone(),
        h.lifecycle.clone(),
        Arc::new(classifier.clone()),
    ));

    let info = operator.run(10).await.unwrap();
    assert_eq!(info.processed, 2);
    assert_eq!(info.errored, 0);
    assert_eq!(info.succeeded, 2);

    let mut verdicts = Vec::new();
    for id in [first, second] {
        let annotation = h
            .store
            .get_annotation(id, AnnotationKind::Relevant, AnnotationOrigin::Auto)
            .unwrap()
            .expect("automated relevance annotation");
        assert_eq!(annotation.validation_status, ValidationStatus::PendingValidation);
        assert_eq!(annotation.validation_source, ValidationSource::MachineLearning);
        assert_eq!(annotation.model_name.as_deref(), Some(MOCK_MODEL));
        let AnnotationValue::Relevant { is_relevant } = annotation.value else {
            panic!("unexpected annotation value {:?}", annotation.value);
        };
        verdicts.push(is_relevant);
        // Annotating does not move the URL.
        assert_eq!(h.store.get_url(id).unwrap().unwrap().status, UrlStatus::Pending);
    }
    verdicts.sort();
    assert_eq!(verdicts, vec![false, true]);

    let task = h.store.get_task(info.task_id.unwrap()).unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Complete);

    // Annotated URLs are no longer eligible.
    let again = operator.run(10).await.unwrap();
    assert!(again.is_empty());
    assert_eq!(classifier.recorded_inputs().await.len(), 2);
}

#[tokio::test]
async fn test_duplicate_across_batches() {
    let h = TestHarness::new();
    let first = h.lifecycle.register_batch(CollectorType::Ckan, 1).unwrap();
    let summary = h
        .lifecycle
        .ingest(
            first.id,
            vec![CollectedUrl::new("https://data.city.gov/dataset/crime#resources")],
        )
        .unwrap();
    assert_eq!(summary.created.len(), 1);
    let original = summary.created[0];

    let second = h.lifecycle.register_batch(CollectorType::AutoGoogler, 2).unwrap();
    let summary = h
        .lifecycle
        .ingest(
            second.id,
            vec![
                CollectedUrl::new("https://data.city.gov/dataset/crime"),
                CollectedUrl::new("https://data.city.gov/dataset/crime\u{a0}"),
            ],
        )
        .unwrap();
    assert!(summary.created.is_empty());
    assert_eq!(summary.duplicates, vec![original, original]);

    let duplicates = h.store.list_duplicates(second.id).unwrap();
    assert_eq!(duplicates.len(), 2);
    assert!(duplicates.iter().all(|d| d.original_url_id == original));
    assert_eq!(h.store.count_urls(&UrlFilter::new()).unwrap(), 1);
}

#[tokio::test]
async fn test_concurrent_ingestion_creates_one_row() {
    let h = TestHarness::new();
    let mut handles = Vec::new();
    for user in 0..8 {
        let lifecycle = h.lifecycle.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            let batch = lifecycle.register_batch(CollectorType::MuckrockAllSearch, user).unwrap();
            lifecycle
                .ingest(batch.id, vec![CollectedUrl::new("https://records.gov/foia/42")])
                .unwrap()
        }));
    }

    let mut created = 0;
    let mut ids = Vec::new();
    for handle in handles {
        let summary = handle.await.unwrap();
        created += summary.created.len();
        ids.extend(summary.created.iter().chain(summary.duplicates.iter()).copied());
    }
    assert_eq!(created, 1);
    ids.dedup();
    assert_eq!(ids.len(), 1);
    assert_eq!(h.store.count_urls(&UrlFilter::new()).unwrap(), 1);
}

#[tokio::test]
async fn test_self_redirect_keeps_url_pending() {
    let h = TestHarness::new();
    let batch = h.lifecycle.register_batch(CollectorType::AutoGoogler, 1).unwrap();
    let summary = h
        .lifecycle
        .ingest(batch.id, vec![CollectedUrl::new("https://city.gov/police/")])
        .unwrap();
    let id = summary.created[0];

    let prober = MockProber::new();
    prober
        .set_redirect("https://city.gov/police/", "https://city.gov/police/#main")
        .await;
    let operator = h.operator(ProbeStage::new(
        h.store.clone(),
        h.lifecycle.clone(),
        Arc::new(prober.clone()),
    ));

    let info = operator.run(10).await.unwrap();
    assert_eq!(info.errored, 0);
    assert_eq!(h.store.redirect_target(id).unwrap(), Some(id));
    assert_eq!(h.store.get_url(id).unwrap().unwrap().status, UrlStatus::Pending);
    assert_eq!(h.store.count_urls(&UrlFilter::new()).unwrap(), 1);
}

#[tokio::test]
async fn test_probe_then_html_shares_root_title() {
    let h = TestHarness::new();
    let batch = h.lifecycle.register_batch(CollectorType::CommonCrawler, 1).unwrap();
    let summary = h
        .lifecycle
        .ingest(
            batch.id,
            vec![
                CollectedUrl::new("https://county.gov/sheriff/roster"),
                CollectedUrl::new("https://county.gov/sheriff/warrants"),
            ],
        )
        .unwrap();

    let prober = MockProber::new();
    let probe = h.operator(ProbeStage::new(
        h.store.clone(),
        h.lifecycle.clone(),
        Arc::new(prober),
    ));
    assert_eq!(probe.run(10).await.unwrap().succeeded, 2);

    let fetcher = MockPageFetcher::new();
    fetcher
        .set_page("https://county.gov/sheriff/roster", &fixtures::html_page("Jail Roster"))
        .await;
    fetcher
        .set_page("https://county.gov/sheriff/warrants", &fixtures::html_page("Warrants"))
        .await;
    fetcher
        .set_page("https://county.gov", &fixtures::html_page("County Government"))
        .await;
    let root_cache = Arc::new(RootUrlCache::new(h.store.clone(), Arc::new(fetcher.clone())));
    // One item at a time, so the second lookup sees the cached entry.
    let config = OperatorConfig {
        max_concurrency: 1,
        ..TestHarness::config()
    };
    let html = TaskOperator::new(
        HtmlStage::new(h.store.clone(), Arc::new(fetcher.clone()), root_cache),
        h.lifecycle.clone(),
        h.store.clone(),
        config,
    );
    assert_eq!(html.run(10).await.unwrap().succeeded, 2);

    for id in &summary.created {
        let content = h.store.html_for(*id).unwrap().unwrap();
        assert_eq!(content.root_page_title.as_deref(), Some("County Government"));
    }
    let root_fetches = fetcher
        .fetched_urls()
        .await
        .into_iter()
        .filter(|u| u == "https://county.gov")
        .count();
    assert_eq!(root_fetches, 1);
}

#[tokio::test]
async fn test_validation_requires_name() {
    let h = TestHarness::new();
    let batch = h.lifecycle.register_batch(CollectorType::Ckan, 1).unwrap();
    let summary = h
        .lifecycle
        .ingest(
            batch.id,
            vec![CollectedUrl::new("https://data.town.gov/dataset/stops").with_metadata(json!({
                "submitted_name": "Traffic Stops",
                "description": "Stop data by year"
            }))],
        )
        .unwrap();
    let id = summary.created[0];

    // No name yet: the request leaves the URL pending.
    let outcome = h.lifecycle.mark_validated(id).unwrap();
    assert!(matches!(outcome, TransitionOutcome::Reverted { .. }));
    assert_eq!(h.store.get_url(id).unwrap().unwrap().status, UrlStatus::Pending);

    // The misc metadata stage names the URL from the collector's fields.
    let misc = h.operator(MiscMetadataStage::new(
        h.store.clone(),
        h.store.clone(),
        h.lifecycle.clone(),
    ));
    assert_eq!(misc.run(10).await.unwrap().succeeded, 1);
    assert_eq!(
        h.store.get_url(id).unwrap().unwrap().name.as_deref(),
        Some("Traffic Stops")
    );

    let outcome = h.lifecycle.mark_validated(id).unwrap();
    assert!(matches!(outcome, TransitionOutcome::Applied { .. }));
    assert_eq!(h.store.get_url(id).unwrap().unwrap().status, UrlStatus::Validated);
}
