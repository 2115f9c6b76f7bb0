//! Annotation storage trait.

use crate::store::StoreError;
use crate::urls::{HtmlContent, UrlId, UrlRecord};

use super::{Annotation, AnnotationKind, AnnotationOrigin, NewAnnotation};

/// Storage for annotations.
///
/// Implementations enforce uniqueness of `(url, kind, origin)`: writing a
/// second automated annotation of a kind replaces the first.
pub trait AnnotationStore: Send + Sync {
    /// Insert or replace the annotation in its `(url, kind, origin)` slot.
    fn upsert_annotation(&self, annotation: &NewAnnotation) -> Result<Annotation, StoreError>;

    fn get_annotation(
        &self,
        url_id: UrlId,
        kind: AnnotationKind,
        origin: AnnotationOrigin,
    ) -> Result<Option<Annotation>, StoreError>;

    fn annotations_for(&self, url_id: UrlId) -> Result<Vec<Annotation>, StoreError>;

    /// Pending URLs with stored HTML and no automated annotation of `kind`.
    fn urls_with_html_missing_auto(
        &self,
        kind: AnnotationKind,
        limit: usize,
    ) -> Result<Vec<(UrlRecord, HtmlContent)>, StoreError>;

    /// Pending URLs with no automated annotation of `kind`.
    fn pending_urls_missing_auto(
        &self,
        kind: AnnotationKind,
        limit: usize,
    ) -> Result<Vec<UrlRecord>, StoreError>;

    /// The annotation in force: human beats automated.
    fn effective_annotation(
        &self,
        url_id: UrlId,
        kind: AnnotationKind,
    ) -> Result<Option<Annotation>, StoreError> {
        if let Some(human) = self.get_annotation(url_id, kind, AnnotationOrigin::Human)? {
            return Ok(Some(human));
        }
        self.get_annotation(url_id, kind, AnnotationOrigin::Auto)
    }
}
