use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::annotation::{RecordType, SuggestionType};
use crate::fetch::FetchError;
use crate::urls::{HtmlContent, UrlId, UrlRecord};

/// Errors from classifier collaborators.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ClassifierError {
    #[error("transient classifier failure: {0}")]
    Transient(String),

    #[error("classifier failure: {0}")]
    Permanent(String),
}

impl ClassifierError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ClassifierError::Transient(_))
    }
}

impl From<FetchError> for ClassifierError {
    fn from(e: FetchError) -> Self {
        if e.is_transient() {
            ClassifierError::Transient(e.to_string())
        } else {
            ClassifierError::Permanent(e.to_string())
        }
    }
}

/// Text a classifier sees for one URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassifierInput {
    pub url_id: UrlId,
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub h1: Option<String>,
    pub root_page_title: Option<String>,
    pub html: String,
}

impl ClassifierInput {
    pub fn new(url: &UrlRecord, html: &HtmlContent) -> Self {
        Self {
            url_id: url.id,
            url: url.url.clone(),
            title: html.title.clone(),
            description: html.description.clone(),
            h1: html.h1.clone(),
            root_page_title: html.root_page_title.clone(),
            html: html.html.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelevanceVerdict {
    pub is_relevant: bool,
    pub confidence: Option<f32>,
    pub model_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordTypeVerdict {
    pub record_type: RecordType,
    pub confidence: Option<f32>,
    pub model_name: Option<String>,
}

/// One candidate agency for a URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgencySuggestion {
    pub agency_id: Option<i64>,
    pub suggestion_type: SuggestionType,
    pub confidence: Option<f32>,
}

/// Everything sent upstream when registering a data source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataSourceSubmission {
    pub url_id: UrlId,
    pub url: String,
    pub name: String,
    pub description: Option<String>,
    pub record_type: Option<RecordType>,
    pub agency_id: Option<i64>,
    pub record_formats: Vec<String>,
    pub data_portal_type: Option<String>,
    pub supplying_entity: Option<String>,
}
