//! Source-specific metadata processors.
//!
//! Each collector stores its raw metadata blob on the URL. A processor
//! turns that blob into canonical [`MiscMetadata`] fields. Processors are
//! pure: no I/O, no shared state.

mod auto_googler;
mod ckan;
mod muckrock;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::annotation::MiscMetadata;
use crate::urls::CollectorType;

pub use auto_googler::AutoGooglerProcessor;
pub use ckan::CkanProcessor;
pub use muckrock::MuckrockProcessor;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SubtaskError {
    #[error("malformed {collector} metadata: {message}")]
    MalformedMetadata {
        collector: CollectorType,
        message: String,
    },
}

/// Converts a collector's raw metadata into canonical fields. Fields the
/// collector cannot supply stay `None`.
pub trait SubtaskProcessor {
    fn process(&self, metadata: &serde_json::Value) -> Result<MiscMetadata, SubtaskError>;
}

/// Processor selected by collector tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiscMetadataProcessor {
    Ckan(CkanProcessor),
    Muckrock(MuckrockProcessor),
    AutoGoogler(AutoGooglerProcessor),
}

impl MiscMetadataProcessor {
    /// None for collectors whose metadata carries nothing descriptive.
    pub fn for_collector(collector: CollectorType) -> Option<Self> {
        match collector {
            CollectorType::Ckan => Some(Self::Ckan(CkanProcessor)),
            CollectorType::MuckrockSimpleSearch
            | CollectorType::MuckrockCountySearch
            | CollectorType::MuckrockAllSearch => Some(Self::Muckrock(MuckrockProcessor)),
            CollectorType::AutoGoogler => Some(Self::AutoGoogler(AutoGooglerProcessor)),
            CollectorType::CommonCrawler | CollectorType::Example | CollectorType::Manual => None,
        }
    }
}

impl SubtaskProcessor for MiscMetadataProcessor {
    fn process(&self, metadata: &serde_json::Value) -> Result<MiscMetadata, SubtaskError> {
        match self {
            Self::Ckan(p) => p.process(metadata),
            Self::Muckrock(p) => p.process(metadata),
            Self::AutoGoogler(p) => p.process(metadata),
        }
    }
}

/// Deserialize a collector blob; `null` reads as an empty blob.
fn parse_metadata<T>(collector: CollectorType, metadata: &serde_json::Value) -> Result<T, SubtaskError>
where
    T: DeserializeOwned + Default,
{
    if metadata.is_null() {
        return Ok(T::default());
    }
    T::deserialize(metadata).map_err(|e| SubtaskError::MalformedMetadata {
        collector,
        message: e.to_string(),
    })
}

/// Empty or whitespace-only strings count as missing.
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
