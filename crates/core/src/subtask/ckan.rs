use serde::Deserialize;

use crate::annotation::MiscMetadata;
use crate::urls::CollectorType;

use super::{non_blank, parse_metadata, SubtaskError, SubtaskProcessor};

/// CKAN package search results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CkanProcessor;

#[derive(Debug, Default, Deserialize)]
struct CkanMetadata {
    submitted_name: Option<String>,
    description: Option<String>,
    #[serde(default)]
    record_format: Vec<String>,
    data_portal_type: Option<String>,
    supplying_entity: Option<String>,
}

impl SubtaskProcessor for CkanProcessor {
    fn process(&self, metadata: &serde_json::Value) -> Result<MiscMetadata, SubtaskError> {
        let raw: CkanMetadata = parse_metadata(CollectorType::Ckan, metadata)?;
        Ok(MiscMetadata {
            name: non_blank(raw.submitted_name),
            description: non_blank(raw.description),
            record_formats: raw.record_format,
            data_portal_type: non_blank(raw.data_portal_type),
            supplying_entity: non_blank(raw.supplying_entity),
        })
    }
}
