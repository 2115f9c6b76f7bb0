use serde::Deserialize;

use crate::annotation::MiscMetadata;
use crate::urls::CollectorType;

use super::{non_blank, parse_metadata, SubtaskError, SubtaskProcessor};

/// MuckRock FOIA request searches. Only a title is available; it doubles
/// as the description.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MuckrockProcessor;

#[derive(Debug, Default, Deserialize)]
struct MuckrockMetadata {
    title: Option<String>,
}

impl SubtaskProcessor for MuckrockProcessor {
    fn process(&self, metadata: &serde_json::Value) -> Result<MiscMetadata, SubtaskError> {
        let raw: MuckrockMetadata = parse_metadata(CollectorType::MuckrockAllSearch, metadata)?;
        let title = non_blank(raw.title);
        Ok(MiscMetadata {
            name: title.clone(),
            description: title,
            ..Default::default()
        })
    }
}
