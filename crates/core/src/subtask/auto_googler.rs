use serde::Deserialize;

use crate::annotation::MiscMetadata;
use crate::urls::CollectorType;

use super::{non_blank, parse_metadata, SubtaskError, SubtaskProcessor};

/// Search engine results: title and snippet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutoGooglerProcessor;

#[derive(Debug, Default, Deserialize)]
struct AutoGooglerMetadata {
    title: Option<String>,
    snippet: Option<String>,
}

impl SubtaskProcessor for AutoGooglerProcessor {
    fn process(&self, metadata: &serde_json::Value) -> Result<MiscMetadata, SubtaskError> {
        let raw: AutoGooglerMetadata = parse_metadata(CollectorType::AutoGoogler, metadata)?;
        Ok(MiscMetadata {
            name: non_blank(raw.title),
            description: non_blank(raw.snippet),
            ..Default::default()
        })
    }
}
