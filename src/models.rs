use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A storage folder representing one sellable item. Its name encodes
/// `<Title>_<Type>_<Size>_<Price>`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProductFolder {
    pub id: String,
    pub name: String,
}

/// A file stored in a product folder.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// One image to process, together with the product folder it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRecord {
    pub image_id: String,
    pub image_name: String,
    pub folder_id: String,
    pub folder_name: String,
}

/// Marketplace copy produced by the language model.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ListingContent {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StageReport {
    pub name: String,
    pub elapsed_ms: u128,
    pub timestamp: DateTime<Utc>,
    pub output: Value,
}

impl StageReport {
    pub fn new(name: &str, elapsed_ms: u128, output: Value) -> Self {
        Self {
            name: name.to_string(),
            elapsed_ms,
            timestamp: Utc::now(),
            output,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PassOutcome {
    /// Nothing waiting in the unprocessed folder.
    Idle,
    Published {
        listing_id: u64,
        folder_id: String,
        image_attached: bool,
    },
    Failed {
        stage: String,
        kind: String,
        message: String,
        folder_moved: bool,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub pass_id: String,
    #[serde(flatten)]
    pub outcome: PassOutcome,
    pub stages: Vec<StageReport>,
}

#[cfg(test)]
impl PassReport {
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }
}
