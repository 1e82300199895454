//! Records served by the external content store.
//!
//! The pipeline never writes these; it reads them through the
//! [`crate::store::content::ContentStore`] boundary.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A presentation as the content store hands it to us.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceProject {
    pub id: Uuid,

    /// Owner checked against the requesting user
    pub owner_id: Uuid,

    pub title: String,

    /// Visual theme name, used for placeholder still backgrounds
    #[serde(default)]
    pub theme: Option<String>,

    pub slides: Vec<SourceSlide>,
}

impl SourceProject {
    /// Slides in ascending slide-number order, regardless of storage order.
    pub fn slides_ascending(&self) -> Vec<&SourceSlide> {
        let mut slides: Vec<&SourceSlide> = self.slides.iter().collect();
        slides.sort_by_key(|s| s.slide_number);
        slides
    }

    pub fn slide(&self, slide_id: Uuid) -> Option<&SourceSlide> {
        self.slides.iter().find(|s| s.id == slide_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSlide {
    pub id: Uuid,

    /// 1-based position within the presentation
    pub slide_number: u32,

    #[serde(default)]
    pub title: Option<String>,

    /// Structured content blocks; shape varies by block type, so they stay
    /// as raw JSON until the extractor flattens them
    #[serde(default)]
    pub blocks: Vec<serde_json::Value>,
}
