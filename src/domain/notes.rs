//! Speaker notes and the hints that shape their generation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The latest narration text for one source slide. At most one per slide;
/// writes go through an upsert keyed on `slide_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakerNote {
    pub slide_id: Uuid,

    pub text: String,

    /// True when the text came from the notes generator. A manual edit
    /// always clears this, even if the text is unchanged.
    pub ai_generated: bool,

    pub updated_at: DateTime<Utc>,
}

impl SpeakerNote {
    pub fn generated(slide_id: Uuid, text: String) -> Self {
        Self {
            slide_id,
            text,
            ai_generated: true,
            updated_at: Utc::now(),
        }
    }

    pub fn manual(slide_id: Uuid, text: String) -> Self {
        Self {
            slide_id,
            text,
            ai_generated: false,
            updated_at: Utc::now(),
        }
    }
}

/// Tone hint passed to the text provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteTone {
    Professional,
    Casual,
    Educational,
    Persuasive,
}

impl NoteTone {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoteTone::Professional => "professional",
            NoteTone::Casual => "casual",
            NoteTone::Educational => "educational",
            NoteTone::Persuasive => "persuasive",
        }
    }
}

impl Default for NoteTone {
    fn default() -> Self {
        NoteTone::Professional
    }
}

impl std::str::FromStr for NoteTone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "professional" => Ok(NoteTone::Professional),
            "casual" => Ok(NoteTone::Casual),
            "educational" => Ok(NoteTone::Educational),
            "persuasive" => Ok(NoteTone::Persuasive),
            other => Err(format!(
                "unknown tone '{}' (valid: professional, casual, educational, persuasive)",
                other
            )),
        }
    }
}

/// Length hint, mapped to a spoken-duration guideline in the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteLength {
    Short,
    Medium,
    Detailed,
}

impl NoteLength {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoteLength::Short => "short",
            NoteLength::Medium => "medium",
            NoteLength::Detailed => "detailed",
        }
    }

    /// Target spoken duration communicated to the text provider.
    pub fn duration_guideline(&self) -> &'static str {
        match self {
            NoteLength::Short => "about 30 seconds",
            NoteLength::Medium => "about 60 seconds",
            NoteLength::Detailed => "90 to 120 seconds",
        }
    }
}

impl Default for NoteLength {
    fn default() -> Self {
        NoteLength::Medium
    }
}

impl std::str::FromStr for NoteLength {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "short" => Ok(NoteLength::Short),
            "medium" => Ok(NoteLength::Medium),
            "detailed" => Ok(NoteLength::Detailed),
            other => Err(format!(
                "unknown length '{}' (valid: short, medium, detailed)",
                other
            )),
        }
    }
}
