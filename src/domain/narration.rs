//! Narration project and per-slide narration records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::voice::Voice;

/// Lowest speed multiplier accepted from callers.
pub const MIN_SPEED: f64 = 0.25;
/// Highest speed multiplier accepted from callers.
pub const MAX_SPEED: f64 = 4.0;
/// Used when the requested speed is not a finite number.
pub const DEFAULT_SPEED: f64 = 1.0;

/// Narration text shorter than this produces no audio and no slide record.
pub const MIN_NOTES_CHARS: usize = 10;

/// One narration-generation request and its outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrationProject {
    /// Unique identifier for this narration run
    pub id: Uuid,

    /// Source presentation in the content store
    pub project_id: Uuid,

    /// Voice used for every slide in this run
    pub voice: Voice,

    /// Speed multiplier, always within [MIN_SPEED, MAX_SPEED]
    pub speed: f64,

    pub status: NarrationStatus,

    /// Sum of per-slide durations, updated after every slide
    pub total_duration_seconds: u32,

    /// Populated only when status is Failed
    pub error: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl NarrationProject {
    /// Create a new record. Work begins immediately after the request is
    /// accepted, so new records start out `generating`.
    pub fn new(project_id: Uuid, voice: Voice, speed: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            voice,
            speed: clamp_speed(speed),
            status: NarrationStatus::Generating,
            total_duration_seconds: 0,
            error: None,
            created_at: Utc::now(),
        }
    }
}

/// Clamp a requested speed into the supported range. Out-of-range values
/// are clamped rather than rejected; non-finite values fall back to 1.0.
pub fn clamp_speed(speed: f64) -> f64 {
    if !speed.is_finite() {
        return DEFAULT_SPEED;
    }
    speed.clamp(MIN_SPEED, MAX_SPEED)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrationStatus {
    Pending,
    Generating,
    Completed,
    Failed,
}

impl NarrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NarrationStatus::Pending => "pending",
            NarrationStatus::Generating => "generating",
            NarrationStatus::Completed => "completed",
            NarrationStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, NarrationStatus::Completed | NarrationStatus::Failed)
    }
}

impl std::fmt::Display for NarrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NarrationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(NarrationStatus::Pending),
            "generating" => Ok(NarrationStatus::Generating),
            "completed" => Ok(NarrationStatus::Completed),
            "failed" => Ok(NarrationStatus::Failed),
            other => Err(format!("unknown narration status '{}'", other)),
        }
    }
}

/// One successfully narrated slide. Keyed on (narration_id, slide_id) so a
/// retried run overwrites its own earlier work instead of duplicating it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrationSlide {
    pub narration_id: Uuid,

    /// Slide in the source presentation
    pub slide_id: Uuid,

    /// 1-based position within the presentation
    pub slide_number: u32,

    /// Exact text that was spoken
    pub notes_text: String,

    /// Artifact URL of the synthesized audio
    pub audio_url: String,

    pub duration_seconds: u32,
}
