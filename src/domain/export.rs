//! Video-export job record and its state machine.
//!
//! The job record is the single source of truth pollers see. Exactly one
//! worker drives it `pending -> processing -> {completed | failed}`;
//! progress only moves forward and hits 100 only on completion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PipelineError;

/// Per-slide display time when no narration duration is known.
pub const DEFAULT_SLIDE_SECONDS: f64 = 5.0;

/// One video-export request and its outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoExportJob {
    pub id: Uuid,

    /// Source presentation in the content store
    pub project_id: Uuid,

    pub format: ExportFormat,

    pub resolution: Resolution,

    /// Whether the output should carry narration audio and timing
    pub include_narration: bool,

    pub transition: TransitionStyle,

    /// Display time for slides without a narration duration
    pub default_slide_seconds: f64,

    /// Narration run supplying per-slide durations and audio
    pub narration_id: Option<Uuid>,

    pub status: ExportStatus,

    /// 0-100, non-decreasing while the job is active
    pub progress: u8,

    /// Set exactly once, on completion
    pub output_url: Option<String>,

    /// Set exactly once, on failure
    pub error: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl VideoExportJob {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        project_id: Uuid,
        format: ExportFormat,
        resolution: Resolution,
        include_narration: bool,
        transition: TransitionStyle,
        default_slide_seconds: Option<f64>,
        narration_id: Option<Uuid>,
    ) -> Self {
        let default_slide_seconds = default_slide_seconds
            .filter(|s| s.is_finite() && *s > 0.0)
            .unwrap_or(DEFAULT_SLIDE_SECONDS);
        Self {
            id: Uuid::new_v4(),
            project_id,
            format,
            resolution,
            include_narration,
            transition,
            default_slide_seconds,
            narration_id,
            status: ExportStatus::Pending,
            progress: 0,
            output_url: None,
            error: None,
            created_at: Utc::now(),
        }
    }

    /// Claim the job for processing. Re-claiming a job that is already
    /// `processing` is allowed so a retried attempt can resume; leaving a
    /// terminal state is not.
    pub fn start(&mut self) -> Result<(), PipelineError> {
        match self.status {
            ExportStatus::Pending | ExportStatus::Processing => {
                self.status = ExportStatus::Processing;
                Ok(())
            }
            _ => Err(self.invalid_transition("processing")),
        }
    }

    /// Record forward progress. Values below the current progress are
    /// ignored; values are capped at 99 so 100 is reachable only through
    /// [`VideoExportJob::complete`].
    pub fn advance(&mut self, progress: u8) -> Result<(), PipelineError> {
        if self.status.is_terminal() {
            return Err(self.invalid_transition("progress update"));
        }
        self.progress = self.progress.max(progress.min(99));
        Ok(())
    }

    pub fn complete(&mut self, output_url: String) -> Result<(), PipelineError> {
        match self.status {
            ExportStatus::Processing => {
                self.status = ExportStatus::Completed;
                self.progress = 100;
                self.output_url = Some(output_url);
                Ok(())
            }
            _ => Err(self.invalid_transition("completed")),
        }
    }

    pub fn fail(&mut self, error: String) -> Result<(), PipelineError> {
        match self.status {
            ExportStatus::Pending | ExportStatus::Processing => {
                self.status = ExportStatus::Failed;
                self.error = Some(error);
                Ok(())
            }
            _ => Err(self.invalid_transition("failed")),
        }
    }

    fn invalid_transition(&self, to: &str) -> PipelineError {
        PipelineError::InvalidTransition {
            id: self.id,
            from: self.status.as_str().to_string(),
            to: to.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ExportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportStatus::Pending => "pending",
            ExportStatus::Processing => "processing",
            ExportStatus::Completed => "completed",
            ExportStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExportStatus::Completed | ExportStatus::Failed)
    }
}

impl std::fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ExportStatus::Pending),
            "processing" => Ok(ExportStatus::Processing),
            "completed" => Ok(ExportStatus::Completed),
            "failed" => Ok(ExportStatus::Failed),
            other => Err(format!("unknown export status '{}'", other)),
        }
    }
}

/// Output container. Each maps to an encoder codec pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Mp4,
    Webm,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Mp4 => "mp4",
            ExportFormat::Webm => "webm",
        }
    }

    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Mp4 => "video/mp4",
            ExportFormat::Webm => "video/webm",
        }
    }

    pub fn video_codec(&self) -> &'static str {
        match self {
            ExportFormat::Mp4 => "libx264",
            ExportFormat::Webm => "libvpx-vp9",
        }
    }

    pub fn audio_codec(&self) -> &'static str {
        match self {
            ExportFormat::Mp4 => "aac",
            ExportFormat::Webm => "libopus",
        }
    }
}

impl Default for ExportFormat {
    fn default() -> Self {
        ExportFormat::Mp4
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mp4" => Ok(ExportFormat::Mp4),
            "webm" => Ok(ExportFormat::Webm),
            other => Err(format!("unknown format '{}' (valid: mp4, webm)", other)),
        }
    }
}

/// Target resolution. Parsing is total: anything unrecognized maps to
/// 1080p rather than failing the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "720p")]
    Hd720,
    #[serde(rename = "1080p")]
    Hd1080,
    #[serde(rename = "4k")]
    Uhd4k,
}

impl Resolution {
    /// Pixel dimensions (width, height).
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Resolution::Hd720 => (1280, 720),
            Resolution::Hd1080 => (1920, 1080),
            Resolution::Uhd4k => (3840, 2160),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Hd720 => "720p",
            Resolution::Hd1080 => "1080p",
            Resolution::Uhd4k => "4k",
        }
    }

    /// Total mapping from caller input.
    pub fn parse(s: &str) -> Resolution {
        match s.to_ascii_lowercase().as_str() {
            "720p" | "720" => Resolution::Hd720,
            "4k" | "2160p" => Resolution::Uhd4k,
            _ => Resolution::Hd1080,
        }
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Resolution::Hd1080
    }
}

impl std::str::FromStr for Resolution {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Resolution::parse(s))
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transition between slides, applied by the fallback document. The
/// encoder path uses hard cuts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionStyle {
    None,
    Fade,
    Slide,
}

impl TransitionStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionStyle::None => "none",
            TransitionStyle::Fade => "fade",
            TransitionStyle::Slide => "slide",
        }
    }
}

impl Default for TransitionStyle {
    fn default() -> Self {
        TransitionStyle::None
    }
}

impl std::str::FromStr for TransitionStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(TransitionStyle::None),
            "fade" => Ok(TransitionStyle::Fade),
            "slide" => Ok(TransitionStyle::Slide),
            other => Err(format!(
                "unknown transition '{}' (valid: none, fade, slide)",
                other
            )),
        }
    }
}
