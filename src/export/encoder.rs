//! External video encoder invocation.
//!
//! Shells out to ffmpeg: one still per slide, one encoded segment per
//! slide (still looped for the slide's duration, narration audio or
//! silence underneath), then a concat pass into the final container.
//! Every invocation runs under a deadline; an exceeded deadline or a
//! non-zero exit is an assembly failure, not a hang.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::domain::ExportFormat;
use crate::error::{PipelineError, Result};

/// Deadline for the availability probe; the real work gets the full
/// configured timeout
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// A placeholder still for one slide
#[derive(Debug, Clone)]
pub struct StillSpec<'a> {
    pub slide_number: u32,
    pub title: Option<&'a str>,
    pub width: u32,
    pub height: u32,
    /// Background color as an ffmpeg color spec, e.g. "0x1E1E2E"
    pub background: &'a str,
    /// Text color for the slide heading
    pub foreground: &'a str,
}

/// One timeline segment: a still held on screen for a duration, with
/// narration audio or generated silence underneath
#[derive(Debug, Clone)]
pub struct SegmentSpec<'a> {
    pub still: &'a Path,
    pub audio: Option<&'a Path>,
    pub duration_seconds: f64,
    pub format: ExportFormat,
    pub fps: u32,
}

/// Seam between the assembler and the encoding tool, so assembly logic
/// is testable on hosts without the tool installed
#[async_trait]
pub trait VideoEncoder: Send + Sync {
    /// Tool name for logs and fallback messages
    fn name(&self) -> &str;

    /// Probe whether the tool is present on this host
    async fn is_available(&self) -> bool;

    /// Render a placeholder still image for one slide
    async fn render_still(&self, spec: &StillSpec<'_>, out: &Path) -> Result<()>;

    /// Encode one timeline segment from a still plus optional audio
    async fn render_segment(&self, spec: &SegmentSpec<'_>, out: &Path) -> Result<()>;

    /// Concatenate already-encoded segments (listed in an ffmpeg concat
    /// manifest) into the final output file
    async fn concat_segments(
        &self,
        manifest: &Path,
        format: ExportFormat,
        out: &Path,
    ) -> Result<()>;
}

/// ffmpeg-backed encoder
pub struct FfmpegEncoder {
    binary_path: String,
    timeout: Duration,
}

impl FfmpegEncoder {
    pub fn new(binary_path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary_path: binary_path.into(),
            timeout,
        }
    }

    /// Run ffmpeg with `args`, failing on non-zero exit or deadline
    async fn run(&self, args: &[String], deadline: Duration) -> Result<()> {
        debug!(binary = %self.binary_path, ?args, "invoking encoder");

        let child = Command::new(&self.binary_path)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PipelineError::Assembly {
                message: format!("failed to spawn {}: {}", self.binary_path, e),
            })?;

        let output = timeout(deadline, child.wait_with_output())
            .await
            .map_err(|_| PipelineError::Assembly {
                message: format!("{} timed out after {:?}", self.binary_path, deadline),
            })?
            .map_err(|e| PipelineError::Assembly {
                message: format!("failed to wait for {}: {}", self.binary_path, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let exit_code = output.status.code().unwrap_or(-1);
            return Err(PipelineError::Assembly {
                message: format!(
                    "{} exited with code {}: {}",
                    self.binary_path,
                    exit_code,
                    stderr.trim()
                ),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl VideoEncoder for FfmpegEncoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn is_available(&self) -> bool {
        let probe = Command::new(&self.binary_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match timeout(PROBE_TIMEOUT, probe).await {
            Ok(Ok(status)) => status.success(),
            _ => false,
        }
    }

    async fn render_still(&self, spec: &StillSpec<'_>, out: &Path) -> Result<()> {
        let mut args = vec![
            "-y".to_string(),
            "-f".to_string(),
            "lavfi".to_string(),
            "-i".to_string(),
            format!(
                "color=c={}:s={}x{}",
                spec.background, spec.width, spec.height
            ),
        ];

        let heading = match spec.title.filter(|t| !t.trim().is_empty()) {
            Some(title) => title.to_string(),
            None => format!("Slide {}", spec.slide_number),
        };

        // drawtext reads the heading from a file so no shell-style
        // escaping of user text is needed
        let text_path = out.with_extension("txt");
        tokio::fs::write(&text_path, heading).await?;
        args.push("-vf".to_string());
        args.push(format!(
            "drawtext=textfile='{}':fontcolor={}:fontsize={}:x=(w-text_w)/2:y=(h-text_h)/2",
            text_path.display(),
            spec.foreground,
            spec.height / 12,
        ));

        args.push("-frames:v".to_string());
        args.push("1".to_string());
        args.push(out.display().to_string());

        self.run(&args, self.timeout).await
    }

    async fn render_segment(&self, spec: &SegmentSpec<'_>, out: &Path) -> Result<()> {
        let mut args = vec![
            "-y".to_string(),
            "-loop".to_string(),
            "1".to_string(),
            "-i".to_string(),
            spec.still.display().to_string(),
        ];

        match spec.audio {
            Some(audio) => {
                args.push("-i".to_string());
                args.push(audio.display().to_string());
            }
            None => {
                // Silence under slides with no narration keeps every
                // segment's stream layout identical for the concat pass
                args.push("-f".to_string());
                args.push("lavfi".to_string());
                args.push("-i".to_string());
                args.push("anullsrc=r=44100:cl=stereo".to_string());
            }
        }

        args.extend([
            "-t".to_string(),
            format!("{:.3}", spec.duration_seconds),
            "-shortest".to_string(),
            "-r".to_string(),
            spec.fps.to_string(),
            "-c:v".to_string(),
            spec.format.video_codec().to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-c:a".to_string(),
            spec.format.audio_codec().to_string(),
            "-b:a".to_string(),
            "192k".to_string(),
            out.display().to_string(),
        ]);

        self.run(&args, self.timeout).await
    }

    async fn concat_segments(
        &self,
        manifest: &Path,
        _format: ExportFormat,
        out: &Path,
    ) -> Result<()> {
        // Segments share codec parameters, so the concat pass can copy
        // streams instead of re-encoding
        let args = vec![
            "-y".to_string(),
            "-f".to_string(),
            "concat".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-i".to_string(),
            manifest.display().to_string(),
            "-c".to_string(),
            "copy".to_string(),
            out.display().to_string(),
        ];

        self.run(&args, self.timeout).await
    }
}

/// Write an ffmpeg concat manifest listing `paths` in order
pub async fn write_concat_manifest(manifest: &Path, paths: &[std::path::PathBuf]) -> Result<()> {
    let mut body = String::new();
    for path in paths {
        body.push_str(&format!("file '{}'\n", path.display()));
    }
    tokio::fs::write(manifest, body).await?;
    Ok(())
}
