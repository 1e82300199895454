//! Drives one video-export job end to end.
//!
//! Resolution of the output path happens here: the true video branch
//! needs the encoder present AND narration requested; anything else
//! gets the self-contained fallback document. Progress lands on the
//! persisted job record after every stage so pollers always see the
//! best-known state, and the first 30% of the range belongs to the
//! still-materialization phase.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::artifacts::{export_output_key, ArtifactStore};
use crate::domain::{NarrationSlide, SourceProject, VideoExportJob};
use crate::error::{PipelineError, Result};
use crate::extract::extract_speakable_text;
use crate::store::{ContentStore, RecordStore};

use super::encoder::{write_concat_manifest, SegmentSpec, StillSpec, VideoEncoder};
use super::fallback::{render_fallback_document, FallbackSlide};

pub struct VideoAssembler {
    content: Arc<dyn ContentStore>,
    artifacts: Arc<dyn ArtifactStore>,
    encoder: Arc<dyn VideoEncoder>,
    fps: u32,
}

impl VideoAssembler {
    pub fn new(
        content: Arc<dyn ContentStore>,
        artifacts: Arc<dyn ArtifactStore>,
        encoder: Arc<dyn VideoEncoder>,
        fps: u32,
    ) -> Self {
        Self {
            content,
            artifacts,
            encoder,
            fps,
        }
    }

    /// Run one export job to completion. Errors escaping here leave the
    /// record in `processing` with its progress intact; the caller owns
    /// retry and terminal-failure bookkeeping.
    #[instrument(skip(self, store), fields(job_id = %job_id))]
    pub async fn run(
        &self,
        store: &RecordStore,
        job_id: Uuid,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<()> {
        let mut job = store
            .get_export_job(job_id)?
            .ok_or_else(|| PipelineError::NotFound {
                what: format!("export job {}", job_id),
            })?;

        if job.status.is_terminal() {
            debug!(status = job.status.as_str(), "export job already terminal");
            return Ok(());
        }

        job.start()?;
        store.save_export_job(&job)?;

        let project = self.content.fetch_project(project_id, user_id).await?;

        // Per-slide narration timing and audio, when the job asks for it
        let narration: HashMap<Uuid, NarrationSlide> = match (job.include_narration, job.narration_id)
        {
            (true, Some(narration_id)) => store
                .list_narration_slides(narration_id)?
                .into_iter()
                .map(|s| (s.slide_id, s))
                .collect(),
            _ => HashMap::new(),
        };

        let encoder_present = self.encoder.is_available().await;
        let use_video = encoder_present && job.include_narration && !project.slides.is_empty();

        info!(
            encoder = self.encoder.name(),
            encoder_present,
            include_narration = job.include_narration,
            slides = project.slides.len(),
            branch = if use_video { "video" } else { "fallback" },
            "assembling export"
        );

        let output_url = if use_video {
            self.assemble_video(store, &mut job, &project, &narration)
                .await?
        } else {
            self.assemble_fallback(store, &mut job, &project, &narration)
                .await?
        };

        job.complete(output_url)?;
        store.save_export_job(&job)?;
        info!(url = job.output_url.as_deref().unwrap_or_default(), "export completed");

        Ok(())
    }

    /// Encoder branch: stills, per-slide segments, concat, upload.
    async fn assemble_video(
        &self,
        store: &RecordStore,
        job: &mut VideoExportJob,
        project: &SourceProject,
        narration: &HashMap<Uuid, NarrationSlide>,
    ) -> Result<String> {
        // Dropped on every exit path; leftover scratch files are the
        // only cost of a cleanup failure
        let workdir = tempfile::tempdir()?;

        let slides = project.slides_ascending();
        let total = slides.len() as f64;
        let (width, height) = job.resolution.dimensions();
        let (background, foreground) = theme_colors(project.theme.as_deref());

        let mut stills = Vec::with_capacity(slides.len());
        for (i, slide) in slides.iter().enumerate() {
            let out = workdir
                .path()
                .join(format!("still-{:03}.png", slide.slide_number));
            self.encoder
                .render_still(
                    &StillSpec {
                        slide_number: slide.slide_number,
                        title: slide.title.as_deref(),
                        width,
                        height,
                        background,
                        foreground,
                    },
                    &out,
                )
                .await?;
            stills.push(out);

            job.advance(((i + 1) as f64 / total * 30.0) as u8)?;
            store.save_export_job(job)?;
        }

        let mut segments = Vec::with_capacity(slides.len());
        for (i, slide) in slides.iter().enumerate() {
            let (duration_seconds, audio_path) = match narration.get(&slide.id) {
                Some(ns) => {
                    let bytes = self.artifacts.fetch(&ns.audio_url).await?;
                    let path = workdir
                        .path()
                        .join(format!("audio-{:03}.mp3", slide.slide_number));
                    tokio::fs::write(&path, bytes).await?;
                    (ns.duration_seconds as f64, Some(path))
                }
                None => (job.default_slide_seconds, None),
            };

            let out = workdir.path().join(format!(
                "segment-{:03}.{}",
                slide.slide_number,
                job.format.extension()
            ));
            self.encoder
                .render_segment(
                    &SegmentSpec {
                        still: &stills[i],
                        audio: audio_path.as_deref(),
                        duration_seconds,
                        format: job.format,
                        fps: self.fps,
                    },
                    &out,
                )
                .await?;
            segments.push(out);

            job.advance(30 + ((i + 1) as f64 / total * 45.0) as u8)?;
            store.save_export_job(job)?;
        }

        let manifest = workdir.path().join("timeline.txt");
        write_concat_manifest(&manifest, &segments).await?;

        let output_path = workdir
            .path()
            .join(format!("output.{}", job.format.extension()));
        self.encoder
            .concat_segments(&manifest, job.format, &output_path)
            .await?;
        job.advance(85)?;
        store.save_export_job(job)?;

        let bytes = tokio::fs::read(&output_path).await?;
        let key = export_output_key(project.id, job.id, job.format.extension());
        let url = self
            .artifacts
            .store(&bytes, job.format.content_type(), &key)
            .await?;
        job.advance(95)?;
        store.save_export_job(job)?;

        Ok(url)
    }

    /// Fallback branch: interactive document with embedded text, timing,
    /// and narration-audio references.
    async fn assemble_fallback(
        &self,
        store: &RecordStore,
        job: &mut VideoExportJob,
        project: &SourceProject,
        narration: &HashMap<Uuid, NarrationSlide>,
    ) -> Result<String> {
        let slides = project.slides_ascending();
        let total = slides.len().max(1) as f64;

        let mut entries = Vec::with_capacity(slides.len());
        for (i, slide) in slides.iter().enumerate() {
            let ns = narration.get(&slide.id);
            entries.push(FallbackSlide {
                slide_number: slide.slide_number,
                title: slide.title.clone(),
                text: extract_speakable_text(&slide.blocks),
                duration_seconds: ns
                    .map(|s| s.duration_seconds as f64)
                    .unwrap_or(job.default_slide_seconds),
                audio_url: ns.map(|s| s.audio_url.clone()),
            });

            job.advance(((i + 1) as f64 / total * 30.0) as u8)?;
            store.save_export_job(job)?;
        }

        let html = render_fallback_document(&project.title, &entries, job.transition)?;
        job.advance(70)?;
        store.save_export_job(job)?;

        let key = export_output_key(project.id, job.id, "html");
        let url = self
            .artifacts
            .store(html.as_bytes(), "text/html", &key)
            .await?;
        job.advance(95)?;
        store.save_export_job(job)?;

        Ok(url)
    }
}

/// Still colors for a project theme. Anything unrecognized gets the
/// dark default.
fn theme_colors(theme: Option<&str>) -> (&'static str, &'static str) {
    match theme {
        Some("light") => ("0xF5F5F7", "black"),
        _ => ("0x1E1E2E", "white"),
    }
}
