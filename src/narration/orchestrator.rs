//! Walks a narration project's slides end to end: pick the narration
//! text, synthesize audio, store the artifact, append the slide record,
//! and keep the running total persisted after every slide.
//!
//! Each slide is independently safe to redo. A retried run skips slides
//! that already have a row, resumes the total from what is persisted,
//! and finishes the remainder, so a crash mid-run never duplicates work.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::{NarrationSlide, NarrationStatus, MIN_NOTES_CHARS};
use crate::error::{PipelineError, Result};
use crate::extract::extract_speakable_text;
use crate::store::{ContentStore, RecordStore};

use super::synthesis::SpeechSynthesizer;

pub struct NarrationOrchestrator {
    content: Arc<dyn ContentStore>,
    synthesizer: SpeechSynthesizer,
}

impl NarrationOrchestrator {
    pub fn new(content: Arc<dyn ContentStore>, synthesizer: SpeechSynthesizer) -> Self {
        Self {
            content,
            synthesizer,
        }
    }

    /// Run narration for one project. `slide_ids` limits the run to a
    /// subset of slides; `None` narrates everything.
    ///
    /// Errors escaping this function mean the run as a whole could not
    /// proceed (missing records, storage layer down). Per-slide synthesis
    /// failures are logged and skipped instead.
    #[instrument(skip(self, store, slide_ids), fields(narration_id = %narration_id))]
    pub async fn run(
        &self,
        store: &RecordStore,
        narration_id: Uuid,
        project_id: Uuid,
        user_id: Uuid,
        slide_ids: Option<&[Uuid]>,
    ) -> Result<()> {
        let narration = store.get_narration(narration_id)?.ok_or_else(|| {
            PipelineError::NotFound {
                what: format!("narration project {}", narration_id),
            }
        })?;

        if narration.status == NarrationStatus::Completed {
            debug!("narration already completed, nothing to do");
            return Ok(());
        }

        let project = self.content.fetch_project(project_id, user_id).await?;

        // A retried run resumes the total from the slides already done
        let existing = store.list_narration_slides(narration_id)?;
        let mut total_seconds: u32 = existing.iter().map(|s| s.duration_seconds).sum();

        info!(
            slides = project.slides.len(),
            already_done = existing.len(),
            voice = %narration.voice,
            speed = narration.speed,
            "starting narration run"
        );

        for slide in project.slides_ascending() {
            if let Some(wanted) = slide_ids {
                if !wanted.contains(&slide.id) {
                    continue;
                }
            }

            if store.narration_slide_exists(narration_id, slide.id)? {
                debug!(slide = slide.slide_number, "slide already narrated, skipping");
                continue;
            }

            let text = self.narration_text(store, slide.id, &slide.blocks)?;
            if text.chars().count() < MIN_NOTES_CHARS {
                debug!(slide = slide.slide_number, "narration text below floor, skipping");
                continue;
            }

            match self
                .synthesizer
                .synthesize_slide(narration_id, slide.id, &text, narration.voice, narration.speed)
                .await
            {
                Ok(synthesized) => {
                    store.upsert_narration_slide(&NarrationSlide {
                        narration_id,
                        slide_id: slide.id,
                        slide_number: slide.slide_number,
                        notes_text: text,
                        audio_url: synthesized.audio_url,
                        duration_seconds: synthesized.duration_seconds,
                    })?;

                    total_seconds += synthesized.duration_seconds;
                    // Persisted per slide so a crash leaves a true partial
                    // total rather than silence
                    store.update_narration_total(narration_id, total_seconds)?;
                }
                Err(e) => {
                    warn!(
                        slide = slide.slide_number,
                        error = %e,
                        "slide synthesis failed, skipping slide"
                    );
                }
            }
        }

        store.complete_narration(narration_id, total_seconds)?;
        info!(total_seconds, "narration run completed");

        Ok(())
    }

    /// The text to narrate for a slide: its stored speaker note when one
    /// exists and clears the length floor, else the extracted content.
    fn narration_text(
        &self,
        store: &RecordStore,
        slide_id: Uuid,
        blocks: &[serde_json::Value],
    ) -> Result<String> {
        if let Some(note) = store.get_speaker_note(slide_id)? {
            let trimmed = note.text.trim();
            if trimmed.chars().count() >= MIN_NOTES_CHARS {
                return Ok(trimmed.to_string());
            }
        }
        Ok(extract_speakable_text(blocks).trim().to_string())
    }
}
