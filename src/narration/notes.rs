//! Speaker-notes generation via the text provider.
//!
//! One prompt per slide. A provider failure on one slide is logged and
//! reported as empty notes for that slide; the rest of the batch still
//! runs. Successful results are upserted as the slide's [`SpeakerNote`]
//! with the AI-authorship flag set.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::domain::{NoteLength, NoteTone, SourceProject, SpeakerNote};
use crate::error::Result;
use crate::extract::extract_speakable_text;
use crate::providers::TextProvider;
use crate::store::RecordStore;

/// Per-slide result of a notes-generation batch. Present for every slide
/// of the project, numbered from 1; `speaker_notes` is empty when the
/// provider failed for that slide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideNotes {
    pub slide_number: u32,
    pub slide_id: Uuid,
    pub speaker_notes: String,
}

pub struct NotesGenerator {
    provider: Arc<dyn TextProvider>,
    timeout: Duration,
}

impl NotesGenerator {
    pub fn new(provider: Arc<dyn TextProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Generate speaker notes for every slide of `project`, persisting
    /// each successful result. Returns one entry per slide in ascending
    /// slide-number order.
    #[instrument(skip(self, store, project), fields(project_id = %project.id))]
    pub async fn generate_for_project(
        &self,
        store: &RecordStore,
        project: &SourceProject,
        tone: NoteTone,
        length: NoteLength,
    ) -> Result<Vec<SlideNotes>> {
        let mut results = Vec::new();

        for slide in project.slides_ascending() {
            let content = extract_speakable_text(&slide.blocks);
            let prompt = build_prompt(slide.slide_number, slide.title.as_deref(), &content, tone, length);

            let text = match self.provider.generate(&prompt, self.timeout).await {
                Ok(text) => {
                    let text = text.trim().to_string();
                    store.upsert_speaker_note(&SpeakerNote::generated(slide.id, text.clone()))?;
                    debug!(slide = slide.slide_number, chars = text.len(), "generated speaker notes");
                    text
                }
                Err(e) => {
                    // One bad slide must not abort the batch
                    warn!(
                        slide = slide.slide_number,
                        provider = self.provider.name(),
                        error = %e,
                        "speaker-notes generation failed for slide"
                    );
                    String::new()
                }
            };

            results.push(SlideNotes {
                slide_number: slide.slide_number,
                slide_id: slide.id,
                speaker_notes: text,
            });
        }

        Ok(results)
    }
}

/// Build the provider prompt for one slide
fn build_prompt(
    slide_number: u32,
    title: Option<&str>,
    content: &str,
    tone: NoteTone,
    length: NoteLength,
) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "You are writing speaker notes for slide {} of a presentation.\n",
        slide_number
    ));
    if let Some(title) = title {
        prompt.push_str(&format!("Slide title: {}\n", title));
    }
    prompt.push_str(&format!("\nSlide content:\n{}\n\n", content));
    prompt.push_str(&format!(
        "Write narration in a {} tone, {}.\n",
        tone.as_str(),
        length.duration_guideline()
    ));
    prompt.push_str(
        "Use natural pause markers (commas, periods) and at most *one* style of \
         emphasis cue. Return only the narration text, no preamble.",
    );

    prompt
}
