//! Speech synthesis for one slide's narration text.
//!
//! Calls the speech provider, uploads the audio through the artifact
//! store, and reports the spoken duration. Failures propagate to the
//! caller; audio is the deliverable here, so there is nothing useful to
//! return without it.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument};
use uuid::Uuid;

use crate::artifacts::{narration_audio_key, ArtifactStore};
use crate::domain::Voice;
use crate::error::Result;
use crate::providers::SpeechProvider;

/// Average speaking rate used when the provider reports no duration
const WORDS_PER_MINUTE: f64 = 150.0;

/// Outcome of synthesizing one slide
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedSlide {
    /// Where the audio artifact was stored
    pub audio_url: String,

    /// Spoken duration in whole seconds
    pub duration_seconds: u32,
}

pub struct SpeechSynthesizer {
    provider: Arc<dyn SpeechProvider>,
    artifacts: Arc<dyn ArtifactStore>,
    timeout: Duration,
}

impl SpeechSynthesizer {
    pub fn new(
        provider: Arc<dyn SpeechProvider>,
        artifacts: Arc<dyn ArtifactStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            artifacts,
            timeout,
        }
    }

    /// Synthesize `text` and store the audio under the narration's key
    /// space. The provider's own duration wins when it reports one.
    #[instrument(skip(self, text), fields(slide_id = %slide_id, chars = text.len()))]
    pub async fn synthesize_slide(
        &self,
        narration_id: Uuid,
        slide_id: Uuid,
        text: &str,
        voice: Voice,
        speed: f64,
    ) -> Result<SynthesizedSlide> {
        let audio = self
            .provider
            .synthesize(text, voice, speed, self.timeout)
            .await?;

        let duration_seconds = audio
            .duration_seconds
            .unwrap_or_else(|| estimate_duration_seconds(text, speed));

        let key = narration_audio_key(narration_id, slide_id);
        let audio_url = self
            .artifacts
            .store(&audio.bytes, &audio.content_type, &key)
            .await?;

        debug!(duration_seconds, url = %audio_url, "stored slide narration audio");

        Ok(SynthesizedSlide {
            audio_url,
            duration_seconds,
        })
    }
}

/// Estimate spoken duration from word count at 150 words per minute,
/// scaled by playback speed and rounded to the nearest second
pub fn estimate_duration_seconds(text: &str, speed: f64) -> u32 {
    let words = text.split_whitespace().count() as f64;
    (words / WORDS_PER_MINUTE * 60.0 / speed).round() as u32
}
