//! Provider interfaces for text generation and speech synthesis.
//!
//! Components receive providers as injected trait objects, so tests can
//! substitute doubles and nothing in the pipeline knows which vendor is
//! behind the boundary. Every call takes an explicit deadline.

pub mod openai;

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::Voice;
use crate::error::Result;

// Re-export the OpenAI-compatible implementations
pub use openai::{OpenAiSpeechProvider, OpenAiTextProvider};

/// Audio returned by a speech provider.
#[derive(Debug, Clone)]
pub struct SpeechAudio {
    /// Raw encoded audio
    pub bytes: Vec<u8>,

    /// MIME type of `bytes`
    pub content_type: String,

    /// Authoritative duration, when the provider reports one
    pub duration_seconds: Option<u32>,
}

/// Trait for language-generation providers
#[async_trait]
pub trait TextProvider: Send + Sync {
    /// Human-readable provider name
    fn name(&self) -> &str;

    /// Generate text for a prompt, failing once `timeout` elapses
    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String>;

    /// Health check (for HTTP providers)
    async fn health_check(&self) -> Result<()>;
}

/// Trait for speech-synthesis providers
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Human-readable provider name
    fn name(&self) -> &str;

    /// Synthesize narration audio, failing once `timeout` elapses
    async fn synthesize(
        &self,
        text: &str,
        voice: Voice,
        speed: f64,
        timeout: Duration,
    ) -> Result<SpeechAudio>;

    /// Health check (for HTTP providers)
    async fn health_check(&self) -> Result<()>;
}
