//! OpenAI-compatible provider implementations.
//!
//! Works against api.openai.com or any server speaking the same
//! `/chat/completions` and `/audio/speech` shapes.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::Voice;
use crate::error::{PipelineError, Result};
use crate::providers::{SpeechAudio, SpeechProvider, TextProvider};

/// The speech endpoint rejects long inputs; stay under its documented cap.
const MAX_SPEECH_CHARS: usize = 4096;

/// Text generation via `/chat/completions`.
pub struct OpenAiTextProvider {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

impl OpenAiTextProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    fn provider_error(&self, message: String) -> PipelineError {
        PipelineError::Provider {
            provider: self.name().to_string(),
            message,
        }
    }

    async fn request_completion(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.provider_error(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(self.provider_error(format!("HTTP {}: {}", status, detail)));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| self.provider_error(format!("invalid response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| self.provider_error("response carried no choices".to_string()))
    }
}

#[async_trait]
impl TextProvider for OpenAiTextProvider {
    fn name(&self) -> &str {
        "openai-text"
    }

    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String> {
        match tokio::time::timeout(timeout, self.request_completion(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(self.provider_error(format!(
                "timed out after {}s",
                timeout.as_secs()
            ))),
        }
    }

    async fn health_check(&self) -> Result<()> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| self.provider_error(format!("health check failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(self.provider_error(format!(
                "health check returned HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Speech synthesis via `/audio/speech`. Output is always MP3.
pub struct OpenAiSpeechProvider {
    api_key: String,
    base_url: String,
    model: String,
    max_text_chars: usize,
    client: reqwest::Client,
}

impl OpenAiSpeechProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "tts-1".to_string(),
            max_text_chars: MAX_SPEECH_CHARS,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_max_text_chars(mut self, max: usize) -> Self {
        self.max_text_chars = max;
        self
    }

    fn provider_error(&self, message: String) -> PipelineError {
        PipelineError::Provider {
            provider: self.name().to_string(),
            message,
        }
    }

    async fn request_audio(&self, text: &str, voice: Voice, speed: f64) -> Result<Vec<u8>> {
        let url = format!("{}/audio/speech", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": voice.as_str(),
            "speed": speed,
            "response_format": "mp3",
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.provider_error(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(self.provider_error(format!("HTTP {}: {}", status, detail)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.provider_error(format!("failed to read audio body: {}", e)))?;

        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl SpeechProvider for OpenAiSpeechProvider {
    fn name(&self) -> &str {
        "openai-speech"
    }

    async fn synthesize(
        &self,
        text: &str,
        voice: Voice,
        speed: f64,
        timeout: Duration,
    ) -> Result<SpeechAudio> {
        if text.trim().is_empty() {
            return Err(self.provider_error("cannot synthesize empty text".to_string()));
        }
        if text.len() > self.max_text_chars {
            return Err(self.provider_error(format!(
                "text is {} chars, provider limit is {}",
                text.len(),
                self.max_text_chars
            )));
        }

        let bytes = match tokio::time::timeout(timeout, self.request_audio(text, voice, speed))
            .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(self.provider_error(format!(
                    "timed out after {}s",
                    timeout.as_secs()
                )));
            }
        };

        Ok(SpeechAudio {
            bytes,
            content_type: "audio/mpeg".to_string(),
            // The endpoint returns bare MP3 bytes with no duration metadata
            duration_seconds: None,
        })
    }

    async fn health_check(&self) -> Result<()> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| self.provider_error(format!("health check failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(self.provider_error(format!(
                "health check returned HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }
}
