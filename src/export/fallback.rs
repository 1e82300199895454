//! Self-contained interactive slideshow, used when the video encoder is
//! not on the host or narration was not requested.
//!
//! The player template ships inside the binary; slide text, per-slide
//! timing, and narration-audio references are embedded as JSON. The
//! resulting file needs nothing from the server except (optionally) the
//! referenced audio artifacts.

use serde::Serialize;

use crate::domain::TransitionStyle;
use crate::error::{PipelineError, Result};

const PLAYER_TEMPLATE: &str = include_str!("player.html");

/// One slide as embedded in the fallback document
#[derive(Debug, Clone, Serialize)]
pub struct FallbackSlide {
    pub slide_number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub text: String,
    pub duration_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
}

/// Render the complete fallback document
pub fn render_fallback_document(
    deck_title: &str,
    slides: &[FallbackSlide],
    transition: TransitionStyle,
) -> Result<String> {
    let data = serde_json::to_string(slides).map_err(|e| PipelineError::Assembly {
        message: format!("failed to embed slide data: {}", e),
    })?;
    // `<` must not appear inside the inline script block, or slide text
    // containing "</script>" would terminate it
    let data = data.replace('<', "\\u003c");

    Ok(PLAYER_TEMPLATE
        .replace("__DECK_TITLE__", &escape_html(deck_title))
        .replace("__TRANSITION__", transition.as_str())
        .replace("__SLIDE_DATA__", &data))
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_slides() -> Vec<FallbackSlide> {
        vec![
            FallbackSlide {
                slide_number: 1,
                title: Some("Welcome".to_string()),
                text: "Opening remarks".to_string(),
                duration_seconds: 6.0,
                audio_url: Some("/artifacts/narration/a.mp3".to_string()),
            },
            FallbackSlide {
                slide_number: 2,
                title: None,
                text: "Second slide".to_string(),
                duration_seconds: 5.0,
                audio_url: None,
            },
        ]
    }

    #[test]
    fn test_document_is_self_contained_html() {
        let html =
            render_fallback_document("My Deck", &sample_slides(), TransitionStyle::Fade).unwrap();

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<title>My Deck</title>"));
        assert!(html.contains("transition-fade"));
        assert!(html.contains("Opening remarks"));
        assert!(html.contains("/artifacts/narration/a.mp3"));
        assert!(html.contains("\"duration_seconds\":6.0"));
        assert!(!html.contains("__SLIDE_DATA__"));
        assert!(!html.contains("__DECK_TITLE__"));
        assert!(!html.contains("__TRANSITION__"));
    }

    #[test]
    fn test_script_breaking_text_is_neutralized() {
        let slides = vec![FallbackSlide {
            slide_number: 1,
            title: None,
            text: "</script><script>alert(1)</script>".to_string(),
            duration_seconds: 5.0,
            audio_url: None,
        }];

        let html = render_fallback_document("Deck", &slides, TransitionStyle::None).unwrap();
        assert!(!html.contains("</script><script>alert(1)"));
        assert!(html.contains("\\u003c/script"));
    }

    #[test]
    fn test_title_is_html_escaped() {
        let html =
            render_fallback_document("A <b>bold</b> deck", &sample_slides(), TransitionStyle::Slide)
                .unwrap();
        assert!(html.contains("A &lt;b&gt;bold&lt;/b&gt; deck"));
        assert!(html.contains("transition-slide"));
    }
}
