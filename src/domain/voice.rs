//! The fixed set of narration voices.
//!
//! Voice metadata (name, description, gender, style) exists for
//! presentation only; the speech provider receives the lowercase
//! identifier and nothing else.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A narration voice offered to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    Alloy,
    Echo,
    Fable,
    Onyx,
    Nova,
    Shimmer,
}

/// Presentation-only gender tag for a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceGender {
    Male,
    Female,
    Neutral,
}

impl VoiceGender {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoiceGender::Male => "male",
            VoiceGender::Female => "female",
            VoiceGender::Neutral => "neutral",
        }
    }
}

impl Voice {
    /// Every voice, in presentation order.
    pub fn all() -> [Voice; 6] {
        [
            Voice::Alloy,
            Voice::Echo,
            Voice::Fable,
            Voice::Onyx,
            Voice::Nova,
            Voice::Shimmer,
        ]
    }

    /// Identifier sent to the speech provider.
    pub fn as_str(&self) -> &'static str {
        match self {
            Voice::Alloy => "alloy",
            Voice::Echo => "echo",
            Voice::Fable => "fable",
            Voice::Onyx => "onyx",
            Voice::Nova => "nova",
            Voice::Shimmer => "shimmer",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Voice::Alloy => "Alloy",
            Voice::Echo => "Echo",
            Voice::Fable => "Fable",
            Voice::Onyx => "Onyx",
            Voice::Nova => "Nova",
            Voice::Shimmer => "Shimmer",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Voice::Alloy => "Balanced and versatile, works for most decks",
            Voice::Echo => "Clear and articulate, good for technical material",
            Voice::Fable => "Expressive storytelling voice",
            Voice::Onyx => "Deep and authoritative",
            Voice::Nova => "Warm and friendly",
            Voice::Shimmer => "Bright and energetic",
        }
    }

    pub fn gender(&self) -> VoiceGender {
        match self {
            Voice::Alloy | Voice::Fable => VoiceGender::Neutral,
            Voice::Echo | Voice::Onyx => VoiceGender::Male,
            Voice::Nova | Voice::Shimmer => VoiceGender::Female,
        }
    }

    pub fn style(&self) -> &'static str {
        match self {
            Voice::Alloy => "conversational",
            Voice::Echo => "precise",
            Voice::Fable => "narrative",
            Voice::Onyx => "formal",
            Voice::Nova => "friendly",
            Voice::Shimmer => "upbeat",
        }
    }
}

impl Default for Voice {
    fn default() -> Self {
        Voice::Alloy
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Voice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "alloy" => Ok(Voice::Alloy),
            "echo" => Ok(Voice::Echo),
            "fable" => Ok(Voice::Fable),
            "onyx" => Ok(Voice::Onyx),
            "nova" => Ok(Voice::Nova),
            "shimmer" => Ok(Voice::Shimmer),
            other => Err(format!(
                "unknown voice '{}' (valid: alloy, echo, fable, onyx, nova, shimmer)",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_round_trip() {
        for voice in Voice::all() {
            assert_eq!(Voice::from_str(voice.as_str()).unwrap(), voice);
        }
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(Voice::from_str("ALLOY").unwrap(), Voice::Alloy);
        assert_eq!(Voice::from_str("Nova").unwrap(), Voice::Nova);
    }

    #[test]
    fn test_unknown_voice_rejected() {
        let err = Voice::from_str("hal9000").unwrap_err();
        assert!(err.contains("hal9000"));
        assert!(err.contains("alloy"), "error should list valid voices");
    }

    #[test]
    fn test_serde_uses_provider_identifier() {
        let json = serde_json::to_string(&Voice::Shimmer).unwrap();
        assert_eq!(json, "\"shimmer\"");
    }
}
