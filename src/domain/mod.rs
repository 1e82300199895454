//! Domain types for the narration and export pipeline.
//!
//! This module contains the core data structures:
//! - NarrationProject / NarrationSlide: one narration run and its output
//! - SpeakerNote: latest narration text per source slide
//! - VideoExportJob: one export request and its state machine
//! - Voice, tone and length hints, source-presentation records

pub mod content;
pub mod export;
pub mod narration;
pub mod notes;
pub mod voice;

// Re-export commonly used types
pub use content::{SourceProject, SourceSlide};
pub use export::{
    ExportFormat, ExportStatus, Resolution, TransitionStyle, VideoExportJob,
};
pub use narration::{
    clamp_speed, NarrationProject, NarrationSlide, NarrationStatus, MIN_NOTES_CHARS,
};
pub use notes::{NoteLength, NoteTone, SpeakerNote};
pub use voice::{Voice, VoiceGender};
