//! Narration generation: speaker notes, speech synthesis, and the
//! orchestrator that walks a project's slides end to end.

pub mod notes;
pub mod orchestrator;
pub mod synthesis;

pub use notes::{NotesGenerator, SlideNotes};
pub use orchestrator::NarrationOrchestrator;
pub use synthesis::{estimate_duration_seconds, SpeechSynthesizer, SynthesizedSlide};
