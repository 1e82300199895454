//! deckcast - slide-deck narration and video-export pipeline
//!
//! Turns stored presentations into narrated audio and downloadable
//! video, driven by a durable job queue.
//!
//! # Architecture
//!
//! Requests are accepted, validated, and enqueued; a small worker pool
//! claims queued items and runs them:
//! - Narration: per-slide speaker notes are synthesized to audio, with
//!   each slide persisted as it finishes so retries resume mid-deck
//! - Export: slides plus narration audio become a real video when an
//!   encoder is present, or a self-contained interactive HTML document
//!   when it is not
//!
//! # Modules
//!
//! - `domain`: Records and value types (narration runs, export jobs)
//! - `store`: SQLite record store and the presentation content store
//! - `providers`: Text and speech provider integrations
//! - `narration`: Notes generation and the narration orchestrator
//! - `export`: Video assembly, ffmpeg encoder, HTML fallback
//! - `queue`: Durable JSONL job queue and worker pool
//! - `pipeline`: Request-side facade and the queue-side runner
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Queue narration for a deck
//! deckcast narrate <project-id> --user <user-id> --voice nova
//!
//! # Process queued work
//! deckcast work --once
//!
//! # Check progress
//! deckcast status <narration-id>
//! ```

pub mod artifacts;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod export;
pub mod extract;
pub mod narration;
pub mod pipeline;
pub mod providers;
pub mod queue;
pub mod store;

// Re-export main types at crate root for convenience
pub use domain::{
    ExportFormat, ExportStatus, NarrationProject, NarrationSlide, NarrationStatus, NoteLength,
    NoteTone, Resolution, SpeakerNote, TransitionStyle, VideoExportJob, Voice,
};
pub use error::{PipelineError, Result};
pub use pipeline::{ExportRequest, NarrationRequest, Pipeline, PipelineRunner};
pub use queue::{JobKind, JobQueue, RetryPolicy, WorkerPool};
pub use store::{ContentStore, JsonContentStore, RecordStore};
