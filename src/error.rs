//! Error taxonomy for the narration and export pipeline.
//!
//! Components return [`PipelineError`] so callers (and the job queue) can
//! distinguish failures that deserve a retry from failures that never will.

use uuid::Uuid;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Project or slide does not exist, or the requester does not own it.
    /// Surfaced immediately; never retried.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// A text or speech provider call failed (including deadline exceeded).
    #[error("provider {provider} failed: {message}")]
    Provider { provider: String, message: String },

    /// The external encoder is not installed. Selects the fallback path
    /// rather than failing a job.
    #[error("{tool} is not available on this host")]
    ToolUnavailable { tool: String },

    /// Encoder invocation failed after the tool was detected as present.
    #[error("video assembly failed: {message}")]
    Assembly { message: String },

    /// Artifact upload or retrieval failed.
    #[error("artifact storage failed: {message}")]
    Storage { message: String },

    /// A state-machine transition that is not permitted, e.g. completing a
    /// job that already failed.
    #[error("invalid transition for {id}: {from} -> {to}")]
    InvalidTransition { id: Uuid, from: String, to: String },

    /// Record store (SQLite) failure.
    #[error("record store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Job queue failure (enqueue or acknowledgement).
    #[error("job queue error: {0}")]
    Queue(#[from] crate::queue::QueueError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Whether the queue should reset the owning work item for another
    /// attempt. `NotFound` and transition bugs will fail identically on
    /// every retry; a missing encoder will not reappear within the backoff
    /// window.
    pub fn retryable(&self) -> bool {
        !matches!(
            self,
            PipelineError::NotFound { .. }
                | PipelineError::ToolUnavailable { .. }
                | PipelineError::InvalidTransition { .. }
        )
    }
}
