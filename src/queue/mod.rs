//! JSONL-based job queue for narration and export work.
//!
//! Follows an event-log pattern: append-only JSONL with state derived
//! from replay. Both narration runs and video exports flow through this
//! one queue, so both get the same bounded concurrency, retry/backoff,
//! and crash recovery. Claims are serialized through an exclusive file
//! lock so an item is handed to exactly one worker, even across
//! processes.

pub mod worker;

pub use worker::{JobRunner, WorkerPool};

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use uuid::Uuid;

/// Errors that can occur with the job queue
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue item not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition { from: JobState, to: JobState },
}

/// The work a queue item stands for. Everything a worker needs to run the
/// job lives here; outcome and progress live on the persisted records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum JobKind {
    /// Run the narration orchestrator for one NarrationProject
    Narration {
        narration_id: Uuid,
        project_id: Uuid,
        user_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        slide_ids: Option<Vec<Uuid>>,
    },

    /// Run the video assembler for one VideoExportJob
    VideoExport {
        job_id: Uuid,
        project_id: Uuid,
        user_id: Uuid,
    },
}

impl JobKind {
    pub fn describe(&self) -> String {
        match self {
            JobKind::Narration { narration_id, .. } => format!("narration {}", narration_id),
            JobKind::VideoExport { job_id, .. } => format!("export {}", job_id),
        }
    }
}

/// An event in the queue log (append-only)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEvent {
    /// When this event occurred
    pub timestamp: DateTime<Utc>,

    /// The queue item ID (payload hash)
    pub item_id: String,

    /// Type of queue event
    pub event_type: QueueEventType,

    /// Additional data (depends on event type)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Types of queue events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueEventType {
    /// Item added to queue
    Enqueued,

    /// Processing started
    ProcessingStarted,

    /// Processing completed successfully
    Completed,

    /// Processing failed
    Failed,

    /// Reset for retry
    ResetForRetry,
}

/// Current state of a queue item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Processing,
    Done,
    Failed,
}

/// A queue item with current state (derived from replaying events)
#[derive(Debug, Clone)]
pub struct QueueItem {
    /// Unique ID (SHA256 hash of the payload, 12 chars)
    pub id: String,

    /// Current status
    pub state: JobState,

    /// What to run
    pub kind: JobKind,

    pub enqueued_at: DateTime<Utc>,

    /// When processing started (if applicable)
    pub started_at: Option<DateTime<Utc>>,

    /// When processing completed (if applicable)
    pub completed_at: Option<DateTime<Utc>>,

    /// Error message (if failed)
    pub error: Option<String>,

    /// Number of retry resets so far
    pub retry_count: u32,

    /// Backoff gate; the item is not claimable before this instant
    pub not_before: Option<DateTime<Utc>>,
}

impl QueueItem {
    /// Attempt number the next execution would be (1-indexed).
    pub fn attempt(&self) -> u32 {
        self.retry_count + 1
    }

    fn claimable(&self, now: DateTime<Utc>) -> bool {
        self.state == JobState::Pending
            && self.not_before.map(|t| t <= now).unwrap_or(true)
    }
}

/// Retry policy applied by workers when a job fails
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including first try)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay between retries in milliseconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Backoff multiplier (delay *= multiplier after each retry)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay() -> u64 {
    1000
}
fn default_max_delay() -> u64 {
    30000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryPolicy {
    /// Calculate delay for a specific attempt (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::from_millis(self.initial_delay_ms);
        }

        let delay =
            self.initial_delay_ms as f64 * self.backoff_multiplier.powi((attempt - 1) as i32);

        let capped = delay.min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(capped)
    }

    /// Check if we should retry based on attempt count
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// JSONL-based job queue
#[derive(Clone)]
pub struct JobQueue {
    /// Path to the queue JSONL file
    events_path: PathBuf,
    /// Sibling lock file guarding claims
    lock_path: PathBuf,
}

impl JobQueue {
    pub fn new(events_path: PathBuf) -> Self {
        let lock_path = events_path.with_extension("lock");
        Self {
            events_path,
            lock_path,
        }
    }

    /// Open a queue, creating its directory if needed.
    pub async fn open(events_path: PathBuf) -> Result<Self, QueueError> {
        if let Some(parent) = events_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(Self::new(events_path))
    }

    /// Append an event to the queue log
    async fn append_event(&self, event: &QueueEvent) -> Result<(), QueueError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.events_path)
            .await?;

        let json = serde_json::to_string(event)?;
        file.write_all(format!("{}\n", json).as_bytes()).await?;
        file.flush().await?;

        Ok(())
    }

    /// Replay all events to build current state
    pub async fn replay(&self) -> Result<HashMap<String, QueueItem>, QueueError> {
        let mut items: HashMap<String, QueueItem> = HashMap::new();

        if !self.events_path.exists() {
            return Ok(items);
        }

        let file = File::open(&self.events_path).await?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let event: QueueEvent = serde_json::from_str(&line)?;
            Self::apply_event(&mut items, event);
        }

        Ok(items)
    }

    /// Apply a single event to the state
    fn apply_event(items: &mut HashMap<String, QueueItem>, event: QueueEvent) {
        match event.event_type {
            QueueEventType::Enqueued => {
                if let Some(data) = event.data {
                    if let Ok(kind) = serde_json::from_value::<JobKind>(data) {
                        items.insert(
                            event.item_id.clone(),
                            QueueItem {
                                id: event.item_id,
                                state: JobState::Pending,
                                kind,
                                enqueued_at: event.timestamp,
                                started_at: None,
                                completed_at: None,
                                error: None,
                                retry_count: 0,
                                not_before: None,
                            },
                        );
                    }
                }
            }
            QueueEventType::ProcessingStarted => {
                if let Some(item) = items.get_mut(&event.item_id) {
                    item.state = JobState::Processing;
                    item.started_at = Some(event.timestamp);
                }
            }
            QueueEventType::Completed => {
                if let Some(item) = items.get_mut(&event.item_id) {
                    item.state = JobState::Done;
                    item.completed_at = Some(event.timestamp);
                }
            }
            QueueEventType::Failed => {
                if let Some(item) = items.get_mut(&event.item_id) {
                    item.state = JobState::Failed;
                    item.completed_at = Some(event.timestamp);
                    if let Some(data) = event.data {
                        if let Some(error) = data.get("error").and_then(|e| e.as_str()) {
                            item.error = Some(error.to_string());
                        }
                    }
                }
            }
            QueueEventType::ResetForRetry => {
                if let Some(item) = items.get_mut(&event.item_id) {
                    item.state = JobState::Pending;
                    item.retry_count += 1;
                    item.error = None;
                    item.started_at = None;
                    item.completed_at = None;
                    item.not_before = event
                        .data
                        .as_ref()
                        .and_then(|d| d.get("not_before"))
                        .and_then(|v| v.as_str())
                        .and_then(|s| s.parse::<DateTime<Utc>>().ok());
                }
            }
        }
    }

    /// Enqueue a job (idempotent; the id is a hash of the payload, so the
    /// same request enqueued twice lands on one item)
    pub async fn enqueue(&self, kind: &JobKind) -> Result<EnqueueResult, QueueError> {
        let id = compute_job_id(kind)?;

        let items = self.replay().await?;
        if let Some(existing) = items.get(&id) {
            match existing.state {
                JobState::Done => {
                    return Ok(EnqueueResult::AlreadyProcessed(id));
                }
                JobState::Failed => {
                    // Reset for retry
                    let event = QueueEvent {
                        timestamp: Utc::now(),
                        item_id: id.clone(),
                        event_type: QueueEventType::ResetForRetry,
                        data: None,
                    };
                    self.append_event(&event).await?;
                    return Ok(EnqueueResult::ResetForRetry(id));
                }
                _ => {
                    return Ok(EnqueueResult::AlreadyQueued(id));
                }
            }
        }

        let event = QueueEvent {
            timestamp: Utc::now(),
            item_id: id.clone(),
            event_type: QueueEventType::Enqueued,
            data: Some(serde_json::to_value(kind)?),
        };
        self.append_event(&event).await?;

        Ok(EnqueueResult::Queued(id))
    }

    /// Get all claimable items (pending and past their backoff gate),
    /// oldest first
    pub async fn get_pending(&self) -> Result<Vec<QueueItem>, QueueError> {
        let now = Utc::now();
        let items = self.replay().await?;
        let mut pending: Vec<QueueItem> = items
            .into_values()
            .filter(|item| item.claimable(now))
            .collect();

        pending.sort_by(|a, b| a.enqueued_at.cmp(&b.enqueued_at));

        Ok(pending)
    }

    /// Atomically claim the oldest claimable item. The claim (replay,
    /// pick, append ProcessingStarted) runs under an exclusive file lock
    /// so two workers can never claim the same item.
    pub async fn claim_next(&self) -> Result<Option<QueueItem>, QueueError> {
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(&self.lock_path)?;
        lock_file.lock_exclusive()?;

        let result = async {
            let pending = self.get_pending().await?;
            let Some(mut item) = pending.into_iter().next() else {
                return Ok(None);
            };

            let event = QueueEvent {
                timestamp: Utc::now(),
                item_id: item.id.clone(),
                event_type: QueueEventType::ProcessingStarted,
                data: None,
            };
            self.append_event(&event).await?;

            item.state = JobState::Processing;
            item.started_at = Some(event.timestamp);
            Ok(Some(item))
        }
        .await;

        // Lock releases when the handle drops; unlock explicitly so an
        // error path cannot extend the critical section
        let _ = fs2::FileExt::unlock(&lock_file);
        result
    }

    /// Mark an item as processing
    pub async fn mark_processing(&self, id: &str) -> Result<(), QueueError> {
        let items = self.replay().await?;
        let item = items
            .get(id)
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;

        if item.state != JobState::Pending {
            return Err(QueueError::InvalidTransition {
                from: item.state,
                to: JobState::Processing,
            });
        }

        let event = QueueEvent {
            timestamp: Utc::now(),
            item_id: id.to_string(),
            event_type: QueueEventType::ProcessingStarted,
            data: None,
        };
        self.append_event(&event).await?;

        Ok(())
    }

    /// Mark an item as done
    pub async fn mark_done(&self, id: &str) -> Result<(), QueueError> {
        let event = QueueEvent {
            timestamp: Utc::now(),
            item_id: id.to_string(),
            event_type: QueueEventType::Completed,
            data: None,
        };
        self.append_event(&event).await?;

        Ok(())
    }

    /// Mark an item as failed
    pub async fn mark_failed(&self, id: &str, error: &str) -> Result<(), QueueError> {
        let event = QueueEvent {
            timestamp: Utc::now(),
            item_id: id.to_string(),
            event_type: QueueEventType::Failed,
            data: Some(serde_json::json!({ "error": error })),
        };
        self.append_event(&event).await?;

        Ok(())
    }

    /// Reset a failed item for another attempt after `delay`
    pub async fn reset_for_retry(&self, id: &str, delay: Duration) -> Result<(), QueueError> {
        let not_before = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
        let event = QueueEvent {
            timestamp: Utc::now(),
            item_id: id.to_string(),
            event_type: QueueEventType::ResetForRetry,
            data: Some(serde_json::json!({ "not_before": not_before.to_rfc3339() })),
        };
        self.append_event(&event).await?;

        Ok(())
    }

    /// Reset items stuck in `processing` longer than `max_age` (a killed
    /// worker leaves them behind). Returns how many were requeued.
    pub async fn requeue_stale(&self, max_age: Duration) -> Result<usize, QueueError> {
        let cutoff = Utc::now() - chrono::Duration::from_std(max_age).unwrap_or_default();
        let items = self.replay().await?;

        let mut requeued = 0;
        for item in items.values() {
            let stale = item.state == JobState::Processing
                && item.started_at.map(|t| t < cutoff).unwrap_or(false);
            if stale {
                self.reset_for_retry(&item.id, Duration::ZERO).await?;
                requeued += 1;
            }
        }
        Ok(requeued)
    }

    /// Get queue status summary
    pub async fn status(&self) -> Result<QueueStatus, QueueError> {
        let items = self.replay().await?;

        let mut status = QueueStatus::default();
        for item in items.values() {
            match item.state {
                JobState::Pending => status.pending += 1,
                JobState::Processing => status.processing += 1,
                JobState::Done => status.done += 1,
                JobState::Failed => status.failed += 1,
            }
        }

        // Get recent items (last 5)
        let mut all_items: Vec<&QueueItem> = items.values().collect();
        all_items.sort_by(|a, b| b.enqueued_at.cmp(&a.enqueued_at));
        status.recent = all_items.into_iter().take(5).cloned().collect();

        Ok(status)
    }

    /// All items, newest first
    pub async fn list(&self) -> Result<Vec<QueueItem>, QueueError> {
        let items = self.replay().await?;
        let mut all: Vec<QueueItem> = items.into_values().collect();
        all.sort_by(|a, b| b.enqueued_at.cmp(&a.enqueued_at));
        Ok(all)
    }

    /// Get a specific item by ID
    pub async fn get(&self, id: &str) -> Result<Option<QueueItem>, QueueError> {
        let items = self.replay().await?;
        Ok(items.get(id).cloned())
    }
}

/// Result of enqueueing an item
#[derive(Debug, Clone)]
pub enum EnqueueResult {
    /// Successfully queued (new item)
    Queued(String),

    /// Already queued and pending/processing
    AlreadyQueued(String),

    /// Already processed (done)
    AlreadyProcessed(String),

    /// Reset from failed state for retry
    ResetForRetry(String),
}

impl EnqueueResult {
    /// Get the item ID regardless of result type
    pub fn id(&self) -> &str {
        match self {
            Self::Queued(id)
            | Self::AlreadyQueued(id)
            | Self::AlreadyProcessed(id)
            | Self::ResetForRetry(id) => id,
        }
    }

    /// Check if this was a new enqueue
    pub fn is_new(&self) -> bool {
        matches!(self, Self::Queued(_))
    }
}

/// Queue status summary
#[derive(Debug, Clone, Default)]
pub struct QueueStatus {
    pub pending: usize,
    pub processing: usize,
    pub done: usize,
    pub failed: usize,
    pub recent: Vec<QueueItem>,
}

impl QueueStatus {
    /// Total items in queue
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.done + self.failed
    }
}

/// Compute the queue id for a payload: SHA256 of its canonical JSON,
/// first 12 hex characters
pub fn compute_job_id(kind: &JobKind) -> Result<String, QueueError> {
    let canonical = serde_json::to_string(kind)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();

    Ok(hex::encode(digest)[..12].to_string())
}
