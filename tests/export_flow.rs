//! Export Flow Integration Tests
//!
//! End-to-end video exports: request through the pipeline facade,
//! process through the queue worker pool, then assert the job record
//! and the stored output. Covers the encoder path, the interactive
//! HTML fallback, and terminal failure after retries.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use uuid::Uuid;

use deckcast::artifacts::{ArtifactStore, LocalArtifactStore};
use deckcast::domain::{
    ExportFormat, ExportStatus, Resolution, SourceProject, SourceSlide, TransitionStyle, Voice,
};
use deckcast::error::{PipelineError, Result};
use deckcast::export::{SegmentSpec, StillSpec, VideoAssembler, VideoEncoder};
use deckcast::narration::{NarrationOrchestrator, NotesGenerator, SpeechSynthesizer};
use deckcast::pipeline::{ExportRequest, NarrationRequest, Pipeline, PipelineRunner};
use deckcast::providers::{SpeechAudio, SpeechProvider, TextProvider};
use deckcast::queue::{JobQueue, RetryPolicy, WorkerPool};
use deckcast::store::{ContentStore, JsonContentStore, RecordStore};

/// Encoder double: either absent, scripted to succeed, or scripted to
/// fail every segment encode.
struct ScriptedEncoder {
    available: bool,
    fail_segments: bool,
    stills: Mutex<usize>,
    segments: Mutex<Vec<(f64, bool)>>,
}

impl ScriptedEncoder {
    fn present() -> Self {
        Self {
            available: true,
            fail_segments: false,
            stills: Mutex::new(0),
            segments: Mutex::new(Vec::new()),
        }
    }

    fn absent() -> Self {
        Self {
            available: false,
            fail_segments: false,
            stills: Mutex::new(0),
            segments: Mutex::new(Vec::new()),
        }
    }

    fn broken() -> Self {
        Self {
            available: true,
            fail_segments: true,
            stills: Mutex::new(0),
            segments: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl VideoEncoder for ScriptedEncoder {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn is_available(&self) -> bool {
        self.available
    }

    async fn render_still(&self, _spec: &StillSpec<'_>, out: &Path) -> Result<()> {
        *self.stills.lock().unwrap() += 1;
        tokio::fs::write(out, b"png").await.unwrap();
        Ok(())
    }

    async fn render_segment(&self, spec: &SegmentSpec<'_>, out: &Path) -> Result<()> {
        if self.fail_segments {
            return Err(PipelineError::Assembly {
                message: "segment encode blew up".to_string(),
            });
        }
        self.segments
            .lock()
            .unwrap()
            .push((spec.duration_seconds, spec.audio.is_some()));
        tokio::fs::write(out, b"seg").await.unwrap();
        Ok(())
    }

    async fn concat_segments(
        &self,
        _manifest: &Path,
        _format: ExportFormat,
        out: &Path,
    ) -> Result<()> {
        tokio::fs::write(out, b"FINAL VIDEO").await.unwrap();
        Ok(())
    }
}

struct FixedSpeech {
    duration: u32,
}

#[async_trait]
impl SpeechProvider for FixedSpeech {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn synthesize(
        &self,
        _text: &str,
        _voice: Voice,
        _speed: f64,
        _timeout: Duration,
    ) -> Result<SpeechAudio> {
        Ok(SpeechAudio {
            bytes: b"mp3 bytes".to_vec(),
            content_type: "audio/mpeg".to_string(),
            duration_seconds: Some(self.duration),
        })
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

struct UnusedText;

#[async_trait]
impl TextProvider for UnusedText {
    fn name(&self) -> &str {
        "unused"
    }

    async fn generate(&self, _prompt: &str, _timeout: Duration) -> Result<String> {
        Err(PipelineError::Provider {
            provider: "unused".to_string(),
            message: "text provider should not be called".to_string(),
        })
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

struct Harness {
    temp: TempDir,
    user_id: Uuid,
}

impl Harness {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("content")).unwrap();
        Self {
            temp,
            user_id: Uuid::new_v4(),
        }
    }

    fn db_path(&self) -> PathBuf {
        self.temp.path().join("deckcast.db")
    }

    fn queue_path(&self) -> PathBuf {
        self.temp.path().join("queue").join("jobs.jsonl")
    }

    fn artifact_root(&self) -> PathBuf {
        self.temp.path().join("artifacts")
    }

    fn content_dir(&self) -> PathBuf {
        self.temp.path().join("content")
    }

    fn write_project(&self, slide_texts: &[&str]) -> SourceProject {
        let slides = slide_texts
            .iter()
            .enumerate()
            .map(|(i, text)| SourceSlide {
                id: Uuid::new_v4(),
                slide_number: (i + 1) as u32,
                title: Some(format!("Slide {}", i + 1)),
                blocks: vec![serde_json::json!(*text)],
            })
            .collect();

        let project = SourceProject {
            id: Uuid::new_v4(),
            owner_id: self.user_id,
            title: "Board update <Q3>".to_string(),
            theme: None,
            slides,
        };
        std::fs::write(
            self.content_dir().join(format!("{}.json", project.id)),
            serde_json::to_string_pretty(&project).unwrap(),
        )
        .unwrap();
        project
    }

    async fn pipeline(&self) -> Pipeline {
        let store = RecordStore::open(&self.db_path()).unwrap();
        let content: Arc<dyn ContentStore> = Arc::new(JsonContentStore::new(self.content_dir()));
        let queue = JobQueue::open(self.queue_path()).await.unwrap();
        let notes = NotesGenerator::new(Arc::new(UnusedText), Duration::from_secs(5));
        Pipeline::new(store, content, queue, notes)
    }

    fn runner(&self, encoder: Arc<ScriptedEncoder>) -> Arc<PipelineRunner> {
        let content: Arc<dyn ContentStore> = Arc::new(JsonContentStore::new(self.content_dir()));
        let artifacts: Arc<dyn ArtifactStore> =
            Arc::new(LocalArtifactStore::new(self.artifact_root()));

        let synthesizer = SpeechSynthesizer::new(
            Arc::new(FixedSpeech { duration: 8 }),
            Arc::clone(&artifacts),
            Duration::from_secs(5),
        );
        let orchestrator = NarrationOrchestrator::new(Arc::clone(&content), synthesizer);
        let assembler = VideoAssembler::new(content, artifacts, encoder, 30);

        Arc::new(PipelineRunner::new(self.db_path(), orchestrator, assembler))
    }

    async fn drain(&self, runner: Arc<PipelineRunner>) {
        let queue = JobQueue::open(self.queue_path()).await.unwrap();
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            backoff_multiplier: 1.0,
        };
        WorkerPool::new(queue, runner, 2, Duration::from_millis(5), policy)
            .run(true)
            .await
            .unwrap();
    }

    /// Read a stored artifact back off disk by its returned URL.
    fn read_artifact(&self, url: &str) -> Vec<u8> {
        let key = url.strip_prefix("/artifacts/").unwrap();
        std::fs::read(self.artifact_root().join(key)).unwrap()
    }

    fn export_request(&self, project_id: Uuid) -> ExportRequest {
        ExportRequest {
            project_id,
            user_id: self.user_id,
            format: ExportFormat::Mp4,
            resolution: Resolution::Hd1080,
            include_narration: false,
            transition: TransitionStyle::Fade,
            default_slide_seconds: None,
            narration_id: None,
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fallback_document_when_encoder_is_absent() {
    let harness = Harness::new();
    let project = harness.write_project(&[
        "Revenue grew twelve percent this quarter.",
        "Hiring stays flat through the end of the year.",
    ]);

    let pipeline = harness.pipeline().await;
    let job = pipeline
        .request_export(harness.export_request(project.id))
        .await
        .unwrap();
    assert_eq!(job.status, ExportStatus::Pending);
    assert_eq!(job.progress, 0);

    harness.drain(harness.runner(Arc::new(ScriptedEncoder::absent()))).await;

    let job = pipeline.export_status(job.id).unwrap();
    assert_eq!(job.status, ExportStatus::Completed);
    assert_eq!(job.progress, 100);
    let url = job.output_url.unwrap();
    assert!(url.ends_with(".html"), "fallback output is a document: {}", url);

    let html = String::from_utf8(harness.read_artifact(&url)).unwrap();
    assert!(html.contains("<!DOCTYPE html>"));
    assert!(html.contains("Board update &lt;Q3&gt;"), "title is escaped");
    assert!(html.contains("Revenue grew twelve percent"));
    assert!(html.contains("transition-fade"));
    assert!(!html.contains("__SLIDE_DATA__"), "markers are replaced");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_video_export_uses_narration_audio_and_timing() {
    let harness = Harness::new();
    let project = harness.write_project(&[
        "First slide spoken content for the video.",
        "Second slide spoken content for the video.",
    ]);

    let pipeline = harness.pipeline().await;

    // Narrate first so per-slide audio and durations exist
    let narration = pipeline
        .request_narration(NarrationRequest {
            project_id: project.id,
            user_id: harness.user_id,
            voice: Voice::Onyx,
            speed: 1.0,
            slide_ids: None,
        })
        .await
        .unwrap();
    harness.drain(harness.runner(Arc::new(ScriptedEncoder::present()))).await;

    let mut request = harness.export_request(project.id);
    request.include_narration = true;
    request.narration_id = Some(narration.id);
    let job = pipeline.request_export(request).await.unwrap();

    let encoder = Arc::new(ScriptedEncoder::present());
    harness.drain(harness.runner(encoder.clone())).await;

    let job = pipeline.export_status(job.id).unwrap();
    assert_eq!(job.status, ExportStatus::Completed);
    assert_eq!(job.progress, 100);
    let url = job.output_url.unwrap();
    assert!(url.ends_with(".mp4"), "encoder output is a video: {}", url);
    assert_eq!(harness.read_artifact(&url), b"FINAL VIDEO");

    // Both segments carried narration audio at the narrated duration
    let segments = encoder.segments.lock().unwrap().clone();
    assert_eq!(segments, vec![(8.0, true), (8.0, true)]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_empty_deck_falls_back_even_with_encoder() {
    let harness = Harness::new();
    let project = harness.write_project(&[]);

    let pipeline = harness.pipeline().await;
    let mut request = harness.export_request(project.id);
    request.include_narration = true;
    let job = pipeline.request_export(request).await.unwrap();

    let encoder = Arc::new(ScriptedEncoder::present());
    harness.drain(harness.runner(encoder.clone())).await;

    let job = pipeline.export_status(job.id).unwrap();
    assert_eq!(job.status, ExportStatus::Completed);
    assert!(job.output_url.unwrap().ends_with(".html"));
    assert_eq!(*encoder.stills.lock().unwrap(), 0, "no stills for an empty deck");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_broken_encoder_fails_job_after_retries() {
    let harness = Harness::new();
    let project = harness.write_project(&["The only slide in this deck."]);

    let pipeline = harness.pipeline().await;
    let mut request = harness.export_request(project.id);
    request.include_narration = true;
    let job = pipeline.request_export(request).await.unwrap();

    let encoder = Arc::new(ScriptedEncoder::broken());
    harness.drain(harness.runner(encoder.clone())).await;

    // Retries exhausted: record is terminally failed with the encoder error
    let job = pipeline.export_status(job.id).unwrap();
    assert_eq!(job.status, ExportStatus::Failed);
    assert!(job.output_url.is_none());
    assert_ne!(job.progress, 100);
    let error = job.error.unwrap();
    assert!(error.contains("segment encode blew up"), "got: {}", error);

    // Each attempt re-rendered the still before hitting the broken step
    assert_eq!(*encoder.stills.lock().unwrap(), 3);

    let status = JobQueue::open(harness.queue_path())
        .await
        .unwrap()
        .status()
        .await
        .unwrap();
    assert_eq!(status.failed, 1);
    assert_eq!(status.pending, 0);
}

#[tokio::test]
async fn test_export_rejects_foreign_narration_reference() {
    let harness = Harness::new();
    let project = harness.write_project(&["Deck one content for narrating."]);
    let other = harness.write_project(&["Deck two content for narrating."]);

    let pipeline = harness.pipeline().await;
    let narration = pipeline
        .request_narration(NarrationRequest {
            project_id: other.id,
            user_id: harness.user_id,
            voice: Voice::Alloy,
            speed: 1.0,
            slide_ids: None,
        })
        .await
        .unwrap();

    // A narration run belonging to a different deck cannot be attached
    let mut request = harness.export_request(project.id);
    request.include_narration = true;
    request.narration_id = Some(narration.id);
    let err = pipeline.request_export(request).await.unwrap_err();
    assert!(matches!(err, PipelineError::NotFound { .. }));
}
