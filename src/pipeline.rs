//! Request-level entry points for the narration and export pipeline.
//!
//! Requests are validated against the content store, persisted, and
//! handed to the job queue; callers get the freshly created record back
//! and poll for the rest. Workers run the actual work through
//! [`PipelineRunner`], which owns the dispatch from queue payloads to
//! the orchestrator and assembler.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::{
    ExportFormat, NarrationProject, NarrationSlide, NoteLength, NoteTone, Resolution, SpeakerNote,
    TransitionStyle, VideoExportJob, Voice,
};
use crate::error::{PipelineError, Result};
use crate::export::VideoAssembler;
use crate::narration::{NarrationOrchestrator, NotesGenerator, SlideNotes};
use crate::queue::{worker::JobRunner, JobKind, JobQueue};
use crate::store::{ContentStore, RecordStore};

/// A narration-generation request as received from the outside
#[derive(Debug, Clone)]
pub struct NarrationRequest {
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub voice: Voice,
    /// Clamped into the supported range, never rejected
    pub speed: f64,
    /// Limit narration to these slides; `None` narrates the whole deck
    pub slide_ids: Option<Vec<Uuid>>,
}

/// A video-export request as received from the outside
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub format: ExportFormat,
    pub resolution: Resolution,
    pub include_narration: bool,
    pub transition: TransitionStyle,
    pub default_slide_seconds: Option<f64>,
    pub narration_id: Option<Uuid>,
}

/// Narration record plus its per-slide rows, as returned to pollers
#[derive(Debug, Clone)]
pub struct NarrationStatusView {
    pub narration: NarrationProject,
    pub slides: Vec<NarrationSlide>,
}

/// Facade over record store, content store, and queue
pub struct Pipeline {
    store: RecordStore,
    content: Arc<dyn ContentStore>,
    queue: JobQueue,
    notes: NotesGenerator,
}

impl Pipeline {
    pub fn new(
        store: RecordStore,
        content: Arc<dyn ContentStore>,
        queue: JobQueue,
        notes: NotesGenerator,
    ) -> Self {
        Self {
            store,
            content,
            queue,
            notes,
        }
    }

    /// Accept a narration request: validate, persist the record in
    /// `generating`, enqueue the work, and return the record immediately.
    #[instrument(skip(self, request), fields(project_id = %request.project_id))]
    pub async fn request_narration(&self, request: NarrationRequest) -> Result<NarrationProject> {
        self.content
            .fetch_project(request.project_id, request.user_id)
            .await?;

        let narration = NarrationProject::new(request.project_id, request.voice, request.speed);
        self.store.insert_narration(&narration)?;

        let enqueued = self
            .queue
            .enqueue(&JobKind::Narration {
                narration_id: narration.id,
                project_id: request.project_id,
                user_id: request.user_id,
                slide_ids: request.slide_ids,
            })
            .await?;
        info!(narration_id = %narration.id, item = enqueued.id(), "narration queued");

        Ok(narration)
    }

    /// Accept a video-export request: validate (including any narration
    /// reference), persist the job in `pending`, enqueue, and return.
    #[instrument(skip(self, request), fields(project_id = %request.project_id))]
    pub async fn request_export(&self, request: ExportRequest) -> Result<VideoExportJob> {
        self.content
            .fetch_project(request.project_id, request.user_id)
            .await?;

        if let Some(narration_id) = request.narration_id {
            let narration =
                self.store
                    .get_narration(narration_id)?
                    .ok_or_else(|| PipelineError::NotFound {
                        what: format!("narration project {}", narration_id),
                    })?;
            if narration.project_id != request.project_id {
                return Err(PipelineError::NotFound {
                    what: format!(
                        "narration project {} for project {}",
                        narration_id, request.project_id
                    ),
                });
            }
        }

        let job = VideoExportJob::new(
            request.project_id,
            request.format,
            request.resolution,
            request.include_narration,
            request.transition,
            request.default_slide_seconds,
            request.narration_id,
        );
        self.store.insert_export_job(&job)?;

        let enqueued = self
            .queue
            .enqueue(&JobKind::VideoExport {
                job_id: job.id,
                project_id: request.project_id,
                user_id: request.user_id,
            })
            .await?;
        info!(job_id = %job.id, item = enqueued.id(), "export queued");

        Ok(job)
    }

    /// Generate speaker notes for a whole project, synchronously.
    pub async fn generate_notes(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        tone: NoteTone,
        length: NoteLength,
    ) -> Result<Vec<SlideNotes>> {
        let project = self.content.fetch_project(project_id, user_id).await?;
        self.notes
            .generate_for_project(&self.store, &project, tone, length)
            .await
    }

    /// Replace a slide's speaker note with human-authored text. Always
    /// clears the AI-authorship flag.
    pub async fn edit_speaker_note(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        slide_id: Uuid,
        text: String,
    ) -> Result<SpeakerNote> {
        let project = self.content.fetch_project(project_id, user_id).await?;
        if project.slide(slide_id).is_none() {
            return Err(PipelineError::NotFound {
                what: format!("slide {} in project {}", slide_id, project_id),
            });
        }

        let note = SpeakerNote::manual(slide_id, text);
        self.store.upsert_speaker_note(&note)?;
        Ok(note)
    }

    /// Current persisted state of a narration project, verbatim.
    pub fn narration_status(&self, narration_id: Uuid) -> Result<NarrationStatusView> {
        let narration =
            self.store
                .get_narration(narration_id)?
                .ok_or_else(|| PipelineError::NotFound {
                    what: format!("narration project {}", narration_id),
                })?;
        let slides = self.store.list_narration_slides(narration_id)?;
        Ok(NarrationStatusView { narration, slides })
    }

    /// Current persisted state of an export job, verbatim.
    pub fn export_status(&self, job_id: Uuid) -> Result<VideoExportJob> {
        self.store
            .get_export_job(job_id)?
            .ok_or_else(|| PipelineError::NotFound {
                what: format!("export job {}", job_id),
            })
    }
}

/// Dispatches claimed queue items to the orchestrator or assembler.
/// Each call opens its own record store; SQLite connections stay within
/// one worker task.
pub struct PipelineRunner {
    db_path: PathBuf,
    orchestrator: NarrationOrchestrator,
    assembler: VideoAssembler,
}

impl PipelineRunner {
    pub fn new(
        db_path: PathBuf,
        orchestrator: NarrationOrchestrator,
        assembler: VideoAssembler,
    ) -> Self {
        Self {
            db_path,
            orchestrator,
            assembler,
        }
    }
}

#[async_trait]
impl JobRunner for PipelineRunner {
    async fn run(&self, kind: &JobKind) -> Result<()> {
        let store = RecordStore::open(&self.db_path)?;
        match kind {
            JobKind::Narration {
                narration_id,
                project_id,
                user_id,
                slide_ids,
            } => {
                self.orchestrator
                    .run(
                        &store,
                        *narration_id,
                        *project_id,
                        *user_id,
                        slide_ids.as_deref(),
                    )
                    .await
            }
            JobKind::VideoExport {
                job_id,
                project_id,
                user_id,
            } => {
                self.assembler
                    .run(&store, *job_id, *project_id, *user_id)
                    .await
            }
        }
    }

    async fn abandon(&self, kind: &JobKind, error: &PipelineError) -> Result<()> {
        let store = RecordStore::open(&self.db_path)?;
        match kind {
            JobKind::Narration { narration_id, .. } => {
                store.fail_narration(*narration_id, &error.to_string())
            }
            JobKind::VideoExport { job_id, .. } => {
                if let Some(mut job) = store.get_export_job(*job_id)? {
                    if !job.status.is_terminal() {
                        job.fail(error.to_string())?;
                        store.save_export_job(&job)?;
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tempfile::TempDir;

    use crate::domain::{ExportStatus, NarrationStatus, SourceProject, SourceSlide};
    use crate::queue::JobState;

    struct FixedContent {
        project: SourceProject,
    }

    #[async_trait]
    impl ContentStore for FixedContent {
        async fn fetch_project(&self, project_id: Uuid, user_id: Uuid) -> Result<SourceProject> {
            if project_id == self.project.id && user_id == self.project.owner_id {
                Ok(self.project.clone())
            } else {
                Err(PipelineError::NotFound {
                    what: format!("project {}", project_id),
                })
            }
        }
    }

    struct NullText;

    #[async_trait]
    impl crate::providers::TextProvider for NullText {
        fn name(&self) -> &str {
            "null"
        }

        async fn generate(&self, _prompt: &str, _timeout: Duration) -> Result<String> {
            Ok("Generated narration text for the slide.".to_string())
        }

        async fn health_check(&self) -> Result<()> {
            Ok(())
        }
    }

    struct Fixture {
        pipeline: Pipeline,
        queue: JobQueue,
        project: SourceProject,
        _temp: TempDir,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let store = RecordStore::open(&temp.path().join("records.db")).unwrap();
        let queue = JobQueue::new(temp.path().join("jobs.jsonl"));

        let project = SourceProject {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            title: "Deck".to_string(),
            theme: None,
            slides: vec![SourceSlide {
                id: Uuid::new_v4(),
                slide_number: 1,
                title: Some("One".to_string()),
                blocks: vec![serde_json::json!({"text": "Slide body text here."})],
            }],
        };

        let pipeline = Pipeline::new(
            store,
            Arc::new(FixedContent {
                project: project.clone(),
            }),
            queue.clone(),
            NotesGenerator::new(Arc::new(NullText), Duration::from_secs(5)),
        );

        Fixture {
            pipeline,
            queue,
            project,
            _temp: temp,
        }
    }

    #[tokio::test]
    async fn test_narration_request_creates_record_and_enqueues() {
        let f = fixture();

        let narration = f
            .pipeline
            .request_narration(NarrationRequest {
                project_id: f.project.id,
                user_id: f.project.owner_id,
                voice: Voice::Nova,
                speed: 10.0,
                slide_ids: None,
            })
            .await
            .unwrap();

        assert_eq!(narration.status, NarrationStatus::Generating);
        assert_eq!(narration.speed, 4.0, "out-of-range speed is clamped");

        let view = f.pipeline.narration_status(narration.id).unwrap();
        assert_eq!(view.narration.id, narration.id);
        assert!(view.slides.is_empty(), "slides appear only after the worker runs");

        let pending = f.queue.get_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert!(matches!(pending[0].kind, JobKind::Narration { narration_id, .. } if narration_id == narration.id));
    }

    #[tokio::test]
    async fn test_narration_request_for_foreign_project_is_rejected() {
        let f = fixture();

        let err = f
            .pipeline
            .request_narration(NarrationRequest {
                project_id: f.project.id,
                user_id: Uuid::new_v4(),
                voice: Voice::Alloy,
                speed: 1.0,
                slide_ids: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::NotFound { .. }));
        assert!(f.queue.get_pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_export_request_creates_pending_job_and_enqueues() {
        let f = fixture();

        let job = f
            .pipeline
            .request_export(ExportRequest {
                project_id: f.project.id,
                user_id: f.project.owner_id,
                format: ExportFormat::Webm,
                resolution: Resolution::Hd720,
                include_narration: false,
                transition: TransitionStyle::None,
                default_slide_seconds: Some(3.5),
                narration_id: None,
            })
            .await
            .unwrap();

        assert_eq!(job.status, ExportStatus::Pending);
        assert_eq!(job.progress, 0);
        assert!(job.output_url.is_none());

        let polled = f.pipeline.export_status(job.id).unwrap();
        assert_eq!(polled.default_slide_seconds, 3.5);

        let pending = f.queue.get_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].state, JobState::Pending);
    }

    #[tokio::test]
    async fn test_export_request_rejects_unknown_narration_reference() {
        let f = fixture();

        let err = f
            .pipeline
            .request_export(ExportRequest {
                project_id: f.project.id,
                user_id: f.project.owner_id,
                format: ExportFormat::Mp4,
                resolution: Resolution::Hd1080,
                include_narration: true,
                transition: TransitionStyle::Fade,
                default_slide_seconds: None,
                narration_id: Some(Uuid::new_v4()),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_export_request_rejects_narration_of_other_project() {
        let f = fixture();

        // Narration record that belongs to a different project
        let foreign = NarrationProject::new(Uuid::new_v4(), Voice::Alloy, 1.0);
        f.pipeline.store.insert_narration(&foreign).unwrap();

        let err = f
            .pipeline
            .request_export(ExportRequest {
                project_id: f.project.id,
                user_id: f.project.owner_id,
                format: ExportFormat::Mp4,
                resolution: Resolution::Hd1080,
                include_narration: true,
                transition: TransitionStyle::Fade,
                default_slide_seconds: None,
                narration_id: Some(foreign.id),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_manual_note_edit_clears_ai_flag() {
        let f = fixture();
        let slide_id = f.project.slides[0].id;

        // Seed an AI-generated note
        f.pipeline
            .store
            .upsert_speaker_note(&SpeakerNote::generated(
                slide_id,
                "Machine written".to_string(),
            ))
            .unwrap();

        let note = f
            .pipeline
            .edit_speaker_note(
                f.project.id,
                f.project.owner_id,
                slide_id,
                "Human written".to_string(),
            )
            .await
            .unwrap();

        assert!(!note.ai_generated);
        let stored = f.pipeline.store.get_speaker_note(slide_id).unwrap().unwrap();
        assert_eq!(stored.text, "Human written");
        assert!(!stored.ai_generated);
    }

    #[tokio::test]
    async fn test_note_edit_for_unknown_slide_is_not_found() {
        let f = fixture();

        let err = f
            .pipeline
            .edit_speaker_note(
                f.project.id,
                f.project.owner_id,
                Uuid::new_v4(),
                "text".to_string(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_status_for_unknown_ids_is_not_found() {
        let f = fixture();
        assert!(matches!(
            f.pipeline.narration_status(Uuid::new_v4()).unwrap_err(),
            PipelineError::NotFound { .. }
        ));
        assert!(matches!(
            f.pipeline.export_status(Uuid::new_v4()).unwrap_err(),
            PipelineError::NotFound { .. }
        ));
    }
}
