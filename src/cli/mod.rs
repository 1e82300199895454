//! Command-line interface for deckcast.
//!
//! Provides commands for requesting narration and video exports,
//! generating speaker notes, running queue workers, and inspecting
//! pipeline state.

use std::io::{self, Read};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::artifacts::{ArtifactStore, BucketArtifactStore, LocalArtifactStore};
use crate::config::{self, ResolvedConfig};
use crate::domain::{NoteLength, NoteTone, Resolution, TransitionStyle, Voice};
use crate::error::PipelineError;
use crate::export::{FfmpegEncoder, VideoAssembler, VideoEncoder};
use crate::narration::{NarrationOrchestrator, NotesGenerator, SpeechSynthesizer};
use crate::pipeline::{ExportRequest, NarrationRequest, Pipeline, PipelineRunner};
use crate::providers::{OpenAiSpeechProvider, OpenAiTextProvider, SpeechProvider, TextProvider};
use crate::queue::{JobQueue, WorkerPool};
use crate::store::{ContentStore, JsonContentStore, RecordStore};

pub mod jobs;

/// deckcast - slide-deck narration and video-export pipeline
#[derive(Parser, Debug)]
#[command(name = "deckcast")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Queue narration generation for a presentation
    Narrate {
        /// Presentation ID (UUID)
        project_id: String,

        /// Owner of the presentation (UUID)
        #[arg(short, long)]
        user: String,

        /// Voice to narrate with (alloy, echo, fable, onyx, nova, shimmer)
        #[arg(long, default_value = "alloy")]
        voice: String,

        /// Speech speed multiplier (clamped to 0.25-4.0)
        #[arg(long, default_value = "1.0")]
        speed: f64,

        /// Narrate only these slides (repeatable; whole deck if omitted)
        #[arg(long = "slide")]
        slides: Vec<String>,
    },

    /// Queue a video export for a presentation
    Export {
        /// Presentation ID (UUID)
        project_id: String,

        /// Owner of the presentation (UUID)
        #[arg(short, long)]
        user: String,

        /// Output container (mp4, webm)
        #[arg(short, long, default_value = "mp4")]
        format: String,

        /// Target resolution (720p, 1080p, 4k)
        #[arg(short, long, default_value = "1080p")]
        resolution: String,

        /// Narration run supplying audio and per-slide timing
        #[arg(long)]
        narration: Option<String>,

        /// Include narration even without naming a run
        #[arg(long)]
        include_narration: bool,

        /// Transition between slides (none, fade, slide)
        #[arg(long, default_value = "none")]
        transition: String,

        /// Display time for slides without narration timing
        #[arg(long)]
        seconds_per_slide: Option<f64>,
    },

    /// Generate or edit speaker notes
    Notes {
        #[command(subcommand)]
        command: NotesCommands,
    },

    /// Check the status of a narration run or export job
    Status {
        /// Narration or export job ID (UUID)
        id: String,
    },

    /// Run queue workers
    Work {
        /// Drain the queue once and exit
        #[arg(long)]
        once: bool,

        /// Number of workers (defaults to the configured count)
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Manage the job queue
    Jobs {
        #[command(subcommand)]
        command: jobs::JobsCommands,
    },

    /// List available narration voices
    Voices,

    /// Delete stored audio for a narration run
    Clean {
        /// Narration run ID (UUID)
        narration_id: String,
    },

    /// Show resolved configuration
    Config,

    /// Check providers, storage, and tools
    Doctor,
}

/// Speaker-notes subcommands
#[derive(Subcommand, Debug)]
pub enum NotesCommands {
    /// Generate notes for every slide in a presentation
    Generate {
        /// Presentation ID (UUID)
        project_id: String,

        /// Owner of the presentation (UUID)
        #[arg(short, long)]
        user: String,

        /// Tone hint (professional, casual, educational, persuasive)
        #[arg(long, default_value = "professional")]
        tone: String,

        /// Length hint (short, medium, detailed)
        #[arg(long, default_value = "medium")]
        length: String,
    },

    /// Replace one slide's note with hand-written text
    Edit {
        /// Presentation ID (UUID)
        project_id: String,

        /// Slide ID (UUID)
        slide_id: String,

        /// Owner of the presentation (UUID)
        #[arg(short, long)]
        user: String,

        /// Note text (reads from stdin if not provided)
        #[arg(long)]
        text: Option<String>,
    },
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Narrate {
                project_id,
                user,
                voice,
                speed,
                slides,
            } => execute_narrate(&project_id, &user, &voice, speed, slides).await,
            Commands::Export {
                project_id,
                user,
                format,
                resolution,
                narration,
                include_narration,
                transition,
                seconds_per_slide,
            } => {
                execute_export(
                    &project_id,
                    &user,
                    &format,
                    &resolution,
                    narration,
                    include_narration,
                    &transition,
                    seconds_per_slide,
                )
                .await
            }
            Commands::Notes { command } => execute_notes(command).await,
            Commands::Status { id } => execute_status(&id).await,
            Commands::Work { once, workers } => execute_work(once, workers).await,
            Commands::Jobs { command } => jobs::execute(command).await,
            Commands::Voices => execute_voices().await,
            Commands::Clean { narration_id } => execute_clean(&narration_id).await,
            Commands::Config => show_config().await,
            Commands::Doctor => execute_doctor().await,
        }
    }
}

fn parse_uuid(what: &str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).with_context(|| format!("Invalid {}: {}", what, value))
}

fn content_store() -> Result<Arc<dyn ContentStore>> {
    Ok(Arc::new(JsonContentStore::new(config::content_dir()?)))
}

fn artifact_store(cfg: &ResolvedConfig) -> Result<Arc<dyn ArtifactStore>> {
    match &cfg.storage.bucket {
        Some(bucket) => {
            let mut store = BucketArtifactStore::new(&bucket.endpoint, &bucket.bucket)
                .with_timeout(Duration::from_secs(bucket.timeout_seconds));
            if let Some(base) = &bucket.public_base_url {
                store = store.with_public_base_url(base);
            }
            if let Some(env_name) = &bucket.auth_token_env {
                let token = std::env::var(env_name)
                    .with_context(|| format!("{} must be set for bucket storage", env_name))?;
                store = store.with_auth_token(token);
            }
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(LocalArtifactStore::new(config::artifact_root()?))),
    }
}

fn text_provider(cfg: &ResolvedConfig, api_key: String) -> Arc<dyn TextProvider> {
    let settings = &cfg.providers.text;
    Arc::new(
        OpenAiTextProvider::new(api_key)
            .with_base_url(&settings.base_url)
            .with_model(&settings.model),
    )
}

fn speech_provider(cfg: &ResolvedConfig) -> Result<Arc<dyn SpeechProvider>> {
    let settings = &cfg.providers.speech;
    let api_key = std::env::var(&settings.api_key_env)
        .with_context(|| format!("{} must be set for speech synthesis", settings.api_key_env))?;
    Ok(Arc::new(
        OpenAiSpeechProvider::new(api_key)
            .with_base_url(&settings.base_url)
            .with_model(&settings.model),
    ))
}

/// Build the request-side facade. The text key is only exercised by
/// notes generation; enqueue and status commands work without it.
async fn build_pipeline() -> Result<Pipeline> {
    let cfg = config::config()?;
    let store = RecordStore::open(&config::db_path()?)?;
    let content = content_store()?;
    let queue = JobQueue::open(config::queue_events_path()?).await?;

    let api_key = std::env::var(&cfg.providers.text.api_key_env).unwrap_or_default();
    let notes = NotesGenerator::new(
        text_provider(cfg, api_key),
        Duration::from_secs(cfg.providers.text.timeout_seconds),
    );

    Ok(Pipeline::new(store, content, queue, notes))
}

/// Build the worker-side runner. Fails fast when the speech key is
/// missing, since queued narration work cannot run without it.
fn build_runner(cfg: &ResolvedConfig) -> Result<Arc<PipelineRunner>> {
    let content = content_store()?;
    let artifacts = artifact_store(cfg)?;

    let synthesizer = SpeechSynthesizer::new(
        speech_provider(cfg)?,
        Arc::clone(&artifacts),
        Duration::from_secs(cfg.providers.speech.timeout_seconds),
    );
    let orchestrator = NarrationOrchestrator::new(Arc::clone(&content), synthesizer);

    let encoder: Arc<dyn VideoEncoder> = Arc::new(FfmpegEncoder::new(
        cfg.encoder.binary.clone(),
        Duration::from_secs(cfg.encoder.timeout_seconds),
    ));
    let assembler = VideoAssembler::new(content, artifacts, encoder, cfg.encoder.fps);

    Ok(Arc::new(PipelineRunner::new(
        config::db_path()?,
        orchestrator,
        assembler,
    )))
}

/// Queue narration generation
async fn execute_narrate(
    project_id: &str,
    user: &str,
    voice: &str,
    speed: f64,
    slides: Vec<String>,
) -> Result<()> {
    let project_id = parse_uuid("project ID", project_id)?;
    let user_id = parse_uuid("user ID", user)?;
    let voice: Voice = voice.parse().map_err(|e: String| anyhow::anyhow!(e))?;

    let slide_ids = if slides.is_empty() {
        None
    } else {
        let ids = slides
            .iter()
            .map(|s| parse_uuid("slide ID", s))
            .collect::<Result<Vec<_>>>()?;
        Some(ids)
    };

    let pipeline = build_pipeline().await?;
    let narration = pipeline
        .request_narration(NarrationRequest {
            project_id,
            user_id,
            voice,
            speed,
            slide_ids,
        })
        .await?;

    println!("{}", narration.id);
    eprintln!("✅ Narration queued");
    eprintln!("   Voice: {} at {:.2}x", narration.voice, narration.speed);
    eprintln!();
    eprintln!("Run 'deckcast work --once' to process the queue,");
    eprintln!("then 'deckcast status {}' to check progress", narration.id);

    Ok(())
}

/// Queue a video export
#[allow(clippy::too_many_arguments)]
async fn execute_export(
    project_id: &str,
    user: &str,
    format: &str,
    resolution: &str,
    narration: Option<String>,
    include_narration: bool,
    transition: &str,
    seconds_per_slide: Option<f64>,
) -> Result<()> {
    let project_id = parse_uuid("project ID", project_id)?;
    let user_id = parse_uuid("user ID", user)?;
    let format = format.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let resolution = Resolution::parse(resolution);
    let transition: TransitionStyle = transition.parse().map_err(|e: String| anyhow::anyhow!(e))?;

    let narration_id = narration
        .map(|s| parse_uuid("narration ID", &s))
        .transpose()?;

    let pipeline = build_pipeline().await?;
    let job = pipeline
        .request_export(ExportRequest {
            project_id,
            user_id,
            format,
            resolution,
            include_narration: include_narration || narration_id.is_some(),
            transition,
            default_slide_seconds: seconds_per_slide,
            narration_id,
        })
        .await?;

    println!("{}", job.id);
    eprintln!("✅ Export queued");
    eprintln!("   Format: {} @ {}", job.format.as_str(), job.resolution);
    if let Some(nid) = job.narration_id {
        eprintln!("   Narration: {}", nid);
    }
    eprintln!();
    eprintln!("Run 'deckcast work --once' to process the queue,");
    eprintln!("then 'deckcast status {}' to check progress", job.id);

    Ok(())
}

/// Execute notes subcommands
async fn execute_notes(command: NotesCommands) -> Result<()> {
    match command {
        NotesCommands::Generate {
            project_id,
            user,
            tone,
            length,
        } => execute_notes_generate(&project_id, &user, &tone, &length).await,
        NotesCommands::Edit {
            project_id,
            slide_id,
            user,
            text,
        } => execute_notes_edit(&project_id, &slide_id, &user, text).await,
    }
}

/// Generate speaker notes for a whole presentation
async fn execute_notes_generate(
    project_id: &str,
    user: &str,
    tone: &str,
    length: &str,
) -> Result<()> {
    let project_id = parse_uuid("project ID", project_id)?;
    let user_id = parse_uuid("user ID", user)?;
    let tone: NoteTone = tone.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let length: NoteLength = length.parse().map_err(|e: String| anyhow::anyhow!(e))?;

    let cfg = config::config()?;
    std::env::var(&cfg.providers.text.api_key_env).with_context(|| {
        format!(
            "{} must be set to generate speaker notes",
            cfg.providers.text.api_key_env
        )
    })?;

    eprintln!(
        "🔮 Generating {} notes ({} length)...",
        tone.as_str(),
        length.as_str()
    );

    let pipeline = build_pipeline().await?;
    let notes = pipeline
        .generate_notes(project_id, user_id, tone, length)
        .await?;

    let mut generated = 0;
    for note in &notes {
        if note.speaker_notes.is_empty() {
            println!("═══ Slide {} (no notes generated) ═══\n", note.slide_number);
        } else {
            generated += 1;
            println!("═══ Slide {} ═══", note.slide_number);
            println!("{}\n", note.speaker_notes);
        }
    }

    eprintln!("Generated notes for {}/{} slides", generated, notes.len());

    Ok(())
}

/// Save a hand-written speaker note
async fn execute_notes_edit(
    project_id: &str,
    slide_id: &str,
    user: &str,
    text: Option<String>,
) -> Result<()> {
    let project_id = parse_uuid("project ID", project_id)?;
    let slide_id = parse_uuid("slide ID", slide_id)?;
    let user_id = parse_uuid("user ID", user)?;

    let text = match text {
        Some(t) => t,
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read note text from stdin")?;
            buffer
        }
    };

    if text.trim().is_empty() {
        anyhow::bail!("Note text is empty. Use --text <note> or pipe to stdin");
    }

    let pipeline = build_pipeline().await?;
    let note = pipeline
        .edit_speaker_note(project_id, user_id, slide_id, text)
        .await?;

    eprintln!(
        "✅ Speaker note saved for slide {} ({} chars)",
        note.slide_id,
        note.text.chars().count()
    );

    Ok(())
}

/// Show the status of a narration run or export job
async fn execute_status(id_str: &str) -> Result<()> {
    let id = parse_uuid("ID", id_str)?;
    let pipeline = build_pipeline().await?;

    match pipeline.narration_status(id) {
        Ok(view) => {
            println!("Narration:  {}", view.narration.id);
            println!("Project:    {}", view.narration.project_id);
            println!(
                "Voice:      {} at {:.2}x",
                view.narration.voice, view.narration.speed
            );
            println!("Status:     {}", view.narration.status);
            println!("Duration:   {}s", view.narration.total_duration_seconds);
            if let Some(error) = &view.narration.error {
                println!("Error:      {}", error);
            }
            println!("Created:    {}", view.narration.created_at);

            if !view.slides.is_empty() {
                println!("\nSlides:");
                for slide in &view.slides {
                    println!(
                        "  #{:<4} {:>5}s  {}",
                        slide.slide_number, slide.duration_seconds, slide.audio_url
                    );
                }
            }
            return Ok(());
        }
        Err(PipelineError::NotFound { .. }) => {}
        Err(e) => return Err(e.into()),
    }

    match pipeline.export_status(id) {
        Ok(job) => {
            println!("Export job: {}", job.id);
            println!("Project:    {}", job.project_id);
            println!("Format:     {} @ {}", job.format.as_str(), job.resolution);
            match job.narration_id {
                Some(nid) => println!("Narration:  {}", nid),
                None if job.include_narration => println!("Narration:  included"),
                None => println!("Narration:  none"),
            }
            println!("Status:     {} ({}%)", job.status, job.progress);
            if let Some(url) = &job.output_url {
                println!("Output:     {}", url);
            }
            if let Some(error) = &job.error {
                println!("Error:      {}", error);
            }
            println!("Created:    {}", job.created_at);
            Ok(())
        }
        Err(PipelineError::NotFound { .. }) => {
            anyhow::bail!("No narration run or export job with ID {}", id)
        }
        Err(e) => Err(e.into()),
    }
}

/// Run queue workers
async fn execute_work(once: bool, workers: Option<usize>) -> Result<()> {
    let cfg = config::config()?;
    let queue = JobQueue::open(config::queue_events_path()?).await?;
    let runner = build_runner(cfg)?;

    let workers = workers.unwrap_or(cfg.queue.workers);
    let pool = WorkerPool::new(
        queue,
        runner,
        workers,
        Duration::from_millis(cfg.queue.poll_interval_ms),
        cfg.queue.retry.clone(),
    );

    if once {
        eprintln!("Draining queue with {} worker(s)...", workers);
    } else {
        eprintln!("Starting {} worker(s), Ctrl-C to stop", workers);
    }

    pool.run(once).await?;

    if once {
        let status = JobQueue::open(config::queue_events_path()?)
            .await?
            .status()
            .await?;
        eprintln!(
            "Queue drained: {} done, {} failed, {} pending",
            status.done, status.failed, status.pending
        );
    }

    Ok(())
}

/// List available narration voices
async fn execute_voices() -> Result<()> {
    println!(
        "{:<10} {:<9} {:<15} {}",
        "VOICE", "GENDER", "STYLE", "DESCRIPTION"
    );
    println!("{}", "-".repeat(78));

    for voice in Voice::all() {
        println!(
            "{:<10} {:<9} {:<15} {}",
            voice.as_str(),
            voice.gender().as_str(),
            voice.style(),
            voice.description()
        );
    }

    Ok(())
}

/// Delete stored audio for a narration run
async fn execute_clean(narration_id: &str) -> Result<()> {
    let narration_id = parse_uuid("narration ID", narration_id)?;

    let cfg = config::config()?;
    if cfg.storage.bucket.is_some() {
        anyhow::bail!("clean only supports local artifact storage");
    }

    let store = LocalArtifactStore::new(config::artifact_root()?);
    let removed = store.remove_matching(&format!("narration/{}/*", narration_id))?;

    println!(
        "Removed {} audio file(s) for narration {}",
        removed, narration_id
    );

    Ok(())
}

/// Show the resolved configuration
async fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("╔═══════════════════════════════════════════════════════════════╗");
    println!("  Deckcast Configuration");
    println!("╚═══════════════════════════════════════════════════════════════╝");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home (engine state): {}", cfg.home.display());
    println!("  Content (decks):     {}", cfg.content_dir.display());
    println!("  Artifacts:           {}", cfg.artifact_root.display());
    println!("  Database:            {}", config::db_path()?.display());
    println!(
        "  Queue file:          {}",
        config::queue_events_path()?.display()
    );
    println!();
    println!("Providers:");
    println!(
        "  Text:   {} @ {} (key: {} {})",
        cfg.providers.text.model,
        cfg.providers.text.base_url,
        cfg.providers.text.api_key_env,
        key_presence(&cfg.providers.text.api_key_env)
    );
    println!(
        "  Speech: {} @ {} (key: {} {})",
        cfg.providers.speech.model,
        cfg.providers.speech.base_url,
        cfg.providers.speech.api_key_env,
        key_presence(&cfg.providers.speech.api_key_env)
    );
    println!();
    println!("Storage:");
    match &cfg.storage.bucket {
        Some(bucket) => {
            println!("  Backend: bucket");
            println!("  Endpoint: {}/{}", bucket.endpoint, bucket.bucket);
            if let Some(base) = &bucket.public_base_url {
                println!("  Public base URL: {}", base);
            }
        }
        None => {
            println!("  Backend: local ({})", cfg.artifact_root.display());
        }
    }
    println!();
    println!("Encoder:");
    println!("  Binary:  {}", cfg.encoder.binary);
    println!("  Timeout: {}s", cfg.encoder.timeout_seconds);
    println!("  FPS:     {}", cfg.encoder.fps);
    println!();
    println!("Queue:");
    println!("  Workers:       {}", cfg.queue.workers);
    println!("  Poll interval: {}ms", cfg.queue.poll_interval_ms);
    println!(
        "  Retry:         {} attempts, {}ms-{}ms backoff",
        cfg.queue.retry.max_attempts,
        cfg.queue.retry.initial_delay_ms,
        cfg.queue.retry.max_delay_ms
    );

    Ok(())
}

fn key_presence(env_name: &str) -> &'static str {
    if std::env::var(env_name).is_ok() {
        "set"
    } else {
        "NOT SET"
    }
}

/// Check providers, storage, and tools
async fn execute_doctor() -> Result<()> {
    let cfg = config::config()?;
    let mut failures = 0;

    match RecordStore::open(&config::db_path()?) {
        Ok(_) => println!("✅ {:<16} {}", "database", config::db_path()?.display()),
        Err(e) => {
            println!("❌ {:<16} {}", "database", e);
            failures += 1;
        }
    }

    match JobQueue::open(config::queue_events_path()?).await {
        Ok(queue) => match queue.status().await {
            Ok(status) => println!("✅ {:<16} {} item(s)", "queue", status.total()),
            Err(e) => {
                println!("❌ {:<16} {}", "queue", e);
                failures += 1;
            }
        },
        Err(e) => {
            println!("❌ {:<16} {}", "queue", e);
            failures += 1;
        }
    }

    match &cfg.storage.bucket {
        Some(bucket) => println!(
            "✅ {:<16} bucket {}/{}",
            "storage", bucket.endpoint, bucket.bucket
        ),
        None => match std::fs::create_dir_all(&cfg.artifact_root) {
            Ok(()) => println!("✅ {:<16} local {}", "storage", cfg.artifact_root.display()),
            Err(e) => {
                println!(
                    "❌ {:<16} {}: {}",
                    "storage",
                    cfg.artifact_root.display(),
                    e
                );
                failures += 1;
            }
        },
    }

    match std::env::var(&cfg.providers.text.api_key_env) {
        Ok(api_key) => {
            let provider = text_provider(cfg, api_key);
            match provider.health_check().await {
                Ok(()) => println!("✅ {:<16} {}", "text provider", provider.name()),
                Err(e) => {
                    println!("❌ {:<16} {}", "text provider", e);
                    failures += 1;
                }
            }
        }
        Err(_) => {
            println!(
                "❌ {:<16} {} not set",
                "text provider", cfg.providers.text.api_key_env
            );
            failures += 1;
        }
    }

    match speech_provider(cfg) {
        Ok(provider) => match provider.health_check().await {
            Ok(()) => println!("✅ {:<16} {}", "speech provider", provider.name()),
            Err(e) => {
                println!("❌ {:<16} {}", "speech provider", e);
                failures += 1;
            }
        },
        Err(_) => {
            println!(
                "❌ {:<16} {} not set",
                "speech provider", cfg.providers.speech.api_key_env
            );
            failures += 1;
        }
    }

    let encoder = FfmpegEncoder::new(
        cfg.encoder.binary.clone(),
        Duration::from_secs(cfg.encoder.timeout_seconds),
    );
    if encoder.is_available().await {
        println!("✅ {:<16} {} available", "encoder", cfg.encoder.binary);
    } else {
        println!(
            "⚠️  {:<16} {} not found (exports fall back to interactive HTML)",
            "encoder", cfg.encoder.binary
        );
    }

    println!();
    if failures > 0 {
        anyhow::bail!("{} check(s) failed", failures);
    }
    println!("All checks passed");

    Ok(())
}
