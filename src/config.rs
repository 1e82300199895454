//! Configuration for deckcast paths and pipeline settings.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (DECKCAST_HOME, DECKCAST_CONTENT)
//! 2. Config file (.deckcast/config.yaml)
//! 3. Defaults (~/.deckcast)
//!
//! Config file discovery:
//! - Searches current directory and parents for .deckcast/config.yaml
//! - Paths in config file are relative to the config file's parent directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::queue::RetryPolicy;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub providers: ProviderSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub encoder: EncoderSettings,
    #[serde(default)]
    pub queue: QueueSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Pipeline state directory (relative to config file)
    pub home: Option<String>,
    /// Source-presentation directory (relative to config file)
    pub content: Option<String>,
    /// Artifact root for the local store (relative to config file)
    pub artifacts: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub text: TextProviderSettings,
    #[serde(default)]
    pub speech: SpeechProviderSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextProviderSettings {
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_text_model")]
    pub model: String,
    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_text_timeout")]
    pub timeout_seconds: u64,
}

impl Default for TextProviderSettings {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            model: default_text_model(),
            api_key_env: default_api_key_env(),
            timeout_seconds: default_text_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpeechProviderSettings {
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_speech_model")]
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_speech_timeout")]
    pub timeout_seconds: u64,
}

impl Default for SpeechProviderSettings {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            model: default_speech_model(),
            api_key_env: default_api_key_env(),
            timeout_seconds: default_speech_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageSettings {
    /// Remote object-storage target. Absent means the local store is used.
    #[serde(default)]
    pub bucket: Option<BucketSettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BucketSettings {
    /// Object-store endpoint, e.g. https://storage.example.com
    pub endpoint: String,
    pub bucket: String,
    /// Base URL returned to callers; defaults to endpoint/bucket
    #[serde(default)]
    pub public_base_url: Option<String>,
    /// Name of the environment variable holding a bearer token
    #[serde(default)]
    pub auth_token_env: Option<String>,
    #[serde(default = "default_storage_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EncoderSettings {
    /// Video encoder binary resolved on PATH
    #[serde(default = "default_encoder_binary")]
    pub binary: String,
    #[serde(default = "default_encoder_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_fps")]
    pub fps: u32,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            binary: default_encoder_binary(),
            timeout_seconds: default_encoder_timeout(),
            fps: default_fps(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueSettings {
    /// Concurrent workers draining the job queue
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            poll_interval_ms: default_poll_interval_ms(),
            retry: RetryPolicy::default(),
        }
    }
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_text_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_speech_model() -> String {
    "tts-1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_text_timeout() -> u64 {
    60
}

fn default_speech_timeout() -> u64 {
    120
}

fn default_storage_timeout() -> u64 {
    60
}

fn default_encoder_binary() -> String {
    "ffmpeg".to_string()
}

fn default_encoder_timeout() -> u64 {
    300
}

fn default_fps() -> u32 {
    30
}

fn default_workers() -> usize {
    2
}

fn default_poll_interval_ms() -> u64 {
    1000
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to deckcast home (pipeline state)
    pub home: PathBuf,
    /// Absolute path to the source-presentation directory
    pub content_dir: PathBuf,
    /// Absolute path to the local artifact root
    pub artifact_root: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub providers: ProviderSettings,
    pub storage: StorageSettings,
    pub encoder: EncoderSettings,
    pub queue: QueueSettings,
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".deckcast").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    // Default home directory
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".deckcast");

    // Check for config file
    let config_file = find_config_file();

    let (home, content_dir, artifact_root, providers, storage, encoder, queue) =
        if let Some(ref config_path) = config_file {
            // Config file found - use it as base
            let config = load_config_file(config_path)?;

            // Base directory is the parent of .deckcast/ (i.e., grandparent of config.yaml)
            let base_dir = config_path
                .parent() // .deckcast/
                .and_then(|p| p.parent()) // project root
                .unwrap_or(Path::new("."));

            // Resolve home path
            let home = if let Ok(env_home) = std::env::var("DECKCAST_HOME") {
                PathBuf::from(env_home)
            } else if let Some(ref home_path) = config.paths.home {
                // home is relative to .deckcast/ directory
                let deckcast_dir = config_path.parent().unwrap_or(Path::new("."));
                resolve_path(deckcast_dir, home_path)
            } else {
                default_home.clone()
            };

            // Resolve content directory
            let content_dir = if let Ok(env_content) = std::env::var("DECKCAST_CONTENT") {
                PathBuf::from(env_content)
            } else if let Some(ref content_path) = config.paths.content {
                resolve_path(base_dir, content_path)
            } else {
                home.join("content")
            };

            let artifact_root = if let Some(ref artifacts_path) = config.paths.artifacts {
                resolve_path(base_dir, artifacts_path)
            } else {
                home.join("artifacts")
            };

            (
                home,
                content_dir,
                artifact_root,
                config.providers,
                config.storage,
                config.encoder,
                config.queue,
            )
        } else {
            // No config file - use env vars or defaults
            let home = std::env::var("DECKCAST_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_home.clone());

            let content_dir = std::env::var("DECKCAST_CONTENT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| home.join("content"));

            let artifact_root = home.join("artifacts");

            (
                home,
                content_dir,
                artifact_root,
                ProviderSettings::default(),
                StorageSettings::default(),
                EncoderSettings::default(),
                QueueSettings::default(),
            )
        };

    Ok(ResolvedConfig {
        home,
        content_dir,
        artifact_root,
        config_file,
        providers,
        storage,
        encoder,
        queue,
    })
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

// ============================================================================
// Convenience functions
// ============================================================================

/// Get the deckcast home directory (pipeline state).
pub fn deckcast_home() -> Result<PathBuf> {
    Ok(config()?.home.clone())
}

/// Get the record database path ($DECKCAST_HOME/deckcast.db)
pub fn db_path() -> Result<PathBuf> {
    Ok(config()?.home.join("deckcast.db"))
}

/// Get the job-queue event log path ($DECKCAST_HOME/queue/jobs.jsonl)
pub fn queue_events_path() -> Result<PathBuf> {
    Ok(config()?.home.join("queue").join("jobs.jsonl"))
}

/// Get the source-presentation directory.
pub fn content_dir() -> Result<PathBuf> {
    Ok(config()?.content_dir.clone())
}

/// Get the local artifact root.
pub fn artifact_root() -> Result<PathBuf> {
    Ok(config()?.artifact_root.clone())
}
