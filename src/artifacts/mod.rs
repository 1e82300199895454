//! Artifact storage: durable homes for generated media, addressed by URL.
//!
//! Narration audio and export outputs live under separate logical
//! prefixes, and every key carries a fresh UUID token, so concurrent runs
//! against the same slide never overwrite each other and whole runs can
//! be garbage-collected by prefix.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{PipelineError, Result};

/// Key for one slide's narration audio.
pub fn narration_audio_key(narration_id: Uuid, slide_id: Uuid) -> String {
    format!(
        "narration/{}/slide-{}-{}.mp3",
        narration_id,
        slide_id,
        Uuid::new_v4()
    )
}

/// Key for an export job's single output (video or fallback document).
pub fn export_output_key(project_id: Uuid, job_id: Uuid, extension: &str) -> String {
    format!(
        "exports/{}/{}-{}.{}",
        project_id,
        job_id,
        Uuid::new_v4(),
        extension
    )
}

/// Trait for artifact storage backends
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Store bytes under `key`, returning a retrievable URL
    async fn store(&self, bytes: &[u8], content_type: &str, key: &str) -> Result<String>;

    /// Fetch previously stored bytes by the URL `store` returned
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Filesystem-backed store. URLs are paths under `/artifacts/` that the
/// surrounding product serves statically.
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn storage_error(message: String) -> PipelineError {
        PipelineError::Storage { message }
    }

    /// Delete stored artifacts whose key matches `pattern` (glob syntax,
    /// e.g. `narration/<id>/*`). Returns how many files were removed.
    pub fn remove_matching(&self, pattern: &str) -> Result<usize> {
        let full_pattern = self.root.join(pattern);
        let full_pattern = full_pattern.to_string_lossy();
        let entries = glob::glob(&full_pattern)
            .map_err(|e| Self::storage_error(format!("bad pattern '{}': {}", pattern, e)))?;

        let mut removed = 0;
        for entry in entries {
            let path =
                entry.map_err(|e| Self::storage_error(format!("walking '{}': {}", pattern, e)))?;
            if path.is_file() {
                std::fs::remove_file(&path).map_err(|e| {
                    Self::storage_error(format!("removing {}: {}", path.display(), e))
                })?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn store(&self, bytes: &[u8], _content_type: &str, key: &str) -> Result<String> {
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Self::storage_error(format!("creating {}: {}", parent.display(), e))
            })?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| Self::storage_error(format!("writing {}: {}", path.display(), e)))?;

        Ok(format!("/artifacts/{}", key))
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let key = url
            .strip_prefix("/artifacts/")
            .ok_or_else(|| Self::storage_error(format!("not a local artifact URL: {}", url)))?;
        let path = self.root.join(key);
        tokio::fs::read(&path)
            .await
            .map_err(|e| Self::storage_error(format!("reading {}: {}", path.display(), e)))
    }
}

/// Object-store backend speaking plain HTTP PUT/GET against
/// `endpoint/bucket/key`.
pub struct BucketArtifactStore {
    endpoint: String,
    bucket: String,
    public_base_url: Option<String>,
    auth_token: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl BucketArtifactStore {
    pub fn new(endpoint: &str, bucket: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            public_base_url: None,
            auth_token: None,
            timeout: Duration::from_secs(60),
            client: reqwest::Client::new(),
        }
    }

    /// Base URL handed back to callers; defaults to `endpoint/bucket`.
    pub fn with_public_base_url(mut self, base: &str) -> Self {
        self.public_base_url = Some(base.trim_end_matches('/').to_string());
        self
    }

    pub fn with_auth_token(mut self, token: String) -> Self {
        self.auth_token = Some(token);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, key)
    }

    fn public_url(&self, key: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{}/{}", base, key),
            None => self.object_url(key),
        }
    }

    fn storage_error(message: String) -> PipelineError {
        PipelineError::Storage { message }
    }

    async fn put_object(&self, bytes: &[u8], content_type: &str, key: &str) -> Result<()> {
        let mut request = self
            .client
            .put(self.object_url(key))
            .header("Content-Type", content_type)
            .body(bytes.to_vec());
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Self::storage_error(format!("upload of {} failed: {}", key, e)))?;

        if !response.status().is_success() {
            return Err(Self::storage_error(format!(
                "upload of {} returned HTTP {}",
                key,
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for BucketArtifactStore {
    fn name(&self) -> &str {
        "bucket"
    }

    async fn store(&self, bytes: &[u8], content_type: &str, key: &str) -> Result<String> {
        match tokio::time::timeout(self.timeout, self.put_object(bytes, content_type, key)).await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(Self::storage_error(format!(
                    "upload of {} timed out after {}s",
                    key,
                    self.timeout.as_secs()
                )));
            }
        }
        Ok(self.public_url(key))
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let fut = async {
            let mut request = self.client.get(url);
            if let Some(token) = &self.auth_token {
                request = request.bearer_auth(token);
            }
            let response = request
                .send()
                .await
                .map_err(|e| Self::storage_error(format!("fetch of {} failed: {}", url, e)))?;
            if !response.status().is_success() {
                return Err(Self::storage_error(format!(
                    "fetch of {} returned HTTP {}",
                    url,
                    response.status()
                )));
            }
            let bytes = response
                .bytes()
                .await
                .map_err(|e| Self::storage_error(format!("reading {} body: {}", url, e)))?;
            Ok(bytes.to_vec())
        };

        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Self::storage_error(format!(
                "fetch of {} timed out after {}s",
                url,
                self.timeout.as_secs()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_local_store_and_fetch_round_trip() {
        let dir = tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path().to_path_buf());

        let key = narration_audio_key(Uuid::new_v4(), Uuid::new_v4());
        let url = store.store(b"mp3 bytes", "audio/mpeg", &key).await.unwrap();
        assert!(url.starts_with("/artifacts/narration/"));

        let bytes = store.fetch(&url).await.unwrap();
        assert_eq!(bytes, b"mp3 bytes");
    }

    #[tokio::test]
    async fn test_local_store_creates_missing_directories() {
        let dir = tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path().join("deep").join("root"));

        let url = store
            .store(b"html", "text/html", "exports/p/j-x.html")
            .await
            .unwrap();
        assert_eq!(url, "/artifacts/exports/p/j-x.html");
    }

    #[tokio::test]
    async fn test_fetch_rejects_foreign_urls() {
        let dir = tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path().to_path_buf());
        let err = store.fetch("https://elsewhere/thing.mp3").await.unwrap_err();
        assert!(matches!(err, PipelineError::Storage { .. }));
    }

    #[test]
    fn test_keys_never_collide_for_same_slide() {
        let narration_id = Uuid::new_v4();
        let slide_id = Uuid::new_v4();
        let a = narration_audio_key(narration_id, slide_id);
        let b = narration_audio_key(narration_id, slide_id);
        assert_ne!(a, b);
        assert!(a.starts_with(&format!("narration/{}/slide-{}-", narration_id, slide_id)));
    }

    #[tokio::test]
    async fn test_remove_matching_by_prefix() {
        let dir = tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path().to_path_buf());

        let narration_id = Uuid::new_v4();
        for _ in 0..3 {
            let key = narration_audio_key(narration_id, Uuid::new_v4());
            store.store(b"x", "audio/mpeg", &key).await.unwrap();
        }
        let other_key = narration_audio_key(Uuid::new_v4(), Uuid::new_v4());
        store.store(b"x", "audio/mpeg", &other_key).await.unwrap();

        let removed = store
            .remove_matching(&format!("narration/{}/*", narration_id))
            .unwrap();
        assert_eq!(removed, 3);

        // The unrelated narration's audio survives
        let survivor = store.fetch(&format!("/artifacts/{}", other_key)).await;
        assert!(survivor.is_ok());
    }

    #[test]
    fn test_bucket_public_url_fallback_and_override() {
        let store = BucketArtifactStore::new("https://storage.example.com/", "media");
        assert_eq!(
            store.public_url("exports/a/b.mp4"),
            "https://storage.example.com/media/exports/a/b.mp4"
        );

        let store = store.with_public_base_url("https://cdn.example.com/");
        assert_eq!(
            store.public_url("exports/a/b.mp4"),
            "https://cdn.example.com/exports/a/b.mp4"
        );
    }
}
