//! Boundary to the external presentation store.
//!
//! The pipeline only ever asks one question: "give me this project, if
//! this user owns it". Everything else about presentations (editing,
//! sharing, deletion) belongs to the surrounding product.

use std::path::PathBuf;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::SourceProject;
use crate::error::{PipelineError, Result};

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Fetch a project by id, enforcing ownership. A missing project and a
    /// project owned by someone else are both `NotFound`; callers cannot
    /// distinguish them.
    async fn fetch_project(&self, project_id: Uuid, user_id: Uuid) -> Result<SourceProject>;
}

/// Content store reading one JSON file per presentation from a directory.
/// This is what the CLI runs against; servers would implement
/// [`ContentStore`] over their own query layer.
pub struct JsonContentStore {
    dir: PathBuf,
}

impl JsonContentStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn project_path(&self, project_id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", project_id))
    }
}

#[async_trait]
impl ContentStore for JsonContentStore {
    async fn fetch_project(&self, project_id: Uuid, user_id: Uuid) -> Result<SourceProject> {
        let path = self.project_path(project_id);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PipelineError::NotFound {
                    what: format!("project {}", project_id),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let project: SourceProject = serde_json::from_str(&raw).map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("invalid project file {}: {}", path.display(), e),
            )
        })?;

        if project.owner_id != user_id {
            return Err(PipelineError::NotFound {
                what: format!("project {}", project_id),
            });
        }

        Ok(project)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SourceSlide;
    use tempfile::tempdir;

    fn write_project(dir: &std::path::Path, owner_id: Uuid) -> SourceProject {
        let project = SourceProject {
            id: Uuid::new_v4(),
            owner_id,
            title: "Quarterly review".to_string(),
            theme: Some("dark".to_string()),
            slides: vec![SourceSlide {
                id: Uuid::new_v4(),
                slide_number: 1,
                title: Some("Welcome".to_string()),
                blocks: vec![serde_json::json!("Hello everyone")],
            }],
        };
        let path = dir.join(format!("{}.json", project.id));
        std::fs::write(&path, serde_json::to_string_pretty(&project).unwrap()).unwrap();
        project
    }

    #[tokio::test]
    async fn test_fetch_owned_project() {
        let dir = tempdir().unwrap();
        let owner = Uuid::new_v4();
        let project = write_project(dir.path(), owner);

        let store = JsonContentStore::new(dir.path().to_path_buf());
        let fetched = store.fetch_project(project.id, owner).await.unwrap();
        assert_eq!(fetched.id, project.id);
        assert_eq!(fetched.slides.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_project_is_not_found() {
        let dir = tempdir().unwrap();
        let store = JsonContentStore::new(dir.path().to_path_buf());

        let err = store
            .fetch_project(Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_foreign_project_is_not_found() {
        let dir = tempdir().unwrap();
        let project = write_project(dir.path(), Uuid::new_v4());

        let store = JsonContentStore::new(dir.path().to_path_buf());
        let err = store
            .fetch_project(project.id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(
            matches!(err, PipelineError::NotFound { .. }),
            "ownership failures must look identical to missing projects"
        );
    }
}
