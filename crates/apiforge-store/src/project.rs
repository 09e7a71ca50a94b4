//! Project-scoped facade over a [`BlobStore`].
//!
//! A project is created implicitly by its first write; every write refreshes
//! `metadata.json` while preserving the original `createdAt`. Projects are
//! never deleted here.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::StoreError;
use crate::keys::{project_from_key, ProjectKeys, PROJECTS_PREFIX};
use crate::storage_traits::{BlobStore, StoreResult, JSON_CONTENT_TYPE};

/// Metadata document stored at `projects/<safe>/metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMetadata {
    pub name: String,
    pub safe_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Project storage facade.
#[derive(Clone)]
pub struct ProjectStore {
    blobs: Arc<dyn BlobStore>,
}

impl ProjectStore {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }

    /// The underlying blob store.
    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    /// Store an OpenAPI spec. Generates a UUIDv4 id when none is given.
    #[instrument(skip(self, spec))]
    pub async fn save_spec(
        &self,
        project: &str,
        spec: &Value,
        spec_id: Option<&str>,
    ) -> StoreResult<String> {
        let keys = ProjectKeys::new(project)?;
        let spec_id = match spec_id {
            Some(id) => id.to_string(),
            None => uuid::Uuid::new_v4().to_string(),
        };
        let key = keys.spec(&spec_id)?;
        self.put_json(&key, spec).await?;
        self.touch_metadata(project, &keys).await?;
        debug!(key = %key, "spec saved");
        Ok(spec_id)
    }

    pub async fn load_spec(&self, project: &str, spec_id: &str) -> StoreResult<Value> {
        let keys = ProjectKeys::new(project)?;
        self.get_json(&keys.spec(spec_id)?).await
    }

    /// Spec ids stored for a project, sorted. Docs objects are excluded.
    pub async fn list_specs(&self, project: &str) -> StoreResult<Vec<String>> {
        let keys = ProjectKeys::new(project)?;
        let listed = self.blobs.list(&keys.specs_prefix()).await?;
        Ok(listed
            .iter()
            .filter_map(|k| keys.spec_id_from_key(k))
            .collect())
    }

    pub async fn save_docs<T: Serialize + Sync>(
        &self,
        project: &str,
        spec_id: &str,
        docs: &T,
    ) -> StoreResult<String> {
        let keys = ProjectKeys::new(project)?;
        let key = keys.spec_docs(spec_id)?;
        self.put_json(&key, docs).await?;
        self.touch_metadata(project, &keys).await?;
        Ok(key)
    }

    pub async fn load_docs(&self, project: &str, spec_id: &str) -> StoreResult<Value> {
        let keys = ProjectKeys::new(project)?;
        self.get_json(&keys.spec_docs(spec_id)?).await
    }

    pub async fn save_analysis<T: Serialize + Sync>(
        &self,
        project: &str,
        analysis: &T,
    ) -> StoreResult<String> {
        let keys = ProjectKeys::new(project)?;
        let key = keys.analysis();
        self.put_json(&key, analysis).await?;
        self.touch_metadata(project, &keys).await?;
        Ok(key)
    }

    pub async fn load_analysis(&self, project: &str) -> StoreResult<Value> {
        let keys = ProjectKeys::new(project)?;
        self.get_json(&keys.analysis()).await
    }

    pub async fn save_image(
        &self,
        project: &str,
        filename: &str,
        data: &[u8],
        content_type: &str,
    ) -> StoreResult<String> {
        let keys = ProjectKeys::new(project)?;
        let key = keys.image(filename)?;
        self.blobs.put(&key, data, content_type).await?;
        self.touch_metadata(project, &keys).await?;
        Ok(key)
    }

    pub async fn load_metadata(&self, project: &str) -> StoreResult<ProjectMetadata> {
        let keys = ProjectKeys::new(project)?;
        let bytes = self.blobs.get(&keys.metadata()).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Safe names of every project with at least one object, sorted.
    pub async fn list_projects(&self) -> StoreResult<Vec<String>> {
        let listed = self.blobs.list(PROJECTS_PREFIX).await?;
        let names: BTreeSet<String> = listed
            .iter()
            .filter_map(|k| project_from_key(k))
            .map(str::to_string)
            .collect();
        Ok(names.into_iter().collect())
    }

    async fn touch_metadata(&self, project: &str, keys: &ProjectKeys) -> StoreResult<()> {
        let now = Utc::now();
        let metadata = match self.load_metadata(project).await {
            Ok(existing) => ProjectMetadata {
                updated_at: now,
                ..existing
            },
            Err(StoreError::NotFound { .. }) | Err(StoreError::Serialization(_)) => {
                ProjectMetadata {
                    name: project.to_string(),
                    safe_name: keys.safe_name().to_string(),
                    created_at: now,
                    updated_at: now,
                }
            }
            Err(e) => return Err(e),
        };
        self.put_json(&keys.metadata(), &metadata).await
    }

    async fn put_json<T: Serialize + ?Sized + Sync>(&self, key: &str, value: &T) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.blobs.put(key, &bytes, JSON_CONTENT_TYPE).await
    }

    async fn get_json(&self, key: &str) -> StoreResult<Value> {
        let bytes = self.blobs.get(key).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
