//! apiforge-store: project blob storage for apiforge
//!
//! This crate is the persistence layer. It knows nothing about AI
//! invocations; it stores JSON documents and images for projects under a
//! fixed key layout.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: key layout compatibility and backend-agnostic storage.
//!
//! ## Key Components
//!
//! - `BlobStore`: async flat object store trait (S3 semantics)
//! - `FsBlobStore`: filesystem backend with atomic writes
//! - `ProjectKeys` / `safe_project_name`: the `projects/<safe>/...` layout
//! - `ProjectStore`: typed facade for specs, docs, analyses, images, metadata

mod error;
pub mod fakes;
pub mod fs;
pub mod keys;
pub mod project;
pub mod storage_traits;

pub use error::StoreError;
pub use fs::FsBlobStore;
pub use keys::{project_from_key, safe_project_name, ProjectKeys, PROJECTS_PREFIX};
pub use project::{ProjectMetadata, ProjectStore};
pub use storage_traits::{validate_key, BlobStore, StoreResult, JSON_CONTENT_TYPE};
