//! Project key layout.
//!
//! Every object belonging to a project lives under
//! `projects/<safe-project-name>/`:
//!
//! ```text
//! projects/<safe>/specs/<spec-id>.json
//! projects/<safe>/specs/<spec-id>-docs.json
//! projects/<safe>/analysis.json
//! projects/<safe>/metadata.json
//! projects/<safe>/images/<filename>
//! ```
//!
//! The layout is shared with other deployments reading the same bucket and
//! must not change.

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::storage_traits::StoreResult;

/// Root prefix for all project objects.
pub const PROJECTS_PREFIX: &str = "projects/";

const DOCS_SUFFIX: &str = "-docs.json";
const JSON_SUFFIX: &str = ".json";

/// Sanitize a project name into its key segment.
///
/// Lowercases, then replaces every character outside `[a-zA-Z0-9-_]` with
/// `-`, one `-` per UTF-16 code unit. Characters outside the basic
/// multilingual plane therefore become `--`, so keys match the ones other
/// UTF-16 based sanitizers produce for the same name.
pub fn safe_project_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    let mut safe = String::with_capacity(lowered.len());
    for c in lowered.chars() {
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            safe.push(c);
        } else {
            safe.extend(std::iter::repeat('-').take(c.len_utf16()));
        }
    }
    safe
}

/// Key builder for one project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectKeys {
    safe_name: String,
}

impl ProjectKeys {
    /// Build keys for a project name. Fails for names that sanitize to
    /// nothing.
    pub fn new(project_name: &str) -> StoreResult<Self> {
        let safe_name = safe_project_name(project_name);
        if safe_name.is_empty() {
            return Err(StoreError::InvalidKey(
                "project name must not be empty".to_string(),
            ));
        }
        Ok(Self { safe_name })
    }

    pub fn safe_name(&self) -> &str {
        &self.safe_name
    }

    /// `projects/<safe>/`
    pub fn prefix(&self) -> String {
        format!("{PROJECTS_PREFIX}{}/", self.safe_name)
    }

    /// `projects/<safe>/specs/`
    pub fn specs_prefix(&self) -> String {
        format!("{}specs/", self.prefix())
    }

    pub fn spec(&self, spec_id: &str) -> StoreResult<String> {
        validate_segment(spec_id)?;
        Ok(format!("{}{spec_id}{JSON_SUFFIX}", self.specs_prefix()))
    }

    pub fn spec_docs(&self, spec_id: &str) -> StoreResult<String> {
        validate_segment(spec_id)?;
        Ok(format!("{}{spec_id}{DOCS_SUFFIX}", self.specs_prefix()))
    }

    pub fn analysis(&self) -> String {
        format!("{}analysis.json", self.prefix())
    }

    pub fn metadata(&self) -> String {
        format!("{}metadata.json", self.prefix())
    }

    pub fn image(&self, filename: &str) -> StoreResult<String> {
        validate_segment(filename)?;
        Ok(format!("{}images/{filename}", self.prefix()))
    }

    /// Extract the spec id from a key under `specs/`, skipping docs objects.
    pub fn spec_id_from_key(&self, key: &str) -> Option<String> {
        let rest = key.strip_prefix(&self.specs_prefix())?;
        if rest.contains('/') || rest.ends_with(DOCS_SUFFIX) {
            return None;
        }
        rest.strip_suffix(JSON_SUFFIX)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }
}

/// Extract the safe project name from any key under `projects/`.
pub fn project_from_key(key: &str) -> Option<&str> {
    let rest = key.strip_prefix(PROJECTS_PREFIX)?;
    let (name, tail) = rest.split_once('/')?;
    if name.is_empty() || tail.is_empty() {
        return None;
    }
    Some(name)
}

fn validate_segment(segment: &str) -> StoreResult<()> {
    if segment.is_empty()
        || segment.contains('/')
        || segment.contains('\\')
        || segment.contains("..")
    {
        return Err(StoreError::InvalidKey(segment.to_string()));
    }
    Ok(())
}
