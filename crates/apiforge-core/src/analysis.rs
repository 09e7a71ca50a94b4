//! Domain / bounded-context / diagram analysis of a prompt or whiteboard image.
//!
//! `AnalysisService::analyze` sends the request to the analysis agent,
//! reconciles whatever comes back and records it as the session's latest
//! result. A `full` analysis fans the three single analyses out in parallel
//! and merges them.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use apiforge_store::ProjectStore;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};

use crate::config::ForgeConfig;
use crate::dispatch::{Dispatcher, InvocationRequest};
use crate::error::{store_timeout, ForgeError, ForgeResult};
use crate::reconcile::{reconcile_invocation, AnalysisResult};
use crate::session::{SessionId, SessionStore};

/// Requested analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisKind {
    Domain,
    Bounded,
    Ascii,
    Full,
}

impl AnalysisKind {
    /// The single analyses a `full` request fans out to.
    pub const PARTS: [AnalysisKind; 3] =
        [AnalysisKind::Domain, AnalysisKind::Bounded, AnalysisKind::Ascii];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::Domain => "domain",
            AnalysisKind::Bounded => "bounded",
            AnalysisKind::Ascii => "ascii",
            AnalysisKind::Full => "full",
        }
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisKind {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "domain" => Ok(AnalysisKind::Domain),
            "bounded" => Ok(AnalysisKind::Bounded),
            "ascii" => Ok(AnalysisKind::Ascii),
            "full" => Ok(AnalysisKind::Full),
            other => Err(ForgeError::InvalidRequest(format!(
                "unknown analysis type {other:?}; expected domain, bounded, ascii or full"
            ))),
        }
    }
}

/// Client request for an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub analysis_type: AnalysisKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Base64 image, optionally as a `data:` URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
}

impl AnalysisRequest {
    pub fn from_prompt(kind: AnalysisKind, prompt: impl Into<String>) -> Self {
        Self {
            analysis_type: kind,
            prompt: Some(prompt.into()),
            image_base64: None,
            project_name: None,
        }
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project_name = Some(project.into());
        self
    }

    pub fn with_image(mut self, image_base64: impl Into<String>) -> Self {
        self.image_base64 = Some(image_base64.into());
        self
    }

    fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref().filter(|p| !p.trim().is_empty())
    }

    fn image(&self) -> Option<&str> {
        self.image_base64
            .as_deref()
            .map(strip_data_url)
            .filter(|i| !i.trim().is_empty())
    }

    fn project(&self) -> Option<&str> {
        self.project_name.as_deref().filter(|p| !p.trim().is_empty())
    }

    /// A prompt or an image is required; an image must be valid base64.
    pub fn validate(&self) -> ForgeResult<()> {
        if self.prompt().is_none() && self.image().is_none() {
            return Err(ForgeError::InvalidRequest(
                "either prompt or imageBase64 is required".to_string(),
            ));
        }
        self.decoded_image()?;
        Ok(())
    }

    fn decoded_image(&self) -> ForgeResult<Option<Vec<u8>>> {
        self.image()
            .map(|image| {
                STANDARD
                    .decode(image.trim())
                    .map_err(|e| ForgeError::InvalidRequest(format!("imageBase64 is not base64: {e}")))
            })
            .transpose()
    }

    /// Agent payload: `{analysisType, prompt?, imageBase64?, context?: {projectName}}`.
    pub fn payload(&self, kind: AnalysisKind) -> Value {
        let mut payload = Map::new();
        payload.insert("analysisType".to_string(), json!(kind.as_str()));
        if let Some(prompt) = self.prompt() {
            payload.insert("prompt".to_string(), json!(prompt));
        }
        if let Some(image) = self.image() {
            payload.insert("imageBase64".to_string(), json!(image.trim()));
        }
        if let Some(project) = self.project() {
            payload.insert("context".to_string(), json!({"projectName": project}));
        }
        Value::Object(payload)
    }
}

fn strip_data_url(image: &str) -> &str {
    match image.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => image,
    }
}

/// Stable object name for an uploaded image, derived from its content.
fn image_filename(bytes: &[u8]) -> String {
    let ext = match bytes {
        [0x89, b'P', b'N', b'G', ..] => "png",
        [0xFF, 0xD8, 0xFF, ..] => "jpg",
        [b'G', b'I', b'F', b'8', ..] => "gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "webp",
        _ => "bin",
    };
    let digest = hex::encode(Sha256::digest(bytes));
    format!("upload-{}.{ext}", &digest[..16])
}

fn image_content_type(filename: &str) -> &'static str {
    match filename.rsplit('.').next() {
        Some("png") => "image/png",
        Some("jpg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Runs analyses and keeps per-session results.
#[derive(Clone)]
pub struct AnalysisService {
    dispatcher: Dispatcher,
    projects: ProjectStore,
    sessions: Arc<SessionStore>,
    function: String,
    timeout: Duration,
    store_timeout: Duration,
}

impl AnalysisService {
    pub fn new(
        dispatcher: Dispatcher,
        projects: ProjectStore,
        sessions: Arc<SessionStore>,
        config: &ForgeConfig,
    ) -> Self {
        Self {
            dispatcher,
            projects,
            sessions,
            function: config.analysis_function.clone(),
            timeout: config.timeouts.analysis,
            store_timeout: config.timeouts.store,
        }
    }

    /// Run `request` for `session`.
    ///
    /// Only an invalid request is an `Err`; upstream failures and timeouts
    /// come back as `{success: false, error, retryable}`.
    #[instrument(skip(self, session, request), fields(session = %session, kind = %request.analysis_type))]
    pub async fn analyze(
        &self,
        session: &SessionId,
        request: AnalysisRequest,
    ) -> ForgeResult<AnalysisResult> {
        request.validate()?;

        let result = match request.analysis_type {
            AnalysisKind::Full => self.analyze_full(&request).await,
            kind => self.analyze_single(&request, kind).await,
        };

        self.sessions.record_analysis(session, result.clone()).await;
        if let Some(project) = request.project() {
            self.persist(project, &request, &result).await;
        }

        info!(success = result.success, "analysis finished");
        Ok(result)
    }

    /// Most recent analysis recorded for `session`.
    pub async fn latest(&self, session: &SessionId) -> Option<AnalysisResult> {
        self.sessions.latest_analysis(session).await
    }

    async fn analyze_single(&self, request: &AnalysisRequest, kind: AnalysisKind) -> AnalysisResult {
        let invocation = InvocationRequest::direct(self.function.clone(), request.payload(kind));
        match self
            .dispatcher
            .invoke_with_timeout(&invocation, self.timeout)
            .await
        {
            Ok(result) => reconcile_invocation(&result),
            Err(e) => AnalysisResult::failure(e.to_string(), false),
        }
    }

    async fn analyze_full(&self, request: &AnalysisRequest) -> AnalysisResult {
        let invocations = AnalysisKind::PARTS
            .iter()
            .map(|kind| InvocationRequest::direct(self.function.clone(), request.payload(*kind)))
            .collect();
        let results = self
            .dispatcher
            .invoke_parallel(invocations, self.timeout)
            .await;

        let mut merged = AnalysisResult::default();
        let mut failures = Vec::new();
        let mut retryable = false;
        for (kind, result) in AnalysisKind::PARTS.iter().zip(results.iter()) {
            let part = reconcile_invocation(result);
            if !part.success {
                retryable |= part.retryable;
                failures.push(format!(
                    "{kind}: {}",
                    part.error.as_deref().unwrap_or("failed")
                ));
            }
            merged.merge_from(part);
        }

        if !failures.is_empty() {
            merged.error = Some(failures.join("; "));
            merged.retryable = !merged.success && retryable;
        }
        merged
    }

    /// Best-effort persistence; failures are logged, never returned.
    async fn persist(&self, project: &str, request: &AnalysisRequest, result: &AnalysisResult) {
        if let Ok(Some(bytes)) = request.decoded_image() {
            let filename = image_filename(&bytes);
            let saved = store_timeout(
                self.store_timeout,
                self.projects
                    .save_image(project, &filename, &bytes, image_content_type(&filename)),
            )
            .await;
            if let Err(e) = saved {
                warn!(project = %project, error = %e, "failed to store analysis image");
            }
        }

        if !result.success {
            return;
        }
        let saved = store_timeout(self.store_timeout, self.projects.save_analysis(project, result)).await;
        if let Err(e) = saved {
            warn!(project = %project, error = %e, "failed to persist analysis");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_and_displays() {
        assert_eq!("FULL".parse::<AnalysisKind>().unwrap(), AnalysisKind::Full);
        assert_eq!(AnalysisKind::Bounded.to_string(), "bounded");
        assert!("sideways".parse::<AnalysisKind>().is_err());
    }

    #[test]
    fn request_needs_prompt_or_image() {
        let empty = AnalysisRequest {
            analysis_type: AnalysisKind::Domain,
            prompt: Some("   ".to_string()),
            image_base64: None,
            project_name: None,
        };
        assert!(matches!(empty.validate(), Err(ForgeError::InvalidRequest(_))));

        let bad_image = AnalysisRequest::from_prompt(AnalysisKind::Domain, "x").with_image("***");
        assert!(bad_image.validate().is_err());

        let ok = AnalysisRequest::from_prompt(AnalysisKind::Domain, "orders and billing");
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn payload_shape() {
        let request = AnalysisRequest::from_prompt(AnalysisKind::Full, "Design a bookstore")
            .with_project("Book Store")
            .with_image("data:image/png;base64,aGVsbG8=");
        assert_eq!(
            request.payload(AnalysisKind::Ascii),
            json!({
                "analysisType": "ascii",
                "prompt": "Design a bookstore",
                "imageBase64": "aGVsbG8=",
                "context": {"projectName": "Book Store"},
            })
        );
    }

    #[test]
    fn payload_omits_absent_fields() {
        let request = AnalysisRequest::from_prompt(AnalysisKind::Domain, "p");
        assert_eq!(
            request.payload(AnalysisKind::Domain),
            json!({"analysisType": "domain", "prompt": "p"})
        );
    }

    #[test]
    fn request_deserializes_camel_case() {
        let request: AnalysisRequest = serde_json::from_value(json!({
            "analysisType": "bounded",
            "prompt": "p",
            "projectName": "demo",
        }))
        .unwrap();
        assert_eq!(request.analysis_type, AnalysisKind::Bounded);
        assert_eq!(request.project_name.as_deref(), Some("demo"));
    }

    #[test]
    fn image_names_follow_content() {
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A];
        let name = image_filename(&png);
        assert!(name.starts_with("upload-") && name.ends_with(".png"));
        assert_eq!(name, image_filename(&png));
        assert_eq!(image_content_type(&name), "image/png");
        assert!(image_filename(b"plain").ends_with(".bin"));
    }
}
