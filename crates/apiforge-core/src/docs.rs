//! Documentation bundle generation.
//!
//! The four sections of a [`DocumentationBundle`] are requested from the
//! documentation agent concurrently. Each section can fail on its own; a
//! partial bundle is still returned, and if every section fails the
//! deterministic fallback takes over.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use apiforge_store::ProjectStore;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, instrument};

use crate::config::ForgeConfig;
use crate::dispatch::direct::{error_message, status_code};
use crate::dispatch::{Dispatcher, InvocationMode, InvocationRequest, InvocationResult};
use crate::error::{store_timeout, ForgeResult};
use crate::fallback::generate_fallback_bundle;
use crate::metrics::METRICS;
use crate::obs;
use crate::reconcile::{extract_embedded_json, MAX_ENVELOPE_DEPTH};

/// One independently generated part of a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DocSection {
    SecurityDefinitions,
    Policies,
    Documentation,
    Versioning,
}

impl DocSection {
    pub const ALL: [DocSection; 4] = [
        DocSection::SecurityDefinitions,
        DocSection::Policies,
        DocSection::Documentation,
        DocSection::Versioning,
    ];

    /// Field name in the bundle and `task` sent to the agent.
    pub fn key(&self) -> &'static str {
        match self {
            DocSection::SecurityDefinitions => "securityDefinitions",
            DocSection::Policies => "policies",
            DocSection::Documentation => "documentation",
            DocSection::Versioning => "versioning",
        }
    }
}

impl fmt::Display for DocSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Generated (or fallback) documentation for one spec.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentationBundle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_definitions: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policies: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub versioning: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Section key to the reason it failed.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub fallback: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl DocumentationBundle {
    pub fn section(&self, section: DocSection) -> Option<&Value> {
        match section {
            DocSection::SecurityDefinitions => self.security_definitions.as_ref(),
            DocSection::Policies => self.policies.as_ref(),
            DocSection::Documentation => self.documentation.as_ref(),
            DocSection::Versioning => self.versioning.as_ref(),
        }
    }

    pub fn set_section(&mut self, section: DocSection, value: Value) {
        let slot = match section {
            DocSection::SecurityDefinitions => &mut self.security_definitions,
            DocSection::Policies => &mut self.policies,
            DocSection::Documentation => &mut self.documentation,
            DocSection::Versioning => &mut self.versioning,
        };
        *slot = Some(value);
    }

    /// Sections that failed, per `details`.
    pub fn failed_sections(&self) -> Vec<&str> {
        self.details.keys().map(String::as_str).collect()
    }
}

/// Extract a section document from an agent response.
///
/// Accepts `{statusCode, body}`, `{success, data}`, `{<section>: ...}` and
/// prose with embedded JSON, nested up to [`MAX_ENVELOPE_DEPTH`] deep.
pub fn unwrap_section(section: DocSection, result: &InvocationResult) -> Result<Value, String> {
    if !result.success {
        return Err(result
            .error
            .clone()
            .unwrap_or_else(|| "invocation failed".to_string()));
    }

    let mut value = result.data.clone();
    for _ in 0..=MAX_ENVELOPE_DEPTH {
        let next = match &value {
            Value::String(text) => extract_embedded_json(text)
                .ok_or_else(|| "response did not contain JSON".to_string())?,
            Value::Object(map) => {
                if let Some(status) = status_code(&value) {
                    let body = match map.get("body") {
                        Some(Value::String(s)) => {
                            extract_embedded_json(s).unwrap_or_else(|| Value::String(s.clone()))
                        }
                        Some(other) => other.clone(),
                        None => Value::Null,
                    };
                    if status >= 400 {
                        return Err(error_message(&body)
                            .unwrap_or_else(|| format!("upstream returned status {status}")));
                    }
                    body
                } else if let Some(success) = map.get("success").and_then(Value::as_bool) {
                    if !success {
                        return Err(error_message(&value)
                            .unwrap_or_else(|| "agent reported failure".to_string()));
                    }
                    match map.get("data").or_else(|| map.get(section.key())) {
                        Some(inner) => inner.clone(),
                        None => break,
                    }
                } else if let Some(inner) = map.get(section.key()) {
                    inner.clone()
                } else {
                    break;
                }
            }
            _ => break,
        };
        value = next;
    }
    non_empty(section, value)
}

/// `{}` is a valid security section (an API with no schemes); any other
/// empty section is a failure.
fn non_empty(section: DocSection, value: Value) -> Result<Value, String> {
    let empty = match &value {
        Value::Null => true,
        Value::Object(map) => map.is_empty() && section != DocSection::SecurityDefinitions,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    };
    if empty {
        Err("empty section".to_string())
    } else {
        Ok(value)
    }
}

/// Requests the four documentation sections and assembles the bundle.
pub struct DocumentationGenerator {
    dispatcher: Dispatcher,
    projects: ProjectStore,
    target: String,
    mode: InvocationMode,
    timeout: Duration,
    store_timeout: Duration,
}

impl DocumentationGenerator {
    pub fn new(dispatcher: Dispatcher, projects: ProjectStore, config: &ForgeConfig) -> Self {
        let (target, mode) = config.docs_target();
        Self {
            dispatcher,
            projects,
            target,
            mode,
            timeout: config.timeouts.documentation,
            store_timeout: config.timeouts.store,
        }
    }

    fn request(&self, section: DocSection, project: &str, spec: &Value) -> InvocationRequest {
        InvocationRequest::new(
            self.target.clone(),
            json!({
                "task": section.key(),
                "openApiSpec": spec,
                "context": {"projectName": project},
            }),
            self.mode,
        )
    }

    /// Generate every section; never fails.
    #[instrument(skip(self, spec), fields(target = %self.target))]
    pub async fn generate(&self, project: &str, spec: &Value) -> DocumentationBundle {
        let requests = DocSection::ALL
            .iter()
            .map(|section| self.request(*section, project, spec))
            .collect();
        let results = self.dispatcher.invoke_parallel(requests, self.timeout).await;

        let mut bundle = DocumentationBundle::default();
        for (section, result) in DocSection::ALL.iter().zip(results.iter()) {
            match unwrap_section(*section, result) {
                Ok(value) => bundle.set_section(*section, value),
                Err(reason) => {
                    obs::emit_docs_section_failed(section.key(), &reason);
                    bundle.details.insert(section.key().to_string(), reason);
                }
            }
        }

        let failed = bundle.details.len();
        let total = DocSection::ALL.len();
        if failed == total {
            let title = spec
                .pointer("/info/title")
                .and_then(Value::as_str)
                .unwrap_or("untitled");
            METRICS.inc_fallbacks();
            obs::emit_fallback_generated(title, "all documentation sections failed");
            return DocumentationBundle {
                error: Some(
                    "Documentation generation failed; returning fallback documentation".to_string(),
                ),
                details: bundle.details,
                ..generate_fallback_bundle(spec)
            };
        }
        if failed > 0 {
            bundle.error = Some(format!("{failed} of {total} documentation sections failed"));
        }
        info!(project = %project, failed, "documentation generated");
        bundle
    }

    /// Generate and persist to `projects/<p>/specs/<id>-docs.json`.
    pub async fn generate_and_store(
        &self,
        project: &str,
        spec_id: &str,
        spec: &Value,
    ) -> ForgeResult<(String, DocumentationBundle)> {
        let bundle = self.generate(project, spec).await;
        let key = store_timeout(
            self.store_timeout,
            self.projects.save_docs(project, spec_id, &bundle),
        )
        .await?;
        Ok((key, bundle))
    }
}
