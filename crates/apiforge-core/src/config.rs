//! Environment-driven configuration.
//!
//! Function identifiers, region, endpoints and timeouts are opaque values
//! injected at startup. `ForgeConfig::from_env()` reads the process
//! environment; `from_lookup` takes any key lookup so tests do not have to
//! mutate global state.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use apiforge_store::{BlobStore, FsBlobStore};
use serde::{Deserialize, Serialize};

use crate::aws::s3::S3BlobStore;
use crate::aws::transport::SignedClient;
use crate::dispatch::InvocationMode;
use crate::error::{ForgeError, ForgeResult};

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_ANALYSIS_FUNCTION: &str = "analysis-agent";
pub const DEFAULT_DOCS_FUNCTION: &str = "documentation-agent";
pub const DEFAULT_SIGNING_SERVICE: &str = "execute-api";
pub const DEFAULT_DATA_DIR: &str = ".apiforge/data";

pub const DEFAULT_ANALYSIS_TIMEOUT_SECS: u64 = 45;
pub const DEFAULT_STORE_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_DOCS_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MAX_CONCURRENT: usize = 4;
pub const DEFAULT_MAX_SESSIONS: usize = 1024;

/// Per-call-site timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    /// Single analysis invocation.
    pub analysis: Duration,
    /// Blob store reads/writes made on behalf of a request.
    pub store: Duration,
    /// Readiness probes.
    pub probe: Duration,
    /// Each documentation section invocation.
    pub documentation: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            analysis: Duration::from_secs(DEFAULT_ANALYSIS_TIMEOUT_SECS),
            store: Duration::from_secs(DEFAULT_STORE_TIMEOUT_SECS),
            probe: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
            documentation: Duration::from_secs(DEFAULT_DOCS_TIMEOUT_SECS),
        }
    }
}

/// Which blob backend to use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreBackend {
    /// Local directory.
    Fs { root: PathBuf },
    /// S3 bucket (optionally at a custom endpoint).
    S3 {
        bucket: String,
        endpoint: Option<String>,
    },
}

/// Full runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForgeConfig {
    pub region: String,
    pub analysis_function: String,
    pub docs_function: String,
    /// When set, documentation sections are sent over signed HTTP here.
    pub docs_url: Option<String>,
    /// Override for the Lambda endpoint (local emulators, tests).
    pub lambda_endpoint: Option<String>,
    /// SigV4 service name used for signed HTTP calls.
    pub signing_service: String,
    pub store: StoreBackend,
    pub timeouts: Timeouts,
    pub max_concurrent: usize,
    pub max_sessions: usize,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            analysis_function: DEFAULT_ANALYSIS_FUNCTION.to_string(),
            docs_function: DEFAULT_DOCS_FUNCTION.to_string(),
            docs_url: None,
            lambda_endpoint: None,
            signing_service: DEFAULT_SIGNING_SERVICE.to_string(),
            store: StoreBackend::Fs {
                root: PathBuf::from(DEFAULT_DATA_DIR),
            },
            timeouts: Timeouts::default(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

impl ForgeConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> ForgeResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary lookup function.
    pub fn from_lookup<F>(lookup: F) -> ForgeResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let region = get("AWS_REGION")
            .or_else(|| get("AWS_DEFAULT_REGION"))
            .unwrap_or(defaults.region);

        let store = match get("APIFORGE_BUCKET") {
            Some(bucket) => StoreBackend::S3 {
                bucket,
                endpoint: get("APIFORGE_S3_ENDPOINT"),
            },
            None => StoreBackend::Fs {
                root: get("APIFORGE_DATA_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            },
        };

        let timeouts = Timeouts {
            analysis: secs(&get, "APIFORGE_ANALYSIS_TIMEOUT_SECS", defaults.timeouts.analysis)?,
            store: secs(&get, "APIFORGE_STORE_TIMEOUT_SECS", defaults.timeouts.store)?,
            probe: secs(&get, "APIFORGE_PROBE_TIMEOUT_SECS", defaults.timeouts.probe)?,
            documentation: secs(&get, "APIFORGE_DOCS_TIMEOUT_SECS", defaults.timeouts.documentation)?,
        };

        let max_concurrent = count(&get, "APIFORGE_MAX_CONCURRENT", defaults.max_concurrent)?;
        let max_sessions = count(&get, "APIFORGE_MAX_SESSIONS", defaults.max_sessions)?;

        Ok(Self {
            region,
            analysis_function: get("APIFORGE_ANALYSIS_FUNCTION")
                .unwrap_or(defaults.analysis_function),
            docs_function: get("APIFORGE_DOCS_FUNCTION").unwrap_or(defaults.docs_function),
            docs_url: get("APIFORGE_DOCS_URL"),
            lambda_endpoint: get("APIFORGE_LAMBDA_ENDPOINT"),
            signing_service: get("APIFORGE_SIGNING_SERVICE").unwrap_or(defaults.signing_service),
            store,
            timeouts,
            max_concurrent,
            max_sessions,
        })
    }

    /// Target and mode for documentation section invocations.
    pub fn docs_target(&self) -> (String, InvocationMode) {
        match &self.docs_url {
            Some(url) => (url.clone(), InvocationMode::SignedHttp),
            None => (self.docs_function.clone(), InvocationMode::Direct),
        }
    }

    /// Open the configured blob backend.
    pub fn blob_store(&self) -> ForgeResult<Arc<dyn BlobStore>> {
        match &self.store {
            StoreBackend::Fs { root } => Ok(Arc::new(FsBlobStore::new(root)?)),
            StoreBackend::S3 { bucket, endpoint } => {
                let client = SignedClient::from_env(&self.region)?;
                Ok(Arc::new(S3BlobStore::new(client, bucket, endpoint.as_deref())))
            }
        }
    }
}

fn secs<G>(get: &G, key: &str, default: Duration) -> ForgeResult<Duration>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(0) | Err(_) => Err(ForgeError::Config(format!(
                "{key} must be a positive number of seconds, got {raw:?}"
            ))),
            Ok(n) => Ok(Duration::from_secs(n)),
        },
    }
}

fn count<G>(get: &G, key: &str, default: usize) -> ForgeResult<usize>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().parse::<usize>() {
            Ok(0) | Err(_) => Err(ForgeError::Config(format!(
                "{key} must be a positive integer, got {raw:?}"
            ))),
            Ok(n) => Ok(n),
        },
    }
}
