//! apiforge core library
//!
//! Dispatches invocations to the analysis and documentation agents,
//! reconciles their inconsistent responses into one flat result shape, and
//! derives documentation deterministically from an OpenAPI document when
//! the agents are unavailable.
//!
//! ## Layer 1 - Orchestration
//!
//! - `Dispatcher`: direct / signed-HTTP invocation, timeouts, bounded batches
//! - `reconcile`: ordered parser table over agent responses
//! - `generate_fallback_bundle`: pure OpenAPI to documentation derivation
//! - `DocumentationGenerator` / `AnalysisService`: the two workflows
//! - `aws`: SigV4 signing, the Lambda/API Gateway transport and the S3 store

pub mod analysis;
pub mod aws;
pub mod config;
pub mod dispatch;
pub mod docs;
pub mod error;
pub mod fakes;
pub mod fallback;
pub mod metrics;
pub mod obs;
pub mod reconcile;
pub mod session;
pub mod telemetry;

pub use analysis::{AnalysisKind, AnalysisRequest, AnalysisService};
pub use aws::s3::S3BlobStore;
pub use aws::transport::{AwsTransport, SignedClient};
pub use aws::Credentials;
pub use config::{ForgeConfig, StoreBackend, Timeouts};
pub use dispatch::{
    Dispatcher, InvocationMode, InvocationRequest, InvocationResult, RawResponse, Transport,
};
pub use docs::{unwrap_section, DocSection, DocumentationBundle, DocumentationGenerator};
pub use error::{ForgeError, ForgeResult};
pub use fallback::generate_fallback_bundle;
pub use reconcile::{
    reconcile, reconcile_invocation, AnalysisResult, ContentKind, ReconcileStep, Reconciled,
};
pub use session::{SessionId, SessionStore};

pub use metrics::METRICS;
pub use telemetry::init_tracing;

/// apiforge version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
