//! Shared handler state.

use std::sync::Arc;
use std::time::Duration;

use apiforge_core::{
    AnalysisService, AwsTransport, Dispatcher, DocumentationGenerator, ForgeConfig, ForgeResult,
    SessionStore,
};
use apiforge_store::ProjectStore;

#[derive(Clone)]
pub struct AppState {
    pub analysis: AnalysisService,
    pub docs: Arc<DocumentationGenerator>,
    pub projects: ProjectStore,
    pub store_timeout: Duration,
    pub probe_timeout: Duration,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher, projects: ProjectStore, config: &ForgeConfig) -> Self {
        let sessions = Arc::new(SessionStore::new(config.max_sessions));
        Self {
            analysis: AnalysisService::new(dispatcher.clone(), projects.clone(), sessions, config),
            docs: Arc::new(DocumentationGenerator::new(
                dispatcher,
                projects.clone(),
                config,
            )),
            projects,
            store_timeout: config.timeouts.store,
            probe_timeout: config.timeouts.probe,
        }
    }

    /// Wire the AWS transport and the configured blob backend.
    pub fn from_config(config: &ForgeConfig) -> ForgeResult<Self> {
        let transport = AwsTransport::from_config(config)?;
        let dispatcher =
            Dispatcher::new(Arc::new(transport)).with_max_concurrent(config.max_concurrent);
        let projects = ProjectStore::new(config.blob_store()?);
        Ok(Self::new(dispatcher, projects, config))
    }
}
