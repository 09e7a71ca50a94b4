//! Analysis service: single and full analyses, session isolation and
//! project persistence.

use std::sync::Arc;
use std::time::Duration;

use apiforge_core::fakes::ScriptedTransport;
use apiforge_core::{
    AnalysisKind, AnalysisRequest, AnalysisService, Dispatcher, ForgeConfig, ForgeError,
    RawResponse, SessionId, SessionStore,
};
use apiforge_store::fakes::MemoryBlobStore;
use apiforge_store::ProjectStore;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::json;

const AGENT: &str = "analysis-agent";

struct Harness {
    transport: Arc<ScriptedTransport>,
    projects: ProjectStore,
    service: AnalysisService,
}

fn harness(config: ForgeConfig) -> Harness {
    let transport = Arc::new(ScriptedTransport::new());
    let projects = ProjectStore::new(Arc::new(MemoryBlobStore::new()));
    let service = AnalysisService::new(
        Dispatcher::new(transport.clone()),
        projects.clone(),
        Arc::new(SessionStore::new(16)),
        &config,
    );
    Harness {
        transport,
        projects,
        service,
    }
}

/// Domain and bounded analyses succeed in two different shapes; the diagram
/// agent is down.
fn script_parts(transport: &ScriptedTransport) {
    transport.respond_with(AGENT, |payload| match payload["analysisType"].as_str() {
        Some("domain") => Ok(RawResponse::ok(
            json!({"success": true, "domainAnalysis": "Order, Invoice"}).to_string(),
        )),
        Some("bounded") => Ok(RawResponse::ok(
            json!({"statusCode": 200, "body": "Bounded Context: Billing"}).to_string(),
        )),
        _ => Err(ForgeError::Transport("diagram agent down".to_string())),
    });
}

#[tokio::test]
async fn full_analysis_merges_parts() {
    let h = harness(ForgeConfig::default());
    script_parts(&h.transport);

    let result = h
        .service
        .analyze(
            &SessionId::generate(),
            AnalysisRequest::from_prompt(AnalysisKind::Full, "an online shop"),
        )
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.domain_analysis, Some(json!("Order, Invoice")));
    assert_eq!(result.bounded_context_analysis, Some(json!("Bounded Context: Billing")));
    assert_eq!(result.business_context_analysis, result.bounded_context_analysis);
    assert!(result.ascii_diagram.is_none());
    assert!(result.error.as_deref().unwrap().starts_with("ascii: "));
    assert!(!result.retryable);

    let mut kinds: Vec<String> = h
        .transport
        .payloads(AGENT)
        .iter()
        .map(|p| p["analysisType"].as_str().unwrap().to_string())
        .collect();
    kinds.sort();
    assert_eq!(kinds, ["ascii", "bounded", "domain"]);
}

#[tokio::test]
async fn sessions_do_not_see_each_other() {
    let h = harness(ForgeConfig::default());
    script_parts(&h.transport);
    let alice = SessionId::parse("alice").unwrap();
    let bob = SessionId::parse("bob").unwrap();

    let a = h
        .service
        .analyze(&alice, AnalysisRequest::from_prompt(AnalysisKind::Domain, "shop"))
        .await
        .unwrap();
    let b = h
        .service
        .analyze(&bob, AnalysisRequest::from_prompt(AnalysisKind::Bounded, "shop"))
        .await
        .unwrap();

    assert_eq!(h.service.latest(&alice).await, Some(a));
    assert_eq!(h.service.latest(&bob).await, Some(b));
    assert_eq!(h.service.latest(&SessionId::generate()).await, None);
}

#[tokio::test]
async fn successful_analysis_is_persisted_with_image() {
    let h = harness(ForgeConfig::default());
    script_parts(&h.transport);
    let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
    let request = AnalysisRequest::from_prompt(AnalysisKind::Domain, "whiteboard")
        .with_project("Demo Shop")
        .with_image(format!("data:image/png;base64,{}", STANDARD.encode(png)));

    let result = h
        .service
        .analyze(&SessionId::generate(), request)
        .await
        .unwrap();

    let stored = h.projects.load_analysis("Demo Shop").await.unwrap();
    assert_eq!(stored, serde_json::to_value(&result).unwrap());

    let images = h
        .projects
        .blobs()
        .list("projects/demo-shop/images/")
        .await
        .unwrap();
    assert_eq!(images.len(), 1);
    assert!(images[0].ends_with(".png"));

    let payload = &h.transport.payloads(AGENT)[0];
    assert_eq!(payload["imageBase64"], STANDARD.encode(png));
    assert_eq!(payload["context"]["projectName"], "Demo Shop");
}

#[tokio::test]
async fn failed_analysis_is_not_persisted() {
    let h = harness(ForgeConfig::default());
    script_parts(&h.transport);

    let result = h
        .service
        .analyze(
            &SessionId::generate(),
            AnalysisRequest::from_prompt(AnalysisKind::Ascii, "shop").with_project("demo"),
        )
        .await
        .unwrap();

    assert!(!result.success);
    let err = h.projects.load_analysis("demo").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test(start_paused = true)]
async fn slow_agent_yields_retryable_failure() {
    let mut config = ForgeConfig::default();
    config.timeouts.analysis = Duration::from_secs(2);
    let h = harness(config);
    h.transport
        .respond_after(AGENT, Duration::from_secs(30), RawResponse::ok("{}"));

    let result = h
        .service
        .analyze(
            &SessionId::generate(),
            AnalysisRequest::from_prompt(AnalysisKind::Domain, "shop"),
        )
        .await
        .unwrap();

    assert!(!result.success);
    assert!(result.retryable);
    assert!(result.error.as_deref().unwrap().contains("timed out"));
}

#[tokio::test]
async fn empty_request_is_rejected_before_dispatch() {
    let h = harness(ForgeConfig::default());
    let request = AnalysisRequest::from_prompt(AnalysisKind::Domain, "   ");

    let err = h
        .service
        .analyze(&SessionId::generate(), request)
        .await
        .unwrap_err();
    assert!(matches!(err, ForgeError::InvalidRequest(_)));
    assert!(h.transport.payloads(AGENT).is_empty());
}
