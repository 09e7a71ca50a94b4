//! Signed HTTP against a local mock server: Lambda Invoke, API Gateway and
//! the S3 blob store.

use std::sync::Arc;

use apiforge_core::{
    AwsTransport, Credentials, Dispatcher, ForgeConfig, InvocationRequest, S3BlobStore,
    SignedClient,
};
use apiforge_store::{BlobStore, StoreError};
use serde_json::json;
use wiremock::matchers::{header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn credentials(session_token: Option<&str>) -> Credentials {
    Credentials::new(
        "AKIDEXAMPLE",
        "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
        session_token.map(str::to_string),
    )
}

fn client(session_token: Option<&str>) -> SignedClient {
    SignedClient::new("us-east-1", Some(credentials(session_token))).unwrap()
}

fn dispatcher(server: &MockServer) -> Dispatcher {
    let config = ForgeConfig {
        lambda_endpoint: Some(server.uri()),
        ..ForgeConfig::default()
    };
    Dispatcher::new(Arc::new(AwsTransport::new(client(None), &config)))
}

#[tokio::test]
async fn lambda_invoke_is_signed_and_parsed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2015-03-31/functions/analysis-agent/invocations"))
        .and(header("x-amz-invocation-type", "RequestResponse"))
        .and(header("content-type", "application/json"))
        .and(header_exists("authorization"))
        .and(header_exists("x-amz-date"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            json!({"statusCode": 200, "body": "{\"success\":true,\"domainAnalysis\":\"D\"}"})
                .to_string(),
        ))
        .expect(1)
        .mount(&server)
        .await;

    let result = dispatcher(&server)
        .invoke(&InvocationRequest::direct("analysis-agent", json!({"prompt": "p"})))
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.data["domainAnalysis"], "D");

    let requests = server.received_requests().await.unwrap();
    let auth = requests[0].headers.get("authorization").unwrap().to_str().unwrap();
    assert!(auth.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/"));
    assert!(auth.contains("/us-east-1/lambda/aws4_request"));
    assert!(auth.contains("SignedHeaders=content-type;host;x-amz-date;x-amz-invocation-type"));
}

#[tokio::test]
async fn function_error_header_fails_invocation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Amz-Function-Error", "Unhandled")
                .set_body_string(r#"{"errorMessage":"Task timed out after 30.03 seconds"}"#),
        )
        .mount(&server)
        .await;

    let result = dispatcher(&server)
        .invoke(&InvocationRequest::direct("analysis-agent", json!({})))
        .await
        .unwrap();
    assert!(!result.success);
    assert_eq!(
        result.error.as_deref(),
        Some("Task timed out after 30.03 seconds")
    );
}

#[tokio::test]
async fn signed_post_maps_gateway_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/prod/docs"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(504).set_body_string("Endpoint request timed out"))
        .mount(&server)
        .await;

    let url = format!("{}/prod/docs", server.uri());
    let result = dispatcher(&server)
        .invoke(&InvocationRequest::signed_http(url, json!({"task": "policies"})))
        .await
        .unwrap();
    assert!(!result.success);
    assert!(result.retryable);

    let requests = server.received_requests().await.unwrap();
    let auth = requests[0].headers.get("authorization").unwrap().to_str().unwrap();
    assert!(auth.contains("/us-east-1/execute-api/aws4_request"));
}

#[tokio::test]
async fn session_token_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("x-amz-security-token", "token-123"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    let config = ForgeConfig {
        lambda_endpoint: Some(server.uri()),
        ..ForgeConfig::default()
    };
    let transport = AwsTransport::new(client(Some("token-123")), &config);
    let result = Dispatcher::new(Arc::new(transport))
        .invoke(&InvocationRequest::direct("analysis-agent", json!({})))
        .await
        .unwrap();
    assert!(result.success);
}

fn s3(server: &MockServer) -> S3BlobStore {
    S3BlobStore::new(client(None), "specs", Some(&server.uri()))
}

#[tokio::test]
async fn s3_put_and_get() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/specs/projects/demo/analysis.json"))
        .and(header("content-type", "application/json"))
        .and(header_exists("x-amz-content-sha256"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/specs/projects/demo/analysis.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"success":true}"#))
        .mount(&server)
        .await;

    let store = s3(&server);
    store
        .put("projects/demo/analysis.json", br#"{"success":true}"#, "application/json")
        .await
        .unwrap();
    let bytes = store.get("projects/demo/analysis.json").await.unwrap();
    assert_eq!(bytes, br#"{"success":true}"#);

    let requests = server.received_requests().await.unwrap();
    let put = requests.iter().find(|r| r.method.as_str() == "PUT").unwrap();
    let auth = put.headers.get("authorization").unwrap().to_str().unwrap();
    assert!(auth.contains("/us-east-1/s3/aws4_request"));
    assert!(auth.contains("x-amz-content-sha256"));
}

#[tokio::test]
async fn s3_missing_object_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("<Error><Code>NoSuchKey</Code></Error>"))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let store = s3(&server);
    let err = store.get("projects/demo/metadata.json").await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { key } if key == "projects/demo/metadata.json"));
    assert!(!store.exists("projects/demo/metadata.json").await.unwrap());
}

#[tokio::test]
async fn s3_access_denied_is_backend_error() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(403).set_body_string("<Error><Code>AccessDenied</Code></Error>"))
        .mount(&server)
        .await;

    let err = s3(&server)
        .put("projects/demo/analysis.json", b"{}", "application/json")
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Backend(msg) if msg.contains("403")));
}

#[tokio::test]
async fn s3_list_follows_continuation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("list-type", "2"))
        .and(query_param("continuation-token", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<ListBucketResult><IsTruncated>false</IsTruncated>\
             <Contents><Key>projects/a/specs/1.json</Key></Contents></ListBucketResult>",
        ))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("list-type", "2"))
        .and(query_param("prefix", "projects/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<ListBucketResult><IsTruncated>true</IsTruncated>\
             <Contents><Key>projects/b/metadata.json</Key></Contents>\
             <NextContinuationToken>page-2</NextContinuationToken></ListBucketResult>",
        ))
        .with_priority(2)
        .mount(&server)
        .await;

    let keys = s3(&server).list("projects/").await.unwrap();
    assert_eq!(keys, ["projects/a/specs/1.json", "projects/b/metadata.json"]);
}
