//! S3-backed [`BlobStore`].
//!
//! Objects are addressed path-style when a custom endpoint is configured
//! (MinIO, LocalStack) and virtual-hosted style otherwise. Every request
//! carries a signed `x-amz-content-sha256`.

use std::sync::OnceLock;

use apiforge_store::{validate_key, BlobStore, StoreError, StoreResult};
use async_trait::async_trait;
use regex::Regex;
use reqwest::{Method, Url};
use tracing::debug;

use super::sigv4::{sha256_hex, uri_encode, CONTENT_SHA256_HEADER};
use super::transport::SignedClient;
use crate::dispatch::RawResponse;
use crate::error::ForgeError;

pub const S3_SERVICE: &str = "s3";

/// Page-size guard for `list`; S3 returns at most 1000 keys per page.
const MAX_LIST_PAGES: usize = 10_000;

fn key_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<Key>([^<]*)</Key>").expect("valid key regex"))
}

fn continuation_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"<NextContinuationToken>([^<]*)</NextContinuationToken>")
            .expect("valid continuation regex")
    })
}

/// Blob store over the S3 REST API.
#[derive(Clone)]
pub struct S3BlobStore {
    client: SignedClient,
    bucket: String,
    /// Base URL objects are resolved against, without trailing slash.
    base_url: String,
}

impl S3BlobStore {
    pub fn new(client: SignedClient, bucket: impl Into<String>, endpoint: Option<&str>) -> Self {
        let bucket = bucket.into();
        let base_url = match endpoint {
            Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), bucket),
            None => format!("https://{}.s3.{}.amazonaws.com", bucket, client.region()),
        };
        Self {
            client,
            bucket,
            base_url,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn object_url(&self, key: &str) -> StoreResult<Url> {
        let encoded: Vec<String> = key.split('/').map(|s| uri_encode(s, true)).collect();
        parse_url(&format!("{}/{}", self.base_url, encoded.join("/")))
    }

    fn list_url(&self, prefix: &str, continuation: Option<&str>) -> StoreResult<Url> {
        let mut raw = format!(
            "{}/?list-type=2&prefix={}",
            self.base_url,
            uri_encode(prefix, true)
        );
        if let Some(token) = continuation {
            raw.push_str("&continuation-token=");
            raw.push_str(&uri_encode(token, true));
        }
        parse_url(&raw)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        content_type: Option<&str>,
        body: Vec<u8>,
    ) -> StoreResult<RawResponse> {
        let mut headers = vec![(CONTENT_SHA256_HEADER.to_string(), sha256_hex(&body))];
        if let Some(content_type) = content_type {
            headers.push(("content-type".to_string(), content_type.to_string()));
        }
        self.client
            .send(method, url, S3_SERVICE, &headers, body)
            .await
            .map_err(backend)
    }
}

fn parse_url(raw: &str) -> StoreResult<Url> {
    Url::parse(raw).map_err(|e| StoreError::Backend(format!("bad S3 url {raw}: {e}")))
}

fn backend(err: ForgeError) -> StoreError {
    match err {
        ForgeError::Store(inner) => inner,
        other => StoreError::Backend(other.to_string()),
    }
}

fn unexpected(method: &str, key: &str, response: &RawResponse) -> StoreError {
    StoreError::Backend(format!(
        "{method} {key} returned HTTP {}: {}",
        response.status,
        response.body_text()
    ))
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

fn xml_unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Keys and the continuation token from one ListObjectsV2 page.
pub(crate) fn parse_list_page(xml: &str) -> (Vec<String>, Option<String>) {
    let keys = key_regex()
        .captures_iter(xml)
        .map(|c| xml_unescape(&c[1]))
        .collect();
    let truncated = xml.contains("<IsTruncated>true</IsTruncated>");
    let token = continuation_regex()
        .captures(xml)
        .map(|c| xml_unescape(&c[1]))
        .filter(|_| truncated);
    (keys, token)
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> StoreResult<()> {
        validate_key(key)?;
        let url = self.object_url(key)?;
        let response = self
            .send(Method::PUT, url, Some(content_type), data.to_vec())
            .await?;
        if !is_success(response.status) {
            return Err(unexpected("PUT", key, &response));
        }
        debug!(bucket = %self.bucket, key = %key, bytes = data.len(), "stored object");
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Vec<u8>> {
        validate_key(key)?;
        let url = self.object_url(key)?;
        let response = self.send(Method::GET, url, None, Vec::new()).await?;
        match response.status {
            404 => Err(StoreError::NotFound {
                key: key.to_string(),
            }),
            status if is_success(status) => Ok(response.body),
            _ => Err(unexpected("GET", key, &response)),
        }
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        validate_key(key)?;
        let url = self.object_url(key)?;
        let response = self.send(Method::HEAD, url, None, Vec::new()).await?;
        match response.status {
            404 => Ok(false),
            status if is_success(status) => Ok(true),
            _ => Err(unexpected("HEAD", key, &response)),
        }
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;
        for _ in 0..MAX_LIST_PAGES {
            let url = self.list_url(prefix, continuation.as_deref())?;
            let response = self.send(Method::GET, url, None, Vec::new()).await?;
            if !is_success(response.status) {
                return Err(unexpected("LIST", prefix, &response));
            }
            let (page, next) = parse_list_page(&response.body_text());
            keys.extend(page);
            match next {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}
