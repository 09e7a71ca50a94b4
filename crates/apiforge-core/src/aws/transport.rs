//! Production [`Transport`]: Lambda Invoke and signed API Gateway calls over
//! plain HTTPS.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Method, Url};
use tracing::{debug, warn};

use super::sigv4::{uri_encode, SigV4Signer};
use super::Credentials;
use crate::config::ForgeConfig;
use crate::dispatch::{RawResponse, Transport};
use crate::error::{ForgeError, ForgeResult};

pub const USER_AGENT: &str = concat!("apiforge/", env!("CARGO_PKG_VERSION"));
pub const INVOCATION_TYPE_HEADER: &str = "x-amz-invocation-type";
pub const FUNCTION_ERROR_HEADER: &str = "x-amz-function-error";
pub const LAMBDA_SERVICE: &str = "lambda";

/// HTTP client that signs every request with SigV4.
#[derive(Clone)]
pub struct SignedClient {
    http_client: reqwest::Client,
    credentials: Option<Credentials>,
    region: String,
}

impl SignedClient {
    pub fn new(region: impl Into<String>, credentials: Option<Credentials>) -> ForgeResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ForgeError::Transport(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http_client,
            credentials,
            region: region.into(),
        })
    }

    /// Use ambient credentials when present. Without them the client is
    /// still built, and every request fails with
    /// [`ForgeError::Credentials`].
    pub fn from_env(region: impl Into<String>) -> ForgeResult<Self> {
        let credentials = match Credentials::from_env() {
            Ok(creds) => Some(creds),
            Err(e) => {
                warn!(error = %e, "no AWS credentials in environment; upstream calls will fail");
                None
            }
        };
        Self::new(region, credentials)
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Sign and send one request; any HTTP status is returned as-is.
    pub async fn send(
        &self,
        method: Method,
        url: Url,
        service: &str,
        headers: &[(String, String)],
        body: Vec<u8>,
    ) -> ForgeResult<RawResponse> {
        let credentials = self.credentials.as_ref().ok_or_else(|| {
            ForgeError::Credentials("AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY not set".to_string())
        })?;
        let signer = SigV4Signer::new(credentials, &self.region, service);
        let auth_headers = signer.sign(method.as_str(), &url, headers, &body, Utc::now())?;

        debug!(method = %method, url = %url, service = %service, "sending signed request");
        let mut request = self.http_client.request(method, url);
        for (name, value) in headers.iter().chain(auth_headers.iter()) {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request.body(body).send().await?;

        let status = response.status().as_u16();
        let function_error = response
            .headers()
            .get(FUNCTION_ERROR_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();
        Ok(RawResponse {
            status,
            body,
            function_error,
        })
    }
}

/// Lambda and API Gateway transport.
pub struct AwsTransport {
    client: SignedClient,
    lambda_endpoint: String,
    signing_service: String,
}

impl AwsTransport {
    pub fn new(client: SignedClient, config: &ForgeConfig) -> Self {
        let lambda_endpoint = config
            .lambda_endpoint
            .clone()
            .unwrap_or_else(|| format!("https://lambda.{}.amazonaws.com", config.region));
        Self {
            client,
            lambda_endpoint: lambda_endpoint.trim_end_matches('/').to_string(),
            signing_service: config.signing_service.clone(),
        }
    }

    /// Build from config and ambient credentials.
    pub fn from_config(config: &ForgeConfig) -> ForgeResult<Self> {
        Ok(Self::new(SignedClient::from_env(&config.region)?, config))
    }

    pub fn lambda_endpoint(&self) -> &str {
        &self.lambda_endpoint
    }

    /// `POST {endpoint}/2015-03-31/functions/{name}/invocations`
    pub fn invocation_url(&self, function: &str) -> ForgeResult<Url> {
        let raw = format!(
            "{}/2015-03-31/functions/{}/invocations",
            self.lambda_endpoint,
            uri_encode(function, true)
        );
        Url::parse(&raw).map_err(|e| ForgeError::InvalidRequest(format!("bad lambda url {raw}: {e}")))
    }
}

#[async_trait]
impl Transport for AwsTransport {
    async fn invoke_function(&self, function: &str, payload: Vec<u8>) -> ForgeResult<RawResponse> {
        let url = self.invocation_url(function)?;
        let headers = vec![
            ("content-type".to_string(), "application/json".to_string()),
            (INVOCATION_TYPE_HEADER.to_string(), "RequestResponse".to_string()),
        ];
        self.client
            .send(Method::POST, url, LAMBDA_SERVICE, &headers, payload)
            .await
    }

    async fn post_signed(&self, url: &str, payload: Vec<u8>) -> ForgeResult<RawResponse> {
        let url = Url::parse(url)
            .map_err(|e| ForgeError::InvalidRequest(format!("bad url {url}: {e}")))?;
        let headers = vec![("content-type".to_string(), "application/json".to_string())];
        self.client
            .send(Method::POST, url, &self.signing_service, &headers, payload)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(endpoint: Option<&str>) -> AwsTransport {
        let config = ForgeConfig {
            region: "eu-central-1".to_string(),
            lambda_endpoint: endpoint.map(str::to_string),
            ..ForgeConfig::default()
        };
        AwsTransport::new(SignedClient::new(&config.region, None).unwrap(), &config)
    }

    #[test]
    fn default_endpoint_follows_region() {
        assert_eq!(
            transport(None).lambda_endpoint(),
            "https://lambda.eu-central-1.amazonaws.com"
        );
    }

    #[test]
    fn function_arn_is_encoded_in_url() {
        let url = transport(Some("http://localhost:3001/"))
            .invocation_url("arn:aws:lambda:eu-central-1:123:function:agent")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:3001/2015-03-31/functions/arn%3Aaws%3Alambda%3Aeu-central-1%3A123%3Afunction%3Aagent/invocations"
        );
    }

    #[tokio::test]
    async fn missing_credentials_fail_before_sending() {
        let err = transport(Some("http://127.0.0.1:9"))
            .invoke_function("agent", b"{}".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::Credentials(_)));
    }
}
