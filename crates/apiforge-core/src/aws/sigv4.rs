//! AWS Signature Version 4 request signing.
//!
//! Only header-based signing is implemented (no presigned URLs). The signer
//! is pure: callers pass the clock in, which keeps it testable against the
//! published AWS test vectors.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Url;
use sha2::{Digest, Sha256};

use super::Credentials;
use crate::error::{ForgeError, ForgeResult};

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";
pub const CONTENT_SHA256_HEADER: &str = "x-amz-content-sha256";

/// Signs requests for one (credentials, region, service) triple.
#[derive(Debug, Clone, Copy)]
pub struct SigV4Signer<'a> {
    credentials: &'a Credentials,
    region: &'a str,
    service: &'a str,
}

impl<'a> SigV4Signer<'a> {
    pub fn new(credentials: &'a Credentials, region: &'a str, service: &'a str) -> Self {
        Self {
            credentials,
            region,
            service,
        }
    }

    /// Compute the headers to add to the request: `x-amz-date`, the session
    /// token if any, and `authorization`.
    ///
    /// `headers` are extra headers that must be covered by the signature
    /// (e.g. `content-type`). `host` is derived from `url`. When
    /// `x-amz-content-sha256` is among `headers` its value is used as the
    /// payload hash.
    pub fn sign(
        &self,
        method: &str,
        url: &Url,
        headers: &[(String, String)],
        payload: &[u8],
        now: DateTime<Utc>,
    ) -> ForgeResult<Vec<(String, String)>> {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();

        let mut signed: Vec<(String, String)> = headers
            .iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), normalize_header_value(value)))
            .collect();
        signed.push(("host".to_string(), host_header(url)?));
        signed.push(("x-amz-date".to_string(), amz_date.clone()));
        if let Some(token) = &self.credentials.session_token {
            signed.push(("x-amz-security-token".to_string(), token.clone()));
        }
        signed.sort_by(|a, b| a.0.cmp(&b.0));

        let payload_hash = signed
            .iter()
            .find(|(name, _)| name == CONTENT_SHA256_HEADER)
            .map(|(_, value)| value.clone())
            .unwrap_or_else(|| sha256_hex(payload));

        let canonical = canonical_request(method, url, &signed, &payload_hash, self.service == "s3");
        let scope = format!("{date}/{}/{}/aws4_request", self.region, self.service);
        let string_to_sign = format!(
            "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
            sha256_hex(canonical.as_bytes())
        );

        let key = signing_key(
            self.credentials.secret_access_key(),
            &date,
            self.region,
            self.service,
        )?;
        let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes())?);

        let signed_names = signed
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(";");
        let authorization = format!(
            "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_names}, Signature={signature}",
            self.credentials.access_key_id
        );

        let mut out = vec![("x-amz-date".to_string(), amz_date)];
        if let Some(token) = &self.credentials.session_token {
            out.push(("x-amz-security-token".to_string(), token.clone()));
        }
        out.push(("authorization".to_string(), authorization));
        Ok(out)
    }
}

/// Build the canonical request string.
///
/// S3 signs the path exactly as sent; every other service signs the path
/// with each segment encoded a second time.
pub fn canonical_request(
    method: &str,
    url: &Url,
    sorted_headers: &[(String, String)],
    payload_hash: &str,
    single_encode_path: bool,
) -> String {
    let path = match url.path() {
        "" => "/".to_string(),
        p if single_encode_path => p.to_string(),
        p => p
            .split('/')
            .map(|segment| uri_encode(segment, true))
            .collect::<Vec<_>>()
            .join("/"),
    };

    let mut query: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (uri_encode(&k, true), uri_encode(&v, true)))
        .collect();
    query.sort();
    let query = query
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let headers: String = sorted_headers
        .iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect();
    let names = sorted_headers
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";");

    format!("{method}\n{path}\n{query}\n{headers}\n{names}\n{payload_hash}")
}

/// Derive the SigV4 signing key.
pub fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> ForgeResult<Vec<u8>> {
    let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

/// RFC 3986 encoding as AWS expects it: unreserved characters pass through,
/// everything else becomes `%XX` (upper-case hex).
pub fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> ForgeResult<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| ForgeError::Signature(format!("invalid signing key: {e}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn host_header(url: &Url) -> ForgeResult<String> {
    let host = url
        .host_str()
        .ok_or_else(|| ForgeError::InvalidRequest(format!("url has no host: {url}")))?;
    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

fn normalize_header_value(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const EXAMPLE_SECRET: &str = "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY";

    #[test]
    fn signing_key_matches_aws_documentation() {
        let key = signing_key(EXAMPLE_SECRET, "20120215", "us-east-1", "iam").unwrap();
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn get_vanilla_test_vector() {
        let creds = Credentials::new("AKIDEXAMPLE", EXAMPLE_SECRET, None);
        let signer = SigV4Signer::new(&creds, "us-east-1", "service");
        let url = Url::parse("https://example.amazonaws.com/").unwrap();
        let now = Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap();

        let headers = signer.sign("GET", &url, &[], b"", now).unwrap();
        let auth = &headers.iter().find(|(n, _)| n == "authorization").unwrap().1;

        assert_eq!(
            auth,
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/service/aws4_request, \
             SignedHeaders=host;x-amz-date, \
             Signature=5fa00fa31553b73ebf1942676e86291e8372ff2a2260956d9b8aae1d763fbf31"
        );
        assert!(headers.contains(&("x-amz-date".to_string(), "20150830T123600Z".to_string())));
    }

    #[test]
    fn canonical_request_for_get_vanilla() {
        let url = Url::parse("https://example.amazonaws.com/").unwrap();
        let headers = vec![
            ("host".to_string(), "example.amazonaws.com".to_string()),
            ("x-amz-date".to_string(), "20150830T123600Z".to_string()),
        ];
        let canonical = canonical_request("GET", &url, &headers, &sha256_hex(b""), false);
        assert_eq!(
            canonical,
            "GET\n/\n\nhost:example.amazonaws.com\nx-amz-date:20150830T123600Z\n\nhost;x-amz-date\n\
             e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn session_token_is_signed_and_returned() {
        let creds = Credentials::new("AKID", "secret", Some("session".to_string()));
        let signer = SigV4Signer::new(&creds, "eu-west-1", "lambda");
        let url = Url::parse("https://lambda.eu-west-1.amazonaws.com/x").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();

        let headers = signer.sign("POST", &url, &[], b"{}", now).unwrap();
        let auth = &headers.iter().find(|(n, _)| n == "authorization").unwrap().1;
        assert!(auth.contains("SignedHeaders=host;x-amz-date;x-amz-security-token"));
        assert!(headers.contains(&("x-amz-security-token".to_string(), "session".to_string())));
    }

    #[test]
    fn non_default_port_is_part_of_host() {
        let url = Url::parse("http://localhost:9000/bucket").unwrap();
        assert_eq!(host_header(&url).unwrap(), "localhost:9000");
        let url = Url::parse("https://s3.amazonaws.com/bucket").unwrap();
        assert_eq!(host_header(&url).unwrap(), "s3.amazonaws.com");
    }

    #[test]
    fn path_is_double_encoded_except_for_s3() {
        let url = Url::parse("https://h/functions/arn%3Aaws%3Alambda/invocations").unwrap();
        let double = canonical_request("POST", &url, &[], "x", false);
        assert!(double.contains("/functions/arn%253Aaws%253Alambda/invocations"));
        let single = canonical_request("POST", &url, &[], "x", true);
        assert!(single.contains("/functions/arn%3Aaws%3Alambda/invocations"));
    }

    #[test]
    fn query_is_sorted_and_encoded() {
        let url = Url::parse("https://h/?prefix=projects%2F&list-type=2").unwrap();
        let canonical = canonical_request("GET", &url, &[], "x", true);
        assert_eq!(canonical.lines().nth(2), Some("list-type=2&prefix=projects%2F"));
    }

    #[test]
    fn uri_encode_keeps_unreserved() {
        assert_eq!(uri_encode("a-b_c.d~e", true), "a-b_c.d~e");
        assert_eq!(uri_encode("a b/c", true), "a%20b%2Fc");
        assert_eq!(uri_encode("a b/c", false), "a%20b/c");
    }
}
