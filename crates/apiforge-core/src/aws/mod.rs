//! AWS plumbing: ambient credentials, SigV4 signing, the Lambda/API-Gateway
//! transport and the S3 blob backend.
//!
//! Everything here talks plain HTTPS through `reqwest`; requests are signed
//! with [`sigv4::SigV4Signer`].

pub mod s3;
pub mod sigv4;
pub mod transport;

use std::fmt;

use crate::error::{ForgeError, ForgeResult};

/// Static AWS credentials resolved from the environment.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    secret_access_key: String,
    pub session_token: Option<String>,
}

impl Credentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
        }
    }

    /// Read `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` / `AWS_SESSION_TOKEN`.
    pub fn from_env() -> ForgeResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> ForgeResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let access_key_id = get("AWS_ACCESS_KEY_ID")
            .ok_or_else(|| ForgeError::Credentials("AWS_ACCESS_KEY_ID is not set".to_string()))?;
        let secret_access_key = get("AWS_SECRET_ACCESS_KEY").ok_or_else(|| {
            ForgeError::Credentials("AWS_SECRET_ACCESS_KEY is not set".to_string())
        })?;
        Ok(Self::new(
            access_key_id,
            secret_access_key,
            get("AWS_SESSION_TOKEN"),
        ))
    }

    pub(crate) fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
