use std::fmt::{Debug, Formatter};
use std::str::FromStr;

use awssig_core::utils::Redact;
use awssig_core::{Context, Error};
use log::debug;
use serde::Deserialize;

use crate::constants::*;

/// Signing algorithm used by a signer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum SigningAlgorithm {
    /// Standard AWS Signature Version 4.
    #[default]
    #[serde(rename = "sigv4")]
    SigV4,
    /// SigV4 for S3 Express One Zone.
    ///
    /// The session token travels in `x-amz-s3session-token` (or
    /// `X-Amz-S3session-Token` in presigned urls) instead of the security
    /// token header.
    #[serde(rename = "sigv4-s3express")]
    SigV4S3Express,
    /// Asymmetric SigV4 (ECDSA P-256).
    ///
    /// Needs an accelerated crypto backend which is not part of this crate,
    /// so building a signer with it fails.
    #[serde(rename = "sigv4a")]
    SigV4A,
}

impl SigningAlgorithm {
    /// Name as used in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            SigningAlgorithm::SigV4 => "sigv4",
            SigningAlgorithm::SigV4S3Express => "sigv4-s3express",
            SigningAlgorithm::SigV4A => "sigv4a",
        }
    }
}

impl FromStr for SigningAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sigv4" => Ok(SigningAlgorithm::SigV4),
            "sigv4-s3express" => Ok(SigningAlgorithm::SigV4S3Express),
            "sigv4a" => Ok(SigningAlgorithm::SigV4A),
            v => Err(Error::unsupported_algorithm(format!(
                "unknown signing algorithm: {v}"
            ))),
        }
    }
}

/// Config for aws sigv4 signer.
///
/// Every field has a default, the signer checks required ones when it's built.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name like `s3`. Required.
    pub service: Option<String>,
    /// `region` will be loaded from:
    ///
    /// - this field if it's `is_some`
    /// - env value: [`AWS_REGION`]
    /// - env value: [`AWS_DEFAULT_REGION`]
    ///
    /// Required.
    pub region: Option<String>,
    /// `access_key_id` will be loaded from
    ///
    /// - this field if it's `is_some`
    /// - env value: [`AWS_ACCESS_KEY_ID`]
    pub access_key_id: Option<String>,
    /// `secret_access_key` will be loaded from
    ///
    /// - this field if it's `is_some`
    /// - env value: [`AWS_SECRET_ACCESS_KEY`]
    pub secret_access_key: Option<String>,
    /// `session_token` will be loaded from
    ///
    /// - this field if it's `is_some`
    /// - env value: [`AWS_SESSION_TOKEN`]
    pub session_token: Option<String>,
    /// Extra header names that must not be signed, case-insensitive.
    ///
    /// `authorization`, `x-amzn-trace-id` and `expect` are never signed.
    pub unsigned_headers: Vec<String>,
    /// Escape every path segment of the canonical path. Default `true`.
    pub uri_escape_path: bool,
    /// Add `x-amz-content-sha256` to signed requests. Default `true`.
    pub apply_checksum_header: bool,
    /// Default [`SigningAlgorithm::SigV4`].
    pub signing_algorithm: SigningAlgorithm,
    /// Remove `.` and `..` segments from the canonical path. Default `true`.
    pub normalize_path: bool,
    /// Don't put the session token into signed requests. Default `false`.
    pub omit_session_token: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: None,
            region: None,
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            unsigned_headers: Vec::new(),
            uri_escape_path: true,
            apply_checksum_header: true,
            signing_algorithm: SigningAlgorithm::SigV4,
            normalize_path: true,
            omit_session_token: false,
        }
    }
}

impl Debug for Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("service", &self.service)
            .field("region", &self.region)
            .field("access_key_id", &Redact::from(&self.access_key_id))
            .field("secret_access_key", &Redact::from(&self.secret_access_key))
            .field("session_token", &Redact::from(&self.session_token))
            .field("unsigned_headers", &self.unsigned_headers)
            .field("uri_escape_path", &self.uri_escape_path)
            .field("apply_checksum_header", &self.apply_checksum_header)
            .field("signing_algorithm", &self.signing_algorithm)
            .field("normalize_path", &self.normalize_path)
            .field("omit_session_token", &self.omit_session_token)
            .finish()
    }
}

impl Config {
    /// Load config from env, fields already set are kept.
    pub fn from_env(mut self, ctx: &Context) -> Self {
        let envs = ctx.env_vars();

        if self.region.is_none() {
            self.region = envs
                .get(AWS_REGION)
                .or_else(|| envs.get(AWS_DEFAULT_REGION))
                .filter(|v| !v.is_empty())
                .cloned();
        }
        if let Some(v) = envs.get(AWS_ACCESS_KEY_ID) {
            self.access_key_id.get_or_insert(v.clone());
        }
        if let Some(v) = envs.get(AWS_SECRET_ACCESS_KEY) {
            self.secret_access_key.get_or_insert(v.clone());
        }
        if let Some(v) = envs.get(AWS_SESSION_TOKEN) {
            self.session_token.get_or_insert(v.clone());
        }

        debug!("config loaded from env: {self:?}");
        self
    }
}
