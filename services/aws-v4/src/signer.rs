// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use std::collections::BTreeSet;
use std::fmt::Write;
use std::sync::Arc;

use awssig_core::hash::{hex_sha256, hmac_sha256};
use awssig_core::time::{now, DateTime};
use awssig_core::{Context, Error, ProvideCredential, Result, SigningCredential};
use log::debug;

use crate::config::{Config, SigningAlgorithm};
use crate::constants::*;
use crate::provide_credential::StaticCredentialProvider;
use crate::Credential;

/// Signer that implements AWS SigV4.
///
/// - [Signature Version 4 signing process](https://docs.aws.amazon.com/general/latest/gr/signature-version-4.html)
///
/// A signer is immutable once built. Credentials are loaded from its
/// provider on every operation, so rotated credentials are picked up without
/// rebuilding it.
#[derive(Debug, Clone)]
pub struct Signer {
    pub(crate) ctx: Context,
    pub(crate) service: String,
    pub(crate) region: String,
    pub(crate) unsigned_headers: BTreeSet<String>,
    pub(crate) uri_escape_path: bool,
    pub(crate) apply_checksum_header: bool,
    pub(crate) signing_algorithm: SigningAlgorithm,
    pub(crate) normalize_path: bool,
    pub(crate) omit_session_token: bool,
    pub(crate) provider: Arc<dyn ProvideCredential<Credential = Credential>>,

    pub(crate) time: Option<DateTime>,
}

impl Signer {
    /// Create a builder for [`Signer`].
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Service name used in the credential scope.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Region used in the credential scope.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Lowercase names of headers left out of signing.
    pub fn unsigned_headers(&self) -> &BTreeSet<String> {
        &self.unsigned_headers
    }

    /// Whether `x-amz-content-sha256` is added to signed requests.
    pub fn apply_checksum_header(&self) -> bool {
        self.apply_checksum_header
    }

    /// Signing algorithm of this signer.
    pub fn signing_algorithm(&self) -> SigningAlgorithm {
        self.signing_algorithm
    }

    /// Whether the session token is sent unsigned.
    pub fn omit_session_token(&self) -> bool {
        self.omit_session_token
    }

    /// Load a usable credential from the provider.
    pub(crate) async fn credential(&self) -> Result<Credential> {
        let cred = self.provider.provide_credential(&self.ctx).await?;
        match cred {
            Some(cred) if cred.is_valid() => Ok(cred),
            _ => Err(Error::credential_missing(
                "unable to sign request without credentials set",
            )),
        }
    }

    /// Signing time when the caller didn't fix one.
    pub(crate) fn now(&self) -> DateTime {
        self.time.unwrap_or_else(now)
    }

    /// Session token to put into the request.
    ///
    /// The token is always sent; `omit_session_token` only keeps it out of
    /// the signature.
    pub(crate) fn session_token<'a>(&self, cred: &'a Credential) -> Option<&'a str> {
        cred.session_token.as_deref().filter(|v| !v.is_empty())
    }

    /// Scope: "20220313/<region>/<service>/aws4_request"
    pub(crate) fn credential_scope(&self, date: &str) -> String {
        let scope = format!("{date}/{}/{}/{AWS4_REQUEST}", self.region, self.service);
        debug!("calculated scope: {scope}");
        scope
    }

    /// Derive the key for `date`, see [`generate_signing_key`].
    pub(crate) fn signing_key(&self, secret: &str, date: &str) -> Vec<u8> {
        generate_signing_key(secret, date, &self.region, &self.service)
    }
}

/// StringToSign:
///
/// ```text
/// AWS4-HMAC-SHA256
/// 20220313T072004Z
/// 20220313/<region>/<service>/aws4_request
/// <hashed_canonical_request>
/// ```
pub(crate) fn string_to_sign(datetime: &str, scope: &str, canonical_request: &str) -> Result<String> {
    let mut f = String::new();
    writeln!(f, "{AWS4_HMAC_SHA256}")?;
    writeln!(f, "{datetime}")?;
    writeln!(f, "{scope}")?;
    write!(f, "{}", hex_sha256(canonical_request.as_bytes()))?;
    debug!("calculated string to sign: {f}");
    Ok(f)
}

/// First eight characters of an ISO 8601 basic datetime.
pub(crate) fn date_of(datetime: &str) -> &str {
    datetime.get(..8).unwrap_or(datetime)
}

/// Derive the signing key:
///
/// ```text
/// kDate = HMAC("AWS4" + secret, date)
/// kRegion = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
pub fn generate_signing_key(secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let secret = format!("AWS4{secret}");
    let sign_date = hmac_sha256(secret.as_bytes(), date.as_bytes());
    let sign_region = hmac_sha256(sign_date.as_slice(), region.as_bytes());
    let sign_service = hmac_sha256(sign_region.as_slice(), service.as_bytes());
    hmac_sha256(sign_service.as_slice(), AWS4_REQUEST.as_bytes())
}

/// Builder for [`Signer`].
///
/// Options not set here fall back to [`Config::default`].
#[derive(Debug, Default)]
pub struct Builder {
    config: Config,
    credential: Option<Credential>,
    provider: Option<Arc<dyn ProvideCredential<Credential = Credential>>>,
    ctx: Option<Context>,
    time: Option<DateTime>,
}

impl Builder {
    /// Replace all options with the given config.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Set the service name, like `s3` or `ec2`.
    pub fn service(mut self, service: &str) -> Self {
        self.config.service = Some(service.to_string());
        self
    }

    /// Set the region, like `us-east-1`.
    pub fn region(mut self, region: &str) -> Self {
        self.config.region = Some(region.to_string());
        self
    }

    /// Set the access key id.
    pub fn access_key_id(mut self, access_key_id: &str) -> Self {
        self.config.access_key_id = Some(access_key_id.to_string());
        self
    }

    /// Set the secret access key.
    pub fn secret_access_key(mut self, secret_access_key: &str) -> Self {
        self.config.secret_access_key = Some(secret_access_key.to_string());
        self
    }

    /// Set the session token used with the access key pair.
    pub fn session_token(mut self, session_token: &str) -> Self {
        self.config.session_token = Some(session_token.to_string());
        self
    }

    /// Use a fixed credential.
    pub fn credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Load credentials from the provider on every signing operation.
    ///
    /// Takes precedence over [`Builder::credential`] and inline keys.
    pub fn credential_provider(
        mut self,
        provider: impl ProvideCredential<Credential = Credential>,
    ) -> Self {
        self.provider = Some(Arc::new(provider));
        self
    }

    /// Add a header name that must not be signed.
    pub fn unsigned_header(mut self, name: &str) -> Self {
        self.config.unsigned_headers.push(name.to_string());
        self
    }

    /// Add header names that must not be signed.
    pub fn unsigned_headers<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.config
            .unsigned_headers
            .extend(names.into_iter().map(|v| v.as_ref().to_string()));
        self
    }

    /// Escape every path segment of the canonical path.
    ///
    /// Disable it for S3, whose paths are signed as sent.
    pub fn uri_escape_path(mut self, enabled: bool) -> Self {
        self.config.uri_escape_path = enabled;
        self
    }

    /// Add `x-amz-content-sha256` to signed requests.
    pub fn apply_checksum_header(mut self, enabled: bool) -> Self {
        self.config.apply_checksum_header = enabled;
        self
    }

    /// Set the signing algorithm.
    pub fn signing_algorithm(mut self, algorithm: SigningAlgorithm) -> Self {
        self.config.signing_algorithm = algorithm;
        self
    }

    /// Remove `.` and `..` segments from the canonical path.
    pub fn normalize_path(mut self, enabled: bool) -> Self {
        self.config.normalize_path = enabled;
        self
    }

    /// Send the session token without signing it.
    ///
    /// The token still goes into the signed headers or presigned url, but
    /// isn't part of the canonical request.
    pub fn omit_session_token(mut self, enabled: bool) -> Self {
        self.config.omit_session_token = enabled;
        self
    }

    /// Context passed to credential providers.
    pub fn context(mut self, ctx: Context) -> Self {
        self.ctx = Some(ctx);
        self
    }

    /// Specify the signing time.
    ///
    /// # Note
    ///
    /// We should always take current time to sign requests.
    /// Only use this function for testing.
    pub fn time(mut self, time: DateTime) -> Self {
        self.time = Some(time);
        self
    }

    /// Build the signer.
    pub fn build(self) -> Result<Signer> {
        let config = self.config;

        let service = config
            .service
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::config_invalid("missing required option: service"))?;
        let region = config.region.filter(|v| !v.is_empty()).ok_or_else(|| {
            Error::region_missing(
                "missing region, set it on the builder or through AWS_REGION",
            )
        })?;

        let provider: Arc<dyn ProvideCredential<Credential = Credential>> =
            if let Some(provider) = self.provider {
                debug!("signer uses configured credential provider");
                provider
            } else if let Some(cred) = self.credential {
                debug!("signer uses static credential");
                Arc::new(StaticCredentialProvider::from(cred))
            } else if config.access_key_id.is_some() || config.secret_access_key.is_some() {
                debug!("signer uses inline access key pair");
                let mut cred = Credential::new(
                    config.access_key_id.as_deref().unwrap_or_default(),
                    config.secret_access_key.as_deref().unwrap_or_default(),
                );
                cred.session_token = config.session_token;
                Arc::new(StaticCredentialProvider::from(cred))
            } else {
                return Err(Error::credential_missing(
                    "missing credentials, provide an access key pair, a credential or a credential provider",
                ));
            };

        if config.signing_algorithm == SigningAlgorithm::SigV4A {
            return Err(Error::unsupported_algorithm(
                "sigv4a requires an accelerated crypto backend which is not available",
            ));
        }

        let unsigned_headers = config
            .unsigned_headers
            .iter()
            .map(|v| v.to_ascii_lowercase())
            .chain(ALWAYS_UNSIGNED_HEADERS.iter().map(|v| v.to_string()))
            .collect();

        Ok(Signer {
            ctx: self.ctx.unwrap_or_default(),
            service,
            region,
            unsigned_headers,
            uri_escape_path: config.uri_escape_path,
            apply_checksum_header: config.apply_checksum_header,
            signing_algorithm: config.signing_algorithm,
            normalize_path: config.normalize_path,
            omit_session_token: config.omit_session_token,
            provider,
            time: self.time,
        })
    }
}
