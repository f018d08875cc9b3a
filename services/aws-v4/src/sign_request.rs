use std::collections::BTreeMap;
use std::time::Duration;

use awssig_core::hash::hex_hmac_sha256;
use awssig_core::time::{format_iso8601, parse_iso8601, DateTime};
use awssig_core::{Error, Result, SignableRequest};
use http::header::{self, HeaderName};
use http::request::Parts;
use http::uri::PathAndQuery;
use http::{HeaderMap, HeaderValue, Uri};
use log::debug;

use crate::canonical::*;
use crate::config::SigningAlgorithm;
use crate::constants::*;
use crate::signer::{date_of, string_to_sign, Signer};
use crate::Credential;

/// Result of signing a request.
#[derive(Debug, Clone)]
pub struct Signature {
    /// Headers to add to the request: `host`, `x-amz-date`, the session
    /// token header if any, `x-amz-content-sha256` if enabled and
    /// `authorization`.
    pub headers: HeaderMap,
    /// Hex signature.
    pub signature: String,
    /// Canonical request that was signed.
    pub canonical_request: String,
    /// String to sign derived from the canonical request.
    pub string_to_sign: String,
    /// Hex SHA256 of the body, or the value the caller supplied.
    pub content_sha256: String,
}

impl Signature {
    /// Apply the signed headers to a request, replacing existing values.
    pub fn apply(&self, parts: &mut Parts) {
        for (name, value) in self.headers.iter() {
            parts.headers.insert(name.clone(), value.clone());
        }
    }
}

/// Options for [`Signer::presign_url`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PresignOptions {
    /// How long the url stays valid. Defaults to 15 minutes.
    ///
    /// Clamped to the remaining lifetime of the credential if it expires
    /// earlier.
    pub expires_in: Option<Duration>,
    /// Signing time, defaults to now.
    pub time: Option<DateTime>,
}

impl PresignOptions {
    /// Set the expiration.
    pub fn with_expires_in(mut self, expires_in: Duration) -> Self {
        self.expires_in = Some(expires_in);
        self
    }

    /// Set the signing time.
    pub fn with_time(mut self, time: DateTime) -> Self {
        self.time = Some(time);
        self
    }
}

impl Signer {
    /// Sign a request with the `authorization` header.
    ///
    /// The request itself is left untouched, use [`Signature::apply`] to add
    /// the returned headers. A streamed body is hashed and rewound to where
    /// it started.
    pub async fn sign_request(&self, req: &mut SignableRequest<'_>) -> Result<Signature> {
        let cred = self.credential().await?;

        let method = canonical_method(req.method());
        let uri = req.parse_url()?;
        let mut headers = collect_headers(req.headers())?;

        let datetime = match headers.get(X_AMZ_DATE) {
            Some(v) => v.clone(),
            None => format_iso8601(self.now()),
        };
        let date = date_of(&datetime).to_string();
        let content_sha256 = match headers.get(X_AMZ_CONTENT_SHA_256) {
            Some(v) => v.clone(),
            None => req.body_mut().hex_sha256()?,
        };

        let mut sigv4_headers: Vec<(HeaderName, String)> = Vec::with_capacity(5);
        let host = match headers.get(header::HOST.as_str()) {
            Some(v) => v.clone(),
            None => host(&uri),
        };
        sigv4_headers.push((header::HOST, host));
        sigv4_headers.push((HeaderName::from_static(X_AMZ_DATE), datetime.clone()));
        if let Some(token) = self.session_token(&cred) {
            sigv4_headers.push((self.session_token_header(), token.to_string()));
        }
        if self.apply_checksum_header {
            sigv4_headers.push((
                HeaderName::from_static(X_AMZ_CONTENT_SHA_256),
                content_sha256.clone(),
            ));
        }
        for (k, v) in sigv4_headers.iter() {
            if self.omit_session_token && is_session_token_header(k) {
                continue;
            }
            headers.insert(k.as_str().to_string(), v.clone());
        }

        let canonical_request = self.canonical_request(
            &method,
            &uri,
            uri.query().unwrap_or_default(),
            &headers,
            &content_sha256,
        );
        let scope = self.credential_scope(&date);
        let string_to_sign = string_to_sign(&datetime, &scope, &canonical_request)?;
        let signature = hex_hmac_sha256(
            &self.signing_key(&cred.secret_access_key, &date),
            string_to_sign.as_bytes(),
        );

        let mut out = HeaderMap::with_capacity(sigv4_headers.len() + 1);
        for (k, v) in sigv4_headers {
            let mut value = HeaderValue::from_str(&v)?;
            if is_session_token_header(&k) {
                value.set_sensitive(true);
            }
            out.insert(k, value);
        }
        let mut authorization = HeaderValue::from_str(&format!(
            "{AWS4_HMAC_SHA256} Credential={}/{scope}, SignedHeaders={}, Signature={signature}",
            cred.access_key_id,
            signed_headers(&headers, &self.unsigned_headers),
        ))?;
        authorization.set_sensitive(true);
        out.insert(header::AUTHORIZATION, authorization);

        Ok(Signature {
            headers: out,
            signature,
            canonical_request,
            string_to_sign,
            content_sha256,
        })
    }

    /// Build a presigned url for the request.
    ///
    /// The authentication parameters are appended to the url's query,
    /// `X-Amz-Signature` comes last. The path is kept as given.
    pub async fn presign_url(
        &self,
        req: &mut SignableRequest<'_>,
        opts: PresignOptions,
    ) -> Result<Uri> {
        let cred = self.credential().await?;

        let method = canonical_method(req.method());
        let uri = req.parse_url()?;
        let mut headers = collect_headers(req.headers())?;
        headers
            .entry(header::HOST.as_str().to_string())
            .or_insert_with(|| host(&uri));

        let datetime = match headers.get(X_AMZ_DATE) {
            Some(v) => v.clone(),
            None => format_iso8601(opts.time.unwrap_or_else(|| self.now())),
        };
        let date = date_of(&datetime).to_string();
        let content_sha256 = match headers.get(X_AMZ_CONTENT_SHA_256) {
            Some(v) => v.clone(),
            None => req.body_mut().hex_sha256()?,
        };

        let expires_in = self.presign_expiration(&cred, opts.expires_in, &datetime)?;
        let scope = self.credential_scope(&date);

        let mut params: Vec<(&str, String)> = vec![
            (X_AMZ_ALGORITHM_QUERY, AWS4_HMAC_SHA256.to_string()),
            (
                X_AMZ_CREDENTIAL_QUERY,
                format!("{}/{scope}", cred.access_key_id),
            ),
            (X_AMZ_DATE_QUERY, datetime.clone()),
            (X_AMZ_EXPIRES_QUERY, expires_in.to_string()),
        ];
        let session_token = self.session_token(&cred);
        if let Some(token) = session_token.filter(|_| !self.omit_session_token) {
            params.push((self.session_token_query(), token.to_string()));
        }
        params.push((
            X_AMZ_SIGNED_HEADERS_QUERY,
            signed_headers(&headers, &self.unsigned_headers),
        ));
        let params = encode_query_params(&params);

        let query = match uri.query() {
            Some(q) if !q.is_empty() => format!("{q}&{params}"),
            _ => params,
        };

        let canonical_request =
            self.canonical_request(&method, &uri, &query, &headers, &content_sha256);
        let string_to_sign = string_to_sign(&datetime, &scope, &canonical_request)?;
        let signature = hex_hmac_sha256(
            &self.signing_key(&cred.secret_access_key, &date),
            string_to_sign.as_bytes(),
        );

        // An omitted token is sent but not signed.
        let query = match session_token.filter(|_| self.omit_session_token) {
            Some(token) => format!(
                "{query}&{}&{X_AMZ_SIGNATURE_QUERY}={signature}",
                encode_query_params(&[(self.session_token_query(), token.to_string())])
            ),
            None => format!("{query}&{X_AMZ_SIGNATURE_QUERY}={signature}"),
        };
        let mut parts = uri.into_parts();
        let path = parts
            .path_and_query
            .as_ref()
            .map(|v| v.path().to_string())
            .unwrap_or_else(|| "/".to_string());
        parts.path_and_query = Some(PathAndQuery::try_from(format!("{path}?{query}"))?);

        Ok(Uri::from_parts(parts)?)
    }

    /// Canonical request:
    ///
    /// ```text
    /// METHOD
    /// PATH
    /// QUERY
    /// HEADERS
    ///
    /// SIGNED_HEADERS
    /// CONTENT_SHA256
    /// ```
    fn canonical_request(
        &self,
        method: &str,
        uri: &Uri,
        query: &str,
        headers: &BTreeMap<String, String>,
        content_sha256: &str,
    ) -> String {
        let creq = [
            method.to_string(),
            canonical_path(uri, self.normalize_path, self.uri_escape_path),
            canonical_query_string(query),
            canonical_headers(headers, &self.unsigned_headers) + "\n",
            signed_headers(headers, &self.unsigned_headers),
            content_sha256.to_string(),
        ]
        .join("\n");
        debug!("calculated canonical request: {creq}");
        creq
    }

    /// Expiration in seconds, never past the credential's own expiration.
    ///
    /// Credentials already expired at signing time leave the requested
    /// value unchanged.
    fn presign_expiration(
        &self,
        cred: &Credential,
        expires_in: Option<Duration>,
        datetime: &str,
    ) -> Result<u64> {
        let expires_in = expires_in
            .map(|v| v.as_secs())
            .unwrap_or(DEFAULT_PRESIGN_EXPIRES_IN_SECS);
        if cred.expires_in.is_none() {
            return Ok(expires_in);
        }

        let signing_time = parse_iso8601(datetime).map_err(|e| {
            Error::request_invalid(format!("x-amz-date is not a valid datetime: {datetime}"))
                .with_source(e)
        })?;
        match cred.seconds_until_expiration(signing_time) {
            Some(left) => Ok(expires_in.min(left)),
            None => Ok(expires_in),
        }
    }

    fn session_token_header(&self) -> HeaderName {
        match self.signing_algorithm {
            SigningAlgorithm::SigV4S3Express => HeaderName::from_static(X_AMZ_S3_SESSION_TOKEN),
            _ => HeaderName::from_static(X_AMZ_SECURITY_TOKEN),
        }
    }

    fn session_token_query(&self) -> &'static str {
        match self.signing_algorithm {
            SigningAlgorithm::SigV4S3Express => X_AMZ_S3_SESSION_TOKEN_QUERY,
            _ => X_AMZ_SECURITY_TOKEN_QUERY,
        }
    }
}

fn is_session_token_header(name: &HeaderName) -> bool {
    name == X_AMZ_SECURITY_TOKEN || name == X_AMZ_S3_SESSION_TOKEN
}

fn encode_query_params(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", uri_escape(k), uri_escape(v)))
        .collect::<Vec<_>>()
        .join("&")
}
