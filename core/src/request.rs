use std::borrow::Cow;
use std::fmt::Debug;
use std::io::{Read, Seek, SeekFrom};
use std::str::FromStr;

use http::request::Parts;
use http::{HeaderMap, Method, Uri};

use crate::hash::{hex_sha256, hex_sha256_read, EMPTY_SHA256};
use crate::{Error, Result};

/// ReadSeek is a body that can be hashed and then rewound for sending.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Body of a request to sign.
pub enum SignableBody<'a> {
    /// No body at all, hashed as the empty string.
    Empty,
    /// In-memory body.
    Bytes(&'a [u8]),
    /// Seekable body.
    ///
    /// It is hashed from its current position to EOF in bounded chunks and
    /// the position is restored afterwards, so the same reader can be used
    /// to send the body.
    Stream(&'a mut dyn ReadSeek),
    /// Hex digest computed by the caller, or a sentinel such as
    /// `UNSIGNED-PAYLOAD`. Used verbatim.
    Precomputed(Cow<'a, str>),
}

impl Debug for SignableBody<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignableBody::Empty => f.write_str("Empty"),
            SignableBody::Bytes(bs) => write!(f, "Bytes({} bytes)", bs.len()),
            SignableBody::Stream(_) => f.write_str("Stream"),
            SignableBody::Precomputed(v) => f.debug_tuple("Precomputed").field(v).finish(),
        }
    }
}

impl Default for SignableBody<'_> {
    fn default() -> Self {
        SignableBody::Empty
    }
}

impl SignableBody<'_> {
    /// Hex encoded SHA256 of the body.
    pub fn hex_sha256(&mut self) -> Result<String> {
        match self {
            SignableBody::Empty => Ok(EMPTY_SHA256.to_string()),
            SignableBody::Bytes(bs) => Ok(hex_sha256(bs)),
            SignableBody::Precomputed(v) => Ok(v.to_string()),
            SignableBody::Stream(r) => {
                let start = r.stream_position()?;
                let digest = hex_sha256_read(&mut *r)?;
                r.seek(SeekFrom::Start(start))?;
                Ok(digest)
            }
        }
    }
}

/// SignableRequest describes a request to sign without owning it.
///
/// Header names in [`HeaderMap`] are already case-insensitive, header values
/// are left untouched by signing.
#[derive(Debug)]
pub struct SignableRequest<'a> {
    method: Method,
    url: Cow<'a, str>,
    headers: Option<&'a HeaderMap>,
    body: SignableBody<'a>,
}

impl<'a> SignableRequest<'a> {
    /// Create a request without headers and body.
    pub fn new(method: Method, url: impl Into<Cow<'a, str>>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: None,
            body: SignableBody::Empty,
        }
    }

    /// Describe an existing `http` request.
    ///
    /// The body is left empty, set it with [`SignableRequest::with_body`].
    pub fn from_parts(parts: &'a Parts) -> Self {
        Self {
            method: parts.method.clone(),
            url: Cow::Owned(parts.uri.to_string()),
            headers: Some(&parts.headers),
            body: SignableBody::Empty,
        }
    }

    /// Set the request headers.
    pub fn with_headers(mut self, headers: &'a HeaderMap) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Set the request body.
    pub fn with_body(mut self, body: SignableBody<'a>) -> Self {
        self.body = body;
        self
    }

    /// HTTP method of this request.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Raw url of this request.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Headers of this request, if any were given.
    pub fn headers(&self) -> Option<&HeaderMap> {
        self.headers
    }

    /// Mutable access to the body, needed to hash streamed bodies.
    pub fn body_mut(&mut self) -> &mut SignableBody<'a> {
        &mut self.body
    }

    /// Parse the url into an absolute [`Uri`].
    ///
    /// Fails with `RequestInvalid` if the url is empty, and with `UrlInvalid`
    /// if it can't be parsed or lacks a scheme or host.
    pub fn parse_url(&self) -> Result<Uri> {
        if self.url.is_empty() {
            return Err(Error::request_invalid("missing required url"));
        }

        let uri = Uri::from_str(&self.url)?;
        if uri.scheme().is_none() || uri.host().is_none() {
            return Err(Error::url_invalid(format!(
                "url must be absolute to be signed: {}",
                self.url
            )));
        }

        Ok(uri)
    }
}
