use std::fmt;
use thiserror::Error;

/// The error type for signing operations
#[derive(Error, Debug)]
#[error("{kind}: {message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<anyhow::Error>,
}

/// The kind of error that occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Required configuration is absent or malformed (service name, etc.)
    ConfigInvalid,

    /// No region was configured for the signer
    RegionMissing,

    /// No usable credentials: none configured, or the access key / secret is empty
    CredentialMissing,

    /// The requested signing algorithm is not available in this build
    UnsupportedAlgorithm,

    /// The request URL could not be parsed
    UrlInvalid,

    /// Request cannot be signed (missing required fields, etc.)
    RequestInvalid,

    /// Unexpected errors (I/O while reading a body, etc.)
    Unexpected,
}

impl Error {
    /// Create a new error with the given kind and message
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Add a source error
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Get the error message without the kind prefix
    pub fn message(&self) -> &str {
        &self.message
    }
}

// Convenience constructors
impl Error {
    /// Create a config invalid error
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigInvalid, message)
    }

    /// Create a region missing error
    pub fn region_missing(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RegionMissing, message)
    }

    /// Create a credential missing error
    pub fn credential_missing(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CredentialMissing, message)
    }

    /// Create an unsupported algorithm error
    pub fn unsupported_algorithm(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedAlgorithm, message)
    }

    /// Create a url invalid error
    pub fn url_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UrlInvalid, message)
    }

    /// Create a request invalid error
    pub fn request_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RequestInvalid, message)
    }

    /// Create an unexpected error
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unexpected, message)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::ConfigInvalid => write!(f, "invalid configuration"),
            ErrorKind::RegionMissing => write!(f, "missing region"),
            ErrorKind::CredentialMissing => write!(f, "missing credentials"),
            ErrorKind::UnsupportedAlgorithm => write!(f, "unsupported signing algorithm"),
            ErrorKind::UrlInvalid => write!(f, "invalid url"),
            ErrorKind::RequestInvalid => write!(f, "invalid request"),
            ErrorKind::Unexpected => write!(f, "unexpected error"),
        }
    }
}

/// Convenience type alias for Results
pub type Result<T> = std::result::Result<T, Error>;

// Common From implementations
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::unexpected(err.to_string()).with_source(err)
    }
}

impl From<std::fmt::Error> for Error {
    fn from(err: std::fmt::Error) -> Self {
        Self::unexpected(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::unexpected(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::Error> for Error {
    fn from(err: http::Error) -> Self {
        Self::request_invalid(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::header::InvalidHeaderValue> for Error {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        Self::request_invalid(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::header::InvalidHeaderName> for Error {
    fn from(err: http::header::InvalidHeaderName) -> Self {
        Self::request_invalid(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::header::ToStrError> for Error {
    fn from(err: http::header::ToStrError) -> Self {
        Self::request_invalid(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::uri::InvalidUri> for Error {
    fn from(err: http::uri::InvalidUri) -> Self {
        Self::url_invalid(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::uri::InvalidUriParts> for Error {
    fn from(err: http::uri::InvalidUriParts) -> Self {
        Self::url_invalid(err.to_string()).with_source(anyhow::Error::from(err))
    }
}
