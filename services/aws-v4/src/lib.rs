//! AWS SigV4 signer.
//!
//! Signs http requests with the `authorization` header, builds presigned
//! urls and signs event stream messages.
//!
//! ## Example
//!
//! ```no_run
//! use awssig_core::{Result, SignableBody, SignableRequest};
//! use awssig_v4::Signer;
//! use http::Method;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let signer = Signer::builder()
//!         .service("s3")
//!         .region("us-east-1")
//!         .access_key_id("access_key_id")
//!         .secret_access_key("secret_access_key")
//!         .uri_escape_path(false)
//!         .build()?;
//!
//!     let (mut parts, body) = http::Request::put("https://examplebucket.s3.amazonaws.com/hello.txt")
//!         .body(b"Hello, World!".to_vec())?
//!         .into_parts();
//!
//!     let signature = {
//!         let mut req = SignableRequest::from_parts(&parts).with_body(SignableBody::Bytes(&body));
//!         signer.sign_request(&mut req).await?
//!     };
//!     signature.apply(&mut parts);
//!
//!     let _req = http::Request::from_parts(parts, body);
//!     Ok(())
//! }
//! ```

// Make sure all our public APIs have docs.
#![warn(missing_docs)]

mod canonical;
pub use canonical::{uri_escape, uri_escape_path};

mod config;
pub use config::{Config, SigningAlgorithm};

mod constants;
pub use constants::UNSIGNED_PAYLOAD;

mod credential;
pub use credential::Credential;

mod provide_credential;
pub use provide_credential::{EnvCredentialProvider, StaticCredentialProvider};

mod signer;
pub use signer::{generate_signing_key, Builder, Signer};

mod sign_request;
pub use sign_request::{PresignOptions, Signature};

mod event_stream;
pub use event_stream::{EncodeHeaders, EventHeader, EventHeaderValue, EventStreamEncoder};
