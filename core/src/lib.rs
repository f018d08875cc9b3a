//! Core components for AWS Signature Version 4 signing.
//!
//! This crate provides the service independent building blocks used by
//! `awssig-v4`. It defines the abstractions a signer needs without knowing
//! anything about the signing protocol itself.
//!
//! ## Overview
//!
//! - **Context**: A container that holds the environment implementation used by credential providers
//! - **Traits**: Abstract interfaces for credential loading (`ProvideCredential`) and credential validation (`SigningCredential`)
//! - **Request**: A borrowed description of the request to sign (`SignableRequest`, `SignableBody`)
//!
//! ## Example
//!
//! ```
//! use awssig_core::{Context, ProvideCredential, Result, SigningCredential};
//! use async_trait::async_trait;
//!
//! #[derive(Clone, Debug)]
//! struct MyCredential {
//!     key: String,
//!     secret: String,
//! }
//!
//! impl SigningCredential for MyCredential {
//!     fn is_valid(&self) -> bool {
//!         !self.key.is_empty() && !self.secret.is_empty()
//!     }
//! }
//!
//! #[derive(Debug)]
//! struct MyProvider;
//!
//! #[async_trait]
//! impl ProvideCredential for MyProvider {
//!     type Credential = MyCredential;
//!
//!     async fn provide_credential(&self, _: &Context) -> Result<Option<Self::Credential>> {
//!         Ok(Some(MyCredential {
//!             key: "my-access-key".to_string(),
//!             secret: "my-secret-key".to_string(),
//!         }))
//!     }
//! }
//! ```
//!
//! ## Utilities
//!
//! - [`hash`]: SHA256 and HMAC-SHA256 helpers
//! - [`time`]: Time formatting helpers
//! - [`utils`]: Data redaction for debug output

// Make sure all our public APIs have docs.
#![warn(missing_docs)]

pub mod hash;
pub mod time;
pub mod utils;

mod context;
pub use context::{Context, Env, NoopEnv, OsEnv, StaticEnv};

mod error;
pub use error::{Error, ErrorKind, Result};

mod api;
pub use api::{ProvideCredential, ProvideCredentialChain, SigningCredential};

mod request;
pub use request::{ReadSeek, SignableBody, SignableRequest};
