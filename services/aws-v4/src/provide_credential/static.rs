use crate::Credential;
use async_trait::async_trait;
use awssig_core::{Context, ProvideCredential, Result};

/// StaticCredentialProvider provides static AWS credentials.
///
/// Used when the access key pair, or a whole [`Credential`], is handed over
/// directly. Every call returns the same value.
#[derive(Debug, Clone)]
pub struct StaticCredentialProvider {
    credential: Credential,
}

impl StaticCredentialProvider {
    /// Create a new StaticCredentialProvider with access key ID and secret access key.
    pub fn new(access_key_id: &str, secret_access_key: &str) -> Self {
        Self {
            credential: Credential::new(access_key_id, secret_access_key),
        }
    }

    /// Set the session token.
    pub fn with_session_token(mut self, token: &str) -> Self {
        self.credential.session_token = Some(token.to_string());
        self
    }
}

impl From<Credential> for StaticCredentialProvider {
    fn from(credential: Credential) -> Self {
        Self { credential }
    }
}

#[async_trait]
impl ProvideCredential for StaticCredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, _: &Context) -> Result<Option<Self::Credential>> {
        Ok(Some(self.credential.clone()))
    }
}
