use crate::{Context, Result};
use log::{debug, warn};
use std::fmt::Debug;
use std::sync::Arc;

/// SigningCredential is the trait used by signer as the signing credential.
pub trait SigningCredential: Clone + Debug + Send + Sync + Unpin + 'static {
    /// Check if the credential carries everything needed to sign.
    fn is_valid(&self) -> bool;
}

impl<T: SigningCredential> SigningCredential for Option<T> {
    fn is_valid(&self) -> bool {
        let Some(cred) = self else {
            return false;
        };

        cred.is_valid()
    }
}

/// ProvideCredential is the trait used by signer to load the credential.
///
/// Signers call it once per signing operation, so implementations that do
/// expensive work (network calls, process spawning) should memoize on their
/// own. Implementations must be safe to call concurrently.
#[async_trait::async_trait]
pub trait ProvideCredential: Debug + Send + Sync + Unpin + 'static {
    /// Credential returned by this provider.
    type Credential: Send + Sync + Unpin + 'static;

    /// Load credential from the given context.
    ///
    /// Returns `Ok(None)` when this provider has nothing to offer.
    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>>;
}

#[async_trait::async_trait]
impl<T: ProvideCredential + ?Sized> ProvideCredential for Arc<T> {
    type Credential = T::Credential;

    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>> {
        self.as_ref().provide_credential(ctx).await
    }
}

/// ProvideCredentialChain tries a list of providers in order.
///
/// The first provider returning `Some` wins. Errors are logged and the next
/// provider is tried.
pub struct ProvideCredentialChain<C> {
    providers: Vec<Arc<dyn ProvideCredential<Credential = C>>>,
}

impl<C> Default for ProvideCredentialChain<C> {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
        }
    }
}

impl<C> Debug for ProvideCredentialChain<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvideCredentialChain")
            .field("providers", &self.providers)
            .finish()
    }
}

impl<C: Send + Sync + Unpin + 'static> ProvideCredentialChain<C> {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider to the end of the chain.
    pub fn push(mut self, provider: impl ProvideCredential<Credential = C>) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    /// Number of providers in the chain.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the chain holds no provider.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[async_trait::async_trait]
impl<C: Send + Sync + Unpin + 'static> ProvideCredential for ProvideCredentialChain<C> {
    type Credential = C;

    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>> {
        for provider in &self.providers {
            match provider.provide_credential(ctx).await {
                Ok(Some(cred)) => {
                    debug!("credential loaded from provider: {provider:?}");
                    return Ok(Some(cred));
                }
                Ok(None) => continue,
                Err(err) => {
                    warn!("credential provider {provider:?} failed: {err:?}");
                    continue;
                }
            }
        }

        Ok(None)
    }
}
