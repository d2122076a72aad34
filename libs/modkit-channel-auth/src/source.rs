//! Pluggable bearer token sources.
//!
//! Caching and refresh are the source's concern; the interceptor asks for a
//! token on every request.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::TokenError;

/// Opaque bearer credential.
///
/// `Debug` and `Display` print `[REDACTED]`; the buffer is zeroed on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AccessToken(String);

impl AccessToken {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Raw token value. Do not log or persist it.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Capability that yields a bearer token for a scope.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// # Errors
    /// Any failure to produce a token; it aborts the request being sent.
    async fn get_token(&self, scope: &str) -> Result<AccessToken, TokenError>;
}

/// Produces the token source each installed inspector uses.
pub type TokenSourceFactory = Arc<dyn Fn() -> Arc<dyn TokenSource> + Send + Sync>;

/// Factory that always hands out the same shared source.
#[must_use]
pub fn shared_source(source: Arc<dyn TokenSource>) -> TokenSourceFactory {
    Arc::new(move || Arc::clone(&source))
}

/// Token source backed by an async closure taking the scope.
pub struct FnTokenSource<F> {
    fetch: F,
}

impl<F, Fut> FnTokenSource<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<AccessToken, TokenError>> + Send,
{
    #[must_use]
    pub fn new(fetch: F) -> Self {
        Self { fetch }
    }
}

#[async_trait]
impl<F, Fut> TokenSource for FnTokenSource<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<AccessToken, TokenError>> + Send,
{
    async fn get_token(&self, scope: &str) -> Result<AccessToken, TokenError> {
        (self.fetch)(scope.to_owned()).await
    }
}

impl<F> fmt::Debug for FnTokenSource<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTokenSource").finish_non_exhaustive()
    }
}

/// Token source that returns one fixed token regardless of scope.
#[derive(Clone, Debug)]
pub struct StaticTokenSource(AccessToken);

impl StaticTokenSource {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(AccessToken::new(token))
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn get_token(&self, _scope: &str) -> Result<AccessToken, TokenError> {
        Ok(self.0.clone())
    }
}
