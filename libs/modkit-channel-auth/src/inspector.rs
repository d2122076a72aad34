//! Message inspector that attaches a bearer token to every outgoing request.

use std::sync::Arc;

use http::{HeaderName, HeaderValue};
use zeroize::Zeroizing;

use modkit_channel::{
    ChannelError, ClientMessageInspector, CorrelationState, HttpRequestProperty, RequestMessage,
};

use crate::bridge::TokenBridge;
use crate::error::TokenError;
use crate::source::{AccessToken, TokenSource};

/// Header the token is written to unless configured otherwise.
pub const DEFAULT_HEADER: &str = "authentication";

pub(crate) fn default_header_name() -> HeaderName {
    HeaderName::from_static(DEFAULT_HEADER)
}

/// Build `Bearer <token>` as a sensitive header value.
///
/// The formatted string is zeroized once the value has been built.
pub(crate) fn bearer_value(token: &AccessToken) -> Result<HeaderValue, TokenError> {
    let raw = Zeroizing::new(format!("Bearer {}", token.expose()));
    let mut value = HeaderValue::from_str(&raw).map_err(|_| TokenError::InvalidHeaderValue)?;
    value.set_sensitive(true);
    Ok(value)
}

/// Pre-send hook: fetch a token, then set `<header>: Bearer <token>` on the
/// request's HTTP property bag, creating the bag when absent.
///
/// Fails closed. If the token cannot be obtained the request is left
/// untouched and the error aborts the send.
pub struct BearerTokenInspector {
    source: Arc<dyn TokenSource>,
    bridge: Arc<TokenBridge>,
    scope: String,
    header: HeaderName,
}

impl BearerTokenInspector {
    #[must_use]
    pub fn new(source: Arc<dyn TokenSource>, bridge: Arc<TokenBridge>) -> Self {
        Self {
            source,
            bridge,
            scope: String::new(),
            header: default_header_name(),
        }
    }

    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    #[must_use]
    pub fn with_header_name(mut self, header: HeaderName) -> Self {
        self.header = header;
        self
    }

    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    #[must_use]
    pub fn header_name(&self) -> &HeaderName {
        &self.header
    }
}

impl ClientMessageInspector for BearerTokenInspector {
    fn before_send_request(
        &self,
        request: &mut RequestMessage,
    ) -> Result<CorrelationState, ChannelError> {
        let token = self
            .bridge
            .acquire(Arc::clone(&self.source), &self.scope)
            .inspect_err(|e| {
                tracing::warn!(action = %request.action, error = %e, "bearer token unavailable");
            })?;
        let value = bearer_value(&token)?;

        HttpRequestProperty::get_or_insert(&mut request.properties)
            .headers
            .insert(self.header.clone(), value);
        tracing::trace!(action = %request.action, header = %self.header, "bearer token attached");

        Ok(None)
    }
}

impl std::fmt::Debug for BearerTokenInspector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerTokenInspector")
            .field("scope", &self.scope)
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}
