//! Endpoint behavior that installs [`BearerTokenInspector`] on a client runtime.

use std::sync::Arc;

use http::HeaderName;

use modkit_channel::{
    AuthSettings, ChannelError, ClientRuntime, ConfigureEndpoint, EndpointBehavior,
    ServiceEndpoint, configure_endpoint,
};

use crate::bridge::TokenBridge;
use crate::error::TokenError;
use crate::inspector::{BearerTokenInspector, default_header_name};
use crate::source::{TokenSource, TokenSourceFactory, shared_source};

/// Adds bearer token injection to every channel created for an endpoint.
///
/// The factory is called once per application, when the channel factory is
/// built; all channels of the endpoint share the resulting inspector and the
/// behavior's [`TokenBridge`].
pub struct BearerTokenBehavior {
    factory: TokenSourceFactory,
    bridge: Arc<TokenBridge>,
    scope: String,
    header: HeaderName,
}

impl BearerTokenBehavior {
    #[must_use]
    pub fn new(factory: TokenSourceFactory) -> Self {
        Self {
            factory,
            bridge: Arc::new(TokenBridge::new()),
            scope: String::new(),
            header: default_header_name(),
        }
    }

    /// Shorthand for a behavior over a single shared source.
    #[must_use]
    pub fn with_source(source: Arc<dyn TokenSource>) -> Self {
        Self::new(shared_source(source))
    }

    /// Build from configured [`AuthSettings`].
    ///
    /// # Errors
    /// Returns [`TokenError::InvalidHeaderName`] if the configured header is
    /// not a valid HTTP header name.
    pub fn from_settings(
        settings: &AuthSettings,
        factory: TokenSourceFactory,
    ) -> Result<Self, TokenError> {
        let mut behavior = Self::new(factory).with_scope(settings.scope.clone());
        if let Some(header) = &settings.header {
            behavior = behavior.with_header_name(HeaderName::try_from(header.as_str())?);
        }
        Ok(behavior)
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

    /// Share an existing bridge instead of starting a dedicated one.
    #[must_use]
    pub fn with_bridge(mut self, bridge: Arc<TokenBridge>) -> Self {
        self.bridge = bridge;
        self
    }
}

impl EndpointBehavior for BearerTokenBehavior {
    fn apply_client_behavior(&self, endpoint: &ServiceEndpoint, runtime: &mut ClientRuntime) {
        let inspector = BearerTokenInspector::new((self.factory)(), Arc::clone(&self.bridge))
            .with_scope(self.scope.clone())
            .with_header_name(self.header.clone());
        runtime.add_message_inspector(Arc::new(inspector));
        tracing::debug!(
            contract = endpoint.contract(),
            header = %self.header,
            "bearer token inspector installed"
        );
    }
}

impl std::fmt::Debug for BearerTokenBehavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerTokenBehavior")
            .field("scope", &self.scope)
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

/// Rejects the endpoint so that a missing token source fails factory
/// construction instead of sending unauthenticated requests.
struct MissingTokenSource(ChannelError);

impl EndpointBehavior for MissingTokenSource {
    fn validate(&self, _endpoint: &ServiceEndpoint) -> Result<(), ChannelError> {
        Err(ChannelError::interceptor(self.0.to_string()))
    }

    fn apply_client_behavior(&self, _endpoint: &ServiceEndpoint, _runtime: &mut ClientRuntime) {}
}

/// Configuration callback that adds a [`BearerTokenBehavior`] over `factory`.
#[must_use]
pub fn bearer_auth(factory: TokenSourceFactory) -> ConfigureEndpoint {
    configure_endpoint(move |_, endpoint| {
        endpoint.add_behavior(Arc::new(BearerTokenBehavior::new(Arc::clone(&factory))));
    })
}

/// Configuration callback that resolves `dyn TokenSource` from the registry
/// when the factory is built.
///
/// If no source is provided the factory build fails.
#[must_use]
pub fn bearer_auth_from_registry(scope: impl Into<String>) -> ConfigureEndpoint {
    let scope = scope.into();
    configure_endpoint(move |registry, endpoint| {
        match registry.resolve::<dyn TokenSource>() {
            Ok(source) => endpoint.add_behavior(Arc::new(
                BearerTokenBehavior::with_source(source).with_scope(scope.clone()),
            )),
            Err(e) => {
                tracing::error!(contract = endpoint.contract(), error = %e, "no token source provided");
                endpoint.add_behavior(Arc::new(MissingTokenSource(e)));
            }
        }
    })
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::source::StaticTokenSource;
    use modkit_channel::{EndpointAddress, RequestMessage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn endpoint() -> ServiceEndpoint {
        ServiceEndpoint::new(
            "dyn Echo",
            "test",
            EndpointAddress::parse("https://echo.internal/svc").unwrap(),
        )
    }

    #[test]
    fn installs_one_inspector_per_application() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let factory: TokenSourceFactory = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Arc::new(StaticTokenSource::new("abc123")) as Arc<dyn TokenSource>
        });
        let mut endpoint = endpoint();
        endpoint.add_behavior(Arc::new(BearerTokenBehavior::new(factory)));

        let runtime = endpoint.build_runtime().unwrap();

        assert_eq!(runtime.inspector_count(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn from_settings_applies_scope_and_header() {
        let settings = AuthSettings {
            scope: "billing.read".to_owned(),
            header: Some("Authorization".to_owned()),
        };
        let behavior = BearerTokenBehavior::from_settings(
            &settings,
            shared_source(Arc::new(StaticTokenSource::new("abc123"))),
        )
        .unwrap();
        let mut endpoint = endpoint();
        endpoint.add_behavior(Arc::new(behavior));

        let runtime = endpoint.build_runtime().unwrap();
        let mut request = RequestMessage::new("urn:echo/Ping", "ping");
        runtime.before_send(&mut request).unwrap();

        let headers = request.http_headers().unwrap();
        assert_eq!(headers[http::header::AUTHORIZATION], "Bearer abc123");
    }

    #[test]
    fn from_settings_rejects_bad_header_name() {
        let settings = AuthSettings {
            scope: String::new(),
            header: Some("bad header".to_owned()),
        };

        let err = BearerTokenBehavior::from_settings(
            &settings,
            shared_source(Arc::new(StaticTokenSource::new("abc123"))),
        )
        .unwrap_err();

        assert!(matches!(err, TokenError::InvalidHeaderName(_)));
    }
}
