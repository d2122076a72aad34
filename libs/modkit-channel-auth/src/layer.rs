use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use http::Request;
use http::header::HeaderName;
use tower::{Layer, Service};

use crate::error::TokenError;
use crate::inspector::{bearer_value, default_header_name};
use crate::source::TokenSource;

/// Tower layer that awaits a [`TokenSource`] and injects the bearer token
/// into outbound HTTP requests.
///
/// This is the async counterpart of
/// [`BearerTokenInspector`](crate::BearerTokenInspector): no blocking bridge
/// is involved, the token future is simply part of the request future.
#[derive(Clone)]
pub struct BearerAuthLayer {
    source: Arc<dyn TokenSource>,
    scope: Arc<str>,
    header_name: HeaderName,
}

impl BearerAuthLayer {
    /// Create a layer that injects `authentication: Bearer <token>` with an
    /// empty scope.
    #[must_use]
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self {
            source,
            scope: Arc::from(""),
            header_name: default_header_name(),
        }
    }

    #[must_use]
    pub fn with_scope(mut self, scope: &str) -> Self {
        self.scope = Arc::from(scope);
        self
    }

    #[must_use]
    pub fn with_header_name(mut self, header_name: HeaderName) -> Self {
        self.header_name = header_name;
        self
    }
}

impl fmt::Debug for BearerAuthLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerAuthLayer")
            .field("scope", &self.scope)
            .field("header_name", &self.header_name)
            .finish_non_exhaustive()
    }
}

impl<S> Layer<S> for BearerAuthLayer {
    type Service = BearerAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        BearerAuthService {
            inner,
            source: Arc::clone(&self.source),
            scope: Arc::clone(&self.scope),
            header_name: self.header_name.clone(),
        }
    }
}

/// Created by [`BearerAuthLayer`].
#[derive(Clone)]
pub struct BearerAuthService<S> {
    inner: S,
    source: Arc<dyn TokenSource>,
    scope: Arc<str>,
    header_name: HeaderName,
}

impl<S: fmt::Debug> fmt::Debug for BearerAuthService<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerAuthService")
            .field("inner", &self.inner)
            .field("scope", &self.scope)
            .field("header_name", &self.header_name)
            .finish_non_exhaustive()
    }
}

/// Error of [`BearerAuthService`].
#[derive(Debug, thiserror::Error)]
pub enum AuthServiceError<E> {
    /// No token; the inner service was not called.
    #[error(transparent)]
    Token(TokenError),
    /// The inner service failed.
    #[error(transparent)]
    Inner(E),
}

impl<S, B> Service<Request<B>> for BearerAuthService<S>
where
    S: Service<Request<B>> + Clone + Send + 'static,
    S::Future: Send,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = AuthServiceError<S::Error>;
    type Future = Pin<Box<dyn Future<Output = Result<S::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(AuthServiceError::Inner)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        // Clone-swap pattern (Tower Service contract).
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let source = Arc::clone(&self.source);
        let scope = Arc::clone(&self.scope);
        let header_name = self.header_name.clone();

        Box::pin(async move {
            let token = source
                .get_token(&scope)
                .await
                .map_err(AuthServiceError::Token)?;
            let value = bearer_value(&token).map_err(AuthServiceError::Token)?;
            req.headers_mut().insert(header_name, value);
            inner.call(req).await.map_err(AuthServiceError::Inner)
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::source::{AccessToken, FnTokenSource, StaticTokenSource};
    use bytes::Bytes;
    use http::{Response, StatusCode};
    use http_body_util::Full;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records the auth header it sees and returns 200 OK.
    #[derive(Clone, Default)]
    struct RecordingService {
        calls: Arc<AtomicUsize>,
        seen: Arc<parking_lot::Mutex<Vec<Option<String>>>>,
        header: Option<HeaderName>,
    }

    impl RecordingService {
        fn header(&self) -> HeaderName {
            self.header.clone().unwrap_or_else(default_header_name)
        }
    }

    impl Service<Request<Full<Bytes>>> for RecordingService {
        type Response = Response<Full<Bytes>>;
        type Error = Infallible;
        type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

        fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let value = req
                .headers()
                .get(self.header())
                .map(|v| v.to_str().unwrap().to_owned());
            self.seen.lock().push(value);
            Box::pin(async {
                Ok(Response::builder()
                    .status(StatusCode::OK)
                    .body(Full::new(Bytes::new()))
                    .unwrap())
            })
        }
    }

    fn request() -> Request<Full<Bytes>> {
        Request::builder()
            .uri("http://echo.internal/svc")
            .body(Full::new(Bytes::from_static(b"ping")))
            .unwrap()
    }

    #[test]
    fn bearer_auth_is_send_sync_clone() {
        fn assert_traits<T: Send + Sync + Clone>() {}
        assert_traits::<BearerAuthLayer>();
        assert_traits::<BearerAuthService<RecordingService>>();
    }

    #[tokio::test]
    async fn injects_bearer_header() {
        let inner = RecordingService::default();
        let mut svc = BearerAuthLayer::new(Arc::new(StaticTokenSource::new("abc123")))
            .layer(inner.clone());

        let resp = svc.call(request()).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(*inner.seen.lock(), vec![Some("Bearer abc123".to_owned())]);
    }

    #[tokio::test]
    async fn custom_header_and_scope() {
        let inner = RecordingService {
            header: Some(http::header::AUTHORIZATION),
            ..RecordingService::default()
        };
        let source = FnTokenSource::new(|scope: String| async move {
            Ok(AccessToken::new(format!("tok-{scope}")))
        });
        let mut svc = BearerAuthLayer::new(Arc::new(source))
            .with_scope("orders.write")
            .with_header_name(http::header::AUTHORIZATION)
            .layer(inner.clone());

        svc.call(request()).await.unwrap();

        assert_eq!(
            *inner.seen.lock(),
            vec![Some("Bearer tok-orders.write".to_owned())]
        );
    }

    #[tokio::test]
    async fn token_failure_never_reaches_inner_service() {
        let inner = RecordingService::default();
        let source = FnTokenSource::new(|_scope: String| async {
            Err(TokenError::provider("idp returned 503"))
        });
        let mut svc = BearerAuthLayer::new(Arc::new(source)).layer(inner.clone());

        let err = svc.call(request()).await.unwrap_err();

        assert!(matches!(err, AuthServiceError::Token(TokenError::Provider(_))));
        assert_eq!(err.to_string(), "idp returned 503");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn existing_header_is_overwritten() {
        let inner = RecordingService::default();
        let mut svc = BearerAuthLayer::new(Arc::new(StaticTokenSource::new("fresh")))
            .layer(inner.clone());
        let mut req = request();
        req.headers_mut().insert(
            default_header_name(),
            http::HeaderValue::from_static("Bearer stale"),
        );

        svc.call(req).await.unwrap();

        assert_eq!(*inner.seen.lock(), vec![Some("Bearer fresh".to_owned())]);
    }

    #[test]
    fn error_is_transparent_over_both_sides() {
        let token: AuthServiceError<std::io::Error> =
            AuthServiceError::Token(TokenError::Unavailable("worker stopped".to_owned()));
        assert_eq!(token.to_string(), "token unavailable: worker stopped");

        let inner: AuthServiceError<std::io::Error> =
            AuthServiceError::Inner(std::io::Error::other("reset"));
        assert_eq!(inner.to_string(), "reset");
        assert!(std::error::Error::source(&inner).is_none());
    }
}
