//! Bearer token injection through a registered service channel.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use http::HeaderMap;
use parking_lot::Mutex;

use modkit_channel::{
    ChannelError, ChannelProxy, ChannelRegistry, ClientChannel, CommunicationState,
    ConfigureEndpoint, EndpointAddress, ProxyBinding, ReplyMessage, RequestMessage,
    RequestTransport, ServiceChannel, configure_endpoint,
};
use modkit_channel_auth::{
    AccessToken, FnTokenSource, StaticTokenSource, TokenError, TokenSource, bearer_auth,
    bearer_auth_from_registry, shared_source,
};

trait Orders: ClientChannel {
    fn place(&self, sku: &str) -> Result<(), ChannelError>;
}

struct OrdersProxy(ServiceChannel);

impl ChannelProxy for OrdersProxy {
    fn service_channel(&self) -> &ServiceChannel {
        &self.0
    }
}

impl Orders for OrdersProxy {
    fn place(&self, sku: &str) -> Result<(), ChannelError> {
        self.0.request("urn:orders/Place", sku.to_owned()).map(|_| ())
    }
}

#[derive(Default)]
struct Wire {
    sent: Mutex<Vec<HeaderMap>>,
    requests: AtomicUsize,
}

struct CapturingTransport(Arc<Wire>);

impl RequestTransport for CapturingTransport {
    fn open(&self, _address: &EndpointAddress) -> Result<(), ChannelError> {
        Ok(())
    }

    fn request(&self, request: RequestMessage) -> Result<ReplyMessage, ChannelError> {
        self.0.requests.fetch_add(1, Ordering::SeqCst);
        self.0
            .sent
            .lock()
            .push(request.http_headers().cloned().unwrap_or_default());
        Ok(ReplyMessage::new(request.action, "ok"))
    }

    fn close(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    fn abort(&self) {}
}

fn registry(wire: &Arc<Wire>, auth: ConfigureEndpoint) -> ChannelRegistry {
    let registry = ChannelRegistry::new();
    let wire = Arc::clone(wire);
    let binding = ProxyBinding::<dyn Orders>::new(
        "capture",
        move |_address| {
            let transport: Box<dyn RequestTransport> = Box::new(CapturingTransport(wire.clone()));
            Ok(transport)
        },
        |channel| {
            let proxy: Arc<dyn Orders> = Arc::new(OrdersProxy(channel));
            proxy
        },
    );
    registry
        .register_client::<dyn Orders>(Arc::new(binding), "https://orders.internal/svc", Some(auth))
        .unwrap();
    registry
}

fn static_auth(token: &str) -> ConfigureEndpoint {
    bearer_auth(shared_source(Arc::new(StaticTokenSource::new(token))))
}

/// Fails while `down` is set, then hands out `abc123`.
struct FlakyIdp {
    down: AtomicBool,
}

#[async_trait::async_trait]
impl TokenSource for FlakyIdp {
    async fn get_token(&self, _scope: &str) -> Result<AccessToken, TokenError> {
        if self.down.load(Ordering::SeqCst) {
            Err(TokenError::provider("identity provider unavailable"))
        } else {
            Ok(AccessToken::new("abc123"))
        }
    }
}

#[test]
fn attaches_authentication_header() -> anyhow::Result<()> {
    let wire = Arc::new(Wire::default());
    let registry = registry(&wire, static_auth("abc123"));

    let client = registry.create_client::<dyn Orders>()?;
    client.channel()?.place("sku-1")?;

    let sent = wire.sent.lock();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["authentication"], "Bearer abc123");
    assert!(sent[0]["authentication"].is_sensitive());
    Ok(())
}

#[test]
fn failing_source_blocks_the_request_but_not_the_channel() {
    let wire = Arc::new(Wire::default());
    let idp = Arc::new(FlakyIdp {
        down: AtomicBool::new(true),
    });
    let source: Arc<dyn TokenSource> = Arc::<FlakyIdp>::clone(&idp);
    let registry = registry(&wire, bearer_auth(shared_source(source)));

    let client = registry.create_client::<dyn Orders>().unwrap();
    let orders = client.channel().unwrap();

    let err = orders.place("sku-1").unwrap_err();
    assert!(matches!(err, ChannelError::Interceptor(_)));
    assert_eq!(err.to_string(), "identity provider unavailable");
    assert_eq!(wire.requests.load(Ordering::SeqCst), 0);
    assert_eq!(orders.state(), CommunicationState::Opened);

    idp.down.store(false, Ordering::SeqCst);
    orders.place("sku-1").unwrap();

    let sent = wire.sent.lock();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["authentication"], "Bearer abc123");
}

#[test]
fn fresh_token_is_fetched_for_every_request() {
    let wire = Arc::new(Wire::default());
    let issued = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&issued);
    let source: Arc<dyn TokenSource> = Arc::new(FnTokenSource::new(move |_scope: String| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        async move { Ok(AccessToken::new(format!("tok-{n}"))) }
    }));
    let registry = registry(&wire, bearer_auth(shared_source(source)));

    let client = registry.create_client::<dyn Orders>().unwrap();
    let orders = client.channel().unwrap();
    orders.place("a").unwrap();
    orders.place("b").unwrap();

    let sent = wire.sent.lock();
    assert_eq!(sent[0]["authentication"], "Bearer tok-0");
    assert_eq!(sent[1]["authentication"], "Bearer tok-1");
}

#[tokio::test(flavor = "current_thread")]
async fn usable_from_a_current_thread_runtime() {
    let wire = Arc::new(Wire::default());
    let source: Arc<dyn TokenSource> = Arc::new(FnTokenSource::new(|_scope: String| async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(AccessToken::new("abc123"))
    }));
    let registry = registry(&wire, bearer_auth(shared_source(source)));

    let client = registry.create_client::<dyn Orders>().unwrap();
    client.channel().unwrap().place("sku-1").unwrap();
    client.dispose_async().await;

    assert_eq!(wire.sent.lock()[0]["authentication"], "Bearer abc123");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn usable_from_a_multi_thread_runtime() {
    let wire = Arc::new(Wire::default());
    let registry = Arc::new(registry(&wire, static_auth("abc123")));

    let tasks: Vec<_> = (0..4)
        .map(|i| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                let client = registry.create_client::<dyn Orders>().unwrap();
                client.channel().unwrap().place(&format!("sku-{i}")).unwrap();
                client.dispose_async().await;
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let sent = wire.sent.lock();
    assert_eq!(sent.len(), 4);
    assert!(sent.iter().all(|h| h["authentication"] == "Bearer abc123"));
}

#[test]
fn token_source_can_come_from_the_registry() {
    let wire = Arc::new(Wire::default());
    let registry = registry(&wire, bearer_auth_from_registry("orders.write"));
    let source: Arc<dyn TokenSource> = Arc::new(FnTokenSource::new(|scope: String| async move {
        Ok(AccessToken::new(format!("tok-{scope}")))
    }));
    registry.provide::<dyn TokenSource>(source);

    registry
        .create_client::<dyn Orders>()
        .unwrap()
        .channel()
        .unwrap()
        .place("sku-1")
        .unwrap();

    assert_eq!(
        wire.sent.lock()[0]["authentication"],
        "Bearer tok-orders.write"
    );
}

#[test]
fn missing_registry_source_fails_closed() {
    let wire = Arc::new(Wire::default());
    let registry = registry(&wire, bearer_auth_from_registry(""));

    let err = registry.create_client::<dyn Orders>().err().unwrap();

    assert!(matches!(err, ChannelError::FactoryUnavailable { .. }));
    assert!(err.to_string().contains("TokenSource"));
    assert_eq!(wire.requests.load(Ordering::SeqCst), 0);
}

#[test]
fn panicking_callback_never_yields_an_unauthenticated_client() {
    let wire = Arc::new(Wire::default());
    let registry = registry(
        &wire,
        configure_endpoint(|_, _| panic!("misconfigured endpoint")),
    );
    assert!(registry.configure_client::<dyn Orders>(static_auth("abc123")));

    let unwound = panic::catch_unwind(AssertUnwindSafe(|| {
        registry.create_client::<dyn Orders>().map(drop)
    }));
    assert!(unwound.is_err());

    let err = registry.create_client::<dyn Orders>().err().unwrap();

    assert!(matches!(err, ChannelError::FactoryUnavailable { .. }));
    assert_eq!(wire.requests.load(Ordering::SeqCst), 0);
    assert!(wire.sent.lock().is_empty());
}
