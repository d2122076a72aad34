use std::fmt;
use std::sync::Arc;

use crate::address::EndpointAddress;
use crate::channel::{RequestTransport, ServiceChannel};
use crate::endpoint::ServiceEndpoint;
use crate::error::ChannelError;
use crate::runtime::ClientRuntime;

/// Everything a binding needs to manufacture one channel.
#[derive(Debug, Clone, Copy)]
pub struct ChannelContext<'a> {
    pub address: &'a EndpointAddress,
    pub endpoint: &'a ServiceEndpoint,
    pub runtime: &'a Arc<ClientRuntime>,
}

/// Transport/binding variant that produces channels for contract `C`.
///
/// The channel factory is agnostic to which variant it receives.
pub trait Binding<C: ?Sized>: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Create a new channel in the `Created` state.
    ///
    /// # Errors
    /// Transport errors, propagated unchanged to the handle's caller.
    fn create_channel(&self, ctx: &ChannelContext<'_>) -> Result<Arc<C>, ChannelError>;
}

type TransportCtor =
    dyn Fn(&EndpointAddress) -> Result<Box<dyn RequestTransport>, ChannelError> + Send + Sync;
type ProxyCtor<C> = dyn Fn(ServiceChannel) -> Arc<C> + Send + Sync;

/// Binding that wraps a [`ServiceChannel`] over a caller-supplied transport
/// into a contract proxy.
pub struct ProxyBinding<C: ?Sized> {
    name: String,
    transport: Arc<TransportCtor>,
    proxy: Arc<ProxyCtor<C>>,
}

impl<C: ?Sized + 'static> ProxyBinding<C> {
    pub fn new<T, P>(name: impl Into<String>, transport: T, proxy: P) -> Self
    where
        T: Fn(&EndpointAddress) -> Result<Box<dyn RequestTransport>, ChannelError>
            + Send
            + Sync
            + 'static,
        P: Fn(ServiceChannel) -> Arc<C> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            transport: Arc::new(transport),
            proxy: Arc::new(proxy),
        }
    }
}

impl<C: ?Sized + 'static> Binding<C> for ProxyBinding<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_channel(&self, ctx: &ChannelContext<'_>) -> Result<Arc<C>, ChannelError> {
        let transport = (self.transport)(ctx.address)?;
        let channel = ServiceChannel::new(
            ctx.endpoint.contract(),
            ctx.address.clone(),
            Arc::clone(ctx.runtime),
            transport,
        );
        Ok((self.proxy)(channel))
    }
}

impl<C: ?Sized> fmt::Debug for ProxyBinding<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyBinding")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
