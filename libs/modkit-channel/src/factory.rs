use std::fmt;
use std::sync::Arc;

use crate::address::EndpointAddress;
use crate::binding::{Binding, ChannelContext};
use crate::endpoint::ServiceEndpoint;
use crate::error::ChannelError;
use crate::runtime::ClientRuntime;

/// Long-lived manufacturer of channels for contract `C`.
///
/// Endpoint behaviors are applied once, in [`from_endpoint`](Self::from_endpoint);
/// the resulting runtime is shared read-only by every channel created here.
pub struct ChannelFactory<C: ?Sized> {
    binding: Arc<dyn Binding<C>>,
    endpoint: ServiceEndpoint,
    runtime: Arc<ClientRuntime>,
}

impl<C: ?Sized + 'static> ChannelFactory<C> {
    /// Factory for `address` with no endpoint behaviors.
    ///
    /// # Errors
    /// See [`from_endpoint`](Self::from_endpoint).
    pub fn new(binding: Arc<dyn Binding<C>>, address: EndpointAddress) -> Result<Self, ChannelError> {
        let endpoint = ServiceEndpoint::new(std::any::type_name::<C>(), binding.name(), address);
        Self::from_endpoint(binding, endpoint)
    }

    /// Factory for a fully described (and possibly configured) endpoint.
    ///
    /// # Errors
    /// Returns the first endpoint behavior validation error.
    pub fn from_endpoint(
        binding: Arc<dyn Binding<C>>,
        endpoint: ServiceEndpoint,
    ) -> Result<Self, ChannelError> {
        let runtime = Arc::new(endpoint.build_runtime()?);
        tracing::debug!(
            contract = endpoint.contract(),
            binding = binding.name(),
            address = %endpoint.address(),
            behaviors = endpoint.behavior_count(),
            "channel factory built"
        );
        Ok(Self {
            binding,
            endpoint,
            runtime,
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &ServiceEndpoint {
        &self.endpoint
    }

    #[must_use]
    pub fn runtime(&self) -> &Arc<ClientRuntime> {
        &self.runtime
    }

    /// Create a new, unopened channel connected to `address`.
    ///
    /// # Errors
    /// Whatever the binding raises, unchanged.
    pub fn create_channel(&self, address: &EndpointAddress) -> Result<Arc<C>, ChannelError> {
        self.binding.create_channel(&ChannelContext {
            address,
            endpoint: &self.endpoint,
            runtime: &self.runtime,
        })
    }
}

impl<C: ?Sized + 'static> fmt::Debug for ChannelFactory<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelFactory")
            .field("binding", &self.binding.name())
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}
