//! Mutable endpoint description and the behaviors that extend it.

use std::fmt;
use std::sync::Arc;

use crate::address::EndpointAddress;
use crate::error::ChannelError;
use crate::runtime::ClientRuntime;

/// Extension point installed on a [`ServiceEndpoint`].
///
/// Behaviors are applied once, when the channel factory for the endpoint is
/// built; whatever they add to the [`ClientRuntime`] is shared by every
/// channel the factory creates.
pub trait EndpointBehavior: Send + Sync {
    /// Reject endpoint descriptions the behavior cannot work with.
    ///
    /// # Errors
    /// Returns an error to abort factory construction.
    fn validate(&self, endpoint: &ServiceEndpoint) -> Result<(), ChannelError> {
        let _ = endpoint;
        Ok(())
    }

    /// Install client-side hooks (typically message inspectors).
    fn apply_client_behavior(&self, endpoint: &ServiceEndpoint, runtime: &mut ClientRuntime);
}

/// Description of the endpoint a channel factory connects to.
#[derive(Clone)]
pub struct ServiceEndpoint {
    contract: &'static str,
    binding: String,
    address: EndpointAddress,
    behaviors: Vec<Arc<dyn EndpointBehavior>>,
}

impl ServiceEndpoint {
    pub fn new(contract: &'static str, binding: impl Into<String>, address: EndpointAddress) -> Self {
        Self {
            contract,
            binding: binding.into(),
            address,
            behaviors: Vec::new(),
        }
    }

    #[must_use]
    pub fn contract(&self) -> &'static str {
        self.contract
    }

    #[must_use]
    pub fn binding_name(&self) -> &str {
        &self.binding
    }

    #[must_use]
    pub fn address(&self) -> &EndpointAddress {
        &self.address
    }

    pub fn set_address(&mut self, address: EndpointAddress) {
        self.address = address;
    }

    pub fn add_behavior(&mut self, behavior: Arc<dyn EndpointBehavior>) {
        self.behaviors.push(behavior);
    }

    #[must_use]
    pub fn behavior_count(&self) -> usize {
        self.behaviors.len()
    }

    /// Validate every behavior, then let each one contribute to a fresh
    /// runtime.
    ///
    /// # Errors
    /// Returns the first validation error.
    pub fn build_runtime(&self) -> Result<ClientRuntime, ChannelError> {
        for behavior in &self.behaviors {
            behavior.validate(self)?;
        }

        let mut runtime = ClientRuntime::new();
        for behavior in &self.behaviors {
            behavior.apply_client_behavior(self, &mut runtime);
        }
        Ok(runtime)
    }
}

impl fmt::Debug for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceEndpoint")
            .field("contract", &self.contract)
            .field("binding", &self.binding)
            .field("address", &self.address)
            .field("behaviors", &self.behaviors.len())
            .finish()
    }
}
