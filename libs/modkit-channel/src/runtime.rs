//! Client-side message pipeline.
//!
//! Every outgoing request passes through the inspectors registered on the
//! endpoint's [`ClientRuntime`] before it reaches the transport, and every
//! reply passes back through them after it is received.

use std::any::Any;
use std::sync::Arc;

use crate::error::ChannelError;
use crate::message::{ReplyMessage, RequestMessage};

/// Opaque value an inspector returns from `before_send_request` and gets back
/// in `after_receive_reply` for the same call.
pub type CorrelationState = Option<Box<dyn Any + Send>>;

/// Per-call hook invoked around request transmission.
pub trait ClientMessageInspector: Send + Sync {
    /// Called immediately before `request` is handed to the transport.
    ///
    /// # Errors
    /// Any error aborts the send; the request never reaches the transport.
    fn before_send_request(
        &self,
        request: &mut RequestMessage,
    ) -> Result<CorrelationState, ChannelError>;

    /// Called after the reply for a successfully sent request arrives.
    fn after_receive_reply(&self, reply: &mut ReplyMessage, correlation: CorrelationState) {
        let _ = (reply, correlation);
    }
}

/// Correlation states collected for one call, in inspector order.
#[derive(Default)]
pub struct CallCorrelation(Vec<CorrelationState>);

/// Ordered inspector chain shared by every channel a factory creates.
#[derive(Default, Clone)]
pub struct ClientRuntime {
    inspectors: Vec<Arc<dyn ClientMessageInspector>>,
}

impl ClientRuntime {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_message_inspector(&mut self, inspector: Arc<dyn ClientMessageInspector>) {
        self.inspectors.push(inspector);
    }

    #[must_use]
    pub fn inspector_count(&self) -> usize {
        self.inspectors.len()
    }

    /// Run every inspector in registration order, stopping at the first
    /// failure.
    ///
    /// # Errors
    /// Returns the failing inspector's error unchanged.
    pub fn before_send(&self, request: &mut RequestMessage) -> Result<CallCorrelation, ChannelError> {
        let mut states = Vec::with_capacity(self.inspectors.len());
        for inspector in &self.inspectors {
            states.push(inspector.before_send_request(request)?);
        }
        Ok(CallCorrelation(states))
    }

    /// Hand each inspector its correlation state, last registered first.
    pub fn after_receive(&self, reply: &mut ReplyMessage, correlation: CallCorrelation) {
        for (inspector, state) in self.inspectors.iter().zip(correlation.0).rev() {
            inspector.after_receive_reply(reply, state);
        }
    }
}

impl std::fmt::Debug for ClientRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRuntime")
            .field("inspectors", &self.inspectors.len())
            .finish()
    }
}
