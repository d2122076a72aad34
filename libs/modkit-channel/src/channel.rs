//! Client channels: the lifecycle capability set, the transport seam and the
//! generic request channel that contract proxies are built on.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::Instrument;

use crate::address::EndpointAddress;
use crate::error::ChannelError;
use crate::message::{ReplyMessage, RequestMessage};
use crate::runtime::ClientRuntime;
use crate::state::{CommunicationState, StateCell};

/// Lifecycle capabilities every channel exposes.
///
/// Contract traits use this as a supertrait so that `dyn Contract` can be
/// managed by a [`ChannelHandle`](crate::ChannelHandle):
///
/// ```ignore
/// trait Echo: ClientChannel {
///     fn echo(&self, text: &str) -> Result<String, ChannelError>;
/// }
/// ```
#[async_trait]
pub trait ClientChannel: Send + Sync + 'static {
    fn state(&self) -> CommunicationState;

    /// Transition `Created -> Opened`, negotiating the transport.
    ///
    /// # Errors
    /// Transport failures, or an invalid state.
    fn open(&self) -> Result<(), ChannelError>;

    /// Graceful, blocking close.
    ///
    /// # Errors
    /// Transport failures, or calling it on a faulted channel.
    fn close(&self) -> Result<(), ChannelError>;

    /// Graceful close that completes asynchronously.
    ///
    /// # Errors
    /// Same as [`close`](Self::close).
    async fn close_async(&self) -> Result<(), ChannelError>;

    /// Immediate, best-effort teardown. Never fails.
    fn abort(&self);

    /// Release whatever the channel still holds.
    fn dispose(&self);
}

/// Black-box transport a [`ServiceChannel`] drives.
///
/// `close` may be called on a transport that was never opened.
#[async_trait]
pub trait RequestTransport: Send + Sync {
    /// # Errors
    /// Connection or handshake failures.
    fn open(&self, address: &EndpointAddress) -> Result<(), ChannelError>;

    /// # Errors
    /// Any failure to deliver the request or receive its reply.
    fn request(&self, request: RequestMessage) -> Result<ReplyMessage, ChannelError>;

    /// # Errors
    /// Failure of the orderly shutdown handshake.
    fn close(&self) -> Result<(), ChannelError>;

    /// # Errors
    /// Failure of the orderly shutdown handshake.
    async fn close_async(&self) -> Result<(), ChannelError> {
        self.close()
    }

    fn abort(&self);
}

/// Generic request/reply channel.
///
/// Owns one transport, shares the factory's [`ClientRuntime`], and runs the
/// runtime's inspectors around every request.
pub struct ServiceChannel {
    contract: &'static str,
    address: EndpointAddress,
    runtime: Arc<ClientRuntime>,
    transport: Box<dyn RequestTransport>,
    state: StateCell,
}

impl ServiceChannel {
    pub fn new(
        contract: &'static str,
        address: EndpointAddress,
        runtime: Arc<ClientRuntime>,
        transport: Box<dyn RequestTransport>,
    ) -> Self {
        Self {
            contract,
            address,
            runtime,
            transport,
            state: StateCell::new(),
        }
    }

    #[must_use]
    pub fn address(&self) -> &EndpointAddress {
        &self.address
    }

    #[must_use]
    pub fn state(&self) -> CommunicationState {
        self.state.get()
    }

    /// # Errors
    /// See [`ClientChannel::open`].
    pub fn open(&self) -> Result<(), ChannelError> {
        self.state.begin_open()?;
        if let Err(e) = self.transport.open(&self.address) {
            self.state.fault();
            tracing::warn!(contract = self.contract, address = %self.address, error = %e, "channel open failed");
            return Err(e);
        }
        self.state.complete_open()?;
        tracing::debug!(contract = self.contract, address = %self.address, "channel opened");
        Ok(())
    }

    /// Build a request for `action` and send it.
    ///
    /// # Errors
    /// See [`send`](Self::send).
    pub fn request(
        &self,
        action: impl Into<String>,
        body: impl Into<Bytes>,
    ) -> Result<ReplyMessage, ChannelError> {
        self.send(RequestMessage::new(action, body))
    }

    /// Run the inspector chain, transmit, and run the reply chain.
    ///
    /// An inspector failure stops the call before transmission and leaves the
    /// channel usable. A transport failure faults the channel.
    ///
    /// # Errors
    /// [`ChannelError::InvalidState`] unless the channel is opened, otherwise
    /// whatever the inspectors or the transport raise.
    pub fn send(&self, mut request: RequestMessage) -> Result<ReplyMessage, ChannelError> {
        let state = self.state.get();
        if state != CommunicationState::Opened {
            return Err(ChannelError::InvalidState {
                state,
                operation: "send",
            });
        }

        let correlation = self.runtime.before_send(&mut request)?;

        let mut reply = match self.transport.request(request) {
            Ok(reply) => reply,
            Err(e) => {
                if self.state.fault() {
                    tracing::warn!(contract = self.contract, address = %self.address, error = %e, "channel faulted");
                }
                return Err(e);
            }
        };

        self.runtime.after_receive(&mut reply, correlation);
        Ok(reply)
    }

    /// # Errors
    /// See [`ClientChannel::close`].
    pub fn close(&self) -> Result<(), ChannelError> {
        if !self.state.begin_close()? {
            return Ok(());
        }
        match self.transport.close() {
            Ok(()) => {
                self.state.complete_close();
                tracing::debug!(contract = self.contract, address = %self.address, "channel closed");
                Ok(())
            }
            Err(e) => {
                self.abort();
                Err(e)
            }
        }
    }

    /// # Errors
    /// See [`ClientChannel::close_async`].
    pub async fn close_async(&self) -> Result<(), ChannelError> {
        if !self.state.begin_close()? {
            return Ok(());
        }
        let span = tracing::debug_span!("channel_close", contract = self.contract, address = %self.address);
        let mut cancelled = AbortOnCancel {
            channel: self,
            armed: true,
        };
        let result = self.transport.close_async().instrument(span).await;
        cancelled.armed = false;
        match result {
            Ok(()) => {
                self.state.complete_close();
                tracing::debug!(contract = self.contract, address = %self.address, "channel closed");
                Ok(())
            }
            Err(e) => {
                self.abort();
                Err(e)
            }
        }
    }

    pub fn abort(&self) {
        let previous = self.state.abort();
        if previous != CommunicationState::Closed {
            self.transport.abort();
            tracing::debug!(contract = self.contract, address = %self.address, %previous, "channel aborted");
        }
    }

    /// Close if still usable, abort otherwise; never fails.
    pub fn dispose(&self) {
        match self.state.get() {
            CommunicationState::Closed => {}
            // A close still in flight here was abandoned by its caller.
            CommunicationState::Faulted
            | CommunicationState::Opening
            | CommunicationState::Closing => self.abort(),
            CommunicationState::Created | CommunicationState::Opened => {
                if let Err(e) = self.close() {
                    tracing::debug!(contract = self.contract, error = %e, "close during dispose failed, aborted");
                    self.abort();
                }
            }
        }
    }
}

/// Aborts the channel if an async close is dropped before it finishes, so a
/// cancelled close never leaves the transport half shut.
struct AbortOnCancel<'a> {
    channel: &'a ServiceChannel,
    armed: bool,
}

impl Drop for AbortOnCancel<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!(contract = self.channel.contract, address = %self.channel.address, "close cancelled, aborting");
            self.channel.abort();
        }
    }
}

impl fmt::Debug for ServiceChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceChannel")
            .field("contract", &self.contract)
            .field("address", &self.address)
            .field("state", &self.state.get())
            .finish_non_exhaustive()
    }
}

/// Contract proxy backed by a [`ServiceChannel`].
///
/// Implementing this is all a proxy needs to satisfy [`ClientChannel`].
pub trait ChannelProxy: Send + Sync + 'static {
    fn service_channel(&self) -> &ServiceChannel;
}

impl ChannelProxy for ServiceChannel {
    fn service_channel(&self) -> &ServiceChannel {
        self
    }
}

#[async_trait]
impl<T: ChannelProxy> ClientChannel for T {
    fn state(&self) -> CommunicationState {
        self.service_channel().state()
    }

    fn open(&self) -> Result<(), ChannelError> {
        self.service_channel().open()
    }

    fn close(&self) -> Result<(), ChannelError> {
        self.service_channel().close()
    }

    async fn close_async(&self) -> Result<(), ChannelError> {
        self.service_channel().close_async().await
    }

    fn abort(&self) {
        self.service_channel().abort();
    }

    fn dispose(&self) {
        self.service_channel().dispose();
    }
}
