//! Per-client channel handle: lazy create-and-open, exactly-once teardown.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::Instrument;

use crate::address::EndpointAddress;
use crate::channel::ClientChannel;
use crate::error::ChannelError;
use crate::factory::ChannelFactory;
use crate::state::CommunicationState;

struct Slot<C: ?Sized> {
    channel: Option<Arc<C>>,
    disposed: bool,
}

/// Owns at most one channel of contract `C` for its whole lifetime.
///
/// The channel is created and opened on the first [`channel`](Self::channel)
/// call and torn down by [`dispose`](Self::dispose),
/// [`dispose_async`](Self::dispose_async) or `Drop`, whichever comes first.
/// A disposed handle never creates or returns a channel again.
pub struct ChannelHandle<C: ?Sized + ClientChannel> {
    factory: Arc<ChannelFactory<C>>,
    address: EndpointAddress,
    slot: Mutex<Slot<C>>,
}

impl<C: ?Sized + ClientChannel> ChannelHandle<C> {
    /// Handle targeting the factory's own endpoint address.
    #[must_use]
    pub fn new(factory: Arc<ChannelFactory<C>>) -> Self {
        let address = factory.endpoint().address().clone();
        Self::with_address(factory, address)
    }

    #[must_use]
    pub fn with_address(factory: Arc<ChannelFactory<C>>, address: EndpointAddress) -> Self {
        Self {
            factory,
            address,
            slot: Mutex::new(Slot {
                channel: None,
                disposed: false,
            }),
        }
    }

    /// Handle targeting a raw address string.
    ///
    /// # Errors
    /// Returns [`ChannelError::InvalidArgument`] for an empty or malformed
    /// address, before any channel is created.
    pub fn for_address(factory: Arc<ChannelFactory<C>>, address: &str) -> Result<Self, ChannelError> {
        let address = EndpointAddress::parse(address)?;
        Ok(Self::with_address(factory, address))
    }

    #[must_use]
    pub fn address(&self) -> &EndpointAddress {
        &self.address
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.slot.lock().disposed
    }

    /// `true` once a channel has been created and not yet torn down.
    #[must_use]
    pub fn has_channel(&self) -> bool {
        self.slot.lock().channel.is_some()
    }

    fn contract(&self) -> &'static str {
        self.factory.endpoint().contract()
    }

    /// Return the channel, creating and opening it on first use.
    ///
    /// Concurrent first callers are serialized: exactly one channel is
    /// created, and nobody gets it before `open` has completed. If `open`
    /// fails the channel is aborted and not cached.
    ///
    /// # Errors
    /// [`ChannelError::Disposed`] after teardown; otherwise create/open errors
    /// exactly as the binding or channel raised them.
    pub fn channel(&self) -> Result<Arc<C>, ChannelError> {
        let mut slot = self.slot.lock();
        if slot.disposed {
            return Err(ChannelError::Disposed {
                contract: self.contract(),
            });
        }
        if let Some(channel) = &slot.channel {
            return Ok(Arc::clone(channel));
        }

        let channel = self.factory.create_channel(&self.address)?;
        if let Err(e) = channel.open() {
            channel.abort();
            channel.dispose();
            return Err(e);
        }
        tracing::debug!(contract = self.contract(), address = %self.address, "client channel ready");

        slot.channel = Some(Arc::clone(&channel));
        Ok(channel)
    }

    /// Mark the handle disposed and take the channel, if this call is the
    /// first teardown and a channel exists.
    fn begin_dispose(&self) -> Option<Arc<C>> {
        let mut slot = self.slot.lock();
        if slot.disposed {
            return None;
        }
        slot.disposed = true;
        slot.channel.take()
    }

    /// Close (or abort, when faulted) and dispose the channel.
    ///
    /// Idempotent; never fails. A close failure is logged and degrades to
    /// abort.
    pub fn dispose(&self) {
        let Some(channel) = self.begin_dispose() else {
            return;
        };
        let channel = DisposeOnDrop(channel);

        if channel.0.state() == CommunicationState::Faulted {
            tracing::warn!(contract = self.contract(), address = %self.address, "aborting faulted channel");
            channel.0.abort();
        } else if let Err(e) = channel.0.close() {
            tracing::warn!(contract = self.contract(), address = %self.address, error = %e, "channel close failed, aborting");
            channel.0.abort();
        }
    }

    /// Asynchronous counterpart of [`dispose`](Self::dispose).
    ///
    /// Shares the disposed flag with it: whichever runs first does the work.
    pub async fn dispose_async(&self) {
        let Some(channel) = self.begin_dispose() else {
            return;
        };
        let channel = DisposeOnDrop(channel);

        if channel.0.state() == CommunicationState::Faulted {
            tracing::warn!(contract = self.contract(), address = %self.address, "aborting faulted channel");
            channel.0.abort();
            return;
        }

        let span = tracing::debug_span!("client_channel_close", contract = self.contract(), address = %self.address);
        if let Err(e) = channel.0.close_async().instrument(span).await {
            tracing::warn!(contract = self.contract(), address = %self.address, error = %e, "channel close failed, aborting");
            channel.0.abort();
        }
    }
}

/// Runs the channel's own `dispose` on every exit path of a teardown,
/// including unwinding out of `close`.
struct DisposeOnDrop<C: ?Sized + ClientChannel>(Arc<C>);

impl<C: ?Sized + ClientChannel> Drop for DisposeOnDrop<C> {
    fn drop(&mut self) {
        self.0.dispose();
    }
}

impl<C: ?Sized + ClientChannel> Drop for ChannelHandle<C> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<C: ?Sized + ClientChannel> fmt::Debug for ChannelHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot.lock();
        f.debug_struct("ChannelHandle")
            .field("contract", &self.contract())
            .field("address", &self.address)
            .field("created", &slot.channel.is_some())
            .field("disposed", &slot.disposed)
            .finish_non_exhaustive()
    }
}
