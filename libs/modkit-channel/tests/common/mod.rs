#![allow(dead_code)]

//! Test doubles shared by the integration tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use modkit_channel::{
    Binding, ChannelContext, ChannelError, ClientChannel, CommunicationState,
};

/// Contract used throughout the tests.
pub trait Echo: ClientChannel {
    fn echo(&self, text: &str) -> Result<String, ChannelError>;
}

/// Ordered record of lifecycle calls made on a channel.
pub type CallLog = Arc<Mutex<Vec<&'static str>>>;

#[derive(Clone, Copy, Default)]
pub struct Faults {
    pub open: bool,
    pub close: bool,
    pub panic_on_close: bool,
}

pub struct MockChannel {
    calls: CallLog,
    state: Mutex<CommunicationState>,
    faults: Faults,
}

impl MockChannel {
    fn record(&self, call: &'static str) {
        self.calls.lock().push(call);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    /// Simulate a transport-level failure.
    pub fn fault(&self) {
        *self.state.lock() = CommunicationState::Faulted;
    }
}

#[async_trait]
impl ClientChannel for MockChannel {
    fn state(&self) -> CommunicationState {
        *self.state.lock()
    }

    fn open(&self) -> Result<(), ChannelError> {
        self.record("open");
        if self.faults.open {
            *self.state.lock() = CommunicationState::Faulted;
            return Err(ChannelError::transport("connection refused"));
        }
        *self.state.lock() = CommunicationState::Opened;
        Ok(())
    }

    fn close(&self) -> Result<(), ChannelError> {
        self.record("close");
        assert!(!self.faults.panic_on_close, "transport close panicked");
        if self.faults.close {
            return Err(ChannelError::transport("close handshake timed out"));
        }
        *self.state.lock() = CommunicationState::Closed;
        Ok(())
    }

    async fn close_async(&self) -> Result<(), ChannelError> {
        self.record("begin_close");
        tokio::task::yield_now().await;
        self.record("end_close");
        if self.faults.close {
            return Err(ChannelError::transport("close handshake timed out"));
        }
        *self.state.lock() = CommunicationState::Closed;
        Ok(())
    }

    fn abort(&self) {
        self.record("abort");
        *self.state.lock() = CommunicationState::Closed;
    }

    fn dispose(&self) {
        self.record("dispose");
    }
}

impl Echo for MockChannel {
    fn echo(&self, text: &str) -> Result<String, ChannelError> {
        Ok(text.to_owned())
    }
}

/// Binding that counts `create_channel` calls and keeps the channels it made.
#[derive(Default)]
pub struct MockBinding {
    created: AtomicUsize,
    addresses: Mutex<Vec<String>>,
    channels: Mutex<Vec<Arc<MockChannel>>>,
    faults: Faults,
}

impl MockBinding {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_faults(faults: Faults) -> Arc<Self> {
        Arc::new(Self {
            faults,
            ..Self::default()
        })
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn addresses(&self) -> Vec<String> {
        self.addresses.lock().clone()
    }

    pub fn last_channel(&self) -> Arc<MockChannel> {
        self.channels
            .lock()
            .last()
            .cloned()
            .expect("no channel created yet")
    }
}

impl Binding<dyn Echo> for MockBinding {
    fn name(&self) -> &str {
        "mock"
    }

    fn create_channel(&self, ctx: &ChannelContext<'_>) -> Result<Arc<dyn Echo>, ChannelError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        self.addresses.lock().push(ctx.address.to_string());

        let channel = Arc::new(MockChannel {
            calls: CallLog::default(),
            state: Mutex::new(CommunicationState::Created),
            faults: self.faults,
        });
        self.channels.lock().push(Arc::clone(&channel));

        let channel: Arc<dyn Echo> = channel;
        Ok(channel)
    }
}

/// Erase a concrete binding to the trait object the factory expects.
pub fn as_binding(binding: &Arc<MockBinding>) -> Arc<dyn Binding<dyn Echo>> {
    let erased: Arc<dyn Binding<dyn Echo>> = binding.clone();
    erased
}
