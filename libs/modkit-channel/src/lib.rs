#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

//! Service channel client layer for `ModKit`.
//!
//! - [`ChannelRegistry`] holds one [`ChannelFactory`] per contract type and
//!   hands out [`ChannelHandle`]s.
//! - A [`ChannelHandle`] creates and opens its channel on first use and closes
//!   (or aborts, when faulted) and disposes it exactly once.
//! - [`EndpointBehavior`]s installed on a [`ServiceEndpoint`] add
//!   [`ClientMessageInspector`]s that see every outgoing request.
//!
//! # Example
//!
//! ```ignore
//! use modkit_channel::{ChannelRegistry, configure_endpoint};
//!
//! let registry = ChannelRegistry::new();
//! registry.register_client::<dyn Echo>(
//!     Arc::new(echo_binding()),
//!     "https://echo.internal/svc",
//!     Some(configure_endpoint(|_, endpoint| endpoint.add_behavior(my_behavior()))),
//! )?;
//!
//! let client = registry.create_client::<dyn Echo>()?;
//! let reply = client.channel()?.echo("ping")?;
//! client.dispose_async().await;
//! ```

pub mod address;
pub mod binding;
pub mod channel;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod factory;
pub mod handle;
pub mod message;
pub mod registry;
pub mod runtime;
pub mod state;

pub use address::EndpointAddress;
pub use binding::{Binding, ChannelContext, ProxyBinding};
pub use channel::{ChannelProxy, ClientChannel, RequestTransport, ServiceChannel};
pub use config::{AuthSettings, ChannelClientConfig, ConfigError};
pub use endpoint::{EndpointBehavior, ServiceEndpoint};
pub use error::{BoxError, ChannelError};
pub use factory::ChannelFactory;
pub use handle::ChannelHandle;
pub use message::{HttpRequestProperty, MessageProperties, ReplyMessage, RequestMessage};
pub use registry::{ChannelRegistry, ConfigureEndpoint, configure_endpoint};
pub use runtime::{CallCorrelation, ClientMessageInspector, ClientRuntime, CorrelationState};
pub use state::{CommunicationState, StateCell};
