#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

//! Bearer token injection for `ModKit` service channels.
//!
//! Two entry points share one [`TokenSource`] abstraction:
//!
//! - [`BearerTokenBehavior`] installs a [`BearerTokenInspector`] on a channel
//!   endpoint. The inspector runs in the synchronous pre-send hook and obtains
//!   the token through a [`TokenBridge`], so it never blocks the caller's
//!   async runtime on itself.
//! - [`BearerAuthLayer`] is a tower layer for async HTTP stacks; it awaits the
//!   source directly.
//!
//! Both fail closed: without a token the request is not sent.
//!
//! ```ignore
//! use modkit_channel_auth::{StaticTokenSource, bearer_auth, shared_source};
//!
//! registry.register_client::<dyn Echo>(
//!     binding,
//!     "https://echo.internal/svc",
//!     Some(bearer_auth(shared_source(Arc::new(StaticTokenSource::new(token))))),
//! )?;
//! ```

pub mod behavior;
pub mod bridge;
pub mod error;
pub mod inspector;
pub mod layer;
pub mod source;

pub use behavior::{BearerTokenBehavior, bearer_auth, bearer_auth_from_registry};
pub use bridge::TokenBridge;
pub use error::TokenError;
pub use inspector::{BearerTokenInspector, DEFAULT_HEADER};
pub use layer::{AuthServiceError, BearerAuthLayer, BearerAuthService};
pub use source::{
    AccessToken, FnTokenSource, StaticTokenSource, TokenSource, TokenSourceFactory, shared_source,
};
