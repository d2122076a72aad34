//! Client endpoint configuration.
//!
//! Loaded from a YAML file with environment overrides:
//!
//! ```yaml
//! address: "https://billing.internal/echo"
//! auth:
//!   scope: "billing.read"
//!   header: "Authorization"
//! ```
//!
//! `MODKIT_CHANNEL__ADDRESS=...` or `MODKIT_CHANNEL__AUTH__SCOPE=...` override
//! the file.

use std::path::Path;

use figment::Figment;
use figment::providers::{Env, Format, Yaml};
use serde::Deserialize;

use crate::address::EndpointAddress;
use crate::error::ChannelError;

/// Prefix of environment variables that override file settings.
pub const ENV_PREFIX: &str = "MODKIT_CHANNEL__";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to load channel client config: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("invalid channel client config: {0}")]
    Invalid(#[from] ChannelError),
}

/// Settings for the bearer token attached to outgoing requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct AuthSettings {
    /// Scope requested from the token source; empty by default.
    pub scope: String,
    /// Header to set; `None` keeps the interceptor's default.
    pub header: Option<String>,
}

/// Configuration of one client endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelClientConfig {
    pub address: String,
    #[serde(default)]
    pub auth: Option<AuthSettings>,
}

impl ChannelClientConfig {
    /// Load from `path`, then apply `MODKIT_CHANNEL__*` overrides.
    ///
    /// # Errors
    /// Returns [`ConfigError::Load`] for unreadable/ill-typed input and
    /// [`ConfigError::Invalid`] for an unusable address.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::from_figment(&figment)
    }

    /// Extract from an already assembled figment.
    ///
    /// # Errors
    /// See [`load`](Self::load).
    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(Box::new)?;
        config.endpoint_address()?;
        Ok(config)
    }

    /// Parsed endpoint address.
    ///
    /// # Errors
    /// Returns [`ChannelError::InvalidArgument`] for an empty or malformed
    /// address.
    pub fn endpoint_address(&self) -> Result<EndpointAddress, ChannelError> {
        EndpointAddress::parse(&self.address)
    }
}
