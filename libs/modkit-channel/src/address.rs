use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::error::ChannelError;

/// Absolute address of a remote service endpoint.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct EndpointAddress(Url);

impl EndpointAddress {
    /// Parse and validate an endpoint address.
    ///
    /// # Errors
    /// Returns [`ChannelError::InvalidArgument`] for an empty, relative or
    /// otherwise unparseable address.
    pub fn parse(raw: &str) -> Result<Self, ChannelError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ChannelError::invalid_argument(
                "address",
                "must not be empty",
            ));
        }

        let url = Url::parse(trimmed)
            .map_err(|e| ChannelError::invalid_argument("address", e.to_string()))?;
        Self::from_url(url)
    }

    /// Wrap an already parsed URL.
    ///
    /// # Errors
    /// Returns [`ChannelError::InvalidArgument`] if the URL cannot act as a
    /// base (e.g. `mailto:` style addresses).
    pub fn from_url(url: Url) -> Result<Self, ChannelError> {
        if url.cannot_be_a_base() {
            return Err(ChannelError::invalid_argument(
                "address",
                format!("`{url}` is not a hierarchical endpoint address"),
            ));
        }
        Ok(Self(url))
    }

    #[must_use]
    pub fn as_url(&self) -> &Url {
        &self.0
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    #[must_use]
    pub fn scheme(&self) -> &str {
        self.0.scheme()
    }
}

impl FromStr for EndpointAddress {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for EndpointAddress {
    type Error = ChannelError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<String> for EndpointAddress {
    type Error = ChannelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl fmt::Display for EndpointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl fmt::Debug for EndpointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EndpointAddress({})", self.0)
    }
}
