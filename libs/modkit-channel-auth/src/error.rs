use thiserror::Error;

use modkit_channel::{BoxError, ChannelError};

/// Errors raised while obtaining or attaching a bearer token.
///
/// Token values never appear in the formatted output.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TokenError {
    /// The token source failed; its error is surfaced unchanged.
    #[error(transparent)]
    Provider(BoxError),

    /// The token could not be obtained (bridge shut down, source vanished).
    #[error("token unavailable: {0}")]
    Unavailable(String),

    /// The token contains bytes that are not allowed in a header value.
    #[error("token is not a valid header value")]
    InvalidHeaderValue,

    /// The configured header name is not a valid HTTP header name.
    #[error("invalid auth header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),
}

impl TokenError {
    #[must_use]
    pub fn provider<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Provider(err.into())
    }
}

impl From<TokenError> for ChannelError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Provider(inner) => ChannelError::Interceptor(inner),
            other => ChannelError::interceptor(other),
        }
    }
}
