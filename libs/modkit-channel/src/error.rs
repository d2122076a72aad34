use thiserror::Error;

use crate::state::CommunicationState;

/// Boxed error raised by a collaborator (binding, transport, inspector).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by channel handles, factories and the registry.
///
/// Collaborator failures are carried `transparent`ly so that callers observe
/// exactly the message and source the collaborator produced.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ChannelError {
    /// A required registration argument is missing or malformed.
    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    /// No channel factory is registered for the requested contract type.
    #[error("no channel factory registered for contract `{contract}`")]
    NotRegistered { contract: &'static str },

    /// No collaborator service of the requested type was provided.
    #[error("service not provided: `{service}`")]
    ServiceNotProvided { service: &'static str },

    /// Building the channel factory failed; the failure is sticky.
    #[error("channel factory for `{contract}` could not be built: {reason}")]
    FactoryUnavailable {
        contract: &'static str,
        reason: String,
    },

    /// The handle has been disposed; it never hands out a channel again.
    #[error("channel handle for `{contract}` has been disposed")]
    Disposed { contract: &'static str },

    /// The operation is not valid in the channel's current state.
    #[error("channel is {state}, cannot {operation}")]
    InvalidState {
        state: CommunicationState,
        operation: &'static str,
    },

    /// Transport failure (create, open, send, close).
    #[error(transparent)]
    Transport(BoxError),

    /// A pre-send interceptor refused the request.
    #[error(transparent)]
    Interceptor(BoxError),
}

impl ChannelError {
    pub fn invalid_argument(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }

    pub fn transport<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Transport(err.into())
    }

    pub fn interceptor<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Interceptor(err.into())
    }
}
