//! Communication state of a channel and its guarded transitions.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::ChannelError;

/// Lifecycle state of a communication object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommunicationState {
    Created,
    Opening,
    Opened,
    Closing,
    Closed,
    /// Unrecoverable transport failure; only abort-and-dispose is safe.
    Faulted,
}

impl CommunicationState {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Opening => 1,
            Self::Opened => 2,
            Self::Closing => 3,
            Self::Closed => 4,
            Self::Faulted => 5,
        }
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Created,
            1 => Self::Opening,
            2 => Self::Opened,
            3 => Self::Closing,
            4 => Self::Closed,
            _ => Self::Faulted,
        }
    }

    /// `true` for `Closed` and `Faulted`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Faulted)
    }
}

impl fmt::Display for CommunicationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Atomic holder for a [`CommunicationState`].
///
/// Transitions are compare-and-swap based, so concurrent callers never observe
/// a torn state and at most one caller wins a given transition.
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

impl StateCell {
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU8::new(CommunicationState::Created.as_u8()))
    }

    #[must_use]
    pub fn get(&self) -> CommunicationState {
        CommunicationState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn swap_from(&self, from: CommunicationState, to: CommunicationState) -> bool {
        self.0
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// `Created -> Opening`.
    ///
    /// # Errors
    /// Returns [`ChannelError::InvalidState`] from any other state.
    pub fn begin_open(&self) -> Result<(), ChannelError> {
        if self.swap_from(CommunicationState::Created, CommunicationState::Opening) {
            Ok(())
        } else {
            Err(self.invalid("open"))
        }
    }

    /// `Opening -> Opened`.
    ///
    /// # Errors
    /// Returns [`ChannelError::InvalidState`] if the channel was faulted or
    /// aborted while opening.
    pub fn complete_open(&self) -> Result<(), ChannelError> {
        if self.swap_from(CommunicationState::Opening, CommunicationState::Opened) {
            Ok(())
        } else {
            Err(self.invalid("complete open"))
        }
    }

    /// `Created | Opened -> Closing`.
    ///
    /// Returns `Ok(false)` when the channel is already closing or closed, so a
    /// second close is a no-op.
    ///
    /// # Errors
    /// Returns [`ChannelError::InvalidState`] for a faulted or opening channel.
    pub fn begin_close(&self) -> Result<bool, ChannelError> {
        loop {
            let current = self.get();
            match current {
                CommunicationState::Created | CommunicationState::Opened => {
                    if self.swap_from(current, CommunicationState::Closing) {
                        return Ok(true);
                    }
                }
                CommunicationState::Closing | CommunicationState::Closed => return Ok(false),
                CommunicationState::Opening | CommunicationState::Faulted => {
                    return Err(self.invalid("close"));
                }
            }
        }
    }

    /// `Closing -> Closed`.
    pub fn complete_close(&self) {
        self.swap_from(CommunicationState::Closing, CommunicationState::Closed);
    }

    /// Moves any non-closed state to `Faulted`. Returns `true` if this call
    /// performed the transition.
    pub fn fault(&self) -> bool {
        loop {
            let current = self.get();
            if current.is_terminal() {
                return false;
            }
            if self.swap_from(current, CommunicationState::Faulted) {
                return true;
            }
        }
    }

    /// Unconditionally ends in `Closed`; returns the state it replaced.
    pub fn abort(&self) -> CommunicationState {
        CommunicationState::from_u8(
            self.0
                .swap(CommunicationState::Closed.as_u8(), Ordering::AcqRel),
        )
    }

    fn invalid(&self, operation: &'static str) -> ChannelError {
        ChannelError::InvalidState {
            state: self.get(),
            operation,
        }
    }
}
