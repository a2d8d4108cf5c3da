//! Connection state machine for a single agent socket.
//!
//! Provides a `ConnectionState` enum that models the lifecycle of one
//! session socket, with validated transitions that return `Result`
//! instead of panicking.

use std::time::Instant;

use crate::error::OmniError;

// ── ConnectionState ──────────────────────────────────────────────

/// The current state of a session's socket.
///
/// ```text
///   Idle ──► Connecting ──► Open ──► Closed
///    ▲           │                     │
///    └── error ──┘                     │
///                ▲                     │
///                └──── connect() ──────┘   (new socket instance)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No socket. Initial state, and the state after a failed attempt.
    #[default]
    Idle,

    /// WebSocket handshake in flight.
    Connecting,

    /// Socket is up; frames flow both ways.
    Open {
        /// When the socket opened.
        since: Instant,
    },

    /// The socket instance ended (explicit close or remote close).
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Open { .. } => write!(f, "Open"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting)
    }

    /// How long the socket has been open. `None` in any other state.
    pub fn open_duration(&self) -> Option<std::time::Duration> {
        match self {
            Self::Open { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Connecting`.
    ///
    /// Valid from: `Idle`, `Closed`.
    pub fn begin_connect(&mut self) -> Result<(), OmniError> {
        match self {
            Self::Idle | Self::Closed => {
                *self = Self::Connecting;
                Ok(())
            }
            _ => Err(OmniError::InvalidTransition(
                "cannot connect: a socket is already connecting or open",
            )),
        }
    }

    /// Transition to `Open`.
    ///
    /// Valid from: `Connecting`.
    pub fn opened(&mut self) -> Result<(), OmniError> {
        match self {
            Self::Connecting => {
                *self = Self::Open {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(OmniError::InvalidTransition(
                "cannot open: not in Connecting state",
            )),
        }
    }

    /// Transition back to `Idle` after a failed attempt, so the next
    /// `connect()` may retry.
    ///
    /// Valid from: `Connecting`.
    pub fn connect_failed(&mut self) -> Result<(), OmniError> {
        match self {
            Self::Connecting => {
                *self = Self::Idle;
                Ok(())
            }
            _ => Err(OmniError::InvalidTransition(
                "cannot fail connect: not in Connecting state",
            )),
        }
    }

    /// Transition to `Closed`.
    ///
    /// Valid from: `Open`.
    pub fn closed(&mut self) -> Result<(), OmniError> {
        match self {
            Self::Open { .. } => {
                *self = Self::Closed;
                Ok(())
            }
            _ => Err(OmniError::InvalidTransition("cannot close: not in Open state")),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
