//! Connection handshake state machine.
//!
//! # Lifecycle (for beginners)
//!
//! ```text
//! Accepted ──► Welcomed ──► Authenticated ──► Bound ──► Active
//!     │            │              │             │          │
//!     └────────────┴──────────────┴─────────────┴──────────┴──► Disconnected
//! ```
//!
//! - `Accepted`: the TCP connection exists; no id has been exchanged yet.
//! - `Welcomed`: the server sent `Welcome { greeting, id }` (server side) or
//!   the client received it (client side).
//! - `Authenticated`: the client echoed the assigned id back and it matched.
//! - `Bound`: the UDP endpoint is known (server) or the UDP socket is open
//!   (client).
//! - `Active`: connect events have fired; application packets flow.
//! - `Disconnected`: terminal.
//!
//! `Bound` is optional on the way to `Active`: the server activates a client
//! as soon as the id echo matches, and records the UDP endpoint whenever the
//! first datagram arrives.
//!
//! Every transition is checked.  An illegal transition returns
//! [`HandshakeError::InvalidTransition`] and leaves the state untouched.

use std::fmt;

use thiserror::Error;

use crate::ClientId;

/// Where a connection is in the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeState {
    Accepted,
    Welcomed,
    Authenticated,
    Bound,
    Active,
    Disconnected,
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandshakeState::Accepted => "accepted",
            HandshakeState::Welcomed => "welcomed",
            HandshakeState::Authenticated => "authenticated",
            HandshakeState::Bound => "bound",
            HandshakeState::Active => "active",
            HandshakeState::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// Errors raised by handshake transitions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandshakeError {
    /// The requested transition is not allowed from the current state.
    #[error("cannot move from {from} to {to}")]
    InvalidTransition {
        from: HandshakeState,
        to: HandshakeState,
    },

    /// The client echoed a different id from the one it was assigned.
    #[error("client echoed id {echoed}, expected {assigned}")]
    IdMismatch { assigned: ClientId, echoed: ClientId },
}

/// Handshake progress for one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    state: HandshakeState,
}

impl Handshake {
    /// Starts a handshake for a freshly accepted or connected socket.
    pub fn new() -> Self {
        Self {
            state: HandshakeState::Accepted,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == HandshakeState::Active
    }

    pub fn is_disconnected(&self) -> bool {
        self.state == HandshakeState::Disconnected
    }

    /// `Accepted → Welcomed`.
    ///
    /// # Errors
    ///
    /// [`HandshakeError::InvalidTransition`] from any other state.
    pub fn welcome(&mut self) -> Result<(), HandshakeError> {
        self.advance(&[HandshakeState::Accepted], HandshakeState::Welcomed)
    }

    /// `Welcomed → Authenticated`.
    ///
    /// # Errors
    ///
    /// [`HandshakeError::InvalidTransition`] from any other state.
    pub fn authenticate(&mut self) -> Result<(), HandshakeError> {
        self.advance(&[HandshakeState::Welcomed], HandshakeState::Authenticated)
    }

    /// Checks the echoed id against the assigned one, then authenticates.
    ///
    /// # Errors
    ///
    /// [`HandshakeError::IdMismatch`] if the ids differ (state unchanged), or
    /// [`HandshakeError::InvalidTransition`] if not in `Welcomed`.
    pub fn verify_echo(&mut self, assigned: ClientId, echoed: ClientId) -> Result<(), HandshakeError> {
        if assigned != echoed {
            return Err(HandshakeError::IdMismatch { assigned, echoed });
        }
        self.authenticate()
    }

    /// `Authenticated → Bound`.
    ///
    /// # Errors
    ///
    /// [`HandshakeError::InvalidTransition`] from any other state.
    pub fn bind(&mut self) -> Result<(), HandshakeError> {
        self.advance(&[HandshakeState::Authenticated], HandshakeState::Bound)
    }

    /// `Authenticated | Bound → Active`.
    ///
    /// # Errors
    ///
    /// [`HandshakeError::InvalidTransition`] from any other state.
    pub fn activate(&mut self) -> Result<(), HandshakeError> {
        self.advance(
            &[HandshakeState::Authenticated, HandshakeState::Bound],
            HandshakeState::Active,
        )
    }

    /// Moves to `Disconnected` from any state.  Returns the previous state,
    /// or `None` if already disconnected.
    pub fn disconnect(&mut self) -> Option<HandshakeState> {
        if self.is_disconnected() {
            return None;
        }
        Some(std::mem::replace(&mut self.state, HandshakeState::Disconnected))
    }

    fn advance(&mut self, from: &[HandshakeState], to: HandshakeState) -> Result<(), HandshakeError> {
        if !from.contains(&self.state) {
            return Err(HandshakeError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}

impl Default for Handshake {
    fn default() -> Self {
        Self::new()
    }
}
