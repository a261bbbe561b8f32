//! [`ConnectionLifecycle`] – the readiness state machine shared by every
//! output handler.
//!
//! ```text
//! Uninitialized --init()--> Connecting --connect ok--> Ready
//!                               ^   |
//!                               +---+ connect failed (stays Connecting)
//! ```
//!
//! `Ready` is terminal.  A failed connect leaves the lifecycle in
//! `Connecting`; the next [`ConnectionLifecycle::connect_with`] call tries
//! again.

use retarget_types::{ConnectionState, OutputError};

/// Result of a successful [`ConnectionLifecycle::connect_with`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// The connect closure ran and succeeded.
    Connected,
    /// The lifecycle was already `Ready`; the closure was not called.
    AlreadyReady,
}

#[derive(Debug)]
pub struct ConnectionLifecycle {
    state: ConnectionState,
}

impl Default for ConnectionLifecycle {
    fn default() -> Self {
        Self {
            state: ConnectionState::Uninitialized,
        }
    }
}

impl ConnectionLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    /// Drive the lifecycle towards `Ready` using `connect`.
    ///
    /// # Errors
    ///
    /// Propagates the error from `connect` unchanged; the state is left at
    /// `Connecting`.
    pub fn connect_with<F>(&mut self, connect: F) -> Result<ConnectOutcome, OutputError>
    where
        F: FnOnce() -> Result<(), OutputError>,
    {
        if self.is_ready() {
            return Ok(ConnectOutcome::AlreadyReady);
        }
        self.state = ConnectionState::Connecting;
        connect()?;
        self.state = ConnectionState::Ready;
        Ok(ConnectOutcome::Connected)
    }
}
