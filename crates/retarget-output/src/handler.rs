//! The [`OutputHandler`] contract.
//!
//! Every output backend translates a [`PoseSnapshot`] into its own command
//! type and delivers it through the [`OutputChannel`][crate::channel::OutputChannel]
//! it owns.  The [`OutputRegistry`][crate::registry::OutputRegistry] only
//! ever talks to this trait.

use std::time::Duration;

use retarget_types::{ConnectionState, ExclusionSet, OutputError, PoseSnapshot};
use tracing::warn;

/// An output channel backend with a connection lifecycle.
///
/// # Contract
///
/// * `init` – idempotent, blocking.  Connects the channel on the first
///   successful call and moves the handler to [`ConnectionState::Ready`].
///   Once `Ready`, further calls return `Ok(())` without reconnecting.  A
///   connect failure is returned as-is and the handler stays non-`Ready`;
///   retrying is the caller's decision.
///
/// * `set_output` – translates and dispatches one snapshot.  Before `init`
///   has succeeded it returns [`OutputError::NotInitialized`] and sends
///   nothing.  Each dispatch supersedes whatever the channel still had
///   outstanding.
///
/// Methods take `&mut self`; calls into one handler are serialised by its
/// owner.
pub trait OutputHandler: Send {
    /// Handler identity used in logs and fan-out reports.
    fn name(&self) -> &str;

    fn state(&self) -> ConnectionState;

    fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// Connect the underlying channel.  Blocks until the channel is available
    /// or its configured connect timeout elapses.
    ///
    /// # Errors
    ///
    /// [`OutputError::ConnectionFailed`] or [`OutputError::ConnectTimeout`]
    /// from the channel.
    fn init(&mut self) -> Result<(), OutputError>;

    /// Translate `snapshot` and dispatch it.
    ///
    /// # Errors
    ///
    /// [`OutputError::NotInitialized`] when not `Ready`,
    /// [`OutputError::DispatchFailed`] when the channel refuses the command.
    fn set_output(&mut self, snapshot: &PoseSnapshot) -> Result<(), OutputError>;
}

/// Construction-time configuration shared by the built-in handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerConfig {
    pub name: String,
    pub excluded: ExclusionSet,
    /// `None` blocks `init` until the channel answers.
    pub connect_timeout: Option<Duration>,
}

impl HandlerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            excluded: ExclusionSet::new(),
            connect_timeout: None,
        }
    }

    pub fn with_excluded(mut self, excluded: ExclusionSet) -> Self {
        self.excluded = excluded;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}

// Diagnostic + error for a `set_output` call that arrives before `init`.
pub(crate) fn not_initialized(handler: &str, state: ConnectionState) -> OutputError {
    warn!(handler = %handler, state = %state, "Output handler not initialised; dropping snapshot");
    OutputError::NotInitialized {
        handler: handler.to_string(),
        state,
    }
}
