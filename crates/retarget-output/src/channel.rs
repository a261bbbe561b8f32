//! Generic `OutputChannel` trait for anything that can carry a translated
//! command to the robot: action servers, topic publishers, simulators.
//!
//! Handlers own their channel exclusively and only ever talk to this trait,
//! so transports can be swapped without touching the translation logic.

use std::time::Duration;

use retarget_types::OutputError;

/// A goal-delivery primitive wrapped by an
/// [`OutputHandler`][crate::handler::OutputHandler].
pub trait OutputChannel: Send {
    /// Channel-specific command type (a trajectory goal, a joint-state
    /// message, …).
    type Message;

    /// Endpoint name, e.g. `"/arm_controller/follow_joint_trajectory"`.
    fn endpoint(&self) -> &str;

    /// Block until the far side signals availability.
    ///
    /// `None` waits indefinitely.  This is the only blocking call in the
    /// output layer.
    ///
    /// # Errors
    ///
    /// [`OutputError::ConnectionFailed`] when the connection primitive fails,
    /// [`OutputError::ConnectTimeout`] when `timeout` elapses first.
    fn connect(&mut self, timeout: Option<Duration>) -> Result<(), OutputError>;

    /// Issue `message`, superseding any message still outstanding on this
    /// channel.  Returns once the message is handed to the transport.
    ///
    /// # Errors
    ///
    /// Returns [`OutputError::DispatchFailed`] if the transport refuses it.
    fn send(&mut self, message: &Self::Message) -> Result<(), OutputError>;
}
