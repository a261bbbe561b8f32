//! `retarget-middleware` – rosbridge transport for the output handlers.
//!
//! Moves translated commands from the control thread to a ROS 1 robot
//! through a `rosbridge_server` WebSocket, without the handlers knowing
//! anything about the wire.
//!
//! # Modules
//!
//! - [`bus`] – [`FrameBus`]: non-blocking broadcast of outbound rosbridge
//!   frames, built on Tokio broadcast channels.
//! - [`directory`] – [`EndpointDirectory`]: which action servers have
//!   announced themselves; backs the blocking `connect`.
//! - [`rosbridge`] – [`RosbridgeActionChannel`] and [`RosbridgeTopicChannel`]:
//!   [`OutputChannel`][retarget_output::OutputChannel] implementations that
//!   encode goals and joint states as rosbridge v2 operations.
//! - [`client`] – [`RosbridgeClient`]: async WebSocket pump between the bus
//!   and the server.

pub mod bus;
pub mod client;
pub mod directory;
pub mod rosbridge;

pub use bus::{Frame, FrameBus};
pub use client::RosbridgeClient;
pub use directory::EndpointDirectory;
pub use rosbridge::{RosbridgeActionChannel, RosbridgeTopicChannel};
