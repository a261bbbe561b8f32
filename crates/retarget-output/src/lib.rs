//! `retarget-output` – the output handler layer.
//!
//! Turns a [`PoseSnapshot`][retarget_types::PoseSnapshot] produced by the
//! retargeting pipeline into channel-specific commands and hands them to the
//! channel that delivers them.
//!
//! # Modules
//!
//! - [`channel`] – [`OutputChannel`][channel::OutputChannel]: the
//!   goal-delivery seam (`connect` blocks, `send` overwrites).
//! - [`lifecycle`] – [`ConnectionLifecycle`][lifecycle::ConnectionLifecycle]:
//!   the forward-only `Uninitialized → Connecting → Ready` state machine.
//! - [`filter`] – order-preserving removal of excluded joints.
//! - [`handler`] – [`OutputHandler`][handler::OutputHandler]: the
//!   `init` / `set_output` contract every backend satisfies.
//! - [`trajectory`] – [`FollowJointTrajectoryHandler`][trajectory::FollowJointTrajectoryHandler]:
//!   single-point trajectory goals for a trajectory-following controller.
//! - [`joint_state`] – [`JointStatePublishHandler`][joint_state::JointStatePublishHandler]:
//!   publishes the pose as a joint-state message.
//! - [`sim`] – [`SimChannel`][sim::SimChannel]: an in-process channel that
//!   records every message, for simulators and headless tests.
//! - [`registry`] – [`OutputRegistry`][registry::OutputRegistry]: fans one
//!   snapshot out to every registered handler.

pub mod channel;
pub mod filter;
pub mod handler;
pub mod joint_state;
pub mod lifecycle;
pub mod registry;
pub mod sim;
pub mod trajectory;

pub use channel::OutputChannel;
pub use handler::{HandlerConfig, OutputHandler};
pub use joint_state::JointStatePublishHandler;
pub use lifecycle::{ConnectOutcome, ConnectionLifecycle};
pub use registry::{FanoutReport, HandlerOutcome, OutputRegistry};
pub use sim::{SimChannel, SimLog};
pub use trajectory::FollowJointTrajectoryHandler;
