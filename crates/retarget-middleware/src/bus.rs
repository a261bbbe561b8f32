//! In-process outbound frame bus.
//!
//! Channels never talk to the network directly.  They publish rosbridge
//! [`Frame`]s onto a [`FrameBus`]; the
//! [`RosbridgeClient`][crate::client::RosbridgeClient] subscribes and
//! forwards every frame to the `rosbridge_server`.
//!
//! Uses [`tokio::sync::broadcast`] so publishing never blocks the control
//! thread and needs no running runtime.

use chrono::{DateTime, Utc};
use retarget_types::OutputError;
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Default channel capacity (number of buffered frames before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// One rosbridge protocol operation on its way to the server.
#[derive(Debug, Clone)]
pub struct Frame {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Endpoint that produced the frame, e.g. `"/arm_controller/follow_joint_trajectory"`.
    pub source: String,
    /// The rosbridge JSON object (`{"op": ..., ...}`).
    pub body: Value,
}

impl Frame {
    pub fn new(source: impl Into<String>, body: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            body,
        }
    }

    /// rosbridge operation name, if present.
    pub fn op(&self) -> Option<&str> {
        self.body.get("op").and_then(Value::as_str)
    }

    /// Wire text sent over the WebSocket.
    pub fn to_text(&self) -> String {
        self.body.to_string()
    }
}

/// Shared outbound bus.  Clone it cheaply – all clones share the same
/// broadcast channel.
#[derive(Clone, Debug)]
pub struct FrameBus {
    sender: broadcast::Sender<Frame>,
}

impl FrameBus {
    /// Create a new bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish `frame`.
    ///
    /// Returns the number of subscribers handed the frame.
    ///
    /// # Errors
    ///
    /// [`OutputError::DispatchFailed`] when nothing is subscribed, i.e. no
    /// client is attached to carry the frame.
    pub fn publish(&self, frame: Frame) -> Result<usize, OutputError> {
        let source = frame.source.clone();
        self.sender.send(frame).map_err(|_| OutputError::DispatchFailed {
            endpoint: source,
            details: "no rosbridge client attached to the frame bus".to_string(),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Frame> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for FrameBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
