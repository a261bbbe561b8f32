//! rosbridge v2 protocol channels for a ROS 1 robot.
//!
//! * [`RosbridgeActionChannel`] – carries [`TrajectoryGoal`]s to a
//!   `control_msgs/FollowJointTrajectory` actionlib server by publishing on
//!   the server's `goal` topic.  `connect` advertises the client topics,
//!   subscribes to the server's `status` topic and then blocks until the
//!   first status message has been seen, which is how an actionlib client
//!   decides the server is up.
//!
//! * [`RosbridgeTopicChannel`] – publishes [`JointState`] messages on a
//!   plain topic.
//!
//! Both channels only produce [`Frame`]s on the [`FrameBus`]; the
//! [`RosbridgeClient`][crate::client::RosbridgeClient] moves them to the
//! server and feeds status traffic back through [`ingest_inbound`].

use std::sync::Arc;
use std::time::Duration;

use retarget_output::OutputChannel;
use retarget_types::{Header, JointState, OutputError, Stamp, TrajectoryGoal};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info};
use uuid::Uuid;

use crate::bus::{Frame, FrameBus};
use crate::directory::EndpointDirectory;

pub const ACTION_GOAL_TYPE: &str = "control_msgs/FollowJointTrajectoryActionGoal";
pub const GOAL_ID_TYPE: &str = "actionlib_msgs/GoalID";
pub const GOAL_STATUS_ARRAY_TYPE: &str = "actionlib_msgs/GoalStatusArray";
pub const JOINT_STATE_TYPE: &str = "sensor_msgs/JointState";

// ────────────────────────────────────────────────────────────────────────────
// Frame builders
// ────────────────────────────────────────────────────────────────────────────

pub fn advertise_frame(topic: &str, msg_type: &str) -> Value {
    json!({ "op": "advertise", "topic": topic, "type": msg_type })
}

pub fn subscribe_frame(topic: &str, msg_type: &str) -> Value {
    json!({ "op": "subscribe", "topic": topic, "type": msg_type })
}

pub fn publish_frame(topic: &str, msg: Value) -> Value {
    json!({ "op": "publish", "topic": topic, "msg": msg })
}

fn to_json<T: Serialize>(endpoint: &str, value: &T) -> Result<Value, OutputError> {
    serde_json::to_value(value)
        .map_err(|e| OutputError::Serialization(format!("{endpoint}: {e}")))
}

/// Build the `FollowJointTrajectoryActionGoal` message body wrapping `goal`.
pub fn action_goal_message(
    server: &str,
    goal: &TrajectoryGoal,
    goal_id: &str,
    sent_at: Stamp,
) -> Result<Value, OutputError> {
    Ok(json!({
        "header": to_json(server, &Header::stamped(sent_at))?,
        "goal_id": { "stamp": to_json(server, &sent_at)?, "id": goal_id },
        "goal": to_json(server, goal)?,
    }))
}

/// Route one inbound rosbridge text frame.
///
/// A `publish` on `<ns>/status` marks `<ns>` as available in `directory`.
/// Returns the namespace that was marked, or `None` for any other frame
/// (unparseable text included).
pub fn ingest_inbound(directory: &EndpointDirectory, text: &str) -> Option<String> {
    let json = serde_json::from_str::<Value>(text).ok()?;
    if json.get("op").and_then(Value::as_str) != Some("publish") {
        return None;
    }
    let topic = json.get("topic").and_then(Value::as_str)?;
    let server = topic.strip_suffix("/status")?;
    if directory.mark_available(server) {
        info!(server = %server, "Action server status received");
    }
    Some(server.to_string())
}

fn normalise(endpoint: &str) -> String {
    let trimmed = endpoint.trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Action channel
// ────────────────────────────────────────────────────────────────────────────

/// actionlib client side of a `FollowJointTrajectory` server, over rosbridge.
///
/// At most one goal is outstanding: each [`send`][OutputChannel::send]
/// replaces the tracked goal id, and the server preempts the previous goal
/// when the new one arrives.
pub struct RosbridgeActionChannel {
    server: String,
    bus: Arc<FrameBus>,
    directory: EndpointDirectory,
    advertised: bool,
    outstanding: Option<String>,
}

impl RosbridgeActionChannel {
    /// `server` is the action namespace, e.g.
    /// `"/arm_controller/follow_joint_trajectory"`.
    pub fn new(server: &str, bus: Arc<FrameBus>, directory: EndpointDirectory) -> Self {
        Self {
            server: normalise(server),
            bus,
            directory,
            advertised: false,
            outstanding: None,
        }
    }

    /// Id of the goal currently in force, if any goal has been sent.
    pub fn outstanding_goal_id(&self) -> Option<&str> {
        self.outstanding.as_deref()
    }

    fn topic(&self, leaf: &str) -> String {
        format!("{}/{leaf}", self.server)
    }

    fn advertise(&mut self) -> Result<(), OutputError> {
        let frames = [
            advertise_frame(&self.topic("goal"), ACTION_GOAL_TYPE),
            advertise_frame(&self.topic("cancel"), GOAL_ID_TYPE),
            subscribe_frame(&self.topic("status"), GOAL_STATUS_ARRAY_TYPE),
        ];
        for body in frames {
            self.bus
                .publish(Frame::new(&self.server, body))
                .map_err(|e| OutputError::ConnectionFailed {
                    endpoint: self.server.clone(),
                    details: e.to_string(),
                })?;
        }
        self.advertised = true;
        Ok(())
    }
}

impl OutputChannel for RosbridgeActionChannel {
    type Message = TrajectoryGoal;

    fn endpoint(&self) -> &str {
        &self.server
    }

    fn connect(&mut self, timeout: Option<Duration>) -> Result<(), OutputError> {
        if !self.advertised {
            self.advertise()?;
        }
        self.directory.wait_blocking(&self.server, timeout)
    }

    fn send(&mut self, goal: &TrajectoryGoal) -> Result<(), OutputError> {
        let goal_id = format!("retarget-{}", Uuid::new_v4());
        let msg = action_goal_message(&self.server, goal, &goal_id, Stamp::now())?;
        self.bus
            .publish(Frame::new(&self.server, publish_frame(&self.topic("goal"), msg)))?;

        if let Some(previous) = self.outstanding.replace(goal_id) {
            debug!(server = %self.server, superseded = %previous, "Goal superseded");
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Topic channel
// ────────────────────────────────────────────────────────────────────────────

/// Plain `sensor_msgs/JointState` publisher over rosbridge.
///
/// `connect` only advertises the topic; a ROS publisher does not wait for
/// subscribers.
pub struct RosbridgeTopicChannel {
    topic: String,
    bus: Arc<FrameBus>,
    advertised: bool,
}

impl RosbridgeTopicChannel {
    pub fn new(topic: &str, bus: Arc<FrameBus>) -> Self {
        Self {
            topic: normalise(topic),
            bus,
            advertised: false,
        }
    }
}

impl OutputChannel for RosbridgeTopicChannel {
    type Message = JointState;

    fn endpoint(&self) -> &str {
        &self.topic
    }

    fn connect(&mut self, _timeout: Option<Duration>) -> Result<(), OutputError> {
        if self.advertised {
            return Ok(());
        }
        self.bus
            .publish(Frame::new(&self.topic, advertise_frame(&self.topic, JOINT_STATE_TYPE)))
            .map_err(|e| OutputError::ConnectionFailed {
                endpoint: self.topic.clone(),
                details: e.to_string(),
            })?;
        self.advertised = true;
        Ok(())
    }

    fn send(&mut self, message: &JointState) -> Result<(), OutputError> {
        let msg = to_json(&self.topic, message)?;
        self.bus
            .publish(Frame::new(&self.topic, publish_frame(&self.topic, msg)))
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retarget_output::{FollowJointTrajectoryHandler, HandlerConfig, OutputHandler};
    use retarget_types::{ExclusionSet, JointSample, PoseSnapshot};
    use tokio::sync::broadcast;

    const SERVER: &str = "/arm_controller/follow_joint_trajectory";

    fn drain(rx: &mut broadcast::Receiver<Frame>) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame.body);
        }
        frames
    }

    fn snapshot() -> PoseSnapshot {
        PoseSnapshot::new(
            Stamp::from_secs(5),
            vec![
                JointSample::new("wheel_left", 1.0, 0.0),
                JointSample::new("shoulder", 0.5, 0.1),
                JointSample::new("wheel_right", 1.0, 0.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn connect_advertises_then_waits_for_status() {
        let bus = Arc::new(FrameBus::default());
        let mut rx = bus.subscribe();
        let directory = EndpointDirectory::new();
        directory.mark_available(SERVER);

        let mut channel = RosbridgeActionChannel::new(SERVER, Arc::clone(&bus), directory);
        channel.connect(Some(Duration::from_millis(50))).unwrap();

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0]["op"], "advertise");
        assert_eq!(frames[0]["topic"], format!("{SERVER}/goal"));
        assert_eq!(frames[0]["type"], ACTION_GOAL_TYPE);
        assert_eq!(frames[1]["topic"], format!("{SERVER}/cancel"));
        assert_eq!(frames[2]["op"], "subscribe");
        assert_eq!(frames[2]["topic"], format!("{SERVER}/status"));
    }

    #[test]
    fn connect_times_out_without_status() {
        let bus = Arc::new(FrameBus::default());
        let _rx = bus.subscribe();
        let mut channel = RosbridgeActionChannel::new(SERVER, bus, EndpointDirectory::new());
        assert!(matches!(
            channel.connect(Some(Duration::from_millis(20))),
            Err(OutputError::ConnectTimeout { .. })
        ));
    }

    #[test]
    fn connect_without_client_fails() {
        let bus = Arc::new(FrameBus::default());
        let mut channel = RosbridgeActionChannel::new(SERVER, bus, EndpointDirectory::new());
        assert!(matches!(
            channel.connect(None),
            Err(OutputError::ConnectionFailed { .. })
        ));
    }

    #[test]
    fn second_connect_does_not_readvertise() {
        let bus = Arc::new(FrameBus::default());
        let mut rx = bus.subscribe();
        let directory = EndpointDirectory::new();
        directory.mark_available(SERVER);
        let mut channel = RosbridgeActionChannel::new(SERVER, Arc::clone(&bus), directory);
        channel.connect(None).unwrap();
        drain(&mut rx);
        channel.connect(None).unwrap();
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn goal_frame_carries_filtered_single_point_trajectory() {
        let bus = Arc::new(FrameBus::default());
        let mut rx = bus.subscribe();
        let directory = EndpointDirectory::new();
        directory.mark_available(SERVER);

        let channel = RosbridgeActionChannel::new(SERVER, Arc::clone(&bus), directory);
        let config = HandlerConfig::new("arm").with_excluded(ExclusionSet::mobile_base_wheels());
        let mut handler = FollowJointTrajectoryHandler::new(config, channel);
        handler.init().unwrap();
        drain(&mut rx);

        handler.set_output(&snapshot()).unwrap();
        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(frame["op"], "publish");
        assert_eq!(frame["topic"], format!("{SERVER}/goal"));

        let trajectory = &frame["msg"]["goal"]["trajectory"];
        assert_eq!(trajectory["joint_names"], json!(["shoulder"]));
        assert_eq!(trajectory["header"]["stamp"], json!({"secs": 5, "nsecs": 0}));
        let point = &trajectory["points"][0];
        assert_eq!(point["positions"], json!([0.5]));
        assert_eq!(point["velocities"], json!([0.1]));
        assert_eq!(point["accelerations"], json!([0.0]));

        let goal_id = frame["msg"]["goal_id"]["id"].as_str().unwrap();
        assert_eq!(handler.channel().outstanding_goal_id(), Some(goal_id));
    }

    #[test]
    fn new_goal_replaces_outstanding_id() {
        let bus = Arc::new(FrameBus::default());
        let _rx = bus.subscribe();
        let mut channel = RosbridgeActionChannel::new(SERVER, bus, EndpointDirectory::new());

        channel.send(&TrajectoryGoal::default()).unwrap();
        let first = channel.outstanding_goal_id().unwrap().to_string();
        channel.send(&TrajectoryGoal::default()).unwrap();
        let second = channel.outstanding_goal_id().unwrap();
        assert_ne!(first, second);
        assert!(second.starts_with("retarget-"));
    }

    #[test]
    fn ingest_inbound_marks_status_namespaces_only() {
        let directory = EndpointDirectory::new();
        let status = format!(
            r#"{{"op":"publish","topic":"{SERVER}/status","msg":{{"status_list":[]}}}}"#
        );
        assert_eq!(ingest_inbound(&directory, &status).as_deref(), Some(SERVER));
        assert!(directory.is_available(SERVER));

        assert!(ingest_inbound(&directory, r#"{"op":"publish","topic":"/joint_states"}"#).is_none());
        assert!(ingest_inbound(&directory, r#"{"op":"status","level":"error"}"#).is_none());
        assert!(ingest_inbound(&directory, "not json").is_none());
    }

    #[test]
    fn endpoint_names_are_normalised() {
        let bus = Arc::new(FrameBus::default());
        let channel =
            RosbridgeActionChannel::new("arm_controller/follow_joint_trajectory/", bus, EndpointDirectory::new());
        assert_eq!(channel.endpoint(), SERVER);
    }

    #[test]
    fn topic_channel_advertises_once_and_publishes_joint_state() {
        let bus = Arc::new(FrameBus::default());
        let mut rx = bus.subscribe();
        let mut channel = RosbridgeTopicChannel::new("/retarget/joint_states", Arc::clone(&bus));
        channel.connect(None).unwrap();
        channel.connect(None).unwrap();
        channel.send(&JointState::from(&snapshot())).unwrap();

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0]["type"], JOINT_STATE_TYPE);
        assert_eq!(frames[1]["msg"]["name"], json!(["wheel_left", "shoulder", "wheel_right"]));
    }
}
