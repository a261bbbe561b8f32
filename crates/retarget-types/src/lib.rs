use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Point in time in the ROS 1 wire representation (`{secs, nsecs}`).
///
/// Also used for the relative `time_from_start` of a trajectory point, which
/// shares the same encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Stamp {
    pub secs: i64,
    pub nsecs: u32,
}

impl Stamp {
    pub const ZERO: Stamp = Stamp { secs: 0, nsecs: 0 };

    const NANOS_PER_SEC: u32 = 1_000_000_000;

    /// Build a stamp, carrying excess nanoseconds into the seconds field.
    pub fn new(secs: i64, nsecs: u32) -> Self {
        Self {
            secs: secs + i64::from(nsecs / Self::NANOS_PER_SEC),
            nsecs: nsecs % Self::NANOS_PER_SEC,
        }
    }

    pub fn from_secs(secs: i64) -> Self {
        Self { secs, nsecs: 0 }
    }

    /// Build a stamp from fractional seconds.  Non-finite input maps to
    /// [`Stamp::ZERO`].
    pub fn from_secs_f64(secs: f64) -> Self {
        if !secs.is_finite() {
            return Self::ZERO;
        }
        let whole = secs.floor();
        let frac = ((secs - whole) * f64::from(Self::NANOS_PER_SEC)).round() as u32;
        Self::new(whole as i64, frac)
    }

    /// Wall-clock time now.
    pub fn now() -> Self {
        Self::from(Utc::now())
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.secs as f64 + f64::from(self.nsecs) / f64::from(Self::NANOS_PER_SEC)
    }
}

impl From<DateTime<Utc>> for Stamp {
    fn from(time: DateTime<Utc>) -> Self {
        Self::new(time.timestamp(), time.timestamp_subsec_nanos())
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.secs, self.nsecs)
    }
}

/// Standard ROS message header.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Header {
    #[serde(default)]
    pub stamp: Stamp,
    #[serde(default)]
    pub frame_id: String,
}

impl Header {
    pub fn stamped(stamp: Stamp) -> Self {
        Self {
            stamp,
            frame_id: String::new(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Pose snapshot
// ────────────────────────────────────────────────────────────────────────────

/// Desired state of a single named joint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointSample {
    pub name: String,
    pub position: f64,
    pub velocity: f64,
}

impl JointSample {
    pub fn new(name: impl Into<String>, position: f64, velocity: f64) -> Self {
        Self {
            name: name.into(),
            position,
            velocity,
        }
    }
}

/// Immutable, timed set of joint targets produced once per control cycle by
/// the retargeting pipeline.
///
/// Joint names are unique and the insertion order is the authoritative joint
/// order for every array-positional output channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PoseSnapshotRepr")]
pub struct PoseSnapshot {
    stamp: Stamp,
    joints: Vec<JointSample>,
}

#[derive(Deserialize)]
struct PoseSnapshotRepr {
    stamp: Stamp,
    joints: Vec<JointSample>,
}

impl TryFrom<PoseSnapshotRepr> for PoseSnapshot {
    type Error = OutputError;

    fn try_from(repr: PoseSnapshotRepr) -> Result<Self, Self::Error> {
        PoseSnapshot::new(repr.stamp, repr.joints)
    }
}

impl PoseSnapshot {
    /// Build a snapshot from ordered joint samples.
    ///
    /// # Errors
    ///
    /// Returns [`OutputError::InvalidSnapshot`] if a joint name appears twice.
    pub fn new(stamp: Stamp, joints: Vec<JointSample>) -> Result<Self, OutputError> {
        let mut seen = HashSet::with_capacity(joints.len());
        for joint in &joints {
            if !seen.insert(joint.name.as_str()) {
                return Err(OutputError::InvalidSnapshot(format!(
                    "duplicate joint name '{}'",
                    joint.name
                )));
            }
        }
        Ok(Self { stamp, joints })
    }

    /// Build a snapshot from the parallel-array form used by
    /// `sensor_msgs/JointState`.
    ///
    /// `velocities` may be empty, in which case every velocity is `0.0`.
    ///
    /// # Errors
    ///
    /// Returns [`OutputError::InvalidSnapshot`] when the array lengths disagree
    /// or a joint name is duplicated.
    pub fn from_joint_state(
        stamp: Stamp,
        names: Vec<String>,
        positions: &[f64],
        velocities: &[f64],
    ) -> Result<Self, OutputError> {
        if positions.len() != names.len() {
            return Err(OutputError::InvalidSnapshot(format!(
                "{} joint names but {} positions",
                names.len(),
                positions.len()
            )));
        }
        if !velocities.is_empty() && velocities.len() != names.len() {
            return Err(OutputError::InvalidSnapshot(format!(
                "{} joint names but {} velocities",
                names.len(),
                velocities.len()
            )));
        }
        let joints = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| JointSample {
                name,
                position: positions[i],
                velocity: velocities.get(i).copied().unwrap_or(0.0),
            })
            .collect();
        Self::new(stamp, joints)
    }

    pub fn stamp(&self) -> Stamp {
        self.stamp
    }

    /// Joints in authoritative order.
    pub fn joints(&self) -> &[JointSample] {
        &self.joints
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }
}

/// Joint names a handler must never forward to its channel.
///
/// Matching is exact: no case folding, no whitespace trimming.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExclusionSet(HashSet<String>);

impl ExclusionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The non-actuated wheel joints of the mobile base, which are driven by
    /// the base controller rather than the trajectory-following arm.
    pub fn mobile_base_wheels() -> Self {
        ["wheel_left", "wheel_right"].into_iter().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for ExclusionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Readiness of an output handler's channel.  Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Uninitialized,
    Connecting,
    Ready,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Uninitialized => write!(f, "uninitialized"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Ready => write!(f, "ready"),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Channel messages
// ────────────────────────────────────────────────────────────────────────────

/// One waypoint of a joint trajectory (`trajectory_msgs/JointTrajectoryPoint`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub positions: Vec<f64>,
    pub velocities: Vec<f64>,
    pub accelerations: Vec<f64>,
    pub effort: Vec<f64>,
    pub time_from_start: Stamp,
}

impl TrajectoryPoint {
    pub fn clear(&mut self) {
        self.positions.clear();
        self.velocities.clear();
        self.accelerations.clear();
        self.effort.clear();
        self.time_from_start = Stamp::ZERO;
    }
}

/// `trajectory_msgs/JointTrajectory`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JointTrajectory {
    pub header: Header,
    pub joint_names: Vec<String>,
    pub points: Vec<TrajectoryPoint>,
}

/// Goal of a `control_msgs/FollowJointTrajectory` action.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrajectoryGoal {
    pub trajectory: JointTrajectory,
}

/// `sensor_msgs/JointState`, the message emitted by direct-publish channels
/// and accepted from the retargeting pipeline.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JointState {
    #[serde(default)]
    pub header: Header,
    pub name: Vec<String>,
    pub position: Vec<f64>,
    #[serde(default)]
    pub velocity: Vec<f64>,
    #[serde(default)]
    pub effort: Vec<f64>,
}

impl From<&PoseSnapshot> for JointState {
    fn from(snapshot: &PoseSnapshot) -> Self {
        let joints = snapshot.joints();
        Self {
            header: Header::stamped(snapshot.stamp()),
            name: joints.iter().map(|j| j.name.clone()).collect(),
            position: joints.iter().map(|j| j.position).collect(),
            velocity: joints.iter().map(|j| j.velocity).collect(),
            effort: Vec::new(),
        }
    }
}

impl TryFrom<JointState> for PoseSnapshot {
    type Error = OutputError;

    fn try_from(msg: JointState) -> Result<Self, Self::Error> {
        PoseSnapshot::from_joint_state(msg.header.stamp, msg.name, &msg.position, &msg.velocity)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Error type shared by every output handler and channel.
///
/// None of these are fatal: each one degrades to a diagnostic plus a failed
/// result for the affected handler only.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OutputError {
    #[error("Output handler '{handler}' is not initialised (state: {state})")]
    NotInitialized {
        handler: String,
        state: ConnectionState,
    },

    #[error("Connection to '{endpoint}' failed: {details}")]
    ConnectionFailed { endpoint: String, details: String },

    #[error("Connection to '{endpoint}' timed out after {timeout_ms} ms")]
    ConnectTimeout { endpoint: String, timeout_ms: u64 },

    #[error("Dispatch to '{endpoint}' failed: {details}")]
    DispatchFailed { endpoint: String, details: String },

    #[error("Invalid pose snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),
}
