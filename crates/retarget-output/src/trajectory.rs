//! [`FollowJointTrajectoryHandler`] – drives a trajectory-following
//! controller with single-waypoint goals.
//!
//! # Translation
//!
//! For every joint of the snapshot, in order, that is not in the handler's
//! exclusion set, the goal receives the joint name, its position, its
//! velocity and an acceleration of `0.0` (the retargeting pipeline does not
//! produce accelerations).  The goal always carries exactly one trajectory
//! point and is stamped with the snapshot stamp.
//!
//! A snapshot whose joints are all excluded still yields a goal with one
//! empty point, and that goal is still dispatched.

use retarget_types::{ConnectionState, ExclusionSet, OutputError, PoseSnapshot, TrajectoryGoal};
use tracing::{debug, error, info, instrument};

use crate::channel::OutputChannel;
use crate::filter;
use crate::handler::{HandlerConfig, OutputHandler, not_initialized};
use crate::lifecycle::{ConnectOutcome, ConnectionLifecycle};

/// Output handler that sends a `FollowJointTrajectory` goal per snapshot.
///
/// The handler owns its channel and its goal buffer; the buffer is cleared
/// and refilled on every [`set_output`][OutputHandler::set_output] call so
/// that no state leaks between goals.
pub struct FollowJointTrajectoryHandler<C> {
    config: HandlerConfig,
    channel: C,
    lifecycle: ConnectionLifecycle,
    goal: TrajectoryGoal,
}

impl<C> FollowJointTrajectoryHandler<C>
where
    C: OutputChannel<Message = TrajectoryGoal>,
{
    pub fn new(config: HandlerConfig, channel: C) -> Self {
        Self {
            config,
            channel,
            lifecycle: ConnectionLifecycle::new(),
            goal: TrajectoryGoal::default(),
        }
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }
}

/// Overwrite `goal` in place with the translation of `snapshot`.
pub fn fill_goal(goal: &mut TrajectoryGoal, snapshot: &PoseSnapshot, excluded: &ExclusionSet) {
    let trajectory = &mut goal.trajectory;
    trajectory.joint_names.clear();

    // Reuse the first point's allocations when there is one.
    let mut point = trajectory.points.drain(..).next().unwrap_or_default();
    point.clear();

    for joint in filter::retained(snapshot.joints(), excluded) {
        trajectory.joint_names.push(joint.name.clone());
        point.positions.push(joint.position);
        point.velocities.push(joint.velocity);
        point.accelerations.push(0.0);
    }

    trajectory.points.push(point);
    trajectory.header.stamp = snapshot.stamp();
}

impl<C> OutputHandler for FollowJointTrajectoryHandler<C>
where
    C: OutputChannel<Message = TrajectoryGoal>,
{
    fn name(&self) -> &str {
        &self.config.name
    }

    fn state(&self) -> ConnectionState {
        self.lifecycle.state()
    }

    #[instrument(skip(self), fields(handler = %self.config.name))]
    fn init(&mut self) -> Result<(), OutputError> {
        let timeout = self.config.connect_timeout;
        let channel = &mut self.channel;
        let outcome = self.lifecycle.connect_with(|| {
            info!(endpoint = %channel.endpoint(), ?timeout, "Connecting to action server");
            channel.connect(timeout)
        });

        match outcome {
            Ok(ConnectOutcome::Connected) => {
                info!(endpoint = %self.channel.endpoint(), "Connected to action server");
                Ok(())
            }
            Ok(ConnectOutcome::AlreadyReady) => {
                info!("Already initialised");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Failed to connect to action server");
                Err(e)
            }
        }
    }

    #[instrument(skip(self, snapshot), fields(handler = %self.config.name, stamp = %snapshot.stamp()))]
    fn set_output(&mut self, snapshot: &PoseSnapshot) -> Result<(), OutputError> {
        if !self.lifecycle.is_ready() {
            return Err(not_initialized(&self.config.name, self.lifecycle.state()));
        }

        fill_goal(&mut self.goal, snapshot, &self.config.excluded);
        if self.goal.trajectory.joint_names.is_empty() {
            debug!("Every joint excluded; dispatching empty goal");
        }

        self.channel.send(&self.goal)?;
        debug!(
            joints = self.goal.trajectory.joint_names.len(),
            excluded = filter::excluded_count(snapshot.joints(), &self.config.excluded),
            "Action goal sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimChannel, SimLog};
    use retarget_types::{JointSample, Stamp, TrajectoryPoint};
    use std::time::Duration;

    fn handler(
        excluded: ExclusionSet,
    ) -> (FollowJointTrajectoryHandler<SimChannel<TrajectoryGoal>>, SimLog<TrajectoryGoal>) {
        let channel = SimChannel::new("/arm_controller/follow_joint_trajectory");
        let log = channel.log();
        let config = HandlerConfig::new("arm").with_excluded(excluded);
        (FollowJointTrajectoryHandler::new(config, channel), log)
    }

    fn mobile_manipulator_snapshot() -> PoseSnapshot {
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
    fn wheel_joints_are_dropped_from_goal() {
        let (mut h, log) = handler(ExclusionSet::mobile_base_wheels());
        h.init().unwrap();
        h.set_output(&mobile_manipulator_snapshot()).unwrap();

        let goal = log.last().expect("one goal sent");
        let trajectory = &goal.trajectory;
        assert_eq!(trajectory.joint_names, vec!["shoulder".to_string()]);
        assert_eq!(trajectory.points.len(), 1);
        let point = &trajectory.points[0];
        assert_eq!(point.positions, vec![0.5]);
        assert_eq!(point.velocities, vec![0.1]);
        assert_eq!(point.accelerations, vec![0.0]);
        assert_eq!(trajectory.header.stamp, Stamp::from_secs(5));
    }

    #[test]
    fn all_joints_excluded_still_dispatches_empty_goal() {
        let (mut h, log) = handler(["wheel_left", "shoulder", "wheel_right"].into_iter().collect());
        h.init().unwrap();
        h.set_output(&mobile_manipulator_snapshot()).unwrap();

        assert_eq!(log.len(), 1);
        let goal = log.last().unwrap();
        assert!(goal.trajectory.joint_names.is_empty());
        assert_eq!(goal.trajectory.points.len(), 1);
        assert!(goal.trajectory.points[0].positions.is_empty());
        assert_eq!(goal.trajectory.header.stamp, Stamp::from_secs(5));
    }

    #[test]
    fn set_output_before_init_sends_nothing() {
        let (mut h, log) = handler(ExclusionSet::new());
        let result = h.set_output(&mobile_manipulator_snapshot());
        assert!(matches!(result, Err(OutputError::NotInitialized { .. })));
        assert!(log.is_empty());
        assert_eq!(h.state(), ConnectionState::Uninitialized);
    }

    #[test]
    fn init_is_idempotent() {
        let (mut h, log) = handler(ExclusionSet::new());
        h.init().unwrap();
        h.init().unwrap();
        assert_eq!(log.connect_count(), 1);
        assert!(h.is_ready());
    }

    #[test]
    fn failed_connect_leaves_handler_connecting() {
        let channel = SimChannel::<TrajectoryGoal>::new("/arm").failing_connect("no server");
        let log = channel.log();
        let mut h = FollowJointTrajectoryHandler::new(HandlerConfig::new("arm"), channel);

        assert!(matches!(h.init(), Err(OutputError::ConnectionFailed { .. })));
        assert_eq!(h.state(), ConnectionState::Connecting);

        let result = h.set_output(&mobile_manipulator_snapshot());
        assert!(matches!(
            result,
            Err(OutputError::NotInitialized { state: ConnectionState::Connecting, .. })
        ));
        assert!(log.is_empty());
    }

    #[test]
    fn send_failure_is_propagated() {
        let channel = SimChannel::<TrajectoryGoal>::new("/arm").failing_send("link down");
        let mut h = FollowJointTrajectoryHandler::new(HandlerConfig::new("arm"), channel);
        h.init().unwrap();
        assert!(matches!(
            h.set_output(&mobile_manipulator_snapshot()),
            Err(OutputError::DispatchFailed { .. })
        ));
        // A refused dispatch does not regress the connection state.
        assert!(h.is_ready());
    }

    #[test]
    fn accelerations_are_always_zero() {
        let (mut h, log) = handler(ExclusionSet::new());
        h.init().unwrap();
        let snap = PoseSnapshot::new(
            Stamp::from_secs_f64(1.5),
            (0..6)
                .map(|i| JointSample::new(format!("joint_{i}"), i as f64 * 0.3, 10.0 - i as f64))
                .collect(),
        )
        .unwrap();
        h.set_output(&snap).unwrap();

        let goal = log.last().unwrap();
        let point = &goal.trajectory.points[0];
        assert_eq!(point.accelerations.len(), 6);
        assert!(point.accelerations.iter().all(|a| *a == 0.0));
    }

    #[test]
    fn each_goal_supersedes_the_previous_one() {
        let (mut h, log) = handler(ExclusionSet::mobile_base_wheels());
        h.init().unwrap();
        h.set_output(&mobile_manipulator_snapshot()).unwrap();

        let second = PoseSnapshot::new(
            Stamp::from_secs(6),
            vec![
                JointSample::new("elbow", -0.2, 0.0),
                JointSample::new("wrist", 0.3, 0.05),
            ],
        )
        .unwrap();
        h.set_output(&second).unwrap();

        // The buffer is rebuilt: nothing from the first goal survives.
        let goal = log.last().unwrap();
        assert_eq!(goal.trajectory.joint_names, vec!["elbow", "wrist"]);
        assert_eq!(goal.trajectory.points.len(), 1);
        assert_eq!(goal.trajectory.points[0].positions, vec![-0.2, 0.3]);
        assert_eq!(goal.trajectory.header.stamp, Stamp::from_secs(6));
    }

    #[test]
    fn fill_goal_on_empty_buffer_builds_single_point() {
        let snap = mobile_manipulator_snapshot();
        let excluded = ExclusionSet::mobile_base_wheels();
        let mut goal = TrajectoryGoal::default();
        fill_goal(&mut goal, &snap, &excluded);
        let point: &TrajectoryPoint = &goal.trajectory.points[0];
        assert_eq!(goal.trajectory.joint_names, vec!["shoulder"]);
        assert!(point.effort.is_empty());
        assert_eq!(point.time_from_start, Stamp::ZERO);
    }

    #[test]
    fn connect_timeout_is_forwarded_in_config() {
        let channel = SimChannel::<TrajectoryGoal>::new("/arm");
        let cfg = HandlerConfig::new("arm").with_connect_timeout(Duration::from_secs(2));
        let h = FollowJointTrajectoryHandler::new(cfg, channel);
        assert_eq!(h.config().connect_timeout, Some(Duration::from_secs(2)));
        assert_eq!(h.channel().endpoint(), "/arm");
    }
}
