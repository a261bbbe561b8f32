//! [`JointStatePublishHandler`] – publishes the pose as a
//! `sensor_msgs/JointState` message.
//!
//! With the default empty exclusion set the snapshot is emitted unmodified;
//! a non-empty set drops those joints the same way the trajectory handler
//! does.

use retarget_types::{ConnectionState, ExclusionSet, JointState, OutputError, PoseSnapshot};
use tracing::{debug, error, info, instrument};

use crate::channel::OutputChannel;
use crate::filter;
use crate::handler::{HandlerConfig, OutputHandler, not_initialized};
use crate::lifecycle::{ConnectOutcome, ConnectionLifecycle};

pub struct JointStatePublishHandler<C> {
    config: HandlerConfig,
    channel: C,
    lifecycle: ConnectionLifecycle,
    message: JointState,
}

impl<C> JointStatePublishHandler<C>
where
    C: OutputChannel<Message = JointState>,
{
    pub fn new(config: HandlerConfig, channel: C) -> Self {
        Self {
            config,
            channel,
            lifecycle: ConnectionLifecycle::new(),
            message: JointState::default(),
        }
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }
}

/// Overwrite `message` with the joints of `snapshot` not in `excluded`.
pub fn fill_joint_state(message: &mut JointState, snapshot: &PoseSnapshot, excluded: &ExclusionSet) {
    message.name.clear();
    message.position.clear();
    message.velocity.clear();
    message.effort.clear();
    for joint in filter::retained(snapshot.joints(), excluded) {
        message.name.push(joint.name.clone());
        message.position.push(joint.position);
        message.velocity.push(joint.velocity);
    }
    message.header.stamp = snapshot.stamp();
}

impl<C> OutputHandler for JointStatePublishHandler<C>
where
    C: OutputChannel<Message = JointState>,
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
        match self.lifecycle.connect_with(|| channel.connect(timeout)) {
            Ok(ConnectOutcome::Connected) => {
                info!(topic = %self.channel.endpoint(), "Joint state publisher ready");
                Ok(())
            }
            Ok(ConnectOutcome::AlreadyReady) => {
                info!("Already initialised");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Failed to set up joint state publisher");
                Err(e)
            }
        }
    }

    #[instrument(skip(self, snapshot), fields(handler = %self.config.name))]
    fn set_output(&mut self, snapshot: &PoseSnapshot) -> Result<(), OutputError> {
        if !self.lifecycle.is_ready() {
            return Err(not_initialized(&self.config.name, self.lifecycle.state()));
        }
        fill_joint_state(&mut self.message, snapshot, &self.config.excluded);
        self.channel.send(&self.message)?;
        debug!(
            joints = self.message.name.len(),
            excluded = filter::excluded_count(snapshot.joints(), &self.config.excluded),
            "Joint state published"
        );
        Ok(())
    }
}
