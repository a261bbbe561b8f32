//! In-process simulated channel for CI/CD and simulator bridges.
//!
//! [`SimChannel`] implements [`OutputChannel`] for any message type by
//! recording every sent message into a shared [`SimLog`].  Paired with one of
//! the built-in handlers it lets the whole output stack run headless, and a
//! simulator can consume the log as its command stream.
//!
//! # Example
//!
//! ```rust
//! use retarget_output::{FollowJointTrajectoryHandler, HandlerConfig, OutputHandler, SimChannel};
//! use retarget_types::{ExclusionSet, JointSample, PoseSnapshot, Stamp, TrajectoryGoal};
//!
//! let channel = SimChannel::<TrajectoryGoal>::new("/sim/follow_joint_trajectory");
//! let log = channel.log();
//! let config = HandlerConfig::new("sim_arm").with_excluded(ExclusionSet::mobile_base_wheels());
//! let mut handler = FollowJointTrajectoryHandler::new(config, channel);
//!
//! handler.init().expect("sim connect must succeed");
//! let snapshot = PoseSnapshot::new(
//!     Stamp::from_secs(1),
//!     vec![JointSample::new("shoulder", 0.5, 0.0)],
//! )
//! .expect("unique joint names");
//! handler.set_output(&snapshot).expect("sim send must succeed");
//!
//! assert_eq!(log.len(), 1);
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use retarget_types::OutputError;

use crate::channel::OutputChannel;

#[derive(Debug)]
struct SimRecord<M> {
    sent: VecDeque<M>,
    total_sent: usize,
    connects: usize,
    history: Option<usize>,
}

/// Shared view of everything a [`SimChannel`] has seen.  Clone it cheaply –
/// all clones observe the same record.
#[derive(Debug)]
pub struct SimLog<M> {
    record: Arc<Mutex<SimRecord<M>>>,
}

impl<M> Clone for SimLog<M> {
    fn clone(&self) -> Self {
        Self {
            record: Arc::clone(&self.record),
        }
    }
}

impl<M: Clone> SimLog<M> {
    fn new() -> Self {
        Self {
            record: Arc::new(Mutex::new(SimRecord {
                sent: VecDeque::new(),
                total_sent: 0,
                connects: 0,
                history: None,
            })),
        }
    }

    /// Retained messages, oldest first.
    pub fn sent(&self) -> Vec<M> {
        self.record.lock().sent.iter().cloned().collect()
    }

    /// The most recent message, i.e. the one currently in force.
    pub fn last(&self) -> Option<M> {
        self.record.lock().sent.back().cloned()
    }

    /// Number of messages sent, including any no longer retained.
    pub fn len(&self) -> usize {
        self.record.lock().total_sent
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of successful `connect` calls.
    pub fn connect_count(&self) -> usize {
        self.record.lock().connects
    }
}

/// A simulated channel that always connects immediately unless told to fail.
#[derive(Debug)]
pub struct SimChannel<M> {
    endpoint: String,
    log: SimLog<M>,
    connect_failure: Option<String>,
    send_failure: Option<String>,
}

impl<M: Clone> SimChannel<M> {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            log: SimLog::new(),
            connect_failure: None,
            send_failure: None,
        }
    }

    /// Retain only the `limit` most recent messages (at least one).
    pub fn with_history(self, limit: usize) -> Self {
        self.log.record.lock().history = Some(limit.max(1));
        self
    }

    /// Make every `connect` fail with `details`.
    pub fn failing_connect(mut self, details: impl Into<String>) -> Self {
        self.connect_failure = Some(details.into());
        self
    }

    /// Make every `send` fail with `details`.
    pub fn failing_send(mut self, details: impl Into<String>) -> Self {
        self.send_failure = Some(details.into());
        self
    }

    pub fn log(&self) -> SimLog<M> {
        self.log.clone()
    }
}

impl<M: Clone + Send> OutputChannel for SimChannel<M> {
    type Message = M;

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn connect(&mut self, _timeout: Option<Duration>) -> Result<(), OutputError> {
        if let Some(details) = &self.connect_failure {
            return Err(OutputError::ConnectionFailed {
                endpoint: self.endpoint.clone(),
                details: details.clone(),
            });
        }
        self.log.record.lock().connects += 1;
        Ok(())
    }

    fn send(&mut self, message: &M) -> Result<(), OutputError> {
        if let Some(details) = &self.send_failure {
            return Err(OutputError::DispatchFailed {
                endpoint: self.endpoint.clone(),
                details: details.clone(),
            });
        }
        let mut record = self.log.record.lock();
        record.sent.push_back(message.clone());
        record.total_sent += 1;
        if let Some(limit) = record.history {
            while record.sent.len() > limit {
                record.sent.pop_front();
            }
        }
        Ok(())
    }
}
