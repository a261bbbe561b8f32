//! Registry wiring – turns `[[handlers]]` entries into live output handlers.

use std::sync::Arc;

use retarget_middleware::{EndpointDirectory, FrameBus, RosbridgeActionChannel, RosbridgeTopicChannel};
use retarget_output::{FollowJointTrajectoryHandler, JointStatePublishHandler, OutputRegistry, SimChannel};
use retarget_types::TrajectoryGoal;
use tracing::info;

use crate::config::{Config, HandlerEntry, HandlerKind};

/// Shared rosbridge plumbing handed to every rosbridge-backed channel.
#[derive(Clone, Default)]
pub struct Transport {
    pub bus: Arc<FrameBus>,
    pub directory: EndpointDirectory,
}

/// Build one handler per config entry, in config order.
///
/// `transport` may be `None` only when every handler is of kind `sim`.
pub fn build_registry(cfg: &Config, transport: Option<&Transport>) -> Result<OutputRegistry, String> {
    let mut registry = OutputRegistry::new();
    for entry in &cfg.handlers {
        let handler_config = entry.handler_config();
        match entry.kind {
            HandlerKind::FollowJointTrajectory => {
                let t = require_transport(entry, transport)?;
                let channel = RosbridgeActionChannel::new(
                    &entry.endpoint,
                    Arc::clone(&t.bus),
                    t.directory.clone(),
                );
                registry.register(Box::new(FollowJointTrajectoryHandler::new(handler_config, channel)));
            }
            HandlerKind::JointState => {
                let t = require_transport(entry, transport)?;
                let channel = RosbridgeTopicChannel::new(&entry.endpoint, Arc::clone(&t.bus));
                registry.register(Box::new(JointStatePublishHandler::new(handler_config, channel)));
            }
            HandlerKind::Sim => {
                // Keep only the goal in force; the process may run for hours.
                let channel = SimChannel::<TrajectoryGoal>::new(entry.endpoint.as_str()).with_history(1);
                registry.register(Box::new(FollowJointTrajectoryHandler::new(handler_config, channel)));
            }
        }
        info!(handler = %entry.name, kind = %entry.kind, endpoint = %entry.endpoint, "Output handler registered");
    }
    Ok(registry)
}

fn require_transport<'a>(entry: &HandlerEntry, transport: Option<&'a Transport>) -> Result<&'a Transport, String> {
    transport.ok_or_else(|| {
        format!(
            "handler '{}' of kind {} needs a rosbridge connection",
            entry.name, entry.kind
        )
    })
}
