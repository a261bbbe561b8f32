//! [`EndpointDirectory`] – which remote endpoints have announced themselves.
//!
//! An actionlib server is considered available once its first status message
//! has been received.  The WebSocket client marks endpoints as inbound frames
//! arrive and marks the directory closed when its connection ends; channels
//! block on [`EndpointDirectory::wait_blocking`] inside `connect`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use retarget_types::OutputError;
use tokio::sync::watch;

#[derive(Debug, Default)]
struct DirectoryState {
    available: HashSet<String>,
    /// Why the transport went away; no endpoint can appear after this.
    closed: Option<String>,
}

/// Shared set of available endpoints.  Clone it cheaply – all clones share
/// the same set.
#[derive(Clone, Debug)]
pub struct EndpointDirectory {
    state: Arc<watch::Sender<DirectoryState>>,
}

impl Default for EndpointDirectory {
    fn default() -> Self {
        let (state, _) = watch::channel(DirectoryState::default());
        Self {
            state: Arc::new(state),
        }
    }
}

impl EndpointDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `endpoint` as available.  Returns `true` on the first sighting.
    pub fn mark_available(&self, endpoint: &str) -> bool {
        self.state
            .send_if_modified(|state| state.available.insert(endpoint.to_string()))
    }

    pub fn is_available(&self, endpoint: &str) -> bool {
        self.state.borrow().available.contains(endpoint)
    }

    /// Record that the transport feeding this directory has stopped.  Every
    /// pending and future wait for an unseen endpoint fails with `reason`.
    /// The first reason recorded wins.
    pub fn mark_closed(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.state.send_if_modified(|state| {
            if state.closed.is_some() {
                return false;
            }
            state.closed = Some(reason);
            true
        });
    }

    pub fn closed_reason(&self) -> Option<String> {
        self.state.borrow().closed.clone()
    }

    /// Wait until `endpoint` is available.
    ///
    /// # Errors
    ///
    /// [`OutputError::ConnectionFailed`] if the transport closes, or has
    /// already closed, before `endpoint` is seen.
    pub async fn wait_for(&self, endpoint: &str) -> Result<(), OutputError> {
        let closed = |details: String| OutputError::ConnectionFailed {
            endpoint: endpoint.to_string(),
            details,
        };
        let mut rx = self.state.subscribe();
        let state = rx
            .wait_for(|state| state.available.contains(endpoint) || state.closed.is_some())
            .await
            .map_err(|_| closed("endpoint directory closed".to_string()))?;
        if state.available.contains(endpoint) {
            return Ok(());
        }
        Err(closed(state.closed.clone().unwrap_or_default()))
    }

    /// Block the calling thread until `endpoint` is available, the transport
    /// closes, or `timeout` elapses (`None` waits indefinitely).
    ///
    /// Must be called from a plain thread: calling it from inside a Tokio
    /// runtime would stall that runtime's worker, so it is refused.
    ///
    /// # Errors
    ///
    /// [`OutputError::ConnectTimeout`] on timeout,
    /// [`OutputError::ConnectionFailed`] when the transport is closed, when
    /// called from an async context, or when the local wait runtime cannot be
    /// built.
    pub fn wait_blocking(&self, endpoint: &str, timeout: Option<Duration>) -> Result<(), OutputError> {
        if self.is_available(endpoint) {
            return Ok(());
        }
        if let Some(details) = self.closed_reason() {
            return Err(OutputError::ConnectionFailed {
                endpoint: endpoint.to_string(),
                details,
            });
        }
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(OutputError::ConnectionFailed {
                endpoint: endpoint.to_string(),
                details: "blocking connect called from inside an async runtime".to_string(),
            });
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| OutputError::ConnectionFailed {
                endpoint: endpoint.to_string(),
                details: format!("failed to build wait runtime: {e}"),
            })?;

        runtime.block_on(async {
            match timeout {
                None => self.wait_for(endpoint).await,
                Some(limit) => tokio::time::timeout(limit, self.wait_for(endpoint))
                    .await
                    .unwrap_or_else(|_| {
                        Err(OutputError::ConnectTimeout {
                            endpoint: endpoint.to_string(),
                            timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                        })
                    }),
            }
        })
    }
}
