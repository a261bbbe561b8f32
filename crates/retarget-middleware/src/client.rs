//! WebSocket client pump between the [`FrameBus`] and a `rosbridge_server`.
//!
//! [`RosbridgeClient`] subscribes to the bus when it is constructed, so
//! frames published by channels before the socket is open are buffered and
//! delivered in order once [`RosbridgeClient::run`] connects.  Inbound text
//! frames are routed through [`ingest_inbound`], which is how actionlib
//! status traffic unblocks a waiting `connect`.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use retarget_types::OutputError;
use tokio::sync::broadcast;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{info, warn};

use crate::bus::{Frame, FrameBus};
use crate::directory::EndpointDirectory;
use crate::rosbridge::ingest_inbound;

pub struct RosbridgeClient {
    url: String,
    outbound: broadcast::Receiver<Frame>,
    directory: EndpointDirectory,
}

impl RosbridgeClient {
    /// Attach a client to `bus`.  `url` is the server address, e.g.
    /// `"ws://localhost:9090"`.
    pub fn new(url: impl Into<String>, bus: &Arc<FrameBus>, directory: EndpointDirectory) -> Self {
        Self {
            url: url.into(),
            outbound: bus.subscribe(),
            directory,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Connect and pump frames until either side closes.
    ///
    /// However it ends, the directory is marked closed so that a `connect`
    /// still waiting for an action server fails instead of blocking forever.
    ///
    /// # Errors
    ///
    /// [`OutputError::ConnectionFailed`] when the WebSocket handshake fails or
    /// a frame cannot be written.
    pub async fn run(mut self) -> Result<(), OutputError> {
        let result = self.pump().await;
        let reason = match &result {
            Ok(()) => format!("rosbridge connection to {} closed", self.url),
            Err(e) => e.to_string(),
        };
        self.directory.mark_closed(reason);
        result
    }

    async fn pump(&mut self) -> Result<(), OutputError> {
        let (ws_stream, _) = connect_async(self.url.as_str()).await.map_err(|e| {
            OutputError::ConnectionFailed {
                endpoint: self.url.clone(),
                details: format!("ws handshake: {e}"),
            }
        })?;
        info!(url = %self.url, "Connected to rosbridge server");

        let (mut ws_tx, mut ws_rx) = ws_stream.split();

        loop {
            tokio::select! {
                // Forward frames from the bus to the server.
                result = self.outbound.recv() => {
                    match result {
                        Ok(frame) => {
                            if let Err(e) = ws_tx.send(Message::Text(frame.to_text().into())).await {
                                return Err(OutputError::ConnectionFailed {
                                    endpoint: self.url.clone(),
                                    details: format!("ws send: {e}"),
                                });
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(url = %self.url, lagged_by = n, "rosbridge client lagged; frames dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                // Route frames from the server.
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Err(e)) => {
                            warn!(url = %self.url, error = %e, "rosbridge receive error");
                            break;
                        }
                        Some(Ok(Message::Text(text))) => {
                            ingest_inbound(&self.directory, text.as_str());
                        }
                        _ => {}
                    }
                }
            }
        }

        info!(url = %self.url, "rosbridge connection closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rosbridge::RosbridgeActionChannel;
    use retarget_output::OutputChannel;
    use serde_json::Value;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    const SERVER: &str = "/arm_controller/follow_joint_trajectory";

    #[tokio::test]
    async fn handshake_failure_is_connection_failed() {
        // Bind and immediately drop to obtain a port with nothing listening.
        let addr = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
        let bus = Arc::new(FrameBus::default());
        let client = RosbridgeClient::new(format!("ws://{addr}"), &bus, EndpointDirectory::new());
        assert!(matches!(
            client.run().await,
            Err(OutputError::ConnectionFailed { .. })
        ));
    }

    #[test]
    fn transport_loss_fails_a_waiting_connect() {
        let addr = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
        let bus = Arc::new(FrameBus::default());
        let directory = EndpointDirectory::new();
        let client = RosbridgeClient::new(format!("ws://{addr}"), &bus, directory.clone());

        // Advertise while the client is still subscribed, as `init` does
        // when it races the handshake.
        let mut channel = RosbridgeActionChannel::new(SERVER, Arc::clone(&bus), directory.clone());
        assert!(matches!(
            channel.connect(Some(Duration::from_millis(10))),
            Err(OutputError::ConnectTimeout { .. })
        ));

        let runtime = tokio::runtime::Runtime::new().unwrap();
        assert!(runtime.block_on(client.run()).is_err());
        assert!(directory.closed_reason().is_some());

        let started = std::time::Instant::now();
        let result = channel.connect(Some(Duration::from_secs(5)));
        assert!(
            matches!(result, Err(OutputError::ConnectionFailed { .. })),
            "expected transport failure, got {result:?}"
        );
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn pumps_buffered_frames_and_routes_status() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let bus = Arc::new(FrameBus::default());
        let directory = EndpointDirectory::new();
        let client = RosbridgeClient::new(format!("ws://{addr}"), &bus, directory.clone());

        // Fake rosbridge_server: collect the three handshake frames, then
        // announce the action server with a status message.
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = accept_async(stream).await.unwrap();
            let (mut tx, mut rx) = ws.split();
            let mut received = Vec::new();
            while received.len() < 3 {
                match rx.next().await {
                    Some(Ok(Message::Text(text))) => {
                        received.push(serde_json::from_str::<Value>(text.as_str()).unwrap());
                    }
                    Some(Ok(_)) => {}
                    other => panic!("client went away early: {other:?}"),
                }
            }
            let status = format!(r#"{{"op":"publish","topic":"{SERVER}/status","msg":{{"status_list":[]}}}}"#);
            tx.send(Message::Text(status.into())).await.unwrap();
            received
        });

        // The channel's blocking connect runs on a plain thread, as it would
        // on the control thread of the binary.
        let connect_bus = Arc::clone(&bus);
        let connect_dir = directory.clone();
        let connector = std::thread::spawn(move || {
            let mut channel = RosbridgeActionChannel::new(SERVER, connect_bus, connect_dir);
            channel.connect(Some(Duration::from_secs(5)))
        });

        let pump = tokio::spawn(client.run());

        let received = server.await.unwrap();
        let ops: Vec<&str> = received.iter().map(|f| f["op"].as_str().unwrap()).collect();
        assert_eq!(ops, vec!["advertise", "advertise", "subscribe"]);

        let connected = tokio::task::spawn_blocking(move || connector.join().unwrap())
            .await
            .unwrap();
        assert!(connected.is_ok(), "connect must unblock on status: {connected:?}");
        assert!(directory.is_available(SERVER));

        pump.abort();
    }
}
