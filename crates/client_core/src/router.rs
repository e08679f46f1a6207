use std::{collections::HashMap, sync::Arc};

use shared::{
    domain::OperationKind,
    protocol::{ClientMessage, Envelope, ProgressEvent, StartRequest},
};
use tokio::{
    sync::{broadcast::error::RecvError, watch, Mutex},
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::{
    error::TransportError,
    manager::ConnectionManager,
    progress::{OperationState, ProgressTracker},
};

/// Translates raw socket frames into typed progress events and routes them
/// by `msg_type` to the matching [`ProgressTracker`]; translates start,
/// cancel and retry requests into outbound envelopes.
pub struct ProgressRouter {
    manager: Arc<ConnectionManager>,
    trackers: Arc<HashMap<OperationKind, ProgressTracker>>,
    last_start: Mutex<HashMap<OperationKind, StartRequest>>,
    pump: JoinHandle<()>,
}

impl ProgressRouter {
    /// Builds one tracker per operation kind and starts pumping the
    /// manager's raw message stream into them. The manager may be shared;
    /// dispatch is purely by message tag.
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        let output_cap = manager.config().output_cap;
        let trackers: Arc<HashMap<_, _>> = Arc::new(
            OperationKind::ALL
                .into_iter()
                .map(|kind| (kind, ProgressTracker::new(kind, output_cap)))
                .collect(),
        );

        let mut messages = manager.subscribe_messages();
        let pump_trackers = Arc::clone(&trackers);
        let pump = tokio::spawn(async move {
            loop {
                match messages.recv().await {
                    Ok(raw) => dispatch(&pump_trackers, &raw),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "inbound frames dropped by slow dispatch");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Self {
            manager,
            trackers,
            last_start: Mutex::new(HashMap::new()),
            pump,
        }
    }

    /// Resets the target operation to a clean running state, remembers the
    /// request for [`retry`](Self::retry), and sends the start envelope.
    pub async fn start(&self, request: StartRequest) -> Result<(), TransportError> {
        let kind = request.kind();
        self.tracker(kind).reset_running();
        self.last_start.lock().await.insert(kind, request.clone());
        self.send_message(&request.into_message()).await
    }

    /// Asks the gateway to abandon the operation. Terminality still arrives
    /// from the server as a `cancelled` progress frame.
    pub async fn cancel(&self, kind: OperationKind) -> Result<(), TransportError> {
        self.send_message(&ClientMessage::cancel(kind)).await
    }

    /// Replays the remembered start request. Valid only from a failed or
    /// cancelled state.
    pub async fn retry(&self, kind: OperationKind) -> Result<(), TransportError> {
        let status = self.tracker(kind).state().status;
        if !matches!(
            status,
            crate::progress::OperationStatus::Failed | crate::progress::OperationStatus::Cancelled
        ) {
            return Err(TransportError::RetryNotAllowed { kind, status });
        }
        let request = self
            .last_start
            .lock()
            .await
            .get(&kind)
            .cloned()
            .ok_or(TransportError::NothingToRetry { kind })?;
        self.tracker(kind).reset_running();
        self.send_message(&request.into_message()).await
    }

    pub fn state(&self, kind: OperationKind) -> OperationState {
        self.tracker(kind).state()
    }

    /// The returned receiver already holds the operation's current state.
    pub fn subscribe(&self, kind: OperationKind) -> watch::Receiver<OperationState> {
        self.tracker(kind).subscribe()
    }

    fn tracker(&self, kind: OperationKind) -> &ProgressTracker {
        &self.trackers[&kind]
    }

    async fn send_message(&self, message: &ClientMessage) -> Result<(), TransportError> {
        let raw = serde_json::to_string(message)?;
        self.manager.send(&raw).await;
        Ok(())
    }
}

impl Drop for ProgressRouter {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Decodes one raw frame and applies it. Malformed frames and unknown tags
/// are dropped without touching any tracker: one bad frame must never take
/// the consuming view down, and unknown tags keep the client forward
/// compatible with server-added message kinds.
fn dispatch(trackers: &HashMap<OperationKind, ProgressTracker>, raw: &str) {
    let envelope: Envelope = match serde_json::from_str(raw) {
        Ok(envelope) => envelope,
        Err(err) => {
            debug!("discarding malformed frame: {err}");
            return;
        }
    };

    let Some(kind) = OperationKind::from_progress_tag(&envelope.msg_type) else {
        debug!(msg_type = %envelope.msg_type, "ignoring unrecognized message kind");
        return;
    };

    let event: ProgressEvent = match serde_json::from_value(envelope.payload) {
        Ok(event) => event,
        Err(err) => {
            warn!(kind = %kind, "discarding undecodable progress payload: {err}");
            return;
        }
    };

    trackers[&kind].apply(event);
}

#[cfg(test)]
#[path = "tests/router_tests.rs"]
mod tests;
