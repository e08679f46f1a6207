use std::collections::VecDeque;

use shared::{
    domain::{OperationKind, ProgressStatus},
    protocol::ProgressEvent,
};
use tokio::sync::watch;
use tracing::warn;

/// Client-side lifecycle of one operation. `Idle` exists only before the
/// first start; the wire never carries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationStatus::Completed | OperationStatus::Failed | OperationStatus::Cancelled
        )
    }
}

/// Accumulated view of one operation's progress stream.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationState {
    /// Most recent output lines, oldest first, bounded by the configured cap.
    pub output: VecDeque<String>,
    /// Total lines ever appended; lets a consumer that renders incrementally
    /// tell how many lines the ring has evicted since it last looked.
    pub lines_emitted: u64,
    pub current_stage: String,
    pub status: OperationStatus,
    pub progress_pct: Option<f64>,
    pub error: Option<String>,
}

impl OperationState {
    fn idle() -> Self {
        Self {
            output: VecDeque::new(),
            lines_emitted: 0,
            current_stage: String::new(),
            status: OperationStatus::Idle,
            progress_pct: None,
            error: None,
        }
    }

    fn running() -> Self {
        Self {
            status: OperationStatus::Running,
            ..Self::idle()
        }
    }
}

/// Folds one operation's [`ProgressEvent`] stream into the current
/// [`OperationState`]. One instance per [`OperationKind`], owned by the
/// router; consumers observe through [`subscribe`](Self::subscribe).
pub struct ProgressTracker {
    kind: OperationKind,
    output_cap: usize,
    state_tx: watch::Sender<OperationState>,
}

impl ProgressTracker {
    pub fn new(kind: OperationKind, output_cap: usize) -> Self {
        let (state_tx, _) = watch::channel(OperationState::idle());
        Self {
            kind,
            output_cap,
            state_tx,
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn state(&self) -> OperationState {
        self.state_tx.borrow().clone()
    }

    /// The returned receiver already holds the current state.
    pub fn subscribe(&self) -> watch::Receiver<OperationState> {
        self.state_tx.subscribe()
    }

    /// Clean running state, applied before the start frame goes out so the
    /// view is consistent even if the first progress event is delayed.
    pub(crate) fn reset_running(&self) {
        self.state_tx.send_replace(OperationState::running());
    }

    /// Applies one progress event. Terminal states absorb: frames arriving
    /// after `completed`/`failed`/`cancelled` are a protocol violation and
    /// are logged and ignored rather than resurrecting the display.
    pub(crate) fn apply(&self, event: ProgressEvent) {
        if self.state_tx.borrow().status.is_terminal() {
            warn!(
                kind = %self.kind,
                stage = %event.stage,
                status = ?event.status,
                "progress frame received after terminal status; ignoring"
            );
            return;
        }

        self.state_tx.send_modify(|state| {
            state.current_stage = event.stage;
            state.progress_pct = event.progress_pct;

            if let Some(line) = event.output_line {
                if !line.is_empty() {
                    state.output.push_back(line);
                    state.lines_emitted += 1;
                    // ring semantics: evict oldest until back under the cap
                    while state.output.len() > self.output_cap {
                        state.output.pop_front();
                    }
                }
            }

            match event.status {
                ProgressStatus::Running => {
                    state.status = OperationStatus::Running;
                }
                ProgressStatus::Completed => {
                    state.status = OperationStatus::Completed;
                    state.error = None;
                }
                ProgressStatus::Failed => {
                    state.status = OperationStatus::Failed;
                    state.error = Some(describe_failure(event.error, event.message, "operation failed"));
                }
                ProgressStatus::Cancelled => {
                    state.status = OperationStatus::Cancelled;
                    state.error =
                        Some(describe_failure(event.error, event.message, "operation cancelled"));
                }
            }
        });
    }
}

/// Fallback chain for the terminal error text: explicit error, then the
/// event's human-readable message, then a generic label. Never empty.
fn describe_failure(error: Option<String>, message: String, fallback: &str) -> String {
    if let Some(error) = error.filter(|text| !text.is_empty()) {
        return error;
    }
    if !message.is_empty() {
        return message;
    }
    fallback.to_string()
}

#[cfg(test)]
#[path = "tests/progress_tests.rs"]
mod tests;
