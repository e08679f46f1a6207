use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{OperationKind, ProgressStatus};

/// Wire frame: every message on the socket, in either direction, is one of
/// these serialized as a UTF-8 JSON text frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub msg_type: String,
    pub payload: Value,
}

/// Payload of `start-install`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct InstallOptions {
    pub install_node: bool,
    pub install_openclaw: bool,
}

/// Payload of `start-remote-install`: the SSH target to provision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTarget {
    pub host: String,
    pub username: String,
}

/// Payload of every `<kind>-progress` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProgressEvent {
    /// Free-form phase label, e.g. "node-install" or "verify".
    pub stage: String,
    pub status: ProgressStatus,
    /// Human-readable current activity, may be empty.
    #[serde(default)]
    pub message: String,
    /// 0-100, or `None` for indeterminate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_pct: Option<f64>,
    /// One line of raw process output, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_line: Option<String>,
    /// Populated only when `status` is `failed` or `cancelled`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Unix millis; the remote-install stream attaches one per event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// Everything the client may put on the wire, typed per tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg_type", content = "payload", rename_all = "kebab-case")]
pub enum ClientMessage {
    StartInstall(InstallOptions),
    StartUninstall {},
    StartUpgrade {},
    StartRemoteInstall(RemoteTarget),
    CancelInstall {},
    CancelUninstall {},
    CancelUpgrade {},
    CancelRemoteInstall {},
}

impl ClientMessage {
    pub fn cancel(kind: OperationKind) -> Self {
        match kind {
            OperationKind::Install => ClientMessage::CancelInstall {},
            OperationKind::Uninstall => ClientMessage::CancelUninstall {},
            OperationKind::Upgrade => ClientMessage::CancelUpgrade {},
            OperationKind::RemoteInstall => ClientMessage::CancelRemoteInstall {},
        }
    }
}

/// Everything the gateway may put on the wire, typed per tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg_type", content = "payload", rename_all = "kebab-case")]
pub enum GatewayMessage {
    InstallProgress(ProgressEvent),
    UninstallProgress(ProgressEvent),
    UpgradeProgress(ProgressEvent),
    RemoteInstallProgress(ProgressEvent),
}

impl GatewayMessage {
    pub fn progress(kind: OperationKind, event: ProgressEvent) -> Self {
        match kind {
            OperationKind::Install => GatewayMessage::InstallProgress(event),
            OperationKind::Uninstall => GatewayMessage::UninstallProgress(event),
            OperationKind::Upgrade => GatewayMessage::UpgradeProgress(event),
            OperationKind::RemoteInstall => GatewayMessage::RemoteInstallProgress(event),
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            GatewayMessage::InstallProgress(_) => OperationKind::Install,
            GatewayMessage::UninstallProgress(_) => OperationKind::Uninstall,
            GatewayMessage::UpgradeProgress(_) => OperationKind::Upgrade,
            GatewayMessage::RemoteInstallProgress(_) => OperationKind::RemoteInstall,
        }
    }

    pub fn into_event(self) -> (OperationKind, ProgressEvent) {
        let kind = self.kind();
        match self {
            GatewayMessage::InstallProgress(event)
            | GatewayMessage::UninstallProgress(event)
            | GatewayMessage::UpgradeProgress(event)
            | GatewayMessage::RemoteInstallProgress(event) => (kind, event),
        }
    }
}

/// A request to begin one operation, remembered by the router so a failed
/// operation can be retried with the same parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum StartRequest {
    Install(InstallOptions),
    Uninstall,
    Upgrade,
    RemoteInstall(RemoteTarget),
}

impl StartRequest {
    pub fn kind(&self) -> OperationKind {
        match self {
            StartRequest::Install(_) => OperationKind::Install,
            StartRequest::Uninstall => OperationKind::Uninstall,
            StartRequest::Upgrade => OperationKind::Upgrade,
            StartRequest::RemoteInstall(_) => OperationKind::RemoteInstall,
        }
    }

    pub fn into_message(self) -> ClientMessage {
        match self {
            StartRequest::Install(options) => ClientMessage::StartInstall(options),
            StartRequest::Uninstall => ClientMessage::StartUninstall {},
            StartRequest::Upgrade => ClientMessage::StartUpgrade {},
            StartRequest::RemoteInstall(target) => ClientMessage::StartRemoteInstall(target),
        }
    }
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
