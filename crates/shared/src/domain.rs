use std::fmt;

use serde::{Deserialize, Serialize};

/// The long-running operations the gateway can stream progress for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    Install,
    Uninstall,
    Upgrade,
    RemoteInstall,
}

impl OperationKind {
    pub const ALL: [OperationKind; 4] = [
        OperationKind::Install,
        OperationKind::Uninstall,
        OperationKind::Upgrade,
        OperationKind::RemoteInstall,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Install => "install",
            OperationKind::Uninstall => "uninstall",
            OperationKind::Upgrade => "upgrade",
            OperationKind::RemoteInstall => "remote-install",
        }
    }

    /// Client-to-server tag that begins this operation.
    pub fn start_tag(&self) -> &'static str {
        match self {
            OperationKind::Install => "start-install",
            OperationKind::Uninstall => "start-uninstall",
            OperationKind::Upgrade => "start-upgrade",
            OperationKind::RemoteInstall => "start-remote-install",
        }
    }

    /// Server-to-client tag carrying a [`crate::protocol::ProgressEvent`].
    pub fn progress_tag(&self) -> &'static str {
        match self {
            OperationKind::Install => "install-progress",
            OperationKind::Uninstall => "uninstall-progress",
            OperationKind::Upgrade => "upgrade-progress",
            OperationKind::RemoteInstall => "remote-install-progress",
        }
    }

    /// Client-to-server tag requesting that the operation be abandoned.
    pub fn cancel_tag(&self) -> &'static str {
        match self {
            OperationKind::Install => "cancel-install",
            OperationKind::Uninstall => "cancel-uninstall",
            OperationKind::Upgrade => "cancel-upgrade",
            OperationKind::RemoteInstall => "cancel-remote-install",
        }
    }

    pub fn from_progress_tag(tag: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.progress_tag() == tag)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status reported by the gateway inside every progress event.
///
/// `completed`, `failed` and `cancelled` are terminal: the gateway emits
/// exactly one of them as the last event of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    #[default]
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ProgressStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProgressStatus::Running)
    }
}
