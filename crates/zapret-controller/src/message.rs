use std::path::PathBuf;

use zapret_core::VersionRecord;
use zapret_service::{ServiceCommand, ServiceError, ServiceState};

/// Actions a user can pick from the tray menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrayAction {
    Start,
    Stop,
    Restart,
    RefreshVersions,
    Download(String),
    OpenServiceScript,
    Quit,
}

#[derive(Debug, Clone)]
pub enum Message {
    Tray(TrayAction),
    StatusPolled(Result<ServiceState, ServiceError>),
    ServiceCommandFinished(Result<(), ServiceError>),
    VersionsLoaded {
        generation: u64,
        result: Result<Vec<VersionRecord>, String>,
    },
    InstallFinished {
        name: String,
        result: Result<PathBuf, String>,
    },
}

/// Work requested by the controller and carried out by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    PollStatus,
    IssueCommand(ServiceCommand),
    RestartService,
    LoadVersions { generation: u64 },
    Install(VersionRecord),
    OpenServiceScript,
    Exit,
}
