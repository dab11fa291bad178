use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use zapret_core::{InstallPhase, Installer, VersionRecord, VersionSource};
use zapret_service::{ServiceControl, helper_script_path};

use crate::controller::Controller;
use crate::menu::TrayMenuData;
use crate::message::{Effect, Message};

const PROGRESS_CHANNEL_CAPACITY: usize = 32;

/// Collaborators the runtime drives on behalf of the controller.
pub struct Services {
    pub service: Arc<dyn ServiceControl>,
    pub versions: VersionSource,
    pub installer: Installer,
    pub poll_interval: Duration,
    pub restart_delay: Duration,
}

/// Feed messages into a [`Controller`], execute its effects and hand every
/// changed menu snapshot to `render`. Returns once the user quits.
pub async fn run<R>(
    services: Services,
    tx: mpsc::Sender<Message>,
    mut rx: mpsc::Receiver<Message>,
    mut render: R,
) where
    R: FnMut(&TrayMenuData),
{
    let services = Arc::new(services);
    let poller = spawn_status_poller(
        Arc::clone(&services.service),
        services.poll_interval,
        tx.clone(),
    );

    let mut controller = Controller::new();
    let mut rendered: Option<TrayMenuData> = None;
    let mut effects = controller.start();

    loop {
        for effect in effects.drain(..) {
            if effect == Effect::Exit {
                poller.abort();
                return;
            }
            execute(&services, effect, &tx);
        }

        let menu = controller.menu();
        if rendered.as_ref() != Some(&menu) {
            render(&menu);
            rendered = Some(menu);
        }

        let Some(message) = rx.recv().await else {
            break;
        };
        effects = controller.update(message);
    }

    poller.abort();
}

fn spawn_status_poller(
    service: Arc<dyn ServiceControl>,
    interval: Duration,
    tx: mpsc::Sender<Message>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; startup already polls once.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let state = service.query_state().await;
            if tx.send(Message::StatusPolled(state)).await.is_err() {
                break;
            }
        }
    })
}

fn execute(services: &Arc<Services>, effect: Effect, tx: &mpsc::Sender<Message>) {
    let services = Arc::clone(services);
    let tx = tx.clone();

    match effect {
        Effect::PollStatus => {
            tokio::spawn(async move {
                let state = services.service.query_state().await;
                let _ = tx.send(Message::StatusPolled(state)).await;
            });
        }
        Effect::IssueCommand(command) => {
            tokio::spawn(async move {
                let result = services.service.issue(command).await;
                let _ = tx.send(Message::ServiceCommandFinished(result)).await;
            });
        }
        Effect::RestartService => {
            tokio::spawn(async move {
                let result = services.service.restart(services.restart_delay).await;
                let _ = tx.send(Message::ServiceCommandFinished(result)).await;
            });
        }
        Effect::LoadVersions { generation } => {
            tokio::spawn(async move {
                let versions = services.versions.clone();
                let result = tokio::spawn(async move { versions.load().await })
                    .await
                    .map_err(|error| error.to_string());
                let _ = tx.send(Message::VersionsLoaded { generation, result }).await;
            });
        }
        Effect::Install(record) => {
            tokio::spawn(async move {
                let name = record.name.clone();
                let result = install_with_progress(&services.installer, &record)
                    .await
                    .map_err(|error| {
                        if error.is_integrity_violation() {
                            error!("Rejected archive for {name}: {error}");
                        }
                        error.to_string()
                    });
                let _ = tx.send(Message::InstallFinished { name, result }).await;
            });
        }
        Effect::OpenServiceScript => {
            tokio::spawn(async move {
                open_service_script(services.service.as_ref()).await;
            });
        }
        Effect::Exit => {}
    }
}

async fn install_with_progress(
    installer: &Installer,
    record: &VersionRecord,
) -> Result<std::path::PathBuf, zapret_core::AcquireError> {
    let (progress_tx, mut progress_rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
    let name = record.name.clone();
    let logger = tokio::spawn(async move {
        while let Some(phase) = progress_rx.recv().await {
            match phase {
                InstallPhase::Downloading { downloaded, total } if total > 0 => {
                    debug!("{name}: downloaded {downloaded} of {total} bytes");
                }
                InstallPhase::Downloading { downloaded, .. } => {
                    debug!("{name}: downloaded {downloaded} bytes");
                }
                other => debug!("{name}: {other:?}"),
            }
        }
    });

    let result = installer.install(record, Some(&progress_tx)).await;
    drop(progress_tx);
    let _ = logger.await;
    result
}

async fn open_service_script(service: &dyn ServiceControl) {
    let command_line = match service.binary_path().await {
        Ok(command_line) => command_line,
        Err(error) => {
            warn!("Failed to resolve service path: {error}");
            return;
        }
    };

    let script = helper_script_path(&command_line);
    info!("Opening {}", script.display());
    if let Err(error) = launch_script(&script) {
        error!("Failed to open {}: {error}", script.display());
    }
}

#[cfg(windows)]
fn launch_script(script: &Path) -> std::io::Result<()> {
    zapret_platform::script_launch_command(script)
        .spawn()
        .map(|_| ())
}

#[cfg(not(windows))]
fn launch_script(script: &Path) -> std::io::Result<()> {
    open::that_detached(script)
}
