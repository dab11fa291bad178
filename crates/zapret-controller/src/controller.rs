use std::collections::HashMap;

use log::{debug, info, warn};
use zapret_core::VersionRecord;
use zapret_service::{ServiceCommand, ServiceState};

use crate::menu::{APP_TITLE, TrayMenuData, VersionItem};
use crate::message::{Effect, Message, TrayAction};

#[derive(Debug, Clone, PartialEq, Eq)]
enum StatusView {
    Checking,
    Known(ServiceState),
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VersionsView {
    Loading,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DownloadState {
    InFlight,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Controls {
    start: bool,
    stop: bool,
    restart: bool,
}

/// Tray state machine. `update` only mutates state and returns the work the
/// runtime has to perform; it never blocks or touches the system.
#[derive(Debug)]
pub struct Controller {
    status: StatusView,
    tooltip_label: &'static str,
    controls: Controls,
    versions_view: VersionsView,
    records: Vec<VersionRecord>,
    downloads: HashMap<String, DownloadState>,
    generation: u64,
    quitting: bool,
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

impl Controller {
    pub fn new() -> Self {
        Self {
            status: StatusView::Checking,
            tooltip_label: "Checking...",
            controls: Controls::default(),
            versions_view: VersionsView::Loading,
            records: Vec::new(),
            downloads: HashMap::new(),
            generation: 0,
            quitting: false,
        }
    }

    /// Effects to run once at startup.
    pub fn start(&mut self) -> Vec<Effect> {
        vec![Effect::PollStatus, self.refresh()]
    }

    pub fn update(&mut self, message: Message) -> Vec<Effect> {
        if self.quitting {
            return Vec::new();
        }

        match message {
            Message::Tray(action) => self.handle_action(action),
            Message::StatusPolled(Ok(state)) => {
                self.apply_state(state);
                Vec::new()
            }
            Message::StatusPolled(Err(error)) => {
                debug!("Service status query failed: {error}");
                self.status = StatusView::Failed(error.to_string());
                Vec::new()
            }
            Message::ServiceCommandFinished(result) => {
                if let Err(error) = result {
                    warn!("Service control error: {error}");
                }
                vec![Effect::PollStatus]
            }
            Message::VersionsLoaded { generation, result } => {
                self.apply_versions(generation, result);
                Vec::new()
            }
            Message::InstallFinished { name, result } => self.finish_install(name, result),
        }
    }

    fn handle_action(&mut self, action: TrayAction) -> Vec<Effect> {
        match action {
            TrayAction::Start => vec![Effect::IssueCommand(ServiceCommand::Start)],
            TrayAction::Stop => vec![Effect::IssueCommand(ServiceCommand::Stop)],
            TrayAction::Restart => vec![Effect::RestartService],
            TrayAction::RefreshVersions => vec![self.refresh()],
            TrayAction::Download(name) => self.begin_install(&name).into_iter().collect(),
            TrayAction::OpenServiceScript => vec![Effect::OpenServiceScript],
            TrayAction::Quit => {
                info!("Quit requested");
                self.quitting = true;
                vec![Effect::Exit]
            }
        }
    }

    fn refresh(&mut self) -> Effect {
        self.generation += 1;
        self.versions_view = VersionsView::Loading;
        Effect::LoadVersions {
            generation: self.generation,
        }
    }

    fn apply_state(&mut self, state: ServiceState) {
        self.status = StatusView::Known(state);
        self.tooltip_label = state.label();
        match state {
            ServiceState::Running => {
                self.controls = Controls {
                    start: false,
                    stop: true,
                    restart: true,
                };
            }
            ServiceState::Stopped => {
                self.controls = Controls {
                    start: true,
                    stop: false,
                    restart: false,
                };
            }
            ServiceState::StartPending | ServiceState::StopPending | ServiceState::Other(_) => {}
        }
    }

    fn apply_versions(&mut self, generation: u64, result: Result<Vec<VersionRecord>, String>) {
        if generation != self.generation {
            debug!("Dropping stale version list (generation {generation})");
            return;
        }

        self.downloads
            .retain(|_, state| *state == DownloadState::InFlight);
        match result {
            Ok(records) => {
                debug!("Version list refreshed: {} entries", records.len());
                self.records = records;
                self.versions_view = VersionsView::Ready;
            }
            Err(error) => {
                warn!("Version list refresh failed: {error}");
                self.records.clear();
                self.versions_view = VersionsView::Failed;
            }
        }
    }

    fn begin_install(&mut self, name: &str) -> Option<Effect> {
        if self.downloads.get(name) == Some(&DownloadState::InFlight) {
            debug!("Download of {name} already running; ignoring click");
            return None;
        }

        let Some(record) = self.records.iter().find(|record| record.name == name) else {
            warn!("Download requested for unknown version {name}");
            return None;
        };
        if record.installed {
            return None;
        }

        info!("Download requested for {name}");
        self.downloads
            .insert(name.to_string(), DownloadState::InFlight);
        Some(Effect::Install(record.clone()))
    }

    fn finish_install(
        &mut self,
        name: String,
        result: Result<std::path::PathBuf, String>,
    ) -> Vec<Effect> {
        match result {
            Ok(path) => {
                info!("Installed {name} into {}", path.display());
                self.downloads.remove(&name);
                if let Some(record) = self.records.iter_mut().find(|record| record.name == name) {
                    record.installed = true;
                    record.install_path = Some(path);
                }
                vec![self.refresh()]
            }
            Err(error) => {
                warn!("Download of {name} failed: {error}");
                self.downloads.insert(name, DownloadState::Failed);
                Vec::new()
            }
        }
    }

    pub fn menu(&self) -> TrayMenuData {
        let status_line = match &self.status {
            StatusView::Checking => "Status: Checking...".to_string(),
            StatusView::Known(state) => format!("Status: {}", state.label()),
            StatusView::Failed(error) => format!("Error: {error}"),
        };

        let versions_title = match self.versions_view {
            VersionsView::Loading => "Versions (Loading...)",
            VersionsView::Ready => "Versions",
            VersionsView::Failed => "Versions (Error)",
        };

        let versions = self
            .records
            .iter()
            .map(|record| match self.downloads.get(&record.name) {
                Some(DownloadState::InFlight) => VersionItem::downloading(&record.name),
                Some(DownloadState::Failed) => VersionItem::failed(&record.name),
                None if record.installed => VersionItem::installed(&record.name),
                None => VersionItem::downloadable(&record.name),
            })
            .collect();

        TrayMenuData {
            tooltip: format!("{APP_TITLE}: {}", self.tooltip_label),
            status_line,
            start_enabled: self.controls.start,
            stop_enabled: self.controls.stop,
            restart_enabled: self.controls.restart,
            versions_title: versions_title.to_string(),
            versions,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use zapret_core::VersionRecord;
    use zapret_service::{ServiceCommand, ServiceError, ServiceState};

    use super::Controller;
    use crate::message::{Effect, Message, TrayAction};

    fn local(name: &str) -> VersionRecord {
        VersionRecord::local(
            name.to_string(),
            name.to_string(),
            false,
            PathBuf::from(format!("/versions/zapret-discord-youtube-{name}")),
        )
    }

    fn remote(name: &str) -> VersionRecord {
        VersionRecord::remote(
            name.to_string(),
            format!("https://example.invalid/{name}.zip"),
            None,
        )
    }

    fn loaded(controller: &mut Controller, records: Vec<VersionRecord>) {
        let effects = controller.update(Message::Tray(TrayAction::RefreshVersions));
        let [Effect::LoadVersions { generation }] = effects.as_slice() else {
            panic!("refresh should request a load, got {effects:?}");
        };
        controller.update(Message::VersionsLoaded {
            generation: *generation,
            result: Ok(records),
        });
    }

    fn labels(controller: &Controller) -> Vec<(String, bool)> {
        controller
            .menu()
            .versions
            .into_iter()
            .map(|item| (item.label, item.enabled))
            .collect()
    }

    #[test]
    fn start_polls_status_and_loads_versions() {
        let mut controller = Controller::new();

        let effects = controller.start();

        assert_eq!(
            effects,
            vec![Effect::PollStatus, Effect::LoadVersions { generation: 1 }]
        );
        let menu = controller.menu();
        assert_eq!(menu.status_line, "Status: Checking...");
        assert_eq!(menu.versions_title, "Versions (Loading...)");
        assert_eq!(menu.tooltip, "Zapret Controller: Checking...");
    }

    #[test]
    fn running_and_stopped_toggle_controls() {
        let mut controller = Controller::new();

        controller.update(Message::StatusPolled(Ok(ServiceState::Running)));
        let menu = controller.menu();
        assert_eq!(menu.status_line, "Status: Running");
        assert_eq!(menu.tooltip, "Zapret Controller: Running");
        assert!(!menu.start_enabled);
        assert!(menu.stop_enabled);
        assert!(menu.restart_enabled);

        controller.update(Message::StatusPolled(Ok(ServiceState::Stopped)));
        let menu = controller.menu();
        assert!(menu.start_enabled);
        assert!(!menu.stop_enabled);
        assert!(!menu.restart_enabled);
    }

    #[test]
    fn pending_states_keep_previous_controls() {
        let mut controller = Controller::new();
        controller.update(Message::StatusPolled(Ok(ServiceState::Running)));

        controller.update(Message::StatusPolled(Ok(ServiceState::StopPending)));

        let menu = controller.menu();
        assert_eq!(menu.status_line, "Status: Stopping...");
        assert!(!menu.start_enabled);
        assert!(menu.stop_enabled);
        assert!(menu.restart_enabled);
    }

    #[test]
    fn status_errors_replace_line_but_keep_tooltip() {
        let mut controller = Controller::new();
        controller.update(Message::StatusPolled(Ok(ServiceState::Running)));

        controller.update(Message::StatusPolled(Err(ServiceError::NotInstalled {
            name: "zapret".to_string(),
        })));

        let menu = controller.menu();
        assert_eq!(menu.status_line, "Error: Service zapret is not installed");
        assert_eq!(menu.tooltip, "Zapret Controller: Running");
        assert!(menu.stop_enabled);
    }

    #[test]
    fn service_actions_map_to_effects_and_repoll() {
        let mut controller = Controller::new();

        assert_eq!(
            controller.update(Message::Tray(TrayAction::Start)),
            vec![Effect::IssueCommand(ServiceCommand::Start)]
        );
        assert_eq!(
            controller.update(Message::Tray(TrayAction::Stop)),
            vec![Effect::IssueCommand(ServiceCommand::Stop)]
        );
        assert_eq!(
            controller.update(Message::Tray(TrayAction::Restart)),
            vec![Effect::RestartService]
        );
        assert_eq!(
            controller.update(Message::Tray(TrayAction::OpenServiceScript)),
            vec![Effect::OpenServiceScript]
        );
        assert_eq!(
            controller.update(Message::ServiceCommandFinished(Err(
                ServiceError::AccessDenied {
                    operation: "start the service"
                }
            ))),
            vec![Effect::PollStatus]
        );
    }

    #[test]
    fn version_items_reflect_install_state() {
        let mut controller = Controller::new();

        loaded(&mut controller, vec![remote("1.9.4"), local("1.9.3")]);

        assert_eq!(controller.menu().versions_title, "Versions");
        assert_eq!(
            labels(&controller),
            vec![
                ("1.9.4 (download)".to_string(), true),
                ("1.9.3 (installed)".to_string(), false),
            ]
        );
    }

    #[test]
    fn download_click_is_ignored_while_in_flight() {
        let mut controller = Controller::new();
        loaded(&mut controller, vec![remote("1.9.4")]);

        let first = controller.update(Message::Tray(TrayAction::Download("1.9.4".to_string())));
        let second = controller.update(Message::Tray(TrayAction::Download("1.9.4".to_string())));

        assert_eq!(first, vec![Effect::Install(remote("1.9.4"))]);
        assert!(second.is_empty());
        assert_eq!(
            labels(&controller),
            vec![("Downloading... 1.9.4".to_string(), false)]
        );
    }

    #[test]
    fn download_clicks_for_installed_or_unknown_versions_are_ignored() {
        let mut controller = Controller::new();
        loaded(&mut controller, vec![local("1.9.3")]);

        assert!(
            controller
                .update(Message::Tray(TrayAction::Download("1.9.3".to_string())))
                .is_empty()
        );
        assert!(
            controller
                .update(Message::Tray(TrayAction::Download("0.0.1".to_string())))
                .is_empty()
        );
    }

    #[test]
    fn failed_download_is_marked_and_can_be_retried() {
        let mut controller = Controller::new();
        loaded(&mut controller, vec![remote("1.9.4")]);
        controller.update(Message::Tray(TrayAction::Download("1.9.4".to_string())));

        let effects = controller.update(Message::InstallFinished {
            name: "1.9.4".to_string(),
            result: Err("server returned HTTP 404".to_string()),
        });

        assert!(effects.is_empty());
        assert_eq!(labels(&controller), vec![("Error: 1.9.4".to_string(), true)]);
        assert_eq!(
            controller.update(Message::Tray(TrayAction::Download("1.9.4".to_string()))),
            vec![Effect::Install(remote("1.9.4"))]
        );
    }

    #[test]
    fn successful_download_marks_installed_and_refreshes() {
        let mut controller = Controller::new();
        loaded(&mut controller, vec![remote("1.9.4")]);
        controller.update(Message::Tray(TrayAction::Download("1.9.4".to_string())));

        let effects = controller.update(Message::InstallFinished {
            name: "1.9.4".to_string(),
            result: Ok(PathBuf::from("/versions/zapret-discord-youtube-1.9.4")),
        });

        assert_eq!(effects, vec![Effect::LoadVersions { generation: 2 }]);
        assert_eq!(
            labels(&controller),
            vec![("1.9.4 (installed)".to_string(), false)]
        );
        assert_eq!(controller.menu().versions_title, "Versions (Loading...)");
    }

    #[test]
    fn stale_version_lists_are_dropped() {
        let mut controller = Controller::new();
        controller.start();
        controller.update(Message::Tray(TrayAction::RefreshVersions));

        controller.update(Message::VersionsLoaded {
            generation: 1,
            result: Ok(vec![remote("1.0.0")]),
        });
        assert!(controller.menu().versions.is_empty());

        controller.update(Message::VersionsLoaded {
            generation: 2,
            result: Ok(vec![remote("2.0.0")]),
        });
        assert_eq!(
            labels(&controller),
            vec![("2.0.0 (download)".to_string(), true)]
        );
    }

    #[test]
    fn refresh_keeps_in_flight_downloads_and_clears_failures() {
        let mut controller = Controller::new();
        loaded(&mut controller, vec![remote("1.9.4"), remote("1.9.3")]);
        controller.update(Message::Tray(TrayAction::Download("1.9.4".to_string())));
        controller.update(Message::Tray(TrayAction::Download("1.9.3".to_string())));
        controller.update(Message::InstallFinished {
            name: "1.9.3".to_string(),
            result: Err("checksum mismatch".to_string()),
        });

        loaded(&mut controller, vec![remote("1.9.4"), remote("1.9.3")]);

        assert_eq!(
            labels(&controller),
            vec![
                ("Downloading... 1.9.4".to_string(), false),
                ("1.9.3 (download)".to_string(), true),
            ]
        );
    }

    #[test]
    fn failed_refresh_clears_items_and_flags_title() {
        let mut controller = Controller::new();
        loaded(&mut controller, vec![remote("1.9.4")]);
        let effects = controller.update(Message::Tray(TrayAction::RefreshVersions));
        let [Effect::LoadVersions { generation }] = effects.as_slice() else {
            panic!("refresh should request a load");
        };

        controller.update(Message::VersionsLoaded {
            generation: *generation,
            result: Err("task panicked".to_string()),
        });

        let menu = controller.menu();
        assert_eq!(menu.versions_title, "Versions (Error)");
        assert!(menu.versions.is_empty());
    }

    #[test]
    fn quit_stops_processing_further_messages() {
        let mut controller = Controller::new();

        assert_eq!(
            controller.update(Message::Tray(TrayAction::Quit)),
            vec![Effect::Exit]
        );
        assert!(
            controller
                .update(Message::Tray(TrayAction::Start))
                .is_empty()
        );
    }
}
