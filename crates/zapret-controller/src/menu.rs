use crate::message::TrayAction;

pub const APP_TITLE: &str = "Zapret Controller";

#[cfg_attr(not(windows), allow(dead_code))]
pub const ID_STATUS: &str = "status";
pub const ID_START: &str = "start";
pub const ID_STOP: &str = "stop";
pub const ID_RESTART: &str = "restart";
#[cfg_attr(not(windows), allow(dead_code))]
pub const ID_VERSIONS: &str = "versions";
pub const ID_REFRESH_VERSIONS: &str = "refresh_versions";
pub const ID_OPEN_SCRIPT: &str = "open_service_script";
pub const ID_QUIT: &str = "quit";
const DOWNLOAD_PREFIX: &str = "download:";

/// Snapshot of everything the tray shows; rebuilt on each state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrayMenuData {
    pub tooltip: String,
    pub status_line: String,
    pub start_enabled: bool,
    pub stop_enabled: bool,
    pub restart_enabled: bool,
    pub versions_title: String,
    pub versions: Vec<VersionItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionItem {
    pub id: String,
    pub label: String,
    pub enabled: bool,
}

impl VersionItem {
    pub fn installed(name: &str) -> Self {
        Self::new(name, format!("{name} (installed)"), false)
    }

    pub fn downloadable(name: &str) -> Self {
        Self::new(name, format!("{name} (download)"), true)
    }

    pub fn downloading(name: &str) -> Self {
        Self::new(name, format!("Downloading... {name}"), false)
    }

    pub fn failed(name: &str) -> Self {
        Self::new(name, format!("Error: {name}"), true)
    }

    fn new(name: &str, label: String, enabled: bool) -> Self {
        Self {
            id: download_id(name),
            label,
            enabled,
        }
    }
}

pub fn download_id(name: &str) -> String {
    format!("{DOWNLOAD_PREFIX}{name}")
}

#[cfg_attr(not(windows), allow(dead_code))]
pub fn parse_menu_event(id: &str) -> Option<TrayAction> {
    if let Some(name) = id.strip_prefix(DOWNLOAD_PREFIX) {
        return (!name.is_empty()).then(|| TrayAction::Download(name.to_string()));
    }

    match id {
        ID_START => Some(TrayAction::Start),
        ID_STOP => Some(TrayAction::Stop),
        ID_RESTART => Some(TrayAction::Restart),
        ID_REFRESH_VERSIONS => Some(TrayAction::RefreshVersions),
        ID_OPEN_SCRIPT => Some(TrayAction::OpenServiceScript),
        ID_QUIT => Some(TrayAction::Quit),
        other => {
            log::warn!("Unknown tray menu event ID: {other}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{VersionItem, download_id, parse_menu_event};
    use crate::message::TrayAction;

    #[test]
    fn parse_menu_event_maps_fixed_actions() {
        assert_eq!(parse_menu_event("start"), Some(TrayAction::Start));
        assert_eq!(parse_menu_event("stop"), Some(TrayAction::Stop));
        assert_eq!(parse_menu_event("restart"), Some(TrayAction::Restart));
        assert_eq!(
            parse_menu_event("refresh_versions"),
            Some(TrayAction::RefreshVersions)
        );
        assert_eq!(
            parse_menu_event("open_service_script"),
            Some(TrayAction::OpenServiceScript)
        );
        assert_eq!(parse_menu_event("quit"), Some(TrayAction::Quit));
        assert_eq!(parse_menu_event("status"), None);
        assert_eq!(parse_menu_event("unknown"), None);
    }

    #[test]
    fn download_ids_round_trip_names_with_separators() {
        let id = download_id("zapret-v1.8.5-BF:v3.2");

        assert_eq!(
            parse_menu_event(&id),
            Some(TrayAction::Download("zapret-v1.8.5-BF:v3.2".to_string()))
        );
        assert_eq!(parse_menu_event("download:"), None);
    }

    #[test]
    fn version_item_labels_follow_install_state() {
        let installed = VersionItem::installed("1.9.3");
        assert_eq!(installed.label, "1.9.3 (installed)");
        assert!(!installed.enabled);

        let remote = VersionItem::downloadable("1.9.4");
        assert_eq!(remote.label, "1.9.4 (download)");
        assert!(remote.enabled);

        let busy = VersionItem::downloading("1.9.4");
        assert_eq!(busy.label, "Downloading... 1.9.4");
        assert!(!busy.enabled);

        let failed = VersionItem::failed("1.9.4");
        assert_eq!(failed.label, "Error: 1.9.4");
        assert!(failed.enabled);
        assert_eq!(failed.id, "download:1.9.4");
    }
}
