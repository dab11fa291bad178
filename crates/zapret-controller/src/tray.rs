use thiserror::Error;
use tokio::sync::mpsc;

use crate::menu::TrayMenuData;
use crate::message::Message;

#[derive(Debug, Error)]
pub enum TrayError {
    #[cfg(not(windows))]
    #[error("the tray icon is only available on Windows")]
    Unsupported,
    #[cfg(windows)]
    #[error("failed to decode tray icon: {0}")]
    Image(#[from] image::ImageError),
    #[cfg(windows)]
    #[error("invalid tray icon: {0}")]
    BadIcon(#[from] tray_icon::BadIcon),
    #[cfg(windows)]
    #[error("failed to create tray icon: {0}")]
    Build(#[from] tray_icon::Error),
}

#[cfg(windows)]
mod windows_impl {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use tokio::sync::mpsc;
    use tray_icon::menu::{Menu, MenuEvent, MenuId, MenuItem, PredefinedMenuItem, Submenu};
    use tray_icon::{Icon, TrayIcon, TrayIconBuilder};

    use super::TrayError;
    use crate::menu::{
        ID_OPEN_SCRIPT, ID_QUIT, ID_REFRESH_VERSIONS, ID_RESTART, ID_START, ID_STATUS, ID_STOP,
        ID_VERSIONS, TrayMenuData, parse_menu_event,
    };
    use crate::message::Message;

    const TRAY_EVENT_RECV_TIMEOUT: Duration = Duration::from_millis(250);
    const MENU_RECV_TIMEOUT: Duration = Duration::from_millis(30);

    /// Forwards tray menu clicks from the tray-icon channel to the controller.
    struct TrayEventWorker {
        shutdown: Arc<AtomicBool>,
        join_handle: Option<std::thread::JoinHandle<()>>,
    }

    impl TrayEventWorker {
        fn start(event_tx: mpsc::Sender<Message>) -> Self {
            let shutdown = Arc::new(AtomicBool::new(false));
            let worker_shutdown = Arc::clone(&shutdown);

            let join_handle = std::thread::spawn(move || {
                let receiver = MenuEvent::receiver();
                while !worker_shutdown.load(Ordering::Relaxed) {
                    match receiver.recv_timeout(TRAY_EVENT_RECV_TIMEOUT) {
                        Ok(event) => {
                            let Some(action) = parse_menu_event(event.id().as_ref()) else {
                                continue;
                            };
                            match event_tx.try_send(Message::Tray(action)) {
                                Ok(()) => {}
                                Err(mpsc::error::TrySendError::Full(_)) => {
                                    log::debug!("Tray event queue full; dropping event");
                                }
                                Err(mpsc::error::TrySendError::Closed(_)) => break,
                            }
                        }
                        Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                        Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                    }
                }
            });

            Self {
                shutdown,
                join_handle: Some(join_handle),
            }
        }
    }

    impl Drop for TrayEventWorker {
        fn drop(&mut self) {
            self.shutdown.store(true, Ordering::Relaxed);
            if let Some(join_handle) = self.join_handle.take() {
                let _ = join_handle.join();
            }
        }
    }

    fn load_icon() -> Result<Icon, TrayError> {
        let icon_bytes = include_bytes!("../assets/icon.png");
        let img = image::load_from_memory(icon_bytes)?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(Icon::from_rgba(rgba.into_raw(), width, height)?)
    }

    fn build_menu(data: &TrayMenuData) -> Menu {
        let menu = Menu::new();
        let item = |id: &str, text: &str, enabled: bool| {
            MenuItem::with_id(MenuId::new(id), text, enabled, None)
        };

        let _ = menu.append(&item(ID_STATUS, &data.status_line, false));
        let _ = menu.append(&PredefinedMenuItem::separator());
        let _ = menu.append(&item(ID_START, "Start", data.start_enabled));
        let _ = menu.append(&item(ID_STOP, "Stop", data.stop_enabled));
        let _ = menu.append(&item(ID_RESTART, "Restart", data.restart_enabled));
        let _ = menu.append(&PredefinedMenuItem::separator());

        let versions = Submenu::with_id(MenuId::new(ID_VERSIONS), &data.versions_title, true);
        let _ = versions.append(&item(ID_REFRESH_VERSIONS, "Refresh version list", true));
        if !data.versions.is_empty() {
            let _ = versions.append(&PredefinedMenuItem::separator());
        }
        for version in &data.versions {
            let _ = versions.append(&item(&version.id, &version.label, version.enabled));
        }
        let _ = menu.append(&versions);

        let _ = menu.append(&PredefinedMenuItem::separator());
        let _ = menu.append(&item(ID_OPEN_SCRIPT, "Open service.bat", true));
        let _ = menu.append(&PredefinedMenuItem::separator());
        let _ = menu.append(&item(ID_QUIT, "Quit", true));

        menu
    }

    fn apply_menu(tray: &TrayIcon, data: &TrayMenuData) {
        tray.set_menu(Some(Box::new(build_menu(data))));
        if let Err(error) = tray.set_tooltip(Some(&data.tooltip)) {
            log::debug!("Failed to update tray tooltip: {error}");
        }
    }

    fn pump_messages() {
        use windows_sys::Win32::UI::WindowsAndMessaging::{
            DispatchMessageW, MSG, PM_REMOVE, PeekMessageW, TranslateMessage,
        };

        // SAFETY: MSG is plain data and all-zero is a valid value.
        let mut msg: MSG = unsafe { std::mem::zeroed() };
        // SAFETY: `msg` is a valid out pointer; a null window reads every
        // message posted to this thread.
        unsafe {
            while PeekMessageW(&raw mut msg, std::ptr::null_mut(), 0, 0, PM_REMOVE) != 0 {
                TranslateMessage(&raw const msg);
                DispatchMessageW(&raw const msg);
            }
        }
    }

    pub fn run_tray(
        menu_rx: &crossbeam_channel::Receiver<TrayMenuData>,
        event_tx: mpsc::Sender<Message>,
    ) -> Result<(), TrayError> {
        let Ok(initial) = menu_rx.recv() else {
            return Ok(());
        };

        let tray = TrayIconBuilder::new()
            .with_menu(Box::new(build_menu(&initial)))
            .with_tooltip(&initial.tooltip)
            .with_icon(load_icon()?)
            .build()?;
        let _worker = TrayEventWorker::start(event_tx);

        loop {
            pump_messages();
            match menu_rx.recv_timeout(MENU_RECV_TIMEOUT) {
                Ok(data) => apply_menu(&tray, &data),
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            }
        }

        Ok(())
    }
}

/// Show the tray icon on the current thread until the controller stops
/// sending menu snapshots.
#[cfg(windows)]
pub fn run_tray(
    menu_rx: &crossbeam_channel::Receiver<TrayMenuData>,
    event_tx: mpsc::Sender<Message>,
) -> Result<(), TrayError> {
    windows_impl::run_tray(menu_rx, event_tx)
}

#[cfg(not(windows))]
pub fn run_tray(
    _menu_rx: &crossbeam_channel::Receiver<TrayMenuData>,
    _event_tx: mpsc::Sender<Message>,
) -> Result<(), TrayError> {
    Err(TrayError::Unsupported)
}

#[cfg(all(test, not(windows)))]
mod tests {
    use tokio::sync::mpsc;

    use super::{TrayError, run_tray};

    #[test]
    fn non_windows_reports_unsupported() {
        let (_menu_tx, menu_rx) = crossbeam_channel::unbounded();
        let (event_tx, _event_rx) = mpsc::channel(1);

        assert!(matches!(
            run_tray(&menu_rx, event_tx),
            Err(TrayError::Unsupported)
        ));
    }
}
