#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod controller;
mod elevation;
mod logging;
mod menu;
mod message;
mod runtime;
mod settings;
mod single_instance;
mod tray;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use thiserror::Error;
use tokio::sync::mpsc;
use zapret_core::{CatalogClient, Installer, Naming, VersionSource};
use zapret_platform::AppPaths;
use zapret_service::ScmService;

use crate::runtime::Services;
use crate::settings::AppSettings;
use crate::single_instance::{AcquireInstanceError, SingleInstance};

const MESSAGE_CHANNEL_CAPACITY: usize = 64;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
enum AppError {
    #[error("failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Tray(#[from] tray::TrayError),
}

fn main() -> ExitCode {
    if !elevation::is_elevated() {
        return match elevation::relaunch_elevated() {
            Ok(()) => ExitCode::SUCCESS,
            Err(error) => {
                eprintln!("Failed to restart with administrator rights: {error}");
                ExitCode::FAILURE
            }
        };
    }

    let paths = match AppPaths::new() {
        Ok(paths) => paths,
        Err(error) => {
            eprintln!("{error}");
            return ExitCode::FAILURE;
        }
    };

    let settings = AppSettings::load(&paths);
    let paths = match settings.versions_dir.clone() {
        Some(dir) => paths.with_versions_dir(dir),
        None => paths,
    };
    logging::init_logging(&paths, settings.debug_logging, settings.max_log_size_bytes);

    if !paths.settings_file().exists()
        && let Err(error) = settings.save(&paths)
    {
        warn!("Failed to write default settings: {error}");
    }

    let _instance = match SingleInstance::acquire(&paths) {
        Ok(instance) => instance,
        Err(AcquireInstanceError::AlreadyRunning) => {
            info!("Another instance is already running; exiting");
            return ExitCode::SUCCESS;
        }
        Err(error) => {
            error!("Failed to acquire single-instance lock: {error}");
            return ExitCode::FAILURE;
        }
    };

    match run(&paths, &settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!("{error}");
            ExitCode::FAILURE
        }
    }
}

fn run(paths: &AppPaths, settings: &AppSettings) -> Result<(), AppError> {
    let async_runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(AppError::Runtime)?;

    let http = reqwest::Client::builder()
        .connect_timeout(settings.connect_timeout())
        .build()?;
    let naming = Naming::default();
    let root = paths.versions_dir.clone();
    info!(
        "Managing service {} with versions in {}",
        settings.service_name,
        root.display()
    );

    let catalog = CatalogClient::new(http.clone())
        .with_base_url(&settings.api_base_url)
        .with_repo(&settings.catalog_repo);
    let services = Services {
        service: Arc::new(ScmService::new(settings.service_name.clone())),
        versions: VersionSource::new(root.clone(), naming.clone(), catalog),
        installer: Installer::new(http, root, naming),
        poll_interval: settings.poll_interval(),
        restart_delay: settings.restart_delay(),
    };

    let (tx, rx) = mpsc::channel(MESSAGE_CHANNEL_CAPACITY);
    let (menu_tx, menu_rx) = crossbeam_channel::unbounded();
    let controller = async_runtime.spawn(runtime::run(services, tx.clone(), rx, move |menu| {
        let _ = menu_tx.send(menu.clone());
    }));

    let result = tray::run_tray(&menu_rx, tx);

    controller.abort();
    async_runtime.shutdown_timeout(SHUTDOWN_GRACE);
    info!("Zapret Controller stopped");
    result.map_err(AppError::from)
}
