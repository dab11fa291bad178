use std::path::PathBuf;
use thiserror::Error;

const APP_DIR_NAME: &str = "zapret-controller";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AppPathsError {
    #[error("Could not determine config directory")]
    ConfigDirUnavailable,
    #[error("Could not determine data directory")]
    DataDirUnavailable,
}

pub struct AppPaths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
    /// Managed root holding one directory per installed version.
    pub versions_dir: PathBuf,
}

impl AppPaths {
    /// Build application paths for the current platform.
    ///
    /// # Errors
    /// Returns an error when the user config or data directory cannot be
    /// determined.
    pub fn new() -> Result<Self, AppPathsError> {
        let config_dir = dirs::config_dir()
            .ok_or(AppPathsError::ConfigDirUnavailable)?
            .join(APP_DIR_NAME);
        let data_dir = dirs::data_dir()
            .ok_or(AppPathsError::DataDirUnavailable)?
            .join(APP_DIR_NAME);
        let versions_dir = default_versions_dir(&data_dir);

        Ok(Self {
            config_dir,
            data_dir,
            versions_dir,
        })
    }

    #[must_use]
    pub fn with_versions_dir(mut self, dir: PathBuf) -> Self {
        self.versions_dir = dir;
        self
    }

    #[must_use]
    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.json")
    }

    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        self.data_dir.join("debug.log")
    }

    #[must_use]
    pub fn instance_lock_file(&self) -> PathBuf {
        self.data_dir.join("instance.lock")
    }

    /// Ensure the per-user application directories exist on disk.
    ///
    /// The managed versions root is created lazily by the installer since it
    /// may live in a machine-wide location.
    ///
    /// # Errors
    /// Returns an error if any directory cannot be created.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

// The service runs as SYSTEM, so versions live in the machine-wide
// ProgramData tree instead of the per-user profile.
#[cfg(target_os = "windows")]
fn default_versions_dir(_data_dir: &std::path::Path) -> PathBuf {
    let program_data = std::env::var_os("ProgramData")
        .filter(|value| !value.is_empty())
        .map_or_else(
            || {
                log::debug!("ProgramData is not set; falling back to C:\\ProgramData");
                PathBuf::from("C:\\ProgramData")
            },
            PathBuf::from,
        );
    program_data.join("ZapretController").join("Versions")
}

#[cfg(not(target_os = "windows"))]
fn default_versions_dir(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join("versions")
}
