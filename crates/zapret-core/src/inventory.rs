use std::path::{Path, PathBuf};

use log::{debug, trace};
use thiserror::Error;

use crate::record::{Naming, VersionRecord};

#[derive(Debug, Error)]
#[error("{context} {}: {source}", .path.display())]
pub struct InventoryError {
    context: &'static str,
    path: PathBuf,
    #[source]
    source: std::io::Error,
}

impl InventoryError {
    fn new(context: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self {
            context,
            path: path.to_path_buf(),
            source,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// List installed versions under `root`.
///
/// Only directories whose name starts with the family prefix are reported.
/// Records come back ordered by directory name.
///
/// # Errors
/// Returns an error when `root` exists but cannot be read. A missing root is
/// reported as an empty list.
pub fn scan_installed(root: &Path, naming: &Naming) -> Result<Vec<VersionRecord>, InventoryError> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            debug!("Versions directory {} does not exist yet", root.display());
            return Ok(Vec::new());
        }
        Err(error) => {
            return Err(InventoryError::new(
                "failed to read versions directory",
                root,
                error,
            ));
        }
    };

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry
            .map_err(|error| InventoryError::new("failed to read directory entry in", root, error))?;
        let file_type = entry.file_type().map_err(|error| {
            InventoryError::new("failed to read file type of", &entry.path(), error)
        })?;
        if !file_type.is_dir() {
            continue;
        }

        let file_name = entry.file_name();
        let Some(dir_name) = file_name.to_str() else {
            trace!("Skipping non UTF-8 directory name {file_name:?}");
            continue;
        };
        let Some((name, custom)) = naming.classify(dir_name) else {
            trace!("Skipping unrelated directory {dir_name}");
            continue;
        };

        let tag = if custom { dir_name.to_string() } else { name.clone() };
        found.push((
            dir_name.to_string(),
            VersionRecord::local(name, tag, custom, entry.path()),
        ));
    }

    found.sort_by(|a, b| a.0.cmp(&b.0));
    debug!("Found {} installed versions in {}", found.len(), root.display());
    Ok(found.into_iter().map(|(_, record)| record).collect())
}
