use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::warn;

use crate::catalog::CatalogClient;
use crate::inventory::scan_installed;
use crate::record::{Naming, VersionRecord};

/// Merge installed and published versions into one list keyed by name.
///
/// Remote records are seeded first and local records overlay them, so a
/// name present on disk is always reported as installed. The result is
/// ordered by name, descending, using plain string comparison.
#[must_use]
pub fn merge_versions(
    local: Vec<VersionRecord>,
    remote: Option<Vec<VersionRecord>>,
) -> Vec<VersionRecord> {
    let mut by_name: BTreeMap<String, VersionRecord> = BTreeMap::new();

    for mut record in remote.into_iter().flatten() {
        record.installed = false;
        by_name.insert(record.name.clone(), record);
    }

    for mut record in local {
        record.installed = true;
        by_name.insert(record.name.clone(), record);
    }

    by_name.into_values().rev().collect()
}

/// Loads the reconciled versions list from disk and the release catalog.
///
/// Failures on either side are logged and treated as an empty contribution;
/// loading never fails as a whole.
#[derive(Debug, Clone)]
pub struct VersionSource {
    root: PathBuf,
    naming: Naming,
    catalog: CatalogClient,
}

impl VersionSource {
    #[must_use]
    pub fn new(root: PathBuf, naming: Naming, catalog: CatalogClient) -> Self {
        let catalog = catalog.with_naming(naming.clone());
        Self {
            root,
            naming,
            catalog,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn installed(&self) -> Vec<VersionRecord> {
        let root = self.root.clone();
        let naming = self.naming.clone();
        match tokio::task::spawn_blocking(move || scan_installed(&root, &naming)).await {
            Ok(Ok(records)) => records,
            Ok(Err(error)) => {
                warn!("Error reading local versions: {error}");
                Vec::new()
            }
            Err(error) => {
                warn!("Local versions scan task failed: {error}");
                Vec::new()
            }
        }
    }

    pub async fn load(&self) -> Vec<VersionRecord> {
        let (local, remote) = tokio::join!(self.installed(), self.catalog.fetch_versions());

        let remote = match remote {
            Ok(records) => Some(records),
            Err(error) => {
                warn!("Error fetching online versions: {error}");
                None
            }
        };

        merge_versions(local, remote)
    }
}
