use std::path::PathBuf;

const FAMILY_PREFIX: &str = "zapret-";
const STANDARD_PREFIX: &str = "zapret-discord-youtube-";
const ARCHIVE_EXTENSION: &str = ".zip";

/// One entry of the versions list, either backed by a local directory or
/// published upstream (or both, after reconciliation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRecord {
    /// Display name and merge key.
    pub name: String,
    pub installed: bool,
    pub custom: bool,
    pub source_url: Option<String>,
    /// Upstream release tag used to build the install directory name.
    pub tag: String,
    pub install_path: Option<PathBuf>,
    pub sha256: Option<String>,
}

impl VersionRecord {
    #[must_use]
    pub fn local(name: String, tag: String, custom: bool, install_path: PathBuf) -> Self {
        Self {
            name,
            installed: true,
            custom,
            source_url: None,
            tag,
            install_path: Some(install_path),
            sha256: None,
        }
    }

    #[must_use]
    pub fn remote(tag: String, source_url: String, sha256: Option<String>) -> Self {
        Self {
            name: tag.clone(),
            installed: false,
            custom: false,
            source_url: Some(source_url),
            tag,
            install_path: None,
            sha256,
        }
    }

    /// Whether the record can be handed to the installer.
    #[must_use]
    pub fn is_downloadable(&self) -> bool {
        self.source_url.as_deref().is_some_and(|url| !url.is_empty())
    }
}

/// Directory and asset naming conventions of the managed tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Naming {
    /// Directories that do not start with this are not versions at all.
    pub family_prefix: String,
    /// Prefix of directories created from official releases.
    pub standard_prefix: String,
    pub archive_extension: String,
}

impl Default for Naming {
    fn default() -> Self {
        Self {
            family_prefix: FAMILY_PREFIX.to_string(),
            standard_prefix: STANDARD_PREFIX.to_string(),
            archive_extension: ARCHIVE_EXTENSION.to_string(),
        }
    }
}

impl Naming {
    /// Split a directory name into `(name, custom)`, or `None` when the
    /// directory does not belong to the tool.
    #[must_use]
    pub fn classify(&self, dir_name: &str) -> Option<(String, bool)> {
        if let Some(suffix) = dir_name.strip_prefix(self.standard_prefix.as_str()) {
            return Some((suffix.to_string(), false));
        }
        if dir_name.starts_with(self.family_prefix.as_str()) {
            return Some((dir_name.to_string(), true));
        }
        None
    }

    #[must_use]
    pub fn install_dir_name(&self, tag: &str) -> String {
        format!("{}{tag}", self.standard_prefix)
    }

    #[must_use]
    pub fn is_archive(&self, asset_name: &str) -> bool {
        asset_name.ends_with(self.archive_extension.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::{Naming, VersionRecord};

    #[test]
    fn classify_strips_standard_prefix() {
        let naming = Naming::default();
        assert_eq!(
            naming.classify("zapret-discord-youtube-1.9.3"),
            Some(("1.9.3".to_string(), false))
        );
    }

    #[test]
    fn classify_keeps_full_name_for_custom_builds() {
        let naming = Naming::default();
        assert_eq!(
            naming.classify("zapret-v1.8.5-BF-v3.2"),
            Some(("zapret-v1.8.5-BF-v3.2".to_string(), true))
        );
    }

    #[test]
    fn classify_rejects_foreign_directories() {
        let naming = Naming::default();
        assert_eq!(naming.classify("random-folder"), None);
        assert_eq!(naming.classify("Zapret-upper"), None);
    }

    #[test]
    fn install_dir_name_prepends_standard_prefix() {
        assert_eq!(
            Naming::default().install_dir_name("1.9.4"),
            "zapret-discord-youtube-1.9.4"
        );
    }

    #[test]
    fn installed_records_are_not_downloadable() {
        let local = VersionRecord::local(
            "1.9.3".to_string(),
            "1.9.3".to_string(),
            false,
            "/versions/zapret-discord-youtube-1.9.3".into(),
        );
        assert!(!local.is_downloadable());

        let mut remote = VersionRecord::remote(
            "1.9.4".to_string(),
            "https://example.invalid/1.9.4.zip".to_string(),
            None,
        );
        assert!(remote.is_downloadable());
        remote.source_url = Some(String::new());
        assert!(!remote.is_downloadable());
    }
}
