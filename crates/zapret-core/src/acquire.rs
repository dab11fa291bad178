use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info, warn};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use crate::record::{Naming, VersionRecord};

const ARCHIVE_FILE_NAME: &str = "release.zip";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallPhase {
    Requested,
    Downloading { downloaded: u64, total: u64 },
    Extracting,
    Installed,
}

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("no download URL for version {name}")]
    NoSourceUrl { name: String },
    #[error("version {name} is already being installed")]
    AlreadyInProgress { name: String },
    #[error("{context}: {source}")]
    Download {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("download of {url} failed with HTTP {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("checksum mismatch for {name}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        name: String,
        expected: String,
        actual: String,
    },
    #[error("illegal file path in archive: {entry}")]
    IllegalPath { entry: String },
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{context}: {source}")]
    Zip {
        context: &'static str,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("extraction task failed: {0}")]
    Task(#[source] tokio::task::JoinError),
}

impl AcquireError {
    fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    fn io_with_path(context: &'static str, path: &Path, source: &std::io::Error) -> Self {
        Self::io(
            context,
            std::io::Error::new(source.kind(), format!("{}: {source}", path.display())),
        )
    }

    fn download(context: &'static str, source: reqwest::Error) -> Self {
        Self::Download { context, source }
    }

    fn zip(context: &'static str, source: zip::result::ZipError) -> Self {
        Self::Zip { context, source }
    }

    /// Whether the failure means the archive itself cannot be trusted.
    #[must_use]
    pub fn is_integrity_violation(&self) -> bool {
        matches!(
            self,
            Self::IllegalPath { .. } | Self::ChecksumMismatch { .. }
        )
    }
}

/// Downloads releases and unpacks them into the managed versions directory.
///
/// Clones share the set of in-flight installs, so two requests for the same
/// version never race on its directory.
#[derive(Debug, Clone)]
pub struct Installer {
    http: reqwest::Client,
    root: PathBuf,
    naming: Naming,
    temp_root: Option<PathBuf>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl Installer {
    #[must_use]
    pub fn new(http: reqwest::Client, root: PathBuf, naming: Naming) -> Self {
        Self {
            http,
            root,
            naming,
            temp_root: None,
            in_flight: Arc::default(),
        }
    }

    /// Stage downloads under `dir` instead of the system temp directory.
    #[must_use]
    pub fn with_temp_dir(mut self, dir: PathBuf) -> Self {
        self.temp_root = Some(dir);
        self
    }

    #[must_use]
    pub fn target_dir(&self, record: &VersionRecord) -> PathBuf {
        self.root.join(self.naming.install_dir_name(&record.tag))
    }

    #[must_use]
    pub fn is_in_flight(&self, name: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name)
    }

    /// Download `record` and extract it into its install directory,
    /// replacing any previous install of the same tag.
    ///
    /// # Errors
    /// Returns an error when the record has no download URL, the same
    /// version is already being installed, the download fails, the archive
    /// fails checksum or path validation, or writing to disk fails.
    pub async fn install(
        &self,
        record: &VersionRecord,
        progress: Option<&mpsc::Sender<InstallPhase>>,
    ) -> Result<PathBuf, AcquireError> {
        let url = record
            .source_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| AcquireError::NoSourceUrl {
                name: record.name.clone(),
            })?;
        validate_tag(&record.tag)?;
        let _claim = InFlightClaim::acquire(&self.in_flight, &record.name)?;
        report(progress, InstallPhase::Requested).await;

        let mut builder = tempfile::Builder::new();
        builder.prefix("zapret-");
        let temp_dir = match &self.temp_root {
            Some(dir) => builder.tempdir_in(dir),
            None => builder.tempdir(),
        }
        .map_err(|error| AcquireError::io("failed to create temp directory", error))?;
        let archive_path = temp_dir.path().join(ARCHIVE_FILE_NAME);

        info!("Downloading {} from {url}", record.name);
        download_file(&self.http, url, &archive_path, progress).await?;

        let target = self.target_dir(record);
        info!("Extracting to {}", target.display());
        report(progress, InstallPhase::Extracting).await;

        let name = record.name.clone();
        let expected_sha256 = record.sha256.clone();
        let blocking_target = target.clone();
        tokio::task::spawn_blocking(move || {
            if let Some(expected) = expected_sha256 {
                verify_checksum(&name, &archive_path, &expected)?;
            }
            install_archive(&archive_path, &blocking_target)
        })
        .await
        .map_err(AcquireError::Task)??;

        drop(temp_dir);
        report(progress, InstallPhase::Installed).await;
        info!("Installed {} into {}", record.name, target.display());
        Ok(target)
    }
}

struct InFlightClaim {
    set: Arc<Mutex<HashSet<String>>>,
    name: String,
}

impl InFlightClaim {
    fn acquire(set: &Arc<Mutex<HashSet<String>>>, name: &str) -> Result<Self, AcquireError> {
        let inserted = set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string());
        if !inserted {
            return Err(AcquireError::AlreadyInProgress {
                name: name.to_string(),
            });
        }
        Ok(Self {
            set: Arc::clone(set),
            name: name.to_string(),
        })
    }
}

impl Drop for InFlightClaim {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.name);
    }
}

/// The tag becomes a single directory name under the root, so it must not
/// carry separators, drive markers or parent references.
fn validate_tag(tag: &str) -> Result<(), AcquireError> {
    let illegal = matches!(tag, "" | "." | "..") || tag.contains(['/', '\\', ':', '\0']);
    if illegal {
        warn!("Refusing release tag that escapes the versions directory: {tag:?}");
        return Err(AcquireError::IllegalPath {
            entry: tag.to_string(),
        });
    }
    Ok(())
}

async fn report(progress: Option<&mpsc::Sender<InstallPhase>>, phase: InstallPhase) {
    if let Some(progress) = progress {
        let _ = progress.send(phase).await;
    }
}

async fn download_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    progress: Option<&mpsc::Sender<InstallPhase>>,
) -> Result<(), AcquireError> {
    use futures_util::StreamExt;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|error| AcquireError::download("download request failed", error))?;

    if !response.status().is_success() {
        return Err(AcquireError::HttpStatus {
            url: url.to_string(),
            status: response.status(),
        });
    }

    let total = response.content_length().unwrap_or(0);
    let mut downloaded: u64 = 0;

    let mut file = tokio::fs::File::create(dest).await.map_err(|error| {
        AcquireError::io_with_path("failed to create download file", dest, &error)
    })?;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|error| AcquireError::download("download stream error", error))?;
        file.write_all(&chunk).await.map_err(|error| {
            AcquireError::io_with_path("failed to write download data", dest, &error)
        })?;
        downloaded += chunk.len() as u64;
        report(progress, InstallPhase::Downloading { downloaded, total }).await;
    }

    file.flush().await.map_err(|error| {
        AcquireError::io_with_path("failed to flush download file", dest, &error)
    })?;

    debug!("Download complete: {downloaded} bytes");
    Ok(())
}

fn verify_checksum(name: &str, path: &Path, expected: &str) -> Result<(), AcquireError> {
    let actual = sha256_file(path)?;
    if actual.eq_ignore_ascii_case(expected) {
        debug!("Checksum verified for {name}");
        return Ok(());
    }
    Err(AcquireError::ChecksumMismatch {
        name: name.to_string(),
        expected: expected.to_ascii_lowercase(),
        actual,
    })
}

fn sha256_file(path: &Path) -> Result<String, AcquireError> {
    let mut file = File::open(path).map_err(|error| {
        AcquireError::io_with_path("failed to open file for checksum", path, &error)
    })?;
    let mut hasher = Sha256::new();
    let mut buffer = [0_u8; 8192];

    loop {
        let read = file.read(&mut buffer).map_err(|error| {
            AcquireError::io_with_path("failed to read file for checksum", path, &error)
        })?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Resolve an archive entry name against `dest` without touching the disk.
///
/// Returns `None` when the entry would land on or outside `dest`: absolute
/// names, drive or stream prefixes, and `..` segments that climb past the
/// root.
fn resolve_entry_path(dest: &Path, entry_name: &str) -> Option<PathBuf> {
    if entry_name.starts_with(['/', '\\']) {
        return None;
    }

    let mut parts: Vec<&str> = Vec::new();
    for segment in entry_name.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other if other.contains(':') || other.contains('\0') => return None,
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        return None;
    }

    let mut path = dest.to_path_buf();
    path.extend(parts);
    Some(path)
}

/// Replace `dest` with the contents of the zip at `archive_path`.
///
/// Every entry is validated before anything is removed or written.
fn install_archive(archive_path: &Path, dest: &Path) -> Result<(), AcquireError> {
    let file = File::open(archive_path).map_err(|error| {
        AcquireError::io_with_path("failed to open downloaded archive", archive_path, &error)
    })?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|error| AcquireError::zip("failed to read zip archive", error))?;

    let mut targets = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|error| AcquireError::zip("failed to read zip entry", error))?;
        let Some(target) = resolve_entry_path(dest, entry.name()) else {
            warn!("Archive entry escapes destination: {}", entry.name());
            return Err(AcquireError::IllegalPath {
                entry: entry.name().to_string(),
            });
        };
        targets.push(target);
    }

    if dest.exists() {
        debug!("Removing previous install at {}", dest.display());
        std::fs::remove_dir_all(dest).map_err(|error| {
            AcquireError::io_with_path("failed to remove previous install", dest, &error)
        })?;
    }
    std::fs::create_dir_all(dest).map_err(|error| {
        AcquireError::io_with_path("failed to create install directory", dest, &error)
    })?;

    for (i, out_path) in targets.iter().enumerate() {
        let mut entry = archive
            .by_index(i)
            .map_err(|error| AcquireError::zip("failed to read zip entry", error))?;

        if entry.is_dir() {
            std::fs::create_dir_all(out_path).map_err(|error| {
                AcquireError::io_with_path("failed to create directory", out_path, &error)
            })?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                AcquireError::io_with_path("failed to create parent directory", parent, &error)
            })?;
        }
        let mut outfile = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(out_path)
            .map_err(|error| {
                AcquireError::io_with_path("failed to create extracted file", out_path, &error)
            })?;
        std::io::copy(&mut entry, &mut outfile).map_err(|error| {
            AcquireError::io_with_path("failed to extract archive entry", out_path, &error)
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode()
                && let Err(error) =
                    std::fs::set_permissions(out_path, std::fs::Permissions::from_mode(mode & 0o7777))
            {
                debug!("Could not apply mode {mode:o} to {}: {error}", out_path.display());
            }
        }
    }

    debug!("Extracted {} entries to {}", targets.len(), dest.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;
    use std::path::{Path, PathBuf};

    use super::{
        AcquireError, InFlightClaim, Installer, install_archive, resolve_entry_path, sha256_file,
        validate_tag, verify_checksum,
    };
    use crate::record::{Naming, VersionRecord};

    fn write_zip(path: &Path, entries: &[(&str, Option<&[u8]>)]) {
        let file = std::fs::File::create(path).expect("zip file should be created");
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default().unix_permissions(0o644);
        for (name, contents) in entries {
            match contents {
                Some(bytes) => {
                    writer
                        .start_file(*name, options)
                        .expect("file entry should be started");
                    writer.write_all(bytes).expect("file entry should be written");
                }
                None => {
                    writer
                        .add_directory(*name, options)
                        .expect("directory entry should be written");
                }
            }
        }
        writer.finish().expect("zip archive should be finalized");
    }

    fn listing(root: &Path) -> Vec<PathBuf> {
        let mut out = Vec::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            for entry in std::fs::read_dir(&dir).expect("directory should be readable") {
                let path = entry.expect("entry should be readable").path();
                if path.is_dir() {
                    stack.push(path.clone());
                }
                out.push(path.strip_prefix(root).expect("under root").to_path_buf());
            }
        }
        out.sort();
        out
    }

    #[test]
    fn resolve_entry_path_accepts_nested_and_normalized_names() {
        let dest = Path::new("/versions/zapret-discord-youtube-1.9.4");
        assert_eq!(
            resolve_entry_path(dest, "bin/winws.exe"),
            Some(dest.join("bin").join("winws.exe"))
        );
        assert_eq!(
            resolve_entry_path(dest, "./lists/../service.bat"),
            Some(dest.join("service.bat"))
        );
        assert_eq!(
            resolve_entry_path(dest, "bin\\WinDivert.dll"),
            Some(dest.join("bin").join("WinDivert.dll"))
        );
    }

    #[test]
    fn resolve_entry_path_rejects_escapes() {
        let dest = Path::new("/versions/zapret-discord-youtube-1.9.4");
        assert_eq!(resolve_entry_path(dest, "../outside.txt"), None);
        assert_eq!(resolve_entry_path(dest, "bin/../../outside.txt"), None);
        assert_eq!(resolve_entry_path(dest, "..\\outside.txt"), None);
        assert_eq!(resolve_entry_path(dest, "/etc/passwd"), None);
        assert_eq!(resolve_entry_path(dest, "C:/Windows/evil.dll"), None);
        assert_eq!(resolve_entry_path(dest, "bin/.."), None);
    }

    #[test]
    fn install_archive_extracts_files_and_directories() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let zip_path = temp.path().join("release.zip");
        let dest = temp.path().join("zapret-discord-youtube-1.9.4");
        write_zip(
            &zip_path,
            &[
                ("bin/", None),
                ("bin/winws.exe", Some(b"binary".as_slice())),
                ("lists/list-general.txt", Some(b"discord.com\n".as_slice())),
                ("service.bat", Some(b"@echo off\n".as_slice())),
                ("empty/", None),
            ],
        );

        install_archive(&zip_path, &dest).expect("archive should extract");

        assert_eq!(
            std::fs::read(dest.join("bin/winws.exe")).expect("extracted file"),
            b"binary"
        );
        assert_eq!(
            std::fs::read(dest.join("lists/list-general.txt")).expect("extracted file"),
            b"discord.com\n"
        );
        assert!(dest.join("empty").is_dir());
        assert_eq!(listing(&dest).len(), 6);
    }

    #[test]
    fn install_archive_replaces_previous_install() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let zip_path = temp.path().join("release.zip");
        let dest = temp.path().join("zapret-discord-youtube-1.9.4");
        std::fs::create_dir_all(dest.join("old")).expect("old install should be created");
        std::fs::write(dest.join("old/stale.txt"), b"stale").expect("stale file");
        std::fs::write(dest.join("service.bat"), b"old contents").expect("old file");
        write_zip(&zip_path, &[("service.bat", Some(b"new contents".as_slice()))]);

        install_archive(&zip_path, &dest).expect("archive should extract");

        assert!(!dest.join("old").exists());
        assert_eq!(
            std::fs::read(dest.join("service.bat")).expect("replaced file"),
            b"new contents"
        );
    }

    #[test]
    fn install_archive_rejects_traversal_before_writing_anything() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let managed = temp.path().join("versions");
        std::fs::create_dir(&managed).expect("managed root should be created");
        let zip_path = temp.path().join("evil.zip");
        let dest = managed.join("zapret-discord-youtube-6.6.6");
        write_zip(
            &zip_path,
            &[
                ("readme.txt", Some(b"harmless".as_slice())),
                ("../escaped.txt", Some(b"should not be extracted".as_slice())),
            ],
        );
        let before = listing(&managed);

        let error = install_archive(&zip_path, &dest).expect_err("traversal should be rejected");

        assert!(matches!(error, AcquireError::IllegalPath { ref entry } if entry == "../escaped.txt"));
        assert!(error.is_integrity_violation());
        assert_eq!(listing(&managed), before);
        assert!(!managed.join("escaped.txt").exists());
    }

    #[test]
    fn install_archive_reports_corrupt_archives() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let zip_path = temp.path().join("broken.zip");
        std::fs::write(&zip_path, b"definitely not a zip").expect("fixture should be written");

        let error = install_archive(&zip_path, &temp.path().join("dest"))
            .expect_err("corrupt archive should fail");

        assert!(matches!(error, AcquireError::Zip { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn install_archive_applies_declared_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().expect("tempdir should be created");
        let zip_path = temp.path().join("release.zip");
        let dest = temp.path().join("dest");
        let file = std::fs::File::create(&zip_path).expect("zip file should be created");
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file(
                "run.sh",
                zip::write::SimpleFileOptions::default().unix_permissions(0o755),
            )
            .expect("file entry should be started");
        writer.write_all(b"#!/bin/sh\n").expect("file entry should be written");
        writer.finish().expect("zip archive should be finalized");

        install_archive(&zip_path, &dest).expect("archive should extract");

        let mode = std::fs::metadata(dest.join("run.sh"))
            .expect("extracted file metadata")
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn checksum_verification_detects_mismatch() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let file_path = temp.path().join("payload.bin");
        std::fs::write(&file_path, b"abc").expect("payload file should be written");

        assert_eq!(
            sha256_file(&file_path).expect("checksum should be computed"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(
            verify_checksum(
                "1.9.4",
                &file_path,
                "BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD"
            )
            .is_ok()
        );
        assert!(matches!(
            verify_checksum("1.9.4", &file_path, &"0".repeat(64)),
            Err(AcquireError::ChecksumMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn install_without_source_url_fails_immediately() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let installer = Installer::new(
            reqwest::Client::new(),
            temp.path().to_path_buf(),
            Naming::default(),
        );
        let record = VersionRecord::local(
            "1.9.3".to_string(),
            "1.9.3".to_string(),
            false,
            temp.path().join("zapret-discord-youtube-1.9.3"),
        );

        let error = installer
            .install(&record, None)
            .await
            .expect_err("installed record has nothing to download");

        assert!(matches!(error, AcquireError::NoSourceUrl { ref name } if name == "1.9.3"));
        assert!(!installer.is_in_flight("1.9.3"));
    }

    #[tokio::test]
    async fn concurrent_install_of_same_name_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let installer = Installer::new(
            reqwest::Client::new(),
            temp.path().to_path_buf(),
            Naming::default(),
        );
        let record = VersionRecord::remote(
            "1.9.4".to_string(),
            "http://127.0.0.1:9/never.zip".to_string(),
            None,
        );

        let claim = InFlightClaim::acquire(&installer.in_flight, "1.9.4")
            .expect("first claim should succeed");
        assert!(installer.is_in_flight("1.9.4"));

        let error = installer
            .install(&record, None)
            .await
            .expect_err("second install should be refused");
        assert!(matches!(error, AcquireError::AlreadyInProgress { .. }));

        drop(claim);
        assert!(!installer.is_in_flight("1.9.4"));
    }

    #[test]
    fn validate_tag_rejects_separators_and_parent_references() {
        for tag in ["1.9.4", "zapret-v1.8.5-BF-v3.2", "v2_beta", "1.9..4"] {
            assert!(validate_tag(tag).is_ok(), "{tag} should be accepted");
        }
        for tag in [
            "",
            ".",
            "..",
            "x/../../victim",
            "x\\..\\..\\victim",
            "C:evil",
            "a\0b",
        ] {
            assert!(
                matches!(validate_tag(tag), Err(AcquireError::IllegalPath { .. })),
                "{tag:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn escaping_tag_is_rejected_before_touching_disk() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let root = temp.path().join("Versions");
        std::fs::create_dir_all(&root).expect("root should be created");
        let before = listing(temp.path());
        let installer = Installer::new(reqwest::Client::new(), root, Naming::default());
        let record = VersionRecord::remote(
            "x/../../victim".to_string(),
            "http://127.0.0.1:9/never.zip".to_string(),
            None,
        );

        let error = installer
            .install(&record, None)
            .await
            .expect_err("escaping tag should be refused");

        assert!(matches!(error, AcquireError::IllegalPath { ref entry } if entry == "x/../../victim"));
        assert_eq!(listing(temp.path()), before);
        assert!(!installer.is_in_flight("x/../../victim"));
    }

    #[test]
    fn target_dir_uses_standard_prefix_and_tag() {
        let installer = Installer::new(
            reqwest::Client::new(),
            PathBuf::from("/versions"),
            Naming::default(),
        );
        let record = VersionRecord::remote("1.9.4".to_string(), "https://dl/a.zip".to_string(), None);

        assert_eq!(
            installer.target_dir(&record),
            PathBuf::from("/versions/zapret-discord-youtube-1.9.4")
        );
    }
}
