//! Version management core for Zapret Controller.
//!
//! This crate holds the logic that is independent of the tray UI and of the
//! Windows service plumbing:
//! - Scanning the managed versions directory for installed builds.
//! - Fetching the published release catalog from GitHub.
//! - Reconciling both into one ordered, deduplicated list.
//! - Downloading and extracting a release into the managed directory.

pub mod acquire;
pub mod catalog;
pub mod inventory;
pub mod reconcile;
mod record;

/// Installer, install phases, and acquisition failures.
pub use acquire::{AcquireError, InstallPhase, Installer};
/// Release catalog client and GitHub release model.
pub use catalog::{CatalogClient, CatalogError, GitHubAsset, GitHubRelease, records_from_releases};
/// Local directory scanner.
pub use inventory::{InventoryError, scan_installed};
/// Merge policy and the degrade-on-failure list loader.
pub use reconcile::{VersionSource, merge_versions};
/// Version record model and directory naming conventions.
pub use record::{Naming, VersionRecord};
