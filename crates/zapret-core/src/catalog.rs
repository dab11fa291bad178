use log::{debug, info};
use serde::Deserialize;
use thiserror::Error;

use crate::record::{Naming, VersionRecord};

pub const DEFAULT_REPO: &str = "Flowseal/zapret-discord-youtube";
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

const USER_AGENT: &str = concat!("zapret-controller/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubAsset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub digest: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubRelease {
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<GitHubAsset>,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to fetch release list: {0}")]
    Request(#[source] reqwest::Error),
    #[error("release list request failed with HTTP {status}{body_snippet}")]
    HttpStatus {
        status: reqwest::StatusCode,
        body_snippet: String,
    },
    #[error("failed to parse release list: {0}")]
    Parse(#[source] reqwest::Error),
}

/// Client for the upstream release listing.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: reqwest::Client,
    base_url: String,
    repo: String,
    naming: Naming,
}

impl CatalogClient {
    #[must_use]
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: DEFAULT_API_BASE.to_string(),
            repo: DEFAULT_REPO.to_string(),
            naming: Naming::default(),
        }
    }

    /// Point the client at another API host, such as a mirror or a local
    /// test server.
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        let trimmed = base_url.trim().trim_end_matches('/');
        if !trimmed.is_empty() {
            self.base_url = trimmed.to_string();
        }
        self
    }

    #[must_use]
    pub fn with_repo(mut self, repo: &str) -> Self {
        self.repo = repo.trim_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_naming(mut self, naming: Naming) -> Self {
        self.naming = naming;
        self
    }

    #[must_use]
    pub fn releases_url(&self) -> String {
        format!("{}/repos/{}/releases", self.base_url, self.repo)
    }

    /// Fetch the raw release list.
    ///
    /// # Errors
    /// Returns an error when the request fails, the server answers with a
    /// non-success status, or the body is not a release list.
    pub async fn fetch_releases(&self) -> Result<Vec<GitHubRelease>, CatalogError> {
        let url = self.releases_url();
        debug!("Fetching release list from {url}");

        let response = self
            .http
            .get(&url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(CatalogError::Request)?;

        if !response.status().is_success() {
            let status = response.status();
            let body_snippet = response
                .text()
                .await
                .ok()
                .map(|body| response_snippet(&body, 160))
                .unwrap_or_default();
            return Err(CatalogError::HttpStatus {
                status,
                body_snippet,
            });
        }

        response.json().await.map_err(CatalogError::Parse)
    }

    /// Fetch the release list and keep the releases that ship an archive.
    ///
    /// # Errors
    /// See [`CatalogClient::fetch_releases`].
    pub async fn fetch_versions(&self) -> Result<Vec<VersionRecord>, CatalogError> {
        let releases = self.fetch_releases().await?;
        let total = releases.len();
        let records = records_from_releases(releases, &self.naming);
        info!(
            "Release catalog has {} installable releases out of {total}",
            records.len()
        );
        Ok(records)
    }
}

/// Map releases to not-yet-installed records, picking the first archive
/// asset of each release. Releases without an archive are dropped.
#[must_use]
pub fn records_from_releases(releases: Vec<GitHubRelease>, naming: &Naming) -> Vec<VersionRecord> {
    releases
        .into_iter()
        .filter_map(|release| {
            let Some(asset) = release.assets.iter().find(|a| naming.is_archive(&a.name)) else {
                debug!("Release {} has no archive asset, skipping", release.tag_name);
                return None;
            };
            let sha256 = asset.digest.as_deref().and_then(parse_sha256_digest);
            Some(VersionRecord::remote(
                release.tag_name.clone(),
                asset.browser_download_url.clone(),
                sha256,
            ))
        })
        .collect()
}

fn response_snippet(body: &str, max_chars: usize) -> String {
    let snippet: String = body.chars().take(max_chars).collect();
    if snippet.is_empty() {
        String::new()
    } else {
        format!(": {snippet}")
    }
}

fn parse_sha256_digest(digest: &str) -> Option<String> {
    let (algorithm, hash) = digest.split_once(':')?;
    if !algorithm.eq_ignore_ascii_case("sha256") {
        return None;
    }
    if hash.len() != 64 || !hash.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return None;
    }
    Some(hash.to_ascii_lowercase())
}
