//! Version Resolution - Release Index With Local Fallback
//!
//! The last released version comes from the release index when reachable,
//! otherwise from the first `x.y.z` embedded in a known template.

use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VersionError {
    #[error("Release lookup failed: {0}")]
    Lookup(String),

    #[error("Failed to read version probe {path}: {source}")]
    Probe {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("No released version found: release lookup failed ({lookup}) and {path} contains no x.y.z version")]
    Unresolvable { lookup: String, path: PathBuf },
}

/// Source of the latest published version tag.
pub trait ReleaseIndex {
    fn latest_tag(&self) -> Result<String, VersionError>;
}

#[derive(Debug, Deserialize)]
struct LatestRelease {
    tag_name: String,
}

/// GitHub "latest release" endpoint.
pub struct GithubReleases {
    url: String,
    client: reqwest::blocking::Client,
}

impl GithubReleases {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl ReleaseIndex for GithubReleases {
    fn latest_tag(&self) -> Result<String, VersionError> {
        let resp = self
            .client
            .get(&self.url)
            .header(reqwest::header::USER_AGENT, concat!("prettify-build/", env!("CARGO_PKG_VERSION")))
            .send()
            .map_err(|e| VersionError::Lookup(format!("Request failed: {}", e)))?;

        if !resp.status().is_success() {
            return Err(VersionError::Lookup(format!("Release index returned {}", resp.status())));
        }

        let release: LatestRelease = resp
            .json()
            .map_err(|e| VersionError::Lookup(format!("Unexpected response shape: {}", e)))?;
        Ok(release.tag_name)
    }
}

/// Release index that is never reachable; forces the local scan.
pub struct Offline;

impl ReleaseIndex for Offline {
    fn latest_tag(&self) -> Result<String, VersionError> {
        Err(VersionError::Lookup("offline".to_string()))
    }
}

fn semver_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)").expect("semver pattern is valid")
    })
}

/// First `major.minor.patch` occurrence in `text`.
pub fn find_semver(text: &str) -> Option<&str> {
    semver_regex().find(text).map(|m| m.as_str())
}

/// Determine the last released version: release index first, `probe` file second.
pub fn resolve_last_released(index: &dyn ReleaseIndex, probe: &Path) -> Result<String, VersionError> {
    let lookup = match index.latest_tag() {
        Ok(tag) => {
            tracing::debug!("Latest release tag: {}", tag);
            return Ok(tag);
        }
        Err(e) => e.to_string(),
    };

    tracing::warn!("{}; scanning {} for a version", lookup, probe.display());

    let text = fs::read_to_string(probe).map_err(|source| VersionError::Probe {
        path: probe.to_path_buf(),
        source,
    })?;

    find_semver(&text)
        .map(str::to_string)
        .ok_or_else(|| VersionError::Unresolvable {
            lookup,
            path: probe.to_path_buf(),
        })
}

/// Target version: explicit argument, else the configured fallback.
pub fn resolve_target(explicit: Option<&str>, fallback: &str) -> String {
    explicit.unwrap_or(fallback).to_string()
}

/// Last released vs. target version. Stamping runs only when they differ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionGate {
    pub last_released: String,
    pub target: String,
}

impl VersionGate {
    pub fn new(last_released: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            last_released: last_released.into(),
            target: target.into(),
        }
    }

    pub fn needs_stamp(&self) -> bool {
        self.last_released != self.target
    }

    /// True when both sides parse as semver and the target is older.
    pub fn is_regression(&self) -> bool {
        match (parse_loose(&self.last_released), parse_loose(&self.target)) {
            (Some(last), Some(target)) => target < last,
            _ => false,
        }
    }
}

fn parse_loose(version: &str) -> Option<semver::Version> {
    semver::Version::parse(version.trim_start_matches('v')).ok()
}
