//! Version Marker Stamping
//!
//! Rewrites `Version: <n>(.<n>)+` markers in place, including any semver pre-release
//! or build suffix, so a stamped marker matches as a whole next time. Only marker
//! matches change.

use regex::{NoExpand, Regex};
use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

use crate::config::SourceLayout;

#[derive(Debug, Error)]
#[error("Failed to stamp {path}: {source}")]
pub struct StampError {
    pub path: PathBuf,
    pub source: std::io::Error,
}

fn marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Suffix identifiers are alphanumeric runs joined by single hyphens, so `-->` stays put.
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"Version: \d+(?:\.\d+)+",
            r"(?:-[0-9A-Za-z]+(?:-[0-9A-Za-z]+)*(?:\.[0-9A-Za-z]+(?:-[0-9A-Za-z]+)*)*)?",
            r"(?:\+[0-9A-Za-z]+(?:-[0-9A-Za-z]+)*(?:\.[0-9A-Za-z]+(?:-[0-9A-Za-z]+)*)*)?",
        ))
        .expect("marker pattern is valid")
    })
}

/// Replace every version marker in `text` with `version`.
pub fn stamp_text<'a>(text: &'a str, version: &str) -> Cow<'a, str> {
    let replacement = format!("Version: {}", version);
    marker_regex().replace_all(text, NoExpand(&replacement))
}

/// Stamp one file. Returns whether its content changed; unchanged files are not rewritten.
pub fn stamp_file(path: &Path, version: &str) -> Result<bool, StampError> {
    let err = |source| StampError { path: path.to_path_buf(), source };
    let original = fs::read_to_string(path).map_err(err)?;
    let stamped = stamp_text(&original, version);
    if stamped == original {
        return Ok(false);
    }
    fs::write(path, stamped.as_bytes()).map_err(err)?;
    tracing::debug!("Stamped {}", path.display());
    Ok(true)
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StampSummary {
    pub scanned: usize,
    pub changed: Vec<PathBuf>,
}

/// Style sources (`*.scss`) plus every `*-front.html` / `*-back.html` template.
pub fn stamp_targets(layout: &SourceLayout) -> Result<Vec<PathBuf>, StampError> {
    let mut targets = files_with(&layout.scss_dir(), |name| name.ends_with(".scss"))?;

    let templates_dir = layout.templates_dir();
    for kind_dir in subdirs(&templates_dir)? {
        targets.extend(files_with(&kind_dir, |name| {
            name.ends_with("-front.html") || name.ends_with("-back.html")
        })?);
    }
    Ok(targets)
}

/// Stamp every style source and template file under `layout`.
pub fn stamp_sources(layout: &SourceLayout, version: &str) -> Result<StampSummary, StampError> {
    let mut summary = StampSummary::default();
    for path in stamp_targets(layout)? {
        summary.scanned += 1;
        if stamp_file(&path, version)? {
            summary.changed.push(path);
        }
    }
    Ok(summary)
}

fn files_with(dir: &Path, keep: impl Fn(&str) -> bool) -> Result<Vec<PathBuf>, StampError> {
    let mut files = vec![];
    if !dir.is_dir() {
        return Ok(files);
    }
    let err = |source| StampError { path: dir.to_path_buf(), source };
    for entry in fs::read_dir(dir).map_err(err)? {
        let path = entry.map_err(err)?.path();
        let matches = path.file_name().and_then(|n| n.to_str()).map_or(false, &keep);
        if path.is_file() && matches {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn subdirs(dir: &Path) -> Result<Vec<PathBuf>, StampError> {
    let mut dirs = vec![];
    if !dir.is_dir() {
        return Ok(dirs);
    }
    let err = |source| StampError { path: dir.to_path_buf(), source };
    for entry in fs::read_dir(dir).map_err(err)? {
        let path = entry.map_err(err)?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}
