//! Identifier Registry - Stable Ids Per (Theme, Note-Type)
//!
//! Package importers recognise previously imported content by these ids.
//! An entry, once written, is never altered; only absent entries are generated.
//! Collisions between generated triples are not checked: the id range makes them
//! improbable, not impossible.

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Ids are drawn from `[2^30, 2^31)`, above typical externally created ids.
pub const ID_RANGE: Range<i64> = (1 << 30)..(1 << 31);

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Failed to read id registry {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Id registry {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to write id registry {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentifierTriple {
    pub model_id: i64,
    pub deck_id: i64,
    pub note_id: i64,
}

impl IdentifierTriple {
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            model_id: rng.random_range(ID_RANGE),
            deck_id: rng.random_range(ID_RANGE),
            note_id: rng.random_range(ID_RANGE),
        }
    }
}

/// What a registry sync added.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub added_themes: Vec<String>,
    pub added_entries: Vec<(String, String)>,
}

impl SyncSummary {
    pub fn changed(&self) -> bool {
        !self.added_entries.is_empty() || !self.added_themes.is_empty()
    }
}

/// theme -> kind -> triple, kept as raw JSON so untouched entries persist verbatim
/// and in their original order.
#[derive(Debug, Clone, Default)]
pub struct IdentifierRegistry {
    path: PathBuf,
    entries: Map<String, Value>,
}

impl IdentifierRegistry {
    /// Empty registry that will persist to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Map::new(),
        }
    }

    /// Load from `path`. A missing file is an empty registry.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let mut registry = Self::new(path);
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No id registry at {}, starting empty", path.display());
                return Ok(registry);
            }
            Err(source) => {
                return Err(RegistryError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let value: Value = serde_json::from_str(&content).map_err(|source| RegistryError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        match value {
            Value::Object(entries) => registry.entries = entries,
            other => tracing::warn!(
                "Id registry {} holds {} instead of an object; treating as empty",
                path.display(),
                json_kind(&other)
            ),
        }
        Ok(registry)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Themes in registry order.
    pub fn themes(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn has_theme(&self, theme: &str) -> bool {
        self.entries.get(theme).map_or(false, Value::is_object)
    }

    /// Kinds registered for `theme`, in registry order. Malformed entries are omitted.
    pub fn kinds(&self, theme: &str) -> Vec<String> {
        match self.entries.get(theme) {
            Some(Value::Object(kinds)) => kinds
                .iter()
                .filter(|(_, v)| parse_triple(v).is_some())
                .map(|(k, _)| k.clone())
                .collect(),
            _ => vec![],
        }
    }

    pub fn get(&self, theme: &str, kind: &str) -> Option<IdentifierTriple> {
        self.entries
            .get(theme)
            .and_then(|kinds| kinds.get(kind))
            .and_then(parse_triple)
    }

    /// Existing triple for (theme, kind), or a freshly generated one.
    pub fn ensure(&mut self, theme: &str, kind: &str) -> IdentifierTriple {
        self.ensure_with(theme, kind, &mut rand::rng())
    }

    pub fn ensure_with<R: Rng + ?Sized>(&mut self, theme: &str, kind: &str, rng: &mut R) -> IdentifierTriple {
        if let Some(existing) = self.get(theme, kind) {
            return existing;
        }

        let triple = IdentifierTriple::generate(rng);
        let kinds = self.theme_entry(theme);
        if kinds.contains_key(kind) {
            tracing::warn!("Malformed id entry for {}/{}; regenerating", theme, kind);
        }
        // Serializing three integers cannot fail.
        kinds.insert(kind.to_string(), serde_json::to_value(triple).unwrap_or(Value::Null));
        triple
    }

    /// Ensure an entry for every theme x kind. Both lists are visited in the order given.
    pub fn sync(&mut self, themes: &[String], kinds: &[String]) -> SyncSummary {
        let mut summary = SyncSummary::default();
        for theme in themes {
            if !self.has_theme(theme) {
                self.theme_entry(theme);
                tracing::info!("Added new theme to IDs: {}", theme);
                summary.added_themes.push(theme.clone());
            }
            for kind in kinds {
                if self.get(theme, kind).is_none() {
                    self.ensure(theme, kind);
                    tracing::info!("Added new notetype to IDs: {}/{}", theme, kind);
                    summary.added_entries.push((theme.clone(), kind.clone()));
                }
            }
        }
        summary
    }

    /// Registry as 4-space indented JSON.
    pub fn to_json(&self) -> Result<String, RegistryError> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.entries.serialize(&mut ser)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Rewrite the whole registry file.
    pub fn persist(&self) -> Result<(), RegistryError> {
        let json = self.to_json()?;
        let err = |source| RegistryError::Write { path: self.path.clone(), source };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(err)?;
        }
        fs::write(&self.path, json).map_err(err)
    }

    fn theme_entry(&mut self, theme: &str) -> &mut Map<String, Value> {
        let slot = self
            .entries
            .entry(theme.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            tracing::warn!("Malformed id entry for theme {}; replacing", theme);
            *slot = Value::Object(Map::new());
        }
        match slot {
            Value::Object(kinds) => kinds,
            _ => unreachable!("theme slot was just made an object"),
        }
    }
}

fn parse_triple(value: &Value) -> Option<IdentifierTriple> {
    IdentifierTriple::deserialize(value).ok()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
