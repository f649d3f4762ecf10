//! Build Configuration - Defaults Plus Optional JSON Overrides

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_attribution")]
    pub attribution: String,
    #[serde(default = "default_fallback_version")]
    pub fallback_version: String,
    #[serde(default = "default_fonts")]
    pub fonts: BTreeMap<String, String>,
    #[serde(default = "default_font")]
    pub default_font: String,
    /// Themes to package; `None` packages every compiled theme.
    #[serde(default)]
    pub build_themes: Option<Vec<String>>,
    #[serde(default = "default_master_themes")]
    pub master_themes: Vec<String>,
    #[serde(default = "default_release_url")]
    pub release_url: String,
    #[serde(default = "default_style_compiler")]
    pub style_compiler: String,
}

fn default_root() -> PathBuf { PathBuf::from(".") }
fn default_namespace() -> String { "Prettify".to_string() }
fn default_attribution() -> String { "(h0tp's mod)".to_string() }
fn default_fallback_version() -> String { "1.0".to_string() }
fn default_font() -> String { "Arial".to_string() }
fn default_master_themes() -> Vec<String> { vec!["nord".to_string()] }
fn default_style_compiler() -> String { "sass".to_string() }

fn default_release_url() -> String {
    "https://api.github.com/repos/pranavdeshai/anki-prettify/releases/latest".to_string()
}

fn default_fonts() -> BTreeMap<String, String> {
    [
        ("minimal", "Inter"),
        ("nord", "Rubik"),
        ("dracula", "Source Sans Pro"),
    ]
    .into_iter()
    .map(|(theme, font)| (theme.to_string(), font.to_string()))
    .collect()
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            namespace: default_namespace(),
            attribution: default_attribution(),
            fallback_version: default_fallback_version(),
            fonts: default_fonts(),
            default_font: default_font(),
            build_themes: None,
            master_themes: default_master_themes(),
            release_url: default_release_url(),
            style_compiler: default_style_compiler(),
        }
    }
}

impl BuildConfig {
    /// Load overrides from a JSON file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn layout(&self) -> SourceLayout {
        SourceLayout::new(&self.root)
    }

    /// Display font for a theme, falling back to `default_font`.
    pub fn font_for(&self, theme: &str) -> &str {
        match self.fonts.get(theme) {
            Some(font) => font,
            None => {
                tracing::warn!("No font configured for theme '{}', using {}", theme, self.default_font);
                &self.default_font
            }
        }
    }

    /// Tag root and package file prefix, e.g. `prettify`.
    pub fn slug(&self) -> String {
        self.namespace.to_lowercase()
    }
}

/// Convention-based paths under the project root.
#[derive(Debug, Clone)]
pub struct SourceLayout {
    root: PathBuf,
}

impl SourceLayout {
    pub fn new(root: &Path) -> Self {
        Self { root: root.to_path_buf() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scss_dir(&self) -> PathBuf {
        self.root.join("src").join("styles").join("scss")
    }

    pub fn css_dir(&self) -> PathBuf {
        self.root.join("src").join("styles").join("css")
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.root.join("src").join("templates").join("default")
    }

    pub fn front_template(&self, kind: &str) -> PathBuf {
        self.templates_dir().join(kind).join(format!("{}-front.html", kind))
    }

    pub fn back_template(&self, kind: &str) -> PathBuf {
        self.templates_dir().join(kind).join(format!("{}-back.html", kind))
    }

    /// Template scanned for the embedded version when the release index is unavailable.
    pub fn version_probe(&self) -> PathBuf {
        self.front_template("basic")
    }

    pub fn compiled_style(&self, theme: &str) -> PathBuf {
        self.css_dir().join(format!("{}.css", theme))
    }

    pub fn ids_file(&self) -> PathBuf {
        self.root.join("tools").join("ids.json")
    }

    pub fn note_type_package(&self, slug: &str, theme: &str, kind: &str) -> PathBuf {
        self.root
            .join("themes")
            .join(theme)
            .join("notetypes")
            .join(format!("{}-{}-{}.apkg", slug, theme, kind))
    }

    pub fn theme_package(&self, slug: &str, theme: &str) -> PathBuf {
        self.root.join("themes").join(theme).join(format!("{}-{}.apkg", slug, theme))
    }

    pub fn master_package(&self, slug: &str) -> PathBuf {
        self.root.join(format!("{}.apkg", slug))
    }
}
