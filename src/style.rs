//! Style Compilation - External Sass Process and Compiled Theme Discovery

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StyleError {
    #[error("Failed to start style compiler '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("Style compiler exited with {status}: {stderr}")]
    CompilerFailed { status: ExitStatus, stderr: String },

    #[error("Failed to read compiled style {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Compiles a directory of style sources into one stylesheet per theme.
pub trait StyleCompiler {
    fn compile(&self, source_dir: &Path, target_dir: &Path) -> Result<(), StyleError>;
}

/// `sass --no-source-map <src>:<dst>`
pub struct SassCompiler {
    program: String,
}

impl SassCompiler {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }
}

impl Default for SassCompiler {
    fn default() -> Self {
        Self::new("sass")
    }
}

impl StyleCompiler for SassCompiler {
    fn compile(&self, source_dir: &Path, target_dir: &Path) -> Result<(), StyleError> {
        let output = Command::new(&self.program)
            .arg("--no-source-map")
            .arg(format!("{}:{}", source_dir.display(), target_dir.display()))
            .output()
            .map_err(|source| StyleError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(StyleError::CompilerFailed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// A named visual style applied to every note-type kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Theme {
    pub name: String,
    pub font: String,
    pub css: String,
}

/// Theme names, one per `<name>.css` in `css_dir`, sorted.
pub fn discover_themes(css_dir: &Path) -> Result<Vec<String>, StyleError> {
    let err = |source| StyleError::Read { path: css_dir.to_path_buf(), source };
    let mut themes = vec![];
    if !css_dir.is_dir() {
        return Ok(themes);
    }
    for entry in fs::read_dir(css_dir).map_err(err)? {
        let path = entry.map_err(err)?.path();
        if path.is_file() && path.extension().map_or(false, |e| e == "css") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                themes.push(stem.to_string());
            }
        }
    }
    themes.sort();
    Ok(themes)
}

/// Read the compiled stylesheet of `name`.
pub fn load_theme(css_path: &Path, name: &str, font: &str) -> Result<Theme, StyleError> {
    let css = fs::read_to_string(css_path).map_err(|source| StyleError::Read {
        path: css_path.to_path_buf(),
        source,
    })?;
    Ok(Theme {
        name: name.to_string(),
        font: font.to_string(),
        css,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_themes_only_css() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("nord.css"), "").unwrap();
        fs::write(dir.path().join("dracula.css"), "").unwrap();
        fs::write(dir.path().join("nord.css.map"), "").unwrap();
        fs::create_dir(dir.path().join("partials.css")).unwrap();
        assert_eq!(discover_themes(dir.path()).unwrap(), vec!["dracula", "nord"]);
    }

    #[test]
    fn test_missing_css_dir_has_no_themes() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_themes(&dir.path().join("css")).unwrap().is_empty());
    }

    #[test]
    fn test_missing_compiler_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let compiler = SassCompiler::new("prettify-build-no-such-sass");
        let err = compiler.compile(dir.path(), dir.path()).unwrap_err();
        assert!(matches!(err, StyleError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_compiler_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let compiler = SassCompiler::new("false");
        let err = compiler.compile(dir.path(), dir.path()).unwrap_err();
        assert!(matches!(err, StyleError::CompilerFailed { .. }));
    }
}
