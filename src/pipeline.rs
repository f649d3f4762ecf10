//! Build Pipeline - Single Entry Point
//!
//! Phases run strictly in order: resolve version, stamp, compile styles,
//! update ids, compose and package. Each phase finishes before the next starts.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::compose::{Composer, Deck};
use crate::config::{BuildConfig, SourceLayout};
use crate::ids::{IdentifierRegistry, RegistryError, SyncSummary};
use crate::package::{PackageAssembler, PackageError, PackageWriter, WrittenPackage};
use crate::stamping::{stamp_sources, StampError};
use crate::style::{discover_themes, load_theme, StyleCompiler, StyleError};
use crate::templates::{discover_kinds, NoteKind, TemplateError, TemplateSource};
use crate::version::{resolve_last_released, resolve_target, ReleaseIndex, VersionError, VersionGate};

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Version error: {0}")]
    Version(#[from] VersionError),

    #[error("Stamping error: {0}")]
    Stamp(#[from] StampError),

    #[error("Style error: {0}")]
    Style(#[from] StyleError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Package error: {0}")]
    Package(#[from] PackageError),
}

/// Per-run inputs that are not part of the project configuration.
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    /// Target version; the configured fallback when absent.
    pub version: Option<String>,
    /// Skip the release lookup and use this as the last released version.
    pub last_released: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
    pub last_released: String,
    pub version: String,
    pub stamped: Vec<PathBuf>,
    pub themes: Vec<String>,
    pub skipped_themes: Vec<String>,
    pub registry: SyncSummary,
    pub packages: Vec<WrittenPackage>,
}

/// The build pipeline - owns its collaborators, borrows nothing ambient.
pub struct BuildPipeline {
    config: BuildConfig,
    layout: SourceLayout,
    compiler: Box<dyn StyleCompiler>,
    releases: Box<dyn ReleaseIndex>,
    writer: Box<dyn PackageWriter>,
}

impl BuildPipeline {
    pub fn new(
        config: BuildConfig,
        compiler: Box<dyn StyleCompiler>,
        releases: Box<dyn ReleaseIndex>,
        writer: Box<dyn PackageWriter>,
    ) -> Self {
        let layout = config.layout();
        Self {
            config,
            layout,
            compiler,
            releases,
            writer,
        }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn layout(&self) -> &SourceLayout {
        &self.layout
    }

    /// Run every phase.
    pub fn run(&self, request: &BuildRequest) -> Result<BuildReport, BuildError> {
        let gate = self.resolve_versions(request)?;
        let stamped = self.stamp(&gate)?;
        self.compile_styles()?;

        let mut registry = IdentifierRegistry::load(&self.layout.ids_file())?;
        let sync = self.update_registry(&mut registry)?;

        let mut report = BuildReport {
            last_released: gate.last_released.clone(),
            version: gate.target.clone(),
            stamped,
            themes: vec![],
            skipped_themes: vec![],
            registry: sync,
            packages: vec![],
        };
        self.package(&registry, &gate.target, &mut report)?;
        tracing::info!("Generated all packages successfully");
        Ok(report)
    }

    pub fn resolve_versions(&self, request: &BuildRequest) -> Result<VersionGate, BuildError> {
        let last_released = match &request.last_released {
            Some(v) => v.clone(),
            None => resolve_last_released(self.releases.as_ref(), &self.layout.version_probe())?,
        };
        let target = resolve_target(request.version.as_deref(), &self.config.fallback_version);
        tracing::info!("Building with version {} (last release {})", target, last_released);

        let gate = VersionGate::new(last_released, target);
        if gate.is_regression() {
            tracing::warn!(
                "Target version {} is older than the last release {}",
                gate.target,
                gate.last_released
            );
        }
        Ok(gate)
    }

    /// Stamp the target version into sources when it differs from the last release.
    pub fn stamp(&self, gate: &VersionGate) -> Result<Vec<PathBuf>, BuildError> {
        if !gate.needs_stamp() {
            tracing::info!("Version unchanged since last release, sources left as is");
            return Ok(vec![]);
        }
        let summary = stamp_sources(&self.layout, &gate.target)?;
        tracing::info!(
            "Updated version in {} of {} style and template files",
            summary.changed.len(),
            summary.scanned
        );
        Ok(summary.changed)
    }

    pub fn compile_styles(&self) -> Result<(), BuildError> {
        self.compiler.compile(&self.layout.scss_dir(), &self.layout.css_dir())?;
        tracing::info!("Compiled SCSS to CSS");
        Ok(())
    }

    /// Give every compiled theme x template directory an id triple, then persist.
    pub fn update_registry(&self, registry: &mut IdentifierRegistry) -> Result<SyncSummary, BuildError> {
        let themes = discover_themes(&self.layout.css_dir())?;
        let kinds = discover_kinds(&self.layout.templates_dir())?;
        let summary = registry.sync(&themes, &kinds);
        registry.persist()?;
        tracing::info!("Updated {}", registry.path().display());
        Ok(summary)
    }

    fn themes_to_build(&self) -> Result<Vec<String>, BuildError> {
        match &self.config.build_themes {
            Some(themes) => Ok(themes.clone()),
            None => Ok(discover_themes(&self.layout.css_dir())?),
        }
    }

    fn package(
        &self,
        registry: &IdentifierRegistry,
        version: &str,
        report: &mut BuildReport,
    ) -> Result<(), BuildError> {
        let composer = Composer::new(&self.config, version);
        let mut assembler = PackageAssembler::new(&self.layout, self.config.slug(), self.writer.as_ref());
        let mut master: Vec<Deck> = vec![];

        for theme_name in self.themes_to_build()? {
            if !registry.has_theme(&theme_name) {
                tracing::warn!("Theme '{}' not found in {}. Skipping.", theme_name, registry.path().display());
                report.skipped_themes.push(theme_name);
                continue;
            }

            let theme = load_theme(
                &self.layout.compiled_style(&theme_name),
                &theme_name,
                self.config.font_for(&theme_name),
            )?;

            let mut decks = vec![];
            for kind_name in registry.kinds(&theme_name) {
                let Some(ids) = registry.get(&theme_name, &kind_name) else { continue };
                let kind = NoteKind::new(kind_name);
                let source = TemplateSource::load(&self.layout, &kind.name)?;
                let deck = composer.compose(&theme, &kind, &source, ids);
                assembler.write_note_type(&deck)?;
                decks.push(deck);
            }

            if decks.is_empty() {
                tracing::warn!("Theme '{}' has no note-types. Skipping theme package.", theme_name);
                report.skipped_themes.push(theme_name);
                continue;
            }

            assembler.write_theme(&theme_name, &decks)?;
            tracing::info!("Packaged theme {} ({} note-types)", theme_name, decks.len());
            if self.config.master_themes.contains(&theme_name) {
                master.extend(decks);
            }
            report.themes.push(theme_name);
        }

        if master.is_empty() {
            tracing::warn!("No decks from master themes {:?}; master package not written", self.config.master_themes);
        } else {
            assembler.write_master(&master)?;
        }

        report.packages = assembler.finish();
        Ok(())
    }
}
