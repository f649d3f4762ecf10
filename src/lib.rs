//! Prettify Build - Note-Type Packages From Versioned Templates
//!
//! # Guarantees
//! 1. Ids Never Change: a (theme, note-type) keeps its model/deck/note ids forever
//! 2. Stamping Is Idempotent: only `Version:` markers are rewritten
//! 3. Upstream Failures Stop The Build: a failed style compile is reported, not read past
//! 4. Every Compiled Theme x Note-Type Gets A Package, or a warning says why not

pub mod config;
pub mod version;
pub mod stamping;
pub mod style;
pub mod ids;
pub mod templates;
pub mod compose;
pub mod package;
pub mod pipeline;

pub use config::{BuildConfig, SourceLayout};
pub use version::{GithubReleases, Offline, ReleaseIndex, VersionGate};
pub use stamping::{stamp_text, stamp_sources};
pub use style::{SassCompiler, StyleCompiler, Theme};
pub use ids::{IdentifierRegistry, IdentifierTriple, ID_RANGE};
pub use templates::{CardTemplate, NoteKind, NoteTypeKind, TemplateSource};
pub use compose::{Composer, Deck, Note, NoteTypeDefinition};
pub use package::{sha256_hex, ApkgWriter, PackageAssembler, PackageWriter};
pub use pipeline::{BuildError, BuildPipeline, BuildReport, BuildRequest};

pub const BUILDER_VERSION: &str = env!("CARGO_PKG_VERSION");
