//! Prettify Build CLI
//!
//! Builds note-type, theme, and master packages for one version.
//! Status goes to stderr; `--json` prints the build report to stdout.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use prettify_build::config::ConfigError;
use prettify_build::{
    ApkgWriter, BuildConfig, BuildPipeline, BuildRequest, GithubReleases, Offline, ReleaseIndex,
    SassCompiler, BUILDER_VERSION,
};

#[derive(Parser)]
#[command(name = "prettify-build", version = BUILDER_VERSION)]
#[command(about = "Build Prettify note-type packages from templates")]
struct Cli {
    /// Version to stamp into this build
    #[arg(id = "build_version", value_name = "VERSION")]
    version: Option<String>,

    /// Project root containing src/, tools/ and themes/ [default: config root, else .]
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// JSON file overriding build settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Skip the release lookup and read the last version from the templates
    #[arg(long)]
    offline: bool,

    /// Last released version, skipping both lookups
    #[arg(long)]
    last_release: Option<String>,

    /// Print the build report as JSON
    #[arg(long)]
    json: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| default.into())))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

/// Settings from `--config` (or defaults), with `--root` taking precedence when given.
fn build_config(cli: &Cli) -> Result<BuildConfig, ConfigError> {
    let config = match &cli.config {
        Some(path) => BuildConfig::load(path)?,
        None => BuildConfig::default(),
    };
    Ok(match &cli.root {
        Some(root) => config.with_root(root),
        None => config,
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match build_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let releases: Box<dyn ReleaseIndex> = if cli.offline {
        Box::new(Offline)
    } else {
        Box::new(GithubReleases::new(config.release_url.clone()))
    };
    let compiler = Box::new(SassCompiler::new(config.style_compiler.clone()));
    let pipeline = BuildPipeline::new(config, compiler, releases, Box::new(ApkgWriter));

    let request = BuildRequest {
        version: cli.version,
        last_released: cli.last_release,
    };

    match pipeline.run(&request) {
        Ok(report) => {
            if cli.json {
                match serde_json::to_string_pretty(&report) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        tracing::error!("Failed to serialize report: {}", e);
                        return ExitCode::FAILURE;
                    }
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
