// src/main.rs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use unity_nuget::{BuildReport, LocalFeed, MirrorConfig, Registry, RegistryCache};

#[derive(Parser)]
#[command(name = "unity-nuget")]
#[command(author, version, about = "Mirror NuGet packages as Unity Package Manager packages", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one build pass over the manifest and print the catalog
    Build {
        /// Configuration file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Registry manifest (JSON)
        #[arg(short, long, default_value = "registry.json")]
        manifest: PathBuf,

        /// Local feed directory (overrides upstream.feed)
        #[arg(long)]
        feed: Option<PathBuf>,

        /// Only build entries matching this regex (overrides build.filter)
        #[arg(long)]
        filter: Option<String>,

        /// Write the catalog listing here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write full package documents instead of summaries
        #[arg(long)]
        full: bool,
    },
    /// Load and validate a registry manifest
    CheckManifest {
        /// Registry manifest (JSON)
        #[arg(short, long, default_value = "registry.json")]
        manifest: PathBuf,
    },
}

async fn cmd_build(
    config_path: Option<PathBuf>,
    manifest: PathBuf,
    feed: Option<PathBuf>,
    filter: Option<String>,
    output: Option<PathBuf>,
    full: bool,
) -> Result<()> {
    let mut config = match &config_path {
        Some(path) => MirrorConfig::load(path)?,
        None => MirrorConfig::default(),
    };
    if filter.is_some() {
        config.build.filter = filter;
        config.validate()?;
    }

    let feed = feed
        .or_else(|| config.upstream.feed.clone())
        .context("No feed directory: pass --feed or set upstream.feed")?;

    let registry = Registry::load(&manifest)
        .with_context(|| format!("Failed to load manifest: {}", manifest.display()))?;
    info!("Loaded {} manifest entries", registry.len());

    let cache = RegistryCache::new(
        Arc::new(registry),
        Arc::new(LocalFeed::new(&feed)),
        config.to_cache_options()?,
    )
    .with_error_callback(|failure| {
        eprintln!("error: {} ({}): {}", failure.entry, failure.kind, failure.reason);
    });

    let report = cache.build().await;
    let catalog = cache.catalog();

    let json = if full {
        let documents: Vec<_> = catalog
            .list()
            .iter()
            .filter_map(|summary| catalog.document(&summary.name))
            .collect();
        serde_json::to_string_pretty(&documents)?
    } else {
        serde_json::to_string_pretty(&catalog.list())?
    };

    emit(
        &mut std::io::stdout().lock(),
        &mut std::io::stderr().lock(),
        &json,
        output.as_deref(),
        &report,
    )
}

/// Catalog JSON to `out` (or a file), human-readable lines to `err`
///
/// `out` only ever receives the catalog so it can be piped as JSON.
fn emit(
    out: &mut impl Write,
    err: &mut impl Write,
    json: &str,
    output: Option<&Path>,
    report: &BuildReport,
) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            writeln!(err, "Catalog written to {}", path.display())?;
        }
        None => writeln!(out, "{}", json)?,
    }

    writeln!(
        err,
        "{} published, {} skipped, {} failed",
        report.published.len(),
        report.skipped.len(),
        report.failures.len()
    )?;
    Ok(())
}
