use std::path::PathBuf;

use clap::Parser;
use console::style;
use miette::{Context, IntoDiagnostic};
use updex_diff::{CollectStats, DiffStore, MaterializeReporter, MaterializeStats};
use updex_manifest::{release_from_directory, History};

use crate::{
    commands::gc,
    config::{GcConfig, PublishConfig},
    global_multi_progress,
    progress::ProgressReporter,
};

/// Fingerprint a build, add it to the manifest of a target and upload its
/// files to the diff store
#[derive(Debug, Parser)]
pub struct Opt {
    /// The build output directory to publish
    #[arg(env = "UPDEX_SOURCE")]
    source: PathBuf,

    /// The version of the release
    #[arg(long = "version", env = "UPDEX_VERSION")]
    release_version: String,

    /// The display name of the release, defaults to the version
    #[arg(long, env = "UPDEX_NAME")]
    name: Option<String>,

    /// The platform the build is for, e.g. `win-x64`
    #[arg(long, env = "UPDEX_TARGET")]
    target: String,

    /// The directory holding the `<target>_manifest.xml` files and the `diff` store
    #[arg(long, env = "UPDEX_DEPLOY_DIR", default_value = ".")]
    deploy_dir: PathBuf,

    /// Write the updated manifest here instead of back into the deploy directory
    #[arg(long, short, env = "UPDEX_OUTPUT")]
    output: Option<PathBuf>,

    /// Do not mark the release as the latest one
    #[arg(long)]
    not_latest: bool,

    /// Add delete markers for files that disappeared since the latest release
    #[arg(long)]
    mark_deleted: bool,

    /// Remove unreferenced objects from the diff store afterwards
    #[arg(long)]
    cleanup: bool,

    /// Fail without saving the manifest if a file could not be stored
    #[arg(long)]
    strict: bool,
}

impl TryFrom<Opt> for PublishConfig {
    type Error = crate::config::ConfigError;

    fn try_from(opts: Opt) -> Result<Self, Self::Error> {
        PublishConfig::new(
            opts.source,
            &opts.target,
            &opts.release_version,
            opts.name.as_deref(),
            !opts.not_latest,
            opts.deploy_dir,
            opts.output,
            opts.mark_deleted,
            opts.cleanup,
            opts.strict,
        )
    }
}

/// What a publish run did.
#[derive(Debug)]
pub struct PublishSummary {
    /// The history as it was written
    pub history: History,
    /// What happened to the files of the release
    pub materialize: MaterializeStats,
    /// The result of the cleanup, if one was requested
    pub collect: Option<CollectStats>,
}

pub fn publish(opts: Opt) -> miette::Result<()> {
    let config = PublishConfig::try_from(opts).into_diagnostic()?;
    let reporter = ProgressReporter::new(&global_multi_progress());
    let summary = execute(&config, Some(&reporter))?;

    let stats = &summary.materialize;
    for (path, outcome) in &stats.skipped {
        eprintln!("{} {path}: {outcome}", style("!").yellow());
    }
    eprintln!(
        "{} Published {} of {} to '{}' ({} new object(s), {} already present, {} skipped)",
        style("✔").green(),
        style(&config.version).bold(),
        style(&config.target).bold(),
        config.output_path.display(),
        stats.copied,
        stats.already_present,
        stats.skipped_count(),
    );
    eprintln!(
        "{} The manifest lists {} release(s), the latest is {}",
        style("✔").green(),
        summary.history.len(),
        summary
            .history
            .latest()
            .map_or("none", |release| release.version.as_str()),
    );
    if let Some(collect) = &summary.collect {
        eprintln!(
            "{} Removed {} unreferenced object(s)",
            style("✔").green(),
            collect.reclaimed_count()
        );
    }
    Ok(())
}

/// Runs the publish workflow: fingerprint the source directory, merge the
/// release into the history of the target, place its files in the store and
/// save the manifest.
pub fn execute(
    config: &PublishConfig,
    reporter: Option<&dyn MaterializeReporter>,
) -> miette::Result<PublishSummary> {
    let release = release_from_directory(
        &config.source_dir,
        &config.version,
        &config.name,
        config.is_latest,
    )
    .into_diagnostic()
    .with_context(|| format!("failed to scan '{}'", config.source_dir.display()))?;
    tracing::info!(
        "found {} file(s) in '{}'",
        release.files().len(),
        config.source_dir.display()
    );

    let manifest_path = config.manifest_path();
    let history = History::from_path(&manifest_path).into_diagnostic()?;

    let release = match history
        .latest()
        .filter(|previous| previous.version != config.version)
    {
        Some(previous) if config.mark_deleted => release.with_delete_markers(previous),
        _ => release,
    };

    let history = history.merge(release);
    let release = history
        .get(&config.version)
        .ok_or_else(|| miette::miette!("release '{}' is missing after merging", config.version))?;

    let store = DiffStore::for_deploy_dir(&config.deploy_dir);
    let (release, materialize) = store
        .materialize(&config.source_dir, release, reporter)
        .into_diagnostic()
        .context("failed to upload the release to the diff store")?;

    if config.strict && materialize.skipped_count() > 0 {
        miette::bail!(
            "{} file(s) could not be stored, the manifest was not saved",
            materialize.skipped_count()
        );
    }

    let history = history.with_release(release);
    history
        .write_to_path(&config.output_path)
        .into_diagnostic()
        .with_context(|| format!("failed to write '{}'", config.output_path.display()))?;
    tracing::info!(
        "wrote {} release(s) to '{}'",
        history.len(),
        config.output_path.display()
    );

    let collect = if config.cleanup {
        let gc_config = GcConfig {
            deploy_dir: config.deploy_dir.clone(),
            dry_run: false,
        };
        Some(gc::execute(&gc_config, Some((config.target.as_str(), &history)))?)
    } else {
        None
    };

    Ok(PublishSummary {
        history,
        materialize,
        collect,
    })
}
