use std::path::PathBuf;

use clap::Parser;
use console::style;
use miette::{Context, IntoDiagnostic};
use updex_diff::{collect, discover_histories, CollectOptions, CollectStats, DiffStore};
use updex_manifest::History;

use crate::config::GcConfig;

/// Remove objects from the diff store that no manifest references
#[derive(Debug, Parser)]
pub struct Opt {
    /// The directory holding the `<target>_manifest.xml` files and the `diff` store
    #[arg(long, env = "UPDEX_DEPLOY_DIR", default_value = ".")]
    deploy_dir: PathBuf,

    /// Only report what would be removed
    #[arg(long)]
    dry_run: bool,
}

impl From<Opt> for GcConfig {
    fn from(opts: Opt) -> Self {
        GcConfig {
            deploy_dir: opts.deploy_dir,
            dry_run: opts.dry_run,
        }
    }
}

pub fn gc(opts: Opt) -> miette::Result<()> {
    let config = GcConfig::from(opts);
    let stats = execute(&config, None)?;

    let verb = if config.dry_run { "Would remove" } else { "Removed" };
    eprintln!(
        "{} {} {} object(s), {} kept",
        style("✔").green(),
        verb,
        stats.reclaimed_count(),
        stats.objects_kept
    );
    Ok(())
}

/// Collects garbage in the store of the deploy directory against every
/// manifest in it. `current` replaces the manifest of that target on disk,
/// which lets `publish` collect against a history it wrote elsewhere.
pub fn execute(
    config: &GcConfig,
    current: Option<(&str, &History)>,
) -> miette::Result<CollectStats> {
    let mut histories = discover_histories(&config.deploy_dir)
        .into_diagnostic()
        .with_context(|| {
            format!(
                "failed to load the manifests in '{}'",
                config.deploy_dir.display()
            )
        })?;

    if let Some((target, history)) = current {
        histories.retain(|(existing, _)| existing != target);
        histories.push((target.to_string(), history.clone()));
    }

    let store = DiffStore::for_deploy_dir(&config.deploy_dir);
    collect(
        store.root(),
        histories.iter().map(|(_, history)| history),
        &CollectOptions {
            dry_run: config.dry_run,
        },
    )
    .into_diagnostic()
    .context("failed to collect garbage in the diff store")
}
