use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use indicatif::{MultiProgress, ProgressDrawTarget};
use once_cell::sync::Lazy;
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter};

mod commands;
mod config;
mod progress;
mod writer;

/// The [`MultiProgress`] that every progress bar of the cli is added to.
///
/// Log lines are written through [`writer::IndicatifWriter`] which suspends
/// the bars of this instance, so only bars added here are redrawn cleanly.
pub fn global_multi_progress() -> MultiProgress {
    static GLOBAL_MP: Lazy<MultiProgress> = Lazy::new(|| {
        let mp = MultiProgress::new();
        mp.set_draw_target(ProgressDrawTarget::stderr_with_hz(20));
        mp
    });
    GLOBAL_MP.clone()
}

/// Publish releases of an auto-update channel
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Fingerprint a build, add it to the manifest of a target and upload its
    /// files to the diff store
    Publish(commands::publish::Opt),

    /// Remove objects from the diff store that no manifest references
    Gc(commands::gc::Opt),
}

/// Entry point of the `updex` cli.
fn main() -> miette::Result<()> {
    // Parse the command line arguments
    let cli = Cli::parse();

    // Setup default logging level, `RUST_LOG` takes precedence
    let env_filter = EnvFilter::builder()
        .with_default_directive(cli.verbose.tracing_level_filter().into())
        .from_env_lossy();

    // Setup the tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(writer::IndicatifWriter::new(global_multi_progress()))
        .without_time()
        .finish()
        .try_init()
        .map_err(|err| miette::miette!("failed to initialize logging: {err}"))?;

    // Dispatch the selected command
    match cli.command {
        Commands::Publish(opts) => commands::publish::publish(opts),
        Commands::Gc(opts) => commands::gc::gc(opts),
    }
}
