use anyhow::{Context, Result};
use asl_context::{
    acquisition::{Acquisition, FirstNiftiResolver},
    pipeline::{self, Options},
    volume_loader::NiftiImageIo,
};
use clap::Parser;
use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Write BIDS aslcontext sidecars for converted ASL acquisitions.
#[derive(Parser)]
#[command(name = "asl-context")]
#[command(version, about)]
struct Cli {
    /// Dataset directory the acquisitions were moved into
    #[arg(long)]
    out_dir: PathBuf,

    /// JSON file listing the moved acquisitions
    #[arg(long)]
    acquisitions: PathBuf,

    /// Include *_aslcontext.json files among the outputs
    #[arg(long, overrides_with = "no_include_aslcontext_json")]
    include_aslcontext_json: bool,

    /// Do not include *_aslcontext.json files among the outputs (default)
    #[arg(long, overrides_with = "include_aslcontext_json")]
    no_include_aslcontext_json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn options(&self) -> Options {
        Options {
            include_aslcontext_json: self.include_aslcontext_json
                && !self.no_include_aslcontext_json,
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("asl_context=debug,info")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_acquisitions(path: &Path) -> Result<Vec<Acquisition>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading acquisitions from {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("parsing acquisitions from {}", path.display()))
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    info!("asl-context:version: {}", env!("CARGO_PKG_VERSION"));

    let acquisitions = load_acquisitions(&cli.acquisitions)?;
    info!(count = acquisitions.len(), "Loaded acquisitions");

    let report = pipeline::process(
        &cli.out_dir,
        &acquisitions,
        &NiftiImageIo,
        &FirstNiftiResolver,
        &cli.options(),
    );

    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
