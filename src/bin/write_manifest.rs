//! Manifest utility for exported PE risk models.
//!
//! Writes `manifest.json` binding the model files of a directory by SHA-256,
//! so the loader can detect a swapped or corrupted model.
//!
//! # Usage
//!
//! ```bash
//! write_manifest <model_dir> [--file model.json] [--file extra.json]
//! ```

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pe_risk::adapters::model::{Manifest, MODEL_FILE_NAME};

#[derive(Debug, Parser)]
#[command(name = "write_manifest", version, about = "Bind exported model files by SHA-256")]
struct Cli {
    /// Directory holding the exported model
    dir: PathBuf,

    /// File to bind, relative to the directory (repeatable)
    #[arg(long = "file", default_values_t = [MODEL_FILE_NAME.to_string()])]
    files: Vec<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if !cli.dir.is_dir() {
        bail!("{:?} is not a directory", cli.dir);
    }

    let manifest = Manifest::build(&cli.dir, &cli.files)?;
    let path = manifest.write(&cli.dir)?;
    for (file, digest) in &manifest.files {
        tracing::info!("bound {} sha256={}", file, digest);
    }

    println!("Wrote {}", path.display());
    Ok(())
}
