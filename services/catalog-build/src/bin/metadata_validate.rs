//! Validate experiment metadata files.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use catalog_build::{init_tracing, validate_metadata_files, LogFormat};

#[derive(Parser, Debug)]
#[command(name = "metadata-validate")]
#[command(about = "Check experiment metadata files before they are used in a build")]
struct Args {
    /// Metadata files to check
    #[arg(required = true)]
    file: Vec<PathBuf>,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level, args.log_format)?;

    let valid = validate_metadata_files(&args.file)?;
    for (file, metadata) in args.file.iter().zip(&valid) {
        println!("{}: {} ({})", file.display(), metadata.name, metadata.experiment_uuid);
    }
    Ok(())
}
