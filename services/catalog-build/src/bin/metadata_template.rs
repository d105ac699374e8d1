//! Write a starter experiment metadata file.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use catalog_build::metadata::TEMPLATE_FILE;
use catalog_build::{init_tracing, write_metadata_template, LogFormat};

#[derive(Parser, Debug)]
#[command(name = "metadata-template")]
#[command(about = "Write a metadata file template with a fresh experiment UUID")]
struct Args {
    /// Where to write the template
    #[arg(short, long, default_value = TEMPLATE_FILE)]
    output: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    force: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level, args.log_format)?;
    write_metadata_template(&args.output, args.force)
}
