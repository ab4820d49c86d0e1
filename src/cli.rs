use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::checks::QcMode;

/// Shape of the stdout summary printed after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Parser)]
#[command(name = "ifu-qc")]
#[command(about = "Quality-control report generator for IFU survey data products", long_about = None)]
pub struct Cli {
    /// Path(s) to input file(s), or a single directory with --search-in
    #[arg(required = true)]
    pub file_path: Vec<PathBuf>,

    /// Search the given directory recursively for FITS files
    #[arg(long)]
    pub search_in: bool,

    /// Survey/instrument whose check sets apply
    #[arg(long)]
    pub survey: String,

    /// QC checks to run against each file, in order
    #[arg(long, num_args = 1..)]
    pub qctest: Vec<String>,

    /// Data level of the inputs
    #[arg(long, value_enum)]
    pub qcmode: QcMode,

    /// Output directory for all QC products
    #[arg(long, default_value = "output")]
    pub output: PathBuf,

    /// Overwrite output products from previous runs
    #[arg(long)]
    pub overwrite: bool,

    /// Skip HTML report generation
    #[arg(long)]
    pub no_html: bool,

    /// Directory holding acceptance-rule YAML files (defaults to the
    /// built-in rules)
    #[arg(long)]
    pub params: Option<PathBuf>,

    /// Print collected check results to stdout
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}
