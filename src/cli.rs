use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::format::FileKind;

#[derive(Debug, Parser)]
#[command(author, version, about = "Convert Stata and SPSS datasets to XLSForm workbooks", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Convert a dataset into an XLSForm workbook
    Convert(ConvertArgs),
    /// Summarize a dataset's variables, labels, and inferred types
    Inspect(InspectArgs),
}

#[derive(Debug, Args)]
pub struct ConvertArgs {
    /// Input dataset file (.dta or .sav)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Output XLSForm workbook (.xlsx)
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,
    /// Form identifier (defaults to the input file name without extension)
    #[arg(long = "form-id")]
    pub form_id: Option<String>,
    /// Form title (defaults to the form id, title cased)
    #[arg(long = "form-title")]
    pub form_title: Option<String>,
    /// Dataset file type; detected from the extension when omitted
    #[arg(long = "file-type", value_enum)]
    pub file_type: Option<FileKind>,
    /// Character encoding of text in the input (tried automatically when omitted)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct InspectArgs {
    /// Input dataset file (.dta or .sav)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Dataset file type; detected from the extension when omitted
    #[arg(long = "file-type", value_enum)]
    pub file_type: Option<FileKind>,
    /// Character encoding of text in the input (tried automatically when omitted)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Emit the summary as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}
