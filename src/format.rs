//! Dataset file-kind detection.

use std::fmt;
use std::path::Path;

use clap::ValueEnum;

use crate::error::ConvertError;

/// Supported statistical file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum FileKind {
    /// Stata `.dta`
    Stata,
    /// SPSS `.sav`
    Spss,
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileKind::Stata => write!(f, "Stata"),
            FileKind::Spss => write!(f, "SPSS"),
        }
    }
}

/// Determine the file kind from the path extension.
///
/// `.dta` maps to Stata and `.sav` to SPSS, case-insensitively. Anything
/// else is an [`ConvertError::UnrecognizedFormat`]; detection never touches
/// the file contents.
pub fn detect_kind(path: &Path) -> Result<FileKind, ConvertError> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("dta") => Ok(FileKind::Stata),
        Some(ext) if ext.eq_ignore_ascii_case("sav") => Ok(FileKind::Spss),
        _ => Err(ConvertError::UnrecognizedFormat {
            path: path.to_path_buf(),
        }),
    }
}
