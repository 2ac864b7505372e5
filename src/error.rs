//! Error types for dataset loading and workbook conversion.
//!
//! Two levels, mirroring the pipeline: [`ParseError`] covers everything that
//! can go wrong while decoding a statistical file, [`ConvertError`] is the
//! public taxonomy a caller sees (missing input, unrecognized extension,
//! parse failure with the file kind attached, workbook write failure).

use std::path::PathBuf;

use thiserror::Error;

use crate::format::FileKind;

/// Result type for conversion operations.
pub type Result<T> = std::result::Result<T, ConvertError>;

#[derive(Debug, Error)]
pub enum ConvertError {
    /// Input path does not exist. Raised before any parsing is attempted.
    #[error("input file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// Extension is neither `.dta` nor `.sav` and no explicit type was given.
    #[error("cannot determine file type of {}: expected a .dta or .sav extension", path.display())]
    UnrecognizedFormat { path: PathBuf },

    /// The underlying file could not be parsed as the expected format.
    #[error("failed to read {kind} file {}", path.display())]
    Parse {
        kind: FileKind,
        path: PathBuf,
        #[source]
        source: ParseError,
    },

    /// The output workbook could not be written. A partially written file
    /// may remain on disk.
    #[error("failed to write workbook {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: rust_xlsxwriter::XlsxError,
    },
}

/// Low-level failure while parsing a statistical file.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("file is truncated near byte {offset}")]
    Truncated { offset: usize },

    #[error("not a {expected} file: signature mismatch")]
    BadMagic { expected: &'static str },

    #[error("unsupported Stata release {release} (releases 117 and 118 are supported)")]
    UnsupportedRelease { release: u32 },

    #[error("unsupported compression code {code}")]
    UnsupportedCompression { code: i32 },

    #[error("unknown encoding label {0:?}")]
    UnknownEncoding(String),

    #[error("text could not be decoded as {encoding}")]
    Decode { encoding: &'static str },

    #[error("{0}")]
    Malformed(String),
}

impl ParseError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        ParseError::Malformed(message.into())
    }
}
