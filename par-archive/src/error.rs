//! Error types for PARC archive operations

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid PARC magic: expected [80, 65, 82, 67], got {0:?}")]
    InvalidMagic([u8; 4]),

    #[error("Invalid endianness tag: {0:#04x}")]
    InvalidEndianness(u8),

    #[error("Truncated archive: declared {declared} bytes, stream has {actual}")]
    TruncatedArchive { declared: u64, actual: u64 },

    #[error("Malformed manifest: {0}")]
    MalformedManifest(String),

    #[error("Count mismatch in {scope}: declared {declared}, read {actual}")]
    CountMismatch {
        scope: &'static str,
        declared: u32,
        actual: u32,
    },

    #[error("Entry name {0:?} exceeds 63 bytes")]
    NameTooLong(String),

    #[error("File of {size} bytes exceeds the 2 GiB entry limit")]
    SizeOverflow { size: u64 },

    #[error("No data loaded for entry {0:?}")]
    DataNotLoaded(String),

    #[error("Archive not ready to emit: {0}")]
    NotInitialized(&'static str),

    #[error("Archive structures do not match: {0}")]
    StructureMismatch(String),

    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    #[error("SLLZ error: {0}")]
    Sllz(#[from] sllz::Error),
}

pub type Result<T> = std::result::Result<T, ParError>;
