use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The error type for every fallible operation in the crate.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("File not found in archive: {0}")]
    FileNotFound(String),
    #[error("File already archived: {0}")]
    FileExists(String),

    #[error("Failed to open '{path}': {source}")]
    FileOpen { source: io::Error, path: PathBuf },
    #[error("Read error: {0}")]
    FileRead(#[source] io::Error),
    #[error("Write error: {0}")]
    FileWrite(#[source] io::Error),
    #[error("Close error: {0}")]
    FileClose(#[source] io::Error),
    #[error("Seek error: {0}")]
    FileSeek(#[source] io::Error),

    #[error("Bad filename: {0}")]
    BadFilename(String),
    #[error("Bad archive path: {0}")]
    BadPath(PathBuf),
    #[error("Corrupt archive: {0}")]
    BadArchive(String),
    #[error("Corrupt block chain at index {0}")]
    BadBlock(u64),
    #[error("Block index {index} out of range (archive has {num_blocks} blocks)")]
    BadBlockIndex { index: u64, num_blocks: u64 },
    #[error("Block data length {0} exceeds payload capacity")]
    BadBlockDataLength(u32),

    #[error("Unknown processor: {0:?}")]
    BadProcessor(String),
}

pub type ArchiveResult<T> = Result<T, ArchiveError>;

impl ArchiveError {
    /// Attach a path to a raw open failure.
    pub(crate) fn open(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> ArchiveError {
        let path = path.into();
        move |source| ArchiveError::FileOpen { source, path }
    }
}
