use std::collections::TryReserveError;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Anything that stops a check. `Display` is the single line printed to stderr.
#[derive(Debug, Error)]
pub enum Error {
    #[error("image not found.")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("mmap failed: {0}")]
    Map(#[source] io::Error),

    #[error("ERROR: bad file system geometry: {0}.")]
    Geometry(&'static str),

    #[error("ERROR: out of memory for scan buffers.")]
    Resource(#[from] TryReserveError),

    #[error(transparent)]
    Violation(#[from] Violation),
}

/// One variant per consistency rule. The fields are only for logging; the
/// message is fixed per rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("ERROR: bad inode.")]
    BadInode { inum: u32, type_: i16 },

    #[error("ERROR: bad direct address in inode.")]
    BadDirectAddress { inum: u32, blk: u32 },

    #[error("ERROR: bad indirect address in inode.")]
    BadIndirectAddress { inum: u32, blk: u32 },

    #[error("ERROR: root directory does not exist.")]
    RootMissing,

    #[error("ERROR: directory not properly formatted.")]
    BadDirFormat { inum: u32 },

    #[error("ERROR: address used by inode but marked free in bitmap.")]
    MarkedFree { inum: u32, blk: u32 },

    #[error("ERROR: bitmap marks block in use but it is not in use.")]
    NotInUse { blk: u32 },

    #[error("ERROR: direct address used more than once.")]
    DirectUsedTwice { inum: u32, blk: u32 },

    #[error("ERROR: indirect address used more than once.")]
    IndirectUsedTwice { inum: u32, blk: u32 },

    /// ".." disagrees with the directory that actually lists this one.
    #[error("ERROR: directory not properly formatted.")]
    ParentMismatch {
        inum: u32,
        declared: Option<u32>,
        observed: u32,
    },

    #[error("ERROR: inode marked use but not found in a directory.")]
    Unreferenced { inum: u32 },

    #[error("ERROR: inode referred to in directory but marked free.")]
    ReferencedFree { inum: u32 },

    #[error("ERROR: bad reference count for file.")]
    BadRefCount { inum: u32, nlink: i16, refs: u32 },

    #[error("ERROR: directory appears more than once in file system.")]
    DirLinkedTwice { inum: u32 },
}
