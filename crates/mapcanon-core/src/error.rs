//! Error types for the mapcanon-core library.
//!
//! Decoder failures live in [`DecodeError`] so callers can match on the
//! binary-format failure modes directly; everything else is an [`Error`].

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for mapcanon operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failure modes of the legacy binary map decoder
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DecodeError {
    /// Buffer ended before a field could be read
    #[error("unexpected end of data at offset {offset}: needed {needed} more byte(s)")]
    UnexpectedEof {
        /// Byte offset of the truncated read
        offset: usize,
        /// Bytes missing
        needed: usize,
    },

    /// The buffer does not start with the map magic
    #[error("bad magic header: found {found:02x?}")]
    BadMagicHeader {
        /// The first bytes of the buffer
        found: [u8; 4],
    },

    /// Header version differs from the declared one
    #[error("format version mismatch: declared {declared}, header says {found}")]
    VersionMismatch {
        /// Version the caller declared
        declared: u16,
        /// Version stored in the header
        found: u16,
    },

    /// Version number with no known layout
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u16),

    /// A version name that is not `v<number>` or `<number>`
    #[error("unrecognized format version '{0}', expected v1 or v2")]
    UnrecognizedVersionName(String),

    /// A cell carries flag bits outside the known layout, or a strict decode
    /// found a blocked bit disagreeing with the tile catalog
    #[error("invalid tile flag 0x{flags:02x} at ({x}, {y})")]
    InvalidTileFlag {
        /// 1-indexed column
        x: u16,
        /// 1-indexed row
        y: u16,
        /// Raw flag byte
        flags: u8,
    },

    /// Declared dimensions do not match the cell section
    #[error("dimension overflow: {width}x{height} declared, {cells} cell record(s) present")]
    DimensionOverflow {
        /// Declared width
        width: u16,
        /// Declared height
        height: u16,
        /// Records actually found
        cells: usize,
    },

    /// A length-prefixed string is not valid UTF-8
    #[error("invalid string at offset {offset}")]
    InvalidString {
        /// Byte offset of the string body
        offset: usize,
    },
}

/// Comprehensive error type for all mapcanon operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Failed to read input file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        /// Path to the file that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to write output file
    #[error("failed to write file '{path}': {source}")]
    FileWrite {
        /// Path to the file that failed to write
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to create output directory
    #[error("failed to create directory '{path}': {source}")]
    DirectoryCreate {
        /// Path to the directory that failed to create
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Path traversal attempt detected (security error)
    #[error("path traversal detected: '{path}' would escape output directory")]
    PathTraversal {
        /// The suspicious path
        path: PathBuf,
    },

    /// Binary map decoding failed
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    /// A document cannot be represented in the requested binary version
    #[error("cannot encode map {map_id}: {details}")]
    Encode {
        /// Map being encoded
        map_id: u16,
        /// What does not fit
        details: String,
    },

    /// Malformed object catalog
    #[error("invalid object catalog at offset {offset}: {details}")]
    CatalogParse {
        /// Byte offset where the error occurred
        offset: usize,
        /// Detailed description of the issue
        details: String,
    },

    /// Catalog id absent from the object database
    #[error("object {id} not found in catalog")]
    ObjectNotFound {
        /// The unresolved id
        id: u32,
    },

    /// Malformed tile-type catalog
    #[error("invalid tile catalog: {0}")]
    TileCatalog(String),

    /// Canonical JSON could not be parsed or produced
    #[error("invalid JSON in '{path}': {source}")]
    Json {
        /// File being read or written
        path: PathBuf,
        /// Underlying serde error
        #[source]
        source: serde_json::Error,
    },

    /// Two documents claim the same map id
    #[error("duplicate map id {id}")]
    DuplicateMapId {
        /// The repeated id
        id: u16,
    },

    /// The corpus directory does not hold the expected file pairs
    #[error("corpus incomplete: {} problem(s)", .problems.len())]
    CorpusIncomplete {
        /// One line per missing or unexpected file
        problems: Vec<String>,
    },

    /// The index was queried before it was built
    #[error("cross-map index queried before it was built")]
    IndexNotBuilt,

    /// Archive integrity check failed
    #[error("archive corrupt: {details}")]
    ArchiveCorrupt {
        /// What failed to verify
        details: String,
    },

    /// Another operation owns this archive path
    #[error("archive '{path}' is locked by another operation")]
    ArchiveBusy {
        /// The contended archive path
        path: PathBuf,
    },

    /// The archive file would land inside the directory being packed
    #[error("archive '{archive}' lies inside the packed directory '{source_dir}'")]
    ArchiveInsideSource {
        /// Requested archive path
        archive: PathBuf,
        /// Directory being packed
        source_dir: PathBuf,
    },

    /// Extraction target already holds data
    #[error("extraction target '{path}' already exists and is not empty")]
    TargetNotEmpty {
        /// Destination directory
        path: PathBuf,
    },

    /// Generic internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Creates a new file read error
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a new file write error
    pub fn file_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileWrite {
            path: path.into(),
            source,
        }
    }

    /// Creates a new directory creation error
    pub fn directory_create(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::DirectoryCreate {
            path: path.into(),
            source,
        }
    }

    /// Creates a new path traversal error
    pub fn path_traversal(path: impl Into<PathBuf>) -> Self {
        Self::PathTraversal { path: path.into() }
    }

    /// Creates a new encode error
    pub fn encode(map_id: u16, details: impl Into<String>) -> Self {
        Self::Encode {
            map_id,
            details: details.into(),
        }
    }

    /// Creates a new catalog parse error
    pub fn catalog_parse(offset: usize, details: impl Into<String>) -> Self {
        Self::CatalogParse {
            offset,
            details: details.into(),
        }
    }

    /// Creates a new JSON error
    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }

    /// Creates a new archive corruption error
    pub fn archive_corrupt(details: impl Into<String>) -> Self {
        Self::ArchiveCorrupt {
            details: details.into(),
        }
    }

    /// Creates a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true if this failure is confined to one input file, so a batch
    /// run should record it and move on
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Decode(_) | Self::Json { .. } | Self::FileRead { .. } | Self::Encode { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::path_traversal("/etc/passwd");
        assert!(err.to_string().contains("path traversal"));
        assert!(err.to_string().contains("/etc/passwd"));
    }

    #[test]
    fn test_decode_error_converts() {
        let err: Error = DecodeError::UnsupportedVersion(9).into();
        assert!(err.to_string().contains("unsupported format version 9"));
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::from(DecodeError::BadMagicHeader { found: *b"NOPE" }).is_recoverable());
        assert!(!Error::path_traversal("/test").is_recoverable());
        assert!(!Error::archive_corrupt("crc").is_recoverable());
    }

    #[test]
    fn test_corpus_incomplete_display() {
        let err = Error::CorpusIncomplete {
            problems: vec!["missing resources_3.json".into()],
        };
        assert_eq!(err.to_string(), "corpus incomplete: 1 problem(s)");
    }
}
