//! # mapcanon-core
//!
//! A library for converting legacy binary tile maps into a canonical JSON
//! corpus and keeping that corpus internally consistent.
//!
//! This crate provides the core functionality for:
//! - Decoding versioned binary maps, and encoding them back for fidelity checks
//! - Parsing the global object catalog
//! - Validating maps against the catalog and each other
//! - Indexing graphic usage across every map
//! - Packing the corpus into a single deterministic archive
//!
//! ## Architecture
//!
//! - [`codec`]: Binary map decoder and encoder, tile-type catalog
//! - [`catalog`]: Object catalog parser
//! - [`model`]: The canonical [`MapDocument`] and its parts
//! - [`corpus`]: Explicit corpus handle, JSON persistence, batch conversion
//! - [`validate`]: Read-only consistency checks
//! - [`index`]: Corpus-wide graphic reverse lookup
//! - [`archive`]: Corpus archiver
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use mapcanon_core::{Corpus, CrossMapIndex, Decoder, FormatVersion, ObjectDatabase, TileCatalog, Validator};
//!
//! let tiles = TileCatalog::load("tiles.json")?;
//! let objects = ObjectDatabase::load("objects.odb")?;
//!
//! let data = std::fs::read("maps/mapa1.map")?;
//! let decoded = Decoder::new(&tiles)
//!     .with_objects(&objects)
//!     .decode(&data, FormatVersion::V1)?;
//!
//! let corpus = Corpus::from_documents([decoded.document])?;
//! let report = Validator::new(&objects).validate_corpus(&corpus);
//! println!("{} error(s)", report.error_count());
//!
//! let index = CrossMapIndex::build(&corpus);
//! println!("{} placement(s) of graphic 7", index.query(7)?.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod archive;
pub mod catalog;
pub mod codec;
pub mod corpus;
pub mod error;
pub mod index;
pub mod model;
pub mod validate;

// Re-export primary types for convenience
pub use archive::{ArchiveConfig, ArchiveLock, Archiver, DirectoryTree, ManifestEntry};
pub use catalog::{ObjectAttributes, ObjectCatalogEntry, ObjectDatabase};
pub use codec::{
    encode, DecodeWarning, DecodeWarningCode, Decoded, Decoder, DecoderConfig, FormatVersion,
    RoundTrip, TileCatalog,
};
pub use corpus::{convert_directory, BatchConfig, BatchReport, Corpus, CorpusLayout, FileOutcome, FileResult};
pub use error::{DecodeError, Error, Result};
pub use index::{brute_force_scan, CrossMapIndex, Occurrence};
pub use model::{Coord, GrhIndex, MapDocument, Plane};
pub use validate::{FindingCode, Severity, ValidationFinding, ValidationReport, Validator, ValidatorConfig};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
