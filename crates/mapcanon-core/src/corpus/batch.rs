//! Batch conversion of a directory of binary maps.
//!
//! Files are decoded by scoped worker threads that share nothing mutable;
//! their results are merged afterwards by the calling thread, which is the
//! only writer of the output directory.

use super::{run_parallel, worker_count, Corpus};
use crate::codec::{DecodeWarning, Decoded, Decoder, FormatVersion};
use crate::error::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Configuration for a batch run
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Layout every source file is declared to use
    pub version: FormatVersion,
    /// Worker threads, 0 for one per core
    pub threads: usize,
    /// Extension of source files, without the dot
    pub extension: String,
    /// Decode and report without writing JSON
    pub dry_run: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            version: FormatVersion::V1,
            threads: 0,
            extension: "map".to_string(),
            dry_run: false,
        }
    }
}

impl BatchConfig {
    /// Creates a new batch config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the declared format version
    pub fn version(mut self, version: FormatVersion) -> Self {
        self.version = version;
        self
    }

    /// Sets the worker count
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Sets the source file extension
    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Sets dry-run mode
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// What happened to one source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum FileOutcome {
    /// Decoded (and, unless dry-run, persisted)
    Converted {
        /// Id from the map header
        map_id: u16,
        /// Non-fatal anomalies met while decoding
        warnings: Vec<DecodeWarning>,
    },
    /// Skipped; the run continued
    Failed {
        /// Rendered error
        error: String,
    },
}

/// Per-file entry of a batch report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileResult {
    /// Source file
    pub path: PathBuf,
    /// Result of processing it
    pub outcome: FileOutcome,
}

/// Final report of a batch run, sorted by path
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    /// One entry per source file
    pub results: Vec<FileResult>,
}

impl BatchReport {
    /// Files that converted
    pub fn converted(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, FileOutcome::Converted { .. }))
            .count()
    }

    /// Files that failed
    pub fn failed(&self) -> impl Iterator<Item = &FileResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, FileOutcome::Failed { .. }))
    }

    /// Total decode warnings across converted files
    pub fn warning_count(&self) -> usize {
        self.results
            .iter()
            .map(|r| match &r.outcome {
                FileOutcome::Converted { warnings, .. } => warnings.len(),
                FileOutcome::Failed { .. } => 0,
            })
            .sum()
    }

    /// Whether every file converted
    pub fn is_clean(&self) -> bool {
        self.failed().next().is_none()
    }
}

fn collect_sources(source: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    if !source.is_dir() {
        return Err(Error::file_read(
            source,
            std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
        ));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(source)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(extension))
            .unwrap_or(false);
        if matches {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

fn decode_file(decoder: &Decoder<'_>, path: &Path, version: FormatVersion) -> Result<Decoded> {
    let data = std::fs::read(path).map_err(|e| Error::file_read(path, e))?;
    Ok(decoder.decode(&data, version)?)
}

/// Decodes every source file under `source` and writes the canonical JSON
/// pair of each map into `output`.
///
/// Per-file failures (unreadable file, decode error, id already produced by
/// an earlier file) are recorded in the report and do not stop the run.
/// Failing to write the output directory does.
pub fn convert_directory(
    source: &Path,
    output: &Path,
    decoder: &Decoder<'_>,
    config: &BatchConfig,
) -> Result<(BatchReport, Corpus)> {
    let files = collect_sources(source, &config.extension)?;
    let threads = worker_count(config.threads).min(files.len().max(1));
    info!(
        "Converting {} file(s) from {} with {} worker(s)",
        files.len(),
        source.display(),
        threads
    );

    let chunk = files.len().div_ceil(threads).max(1);
    let decoded: Vec<(PathBuf, Result<Decoded>)> =
        run_parallel(files.chunks(chunk).collect::<Vec<_>>(), |paths: &[PathBuf]| {
            paths
                .iter()
                .map(|path| {
                    debug!("Decoding {}", path.display());
                    (path.clone(), decode_file(decoder, path, config.version))
                })
                .collect::<Vec<_>>()
        })
        .into_iter()
        .flatten()
        .collect();

    let mut report = BatchReport::default();
    let mut corpus = Corpus::new();
    for (path, result) in decoded {
        let outcome = match result {
            Ok(Decoded { document, warnings }) => {
                let map_id = document.id;
                for warning in &warnings {
                    warn!("{}: {} {}", path.display(), warning.code, warning.message);
                }
                match corpus.insert(document) {
                    Ok(()) => FileOutcome::Converted { map_id, warnings },
                    Err(e) => FileOutcome::Failed {
                        error: e.to_string(),
                    },
                }
            }
            Err(e) if e.is_recoverable() => {
                warn!("Skipping {}: {}", path.display(), e);
                FileOutcome::Failed {
                    error: e.to_string(),
                }
            }
            Err(e) => return Err(e),
        };
        report.results.push(FileResult { path, outcome });
    }

    if !config.dry_run {
        corpus.save_dir(output)?;
    }

    info!(
        "Converted {} of {} file(s), {} warning(s)",
        report.converted(),
        report.results.len(),
        report.warning_count()
    );
    Ok((report, corpus))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode, TileCatalog};
    use crate::model::MapDocument;
    use tempfile::TempDir;

    fn write_map(dir: &Path, file: &str, id: u16) {
        let doc = MapDocument::new(id, format!("Map {}", id), 2, 2);
        std::fs::write(dir.join(file), encode(&doc, FormatVersion::V1).unwrap()).unwrap();
    }

    #[test]
    fn test_failures_do_not_abort_the_run() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write_map(src.path(), "mapa1.map", 1);
        write_map(src.path(), "mapa2.map", 2);
        write_map(src.path(), "mapa2-copy.map", 2);
        std::fs::write(src.path().join("broken.map"), b"garbage").unwrap();
        std::fs::write(src.path().join("notes.txt"), b"ignored").unwrap();

        let tiles = TileCatalog::new();
        let decoder = Decoder::new(&tiles);
        let (report, corpus) =
            convert_directory(src.path(), out.path(), &decoder, &BatchConfig::new().threads(3))
                .unwrap();

        assert_eq!(report.results.len(), 4);
        assert_eq!(report.converted(), 2);
        let failed: Vec<_> = report
            .failed()
            .map(|r| r.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(failed, vec!["broken.map", "mapa2.map"]);
        assert_eq!(corpus.ids().collect::<Vec<_>>(), vec![1, 2]);
        assert!(out.path().join("map_1.json").is_file());
        assert!(out.path().join("resources_2.json").is_file());
        assert!(!report.is_clean());
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write_map(src.path(), "a.MAP", 5);

        let tiles = TileCatalog::new();
        let decoder = Decoder::new(&tiles);
        let (report, _) = convert_directory(
            src.path(),
            out.path(),
            &decoder,
            &BatchConfig::new().dry_run(true),
        )
        .unwrap();

        assert!(report.is_clean());
        assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_source_directory() {
        let tiles = TileCatalog::new();
        let decoder = Decoder::new(&tiles);
        let out = TempDir::new().unwrap();
        let result = convert_directory(
            &out.path().join("nope"),
            out.path(),
            &decoder,
            &BatchConfig::new(),
        );
        assert!(result.is_err());
    }
}
