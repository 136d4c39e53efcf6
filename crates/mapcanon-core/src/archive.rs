//! Deterministic single-file archive of a canonical corpus directory.
//!
//! # Format
//!
//! ```text
//! magic    "MCAR"
//! version  u16
//! count    u32
//! entries  {path: u16 len + UTF-8, raw len u32, crc32 u32, deflate len u32, deflate bytes}
//! digest   32-byte blake3 hash of everything above
//! ```
//!
//! Entries are stored in byte order of their `/`-separated relative paths
//! with no timestamps or permissions, so identical trees at the same
//! compression level always produce identical archives. Decompression
//! verifies every checksum before anything touches the filesystem.

use crate::codec::reader::MapReader;
use crate::codec::writer::MapWriter;
use crate::corpus::{map_file_name, resources_file_name, write_atomic, CorpusLayout};
use crate::error::{Error, Result};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Leading bytes of every archive
pub const ARCHIVE_MAGIC: [u8; 4] = *b"MCAR";

/// Layout version written by this crate
pub const ARCHIVE_VERSION: u16 = 1;

const DIGEST_LEN: usize = blake3::OUT_LEN;

/// Relative `/`-separated path to file contents
pub type DirectoryTree = BTreeMap<String, Vec<u8>>;

/// Configuration for the archiver
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    /// Deflate level, 0 to 9
    pub level: u32,
    /// When set, archives must hold exactly the two files per id of this layout
    pub layout: Option<CorpusLayout>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            level: 6,
            layout: None,
        }
    }
}

impl ArchiveConfig {
    /// Creates a new archive config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the deflate level, clamped to 9
    pub fn level(mut self, level: u32) -> Self {
        self.level = level.min(9);
        self
    }

    /// Requires archives to match `layout` exactly
    pub fn require_layout(mut self, layout: CorpusLayout) -> Self {
        self.layout = Some(layout);
        self
    }
}

/// Header of one archived file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    /// Relative path
    pub path: String,
    /// Uncompressed size
    pub size: u32,
    /// Stored size
    pub compressed: u32,
    /// CRC-32 of the uncompressed bytes
    pub crc32: u32,
}

struct RawEntry<'a> {
    header: ManifestEntry,
    data: &'a [u8],
}

/// Packs and unpacks corpus directories
#[derive(Debug, Clone, Default)]
pub struct Archiver {
    config: ArchiveConfig,
}

impl Archiver {
    /// Creates an archiver with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the configuration
    pub fn with_config(mut self, config: ArchiveConfig) -> Self {
        self.config = config;
        self
    }

    /// Archives every regular file under `dir`
    pub fn compress(&self, dir: &Path) -> Result<Vec<u8>> {
        let tree = read_tree(dir)?;
        self.compress_tree(&tree)
    }

    /// Archives an in-memory tree
    pub fn compress_tree(&self, tree: &DirectoryTree) -> Result<Vec<u8>> {
        if let Some(layout) = &self.config.layout {
            let problems = layout_problems(tree, layout);
            if !problems.is_empty() {
                return Err(Error::CorpusIncomplete { problems });
            }
        }

        let count = u32::try_from(tree.len())
            .map_err(|_| Error::internal("too many files for one archive"))?;
        let mut w = MapWriter::new();
        w.put_bytes(&ARCHIVE_MAGIC);
        w.put_u16(ARCHIVE_VERSION);
        w.put_u32(count);

        for (path, contents) in tree {
            check_relative(path)?;
            let path_len = u16::try_from(path.len()).map_err(|_| Error::path_traversal(path))?;
            let size = u32::try_from(contents.len())
                .map_err(|_| Error::internal(format!("{} exceeds 4 GiB", path)))?;

            let mut encoder =
                DeflateEncoder::new(Vec::new(), Compression::new(self.config.level));
            encoder
                .write_all(contents)
                .map_err(|e| Error::internal(format!("deflate {}: {}", path, e)))?;
            let deflated = encoder
                .finish()
                .map_err(|e| Error::internal(format!("deflate {}: {}", path, e)))?;
            let compressed = u32::try_from(deflated.len())
                .map_err(|_| Error::internal(format!("{} exceeds 4 GiB", path)))?;

            w.put_u16(path_len);
            w.put_bytes(path.as_bytes());
            w.put_u32(size);
            w.put_u32(crc32fast::hash(contents));
            w.put_u32(compressed);
            w.put_bytes(&deflated);
            debug!("Packed {} ({} -> {} bytes)", path, size, compressed);
        }

        let mut blob = w.into_vec();
        let digest = blake3::hash(&blob);
        blob.extend_from_slice(digest.as_bytes());
        info!("Packed {} file(s) into {} bytes", tree.len(), blob.len());
        Ok(blob)
    }

    /// Unpacks `blob` in memory, failing with [`Error::ArchiveCorrupt`] on
    /// any checksum, length or structure error
    pub fn decompress(&self, blob: &[u8]) -> Result<DirectoryTree> {
        let entries = parse(blob)?;
        let mut tree = DirectoryTree::new();

        for entry in entries {
            let header = entry.header;
            // the header size is only trusted once the inflated bytes match it
            let hint = (header.size as usize).min(entry.data.len().saturating_mul(16));
            let mut contents = Vec::with_capacity(hint);
            DeflateDecoder::new(entry.data)
                .take(u64::from(header.size) + 1)
                .read_to_end(&mut contents)
                .map_err(|e| Error::archive_corrupt(format!("{}: {}", header.path, e)))?;
            if contents.len() != header.size as usize {
                return Err(Error::archive_corrupt(format!(
                    "{}: inflated to {} bytes, header says {}",
                    header.path,
                    contents.len(),
                    header.size
                )));
            }
            if crc32fast::hash(&contents) != header.crc32 {
                return Err(Error::archive_corrupt(format!("{}: crc mismatch", header.path)));
            }
            tree.insert(header.path, contents);
        }

        if let Some(layout) = &self.config.layout {
            let problems = layout_problems(&tree, layout);
            if let Some(first) = problems.first() {
                return Err(Error::archive_corrupt(format!(
                    "{} layout problem(s), first: {}",
                    problems.len(),
                    first
                )));
            }
        }
        Ok(tree)
    }

    /// Entry headers, after verifying the archive digest
    pub fn manifest(&self, blob: &[u8]) -> Result<Vec<ManifestEntry>> {
        Ok(parse(blob)?.into_iter().map(|e| e.header).collect())
    }

    /// Fully verifies `blob` without writing anything; returns the file count
    pub fn verify(&self, blob: &[u8]) -> Result<usize> {
        self.decompress(blob).map(|tree| tree.len())
    }

    /// Extracts `blob` into `dest`, all or nothing.
    ///
    /// The archive is verified in memory, written into a staging directory
    /// next to `dest` and renamed into place. `dest` must not exist or be
    /// an empty directory.
    pub fn extract(&self, blob: &[u8], dest: &Path) -> Result<usize> {
        let tree = self.decompress(blob)?;

        if dest.exists() {
            let mut listing =
                std::fs::read_dir(dest).map_err(|e| Error::file_read(dest, e))?;
            if listing.next().is_some() {
                return Err(Error::TargetNotEmpty {
                    path: dest.to_path_buf(),
                });
            }
        }

        let parent = match dest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent).map_err(|e| Error::directory_create(&parent, e))?;
        let staging = tempfile::Builder::new()
            .prefix(".mapcanon-extract")
            .tempdir_in(&parent)
            .map_err(|e| Error::directory_create(&parent, e))?;

        for (path, contents) in &tree {
            let target = staging.path().join(path);
            if let Some(dir) = target.parent() {
                std::fs::create_dir_all(dir).map_err(|e| Error::directory_create(dir, e))?;
            }
            std::fs::write(&target, contents).map_err(|e| Error::file_write(&target, e))?;
        }

        if dest.exists() {
            std::fs::remove_dir(dest).map_err(|e| Error::file_write(dest, e))?;
        }
        std::fs::rename(staging.path(), dest).map_err(|e| Error::file_write(dest, e))?;

        info!("Extracted {} file(s) into {}", tree.len(), dest.display());
        Ok(tree.len())
    }

    /// Compresses `dir` into the file at `archive` while holding its lock;
    /// returns the archive digest.
    ///
    /// `archive` must lie outside `dir`, otherwise the lock and the previous
    /// archive would be packed on the next run.
    pub fn write_archive(&self, dir: &Path, archive: &Path) -> Result<String> {
        let source_dir = dir.canonicalize().map_err(|e| Error::file_read(dir, e))?;
        if resolve(archive).starts_with(&source_dir) {
            return Err(Error::ArchiveInsideSource {
                archive: archive.to_path_buf(),
                source_dir,
            });
        }

        let _lock = ArchiveLock::acquire(archive)?;
        let blob = self.compress(dir)?;
        write_atomic(archive, &blob)?;
        Ok(digest(&blob))
    }

    /// Extracts the archive file at `archive` into `dest` while holding its lock
    pub fn read_archive(&self, archive: &Path, dest: &Path) -> Result<usize> {
        let _lock = ArchiveLock::acquire(archive)?;
        let blob = std::fs::read(archive).map_err(|e| Error::file_read(archive, e))?;
        self.extract(&blob, dest)
    }
}

/// Hex blake3 digest of a whole archive, for change detection
pub fn digest(blob: &[u8]) -> String {
    blake3::hash(blob).to_hex().to_string()
}

/// Exclusive claim on one archive path, released on drop
#[derive(Debug)]
pub struct ArchiveLock {
    path: PathBuf,
}

impl ArchiveLock {
    /// Claims `archive`, failing with [`Error::ArchiveBusy`] if another
    /// operation holds it
    pub fn acquire(archive: &Path) -> Result<Self> {
        let mut name = archive.file_name().unwrap_or_default().to_os_string();
        name.push(".lock");
        let path = archive.with_file_name(name);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| Error::directory_create(parent, e))?;
        }
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Self { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(Error::ArchiveBusy {
                path: archive.to_path_buf(),
            }),
            Err(e) => Err(Error::file_write(&path, e)),
        }
    }
}

impl Drop for ArchiveLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to release {}: {}", self.path.display(), e);
        }
    }
}

fn corrupt(e: crate::error::DecodeError) -> Error {
    Error::archive_corrupt(e.to_string())
}

fn parse(blob: &[u8]) -> Result<Vec<RawEntry<'_>>> {
    if blob.len() < DIGEST_LEN {
        return Err(Error::archive_corrupt("shorter than its digest"));
    }
    let (body, stored) = blob.split_at(blob.len() - DIGEST_LEN);
    if blake3::hash(body).as_bytes()[..] != stored[..] {
        return Err(Error::archive_corrupt("digest mismatch"));
    }

    let mut r = MapReader::new(body);
    let magic: [u8; 4] = r.read_array().map_err(corrupt)?;
    if magic != ARCHIVE_MAGIC {
        return Err(Error::archive_corrupt(format!("bad magic {:02x?}", magic)));
    }
    let version = r.read_u16().map_err(corrupt)?;
    if version != ARCHIVE_VERSION {
        return Err(Error::archive_corrupt(format!("unsupported version {}", version)));
    }

    let count = r.read_u32().map_err(corrupt)?;
    let mut seen = BTreeSet::new();
    let mut entries = Vec::new();
    for _ in 0..count {
        let path_len = r.read_u16().map_err(corrupt)? as usize;
        let offset = r.offset();
        let path = std::str::from_utf8(r.read_bytes(path_len).map_err(corrupt)?)
            .map_err(|_| Error::archive_corrupt(format!("entry path at {} is not UTF-8", offset)))?
            .to_string();
        check_relative(&path)?;
        if !seen.insert(path.clone()) {
            return Err(Error::archive_corrupt(format!("duplicate entry {}", path)));
        }

        let size = r.read_u32().map_err(corrupt)?;
        let crc32 = r.read_u32().map_err(corrupt)?;
        let compressed = r.read_u32().map_err(corrupt)?;
        let data = r.read_bytes(compressed as usize).map_err(corrupt)?;
        entries.push(RawEntry {
            header: ManifestEntry {
                path,
                size,
                compressed,
                crc32,
            },
            data,
        });
    }

    if !r.is_empty() {
        return Err(Error::archive_corrupt(format!(
            "{} unexpected byte(s) after the last entry",
            r.remaining()
        )));
    }
    Ok(entries)
}

/// Rejects paths that could leave the extraction directory
fn check_relative(path: &str) -> Result<()> {
    let suspicious = path.is_empty()
        || path.contains('\\')
        || path.contains(':')
        || path
            .split('/')
            .any(|part| part.is_empty() || part == "." || part == "..");
    if suspicious {
        return Err(Error::path_traversal(path));
    }
    Ok(())
}

/// Absolute form of `path` whose trailing components may not exist yet
fn resolve(path: &Path) -> PathBuf {
    let mut missing = Vec::new();
    let mut current = path.to_path_buf();
    loop {
        let probe = if current.as_os_str().is_empty() {
            Path::new(".")
        } else {
            current.as_path()
        };
        if let Ok(found) = probe.canonicalize() {
            return missing
                .into_iter()
                .rev()
                .fold(found, |acc: PathBuf, part| acc.join(part));
        }
        match (current.file_name(), current.parent()) {
            (Some(name), Some(parent)) => {
                missing.push(name.to_os_string());
                current = parent.to_path_buf();
            }
            _ => return path.to_path_buf(),
        }
    }
}

fn read_tree(dir: &Path) -> Result<DirectoryTree> {
    let mut tree = DirectoryTree::new();
    for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            Error::file_read(path, std::io::Error::other(e.to_string()))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(dir)
            .map_err(|_| Error::path_traversal(entry.path()))?;
        let mut parts = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_str().ok_or_else(|| {
                    Error::file_read(
                        entry.path(),
                        std::io::Error::new(
                            std::io::ErrorKind::InvalidData,
                            "file name is not UTF-8",
                        ),
                    )
                })?),
                _ => return Err(Error::path_traversal(entry.path())),
            }
        }

        let contents =
            std::fs::read(entry.path()).map_err(|e| Error::file_read(entry.path(), e))?;
        tree.insert(parts.join("/"), contents);
    }
    Ok(tree)
}

fn layout_problems(tree: &DirectoryTree, layout: &CorpusLayout) -> Vec<String> {
    let mut expected = BTreeSet::new();
    for id in layout.ids() {
        expected.insert(map_file_name(id));
        expected.insert(resources_file_name(id));
    }

    let mut problems: Vec<String> = expected
        .iter()
        .filter(|name| !tree.contains_key(*name))
        .map(|name| format!("missing {}", name))
        .collect();
    problems.extend(
        tree.keys()
            .filter(|name| !expected.contains(*name))
            .map(|name| format!("unexpected {}", name)),
    );
    problems
}
