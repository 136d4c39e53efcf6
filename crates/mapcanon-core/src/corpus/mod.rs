//! The corpus handle: every map of one conversion run, keyed by id.
//!
//! A [`Corpus`] is an explicit value passed to validation and indexing
//! instead of process-wide state. Its revision counter moves on every
//! mutation, which lets a [`CrossMapIndex`](crate::index::CrossMapIndex)
//! tell whether it was built from the current contents.

mod batch;
mod store;

use crate::error::{Error, Result};
use crate::model::{MapDocument, DEFAULT_MAX_MAP_ID};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use tracing::debug;

pub use batch::{convert_directory, BatchConfig, BatchReport, FileOutcome, FileResult};
pub use store::{
    list_corpus_dir, load_document, map_file_name, resources_file_name, save_document,
    write_atomic, CorpusListing, MapFile, ResourcesFile,
};

/// Expected id range of a canonical corpus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusLayout {
    /// Smallest map id
    pub first_id: u16,
    /// Largest map id
    pub last_id: u16,
}

impl Default for CorpusLayout {
    fn default() -> Self {
        Self {
            first_id: 1,
            last_id: DEFAULT_MAX_MAP_ID,
        }
    }
}

impl CorpusLayout {
    /// Creates the stock layout, ids 1 to 290
    pub fn new() -> Self {
        Self::default()
    }

    /// Layout covering `first..=last`
    pub fn with_range(first: u16, last: u16) -> Self {
        Self {
            first_id: first,
            last_id: last,
        }
    }

    /// Ids the corpus must contain
    pub fn ids(&self) -> RangeInclusive<u16> {
        self.first_id..=self.last_id
    }

    /// Whether `id` belongs to the layout
    pub fn contains(&self, id: u16) -> bool {
        self.ids().contains(&id)
    }

    /// Number of files a complete corpus holds (two per id)
    pub fn expected_files(&self) -> usize {
        self.ids().count() * 2
    }
}

/// In-memory set of map documents with unique ids
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    maps: BTreeMap<u16, MapDocument>,
    revision: u64,
}

impl Corpus {
    /// Creates an empty corpus
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a corpus, rejecting duplicate ids
    pub fn from_documents(docs: impl IntoIterator<Item = MapDocument>) -> Result<Self> {
        let mut corpus = Self::new();
        for doc in docs {
            corpus.insert(doc)?;
        }
        Ok(corpus)
    }

    /// Adds a document whose id is not present yet
    pub fn insert(&mut self, doc: MapDocument) -> Result<()> {
        if self.maps.contains_key(&doc.id) {
            return Err(Error::DuplicateMapId { id: doc.id });
        }
        self.maps.insert(doc.id, doc);
        self.revision += 1;
        Ok(())
    }

    /// Supersedes the document with the same id, returning the retired one
    pub fn replace(&mut self, doc: MapDocument) -> Option<MapDocument> {
        let retired = self.maps.insert(doc.id, doc);
        self.revision += 1;
        if let Some(old) = &retired {
            debug!("Map {} superseded by a newer document", old.id);
        }
        retired
    }

    /// Removes a document
    pub fn remove(&mut self, id: u16) -> Option<MapDocument> {
        let removed = self.maps.remove(&id);
        if removed.is_some() {
            self.revision += 1;
        }
        removed
    }

    /// Document with `id`
    pub fn get(&self, id: u16) -> Option<&MapDocument> {
        self.maps.get(&id)
    }

    /// Documents in id order
    pub fn iter(&self) -> impl Iterator<Item = &MapDocument> {
        self.maps.values()
    }

    /// Ids in ascending order
    pub fn ids(&self) -> impl Iterator<Item = u16> + '_ {
        self.maps.keys().copied()
    }

    /// Number of documents
    pub fn len(&self) -> usize {
        self.maps.len()
    }

    /// Whether the corpus is empty
    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// Mutation counter; unchanged contents keep the same revision
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Ids of `layout` with no document
    pub fn missing_ids(&self, layout: &CorpusLayout) -> Vec<u16> {
        layout
            .ids()
            .filter(|id| !self.maps.contains_key(id))
            .collect()
    }

    /// Documents split into `parts` contiguous, roughly equal slices for
    /// per-thread processing
    pub(crate) fn partition(&self, parts: usize) -> Vec<Vec<&MapDocument>> {
        let docs: Vec<&MapDocument> = self.maps.values().collect();
        let size = docs.len().div_ceil(parts.max(1)).max(1);
        docs.chunks(size).map(<[_]>::to_vec).collect()
    }
}

/// Worker count: `requested`, or the machine's parallelism when 0
pub(crate) fn worker_count(requested: usize) -> usize {
    if requested > 0 {
        return requested;
    }
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Runs `work` over every part on its own scoped thread and returns the
/// results in part order. A panicking worker is re-raised on the caller
/// once every worker has been joined.
pub(crate) fn run_parallel<T, R, F>(parts: Vec<T>, work: F) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Sync,
{
    let work = &work;
    std::thread::scope(|scope| {
        let handles: Vec<_> = parts
            .into_iter()
            .map(|part| scope.spawn(move || work(part)))
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        let mut panic = None;
        for handle in handles {
            match handle.join() {
                Ok(result) => results.push(result),
                Err(payload) => {
                    panic.get_or_insert(payload);
                }
            }
        }
        if let Some(payload) = panic {
            std::panic::resume_unwind(payload);
        }
        results
    })
}
