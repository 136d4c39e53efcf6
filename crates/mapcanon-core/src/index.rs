//! Corpus-wide reverse lookup from graphic index to placements.
//!
//! The index is built explicitly from a [`Corpus`] snapshot and never
//! rebuilds itself. Queries against an index built from an older revision
//! return the old answer; callers decide when to [`CrossMapIndex::rebuild`].

use crate::corpus::{run_parallel, worker_count, Corpus};
use crate::error::{Error, Result};
use crate::model::{Coord, GrhIndex, MapDocument, Plane};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;
use tracing::{debug, info};

/// One placement of a graphic
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    /// Map holding the tile
    pub map_id: u16,
    /// Row
    pub y: u16,
    /// Column
    pub x: u16,
    /// Plane of the layer
    pub plane: Plane,
}

impl Occurrence {
    /// Cell of the placement
    pub fn coord(&self) -> Coord {
        Coord::new(self.x, self.y)
    }
}

type Entries = BTreeMap<GrhIndex, BTreeSet<Occurrence>>;

#[derive(Debug, Clone)]
struct Snapshot {
    revision: u64,
    maps: usize,
    entries: Entries,
}

/// Built index over a corpus snapshot
#[derive(Debug, Clone, Default)]
pub struct CrossMapIndex {
    snapshot: Option<Snapshot>,
    threads: usize,
}

fn empty_set() -> &'static BTreeSet<Occurrence> {
    static EMPTY: OnceLock<BTreeSet<Occurrence>> = OnceLock::new();
    EMPTY.get_or_init(BTreeSet::new)
}

/// Occurrences of every non-zero graphic in `doc`
fn scan_map(doc: &MapDocument, entries: &mut Entries) {
    for layer in &doc.layers {
        for (index, &grh) in layer.tiles.iter().enumerate() {
            if grh == 0 {
                continue;
            }
            let coord = doc.coord_of(index);
            entries.entry(grh).or_default().insert(Occurrence {
                map_id: doc.id,
                y: coord.y,
                x: coord.x,
                plane: layer.plane,
            });
        }
    }
}

fn merge(into: &mut Entries, from: Entries) {
    for (grh, occurrences) in from {
        into.entry(grh).or_default().extend(occurrences);
    }
}

impl CrossMapIndex {
    /// Creates an unbuilt index
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of build workers, 0 for one per core
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Builds an index from `corpus`
    pub fn build(corpus: &Corpus) -> Self {
        let mut index = Self::new();
        index.rebuild(corpus);
        index
    }

    /// Replaces the contents with a fresh build from `corpus`.
    ///
    /// The new snapshot is complete before it replaces the old one, and the
    /// `&mut self` receiver keeps queries out while it runs.
    pub fn rebuild(&mut self, corpus: &Corpus) {
        let parts = corpus.partition(worker_count(self.threads));
        debug!("Indexing {} map(s) in {} part(s)", corpus.len(), parts.len());

        let partials = run_parallel(parts, |docs| {
            let mut entries = Entries::new();
            for doc in docs {
                scan_map(doc, &mut entries);
            }
            entries
        });

        let mut entries = Entries::new();
        for partial in partials {
            merge(&mut entries, partial);
        }

        info!(
            "Indexed {} distinct graphic(s) across {} map(s)",
            entries.len(),
            corpus.len()
        );
        self.snapshot = Some(Snapshot {
            revision: corpus.revision(),
            maps: corpus.len(),
            entries,
        });
    }

    /// Occurrences of `grh`, ordered by map, row, column and plane.
    /// Unknown graphics yield an empty set.
    pub fn query(&self, grh: GrhIndex) -> Result<&BTreeSet<Occurrence>> {
        let snapshot = self.snapshot.as_ref().ok_or(Error::IndexNotBuilt)?;
        Ok(snapshot.entries.get(&grh).unwrap_or_else(|| empty_set()))
    }

    /// Whether a build has completed
    pub fn is_built(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Whether `corpus` changed since the last build
    pub fn is_stale(&self, corpus: &Corpus) -> bool {
        match &self.snapshot {
            Some(snapshot) => {
                snapshot.revision != corpus.revision() || snapshot.maps != corpus.len()
            }
            None => true,
        }
    }

    /// Every indexed graphic in ascending order
    pub fn graphics(&self) -> Result<impl Iterator<Item = GrhIndex> + '_> {
        let snapshot = self.snapshot.as_ref().ok_or(Error::IndexNotBuilt)?;
        Ok(snapshot.entries.keys().copied())
    }
}

/// Reference scan answering one query without an index
pub fn brute_force_scan(corpus: &Corpus, grh: GrhIndex) -> BTreeSet<Occurrence> {
    let mut found = BTreeSet::new();
    for doc in corpus.iter() {
        for plane in Plane::ALL {
            for index in 0..doc.cell_count() {
                let coord = doc.coord_of(index);
                if grh != 0 && doc.tile(plane, coord) == grh {
                    found.insert(Occurrence {
                        map_id: doc.id,
                        y: coord.y,
                        x: coord.x,
                        plane,
                    });
                }
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_corpus() -> Corpus {
        let docs = (1..=5u16).map(|id| {
            let mut doc = MapDocument::new(id, format!("m{}", id), 4, 3);
            for index in 0..doc.cell_count() {
                let coord = doc.coord_of(index);
                doc.set_tile(Plane::Ground, coord, 1 + (index as u32 % 3));
                if (coord.x + coord.y + id) % 4 == 0 {
                    doc.set_tile(Plane::Decoration, coord, 40 + id as u32);
                }
            }
            doc.set_tile(Plane::Roof, Coord::new(2, 2), 7);
            doc
        });
        Corpus::from_documents(docs).unwrap()
    }

    #[test]
    fn test_query_before_build() {
        let index = CrossMapIndex::new();
        assert!(matches!(index.query(1), Err(Error::IndexNotBuilt)));
        assert!(index.graphics().is_err());
        assert!(!index.is_built());
    }

    #[test]
    fn test_matches_brute_force() {
        let corpus = sample_corpus();
        let index = CrossMapIndex::build(&corpus);
        let graphics: Vec<_> = index.graphics().unwrap().collect();
        assert!(graphics.contains(&7));
        for grh in graphics.iter().copied().chain([0, 999]) {
            assert_eq!(index.query(grh).unwrap(), &brute_force_scan(&corpus, grh));
        }
        assert_eq!(index.query(7).unwrap().len(), 5);
    }

    #[test]
    fn test_thread_count_does_not_change_result() {
        let corpus = sample_corpus();
        let mut one = CrossMapIndex::new().with_threads(1);
        one.rebuild(&corpus);
        let mut many = CrossMapIndex::new().with_threads(8);
        many.rebuild(&corpus);
        for grh in one.graphics().unwrap() {
            assert_eq!(one.query(grh).unwrap(), many.query(grh).unwrap());
        }
    }

    #[test]
    fn test_stale_until_rebuilt() {
        let mut corpus = sample_corpus();
        let mut index = CrossMapIndex::build(&corpus);
        assert!(!index.is_stale(&corpus));

        let mut doc = MapDocument::new(6, "new", 2, 2);
        doc.set_tile(Plane::Ground, Coord::new(1, 1), 7);
        corpus.insert(doc).unwrap();

        assert!(index.is_stale(&corpus));
        assert_eq!(index.query(7).unwrap().len(), 5);

        index.rebuild(&corpus);
        assert!(!index.is_stale(&corpus));
        let last = index.query(7).unwrap().iter().last().copied().unwrap();
        assert_eq!(
            last,
            Occurrence {
                map_id: 6,
                y: 1,
                x: 1,
                plane: Plane::Ground,
            }
        );
    }
}
