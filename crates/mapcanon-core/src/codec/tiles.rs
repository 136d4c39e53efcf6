//! Tile-type catalog: which graphics make a cell impassable.
//!
//! The catalog is the authority on blocking. The per-cell bit stored in the
//! binary maps is only cross-checked against it.

use crate::error::{Error, Result};
use crate::model::{BlockKind, GrhIndex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// One catalog line as stored in the JSON file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileTypeEntry {
    /// Graphic index
    pub grh: GrhIndex,
    /// Blocking reason for cells showing this graphic
    pub kind: BlockKind,
}

/// Mapping from graphic index to blocking kind
#[derive(Debug, Clone, Default)]
pub struct TileCatalog {
    kinds: HashMap<GrhIndex, BlockKind>,
}

impl TileCatalog {
    /// Creates an empty catalog where nothing blocks
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a catalog, rejecting a graphic listed with two different kinds
    pub fn from_entries(entries: impl IntoIterator<Item = TileTypeEntry>) -> Result<Self> {
        let mut kinds = HashMap::new();
        for entry in entries {
            if entry.grh == 0 {
                return Err(Error::TileCatalog("graphic 0 cannot be classified".into()));
            }
            match kinds.insert(entry.grh, entry.kind) {
                Some(previous) if previous != entry.kind => {
                    return Err(Error::TileCatalog(format!(
                        "graphic {} listed as both {} and {}",
                        entry.grh,
                        previous.as_str(),
                        entry.kind.as_str()
                    )));
                }
                _ => {}
            }
        }
        Ok(Self { kinds })
    }

    /// Parses the JSON array form: `[{"grh": 7, "kind": "wall"}]`
    pub fn from_json_str(json: &str) -> Result<Self> {
        let entries: Vec<TileTypeEntry> = serde_json::from_str(json)
            .map_err(|e| Error::TileCatalog(format!("malformed JSON: {}", e)))?;
        Self::from_entries(entries)
    }

    /// Loads the JSON catalog from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| Error::file_read(path, e))?;
        Self::from_json_str(&json)
    }

    /// Blocking kind of a single graphic
    pub fn classify(&self, grh: GrhIndex) -> Option<BlockKind> {
        if grh == 0 {
            return None;
        }
        self.kinds.get(&grh).copied()
    }

    /// Blocking kind of a cell; the topmost classified layer decides.
    ///
    /// `layers` is ordered ground, decoration, roof.
    pub fn cell_kind(&self, layers: &[GrhIndex]) -> Option<BlockKind> {
        layers.iter().rev().find_map(|&grh| self.classify(grh))
    }

    /// Number of classified graphics
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Whether no graphic is classified
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json() {
        let catalog =
            TileCatalog::from_json_str(r#"[{"grh": 7, "kind": "wall"}, {"grh": 9, "kind": "water"}]"#)
                .unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.classify(7), Some(BlockKind::Wall));
        assert_eq!(catalog.classify(8), None);
    }

    #[test]
    fn test_conflicting_kinds_rejected() {
        let result = TileCatalog::from_entries([
            TileTypeEntry {
                grh: 7,
                kind: BlockKind::Wall,
            },
            TileTypeEntry {
                grh: 7,
                kind: BlockKind::Rock,
            },
        ]);
        assert!(matches!(result, Err(Error::TileCatalog(_))));
    }

    #[test]
    fn test_topmost_layer_decides() {
        let catalog = TileCatalog::from_entries([
            TileTypeEntry {
                grh: 1,
                kind: BlockKind::Water,
            },
            TileTypeEntry {
                grh: 2,
                kind: BlockKind::Tree,
            },
        ])
        .unwrap();
        assert_eq!(catalog.cell_kind(&[1, 2, 0]), Some(BlockKind::Tree));
        assert_eq!(catalog.cell_kind(&[1, 0, 0]), Some(BlockKind::Water));
        assert_eq!(catalog.cell_kind(&[5, 6, 0]), None);
    }
}
