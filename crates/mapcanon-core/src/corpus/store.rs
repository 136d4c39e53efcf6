//! Canonical JSON persistence.
//!
//! Each map is stored as two files, `map_<id>.json` and
//! `resources_<id>.json`. Every write goes through [`write_atomic`], so a
//! reader never observes a half-written file.

use super::{Corpus, CorpusLayout};
use crate::error::{Error, Result};
use crate::model::{
    BlockedTile, MapDocument, MapObject, NpcSpawn, Sign, SpawnPoint, TileLayer, Transition,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, trace};
use walkdir::WalkDir;

/// Contents of `map_<id>.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapFile {
    /// Map id
    pub id: u16,
    /// Display name
    pub name: String,
    /// Columns
    pub width: u16,
    /// Rows
    pub height: u16,
    /// Tile layers; may be absent in hand-written files
    #[serde(default)]
    pub layers: Vec<TileLayer>,
    /// Impassable cells
    #[serde(default)]
    pub blocked_tiles: Vec<BlockedTile>,
    /// Described spawn locations
    #[serde(default)]
    pub spawn_points: Vec<SpawnPoint>,
}

/// Contents of `resources_<id>.json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcesFile {
    /// Placed catalog objects
    #[serde(default)]
    pub objects: Vec<MapObject>,
    /// NPC spawn locations
    #[serde(default)]
    pub npc_spawns: Vec<NpcSpawn>,
    /// Links to other maps
    #[serde(default)]
    pub transitions: Vec<Transition>,
    /// Sign posts
    #[serde(default)]
    pub signs: Vec<Sign>,
}

impl MapFile {
    /// Map half of a document
    pub fn from_document(doc: &MapDocument) -> Self {
        Self {
            id: doc.id,
            name: doc.name.clone(),
            width: doc.width,
            height: doc.height,
            layers: doc.layers.clone(),
            blocked_tiles: doc.blocked_tiles.clone(),
            spawn_points: doc.spawn_points.clone(),
        }
    }

    /// Joins both halves back into a document
    pub fn into_document(self, resources: ResourcesFile) -> MapDocument {
        MapDocument {
            id: self.id,
            name: self.name,
            width: self.width,
            height: self.height,
            layers: self.layers,
            blocked_tiles: self.blocked_tiles,
            spawn_points: self.spawn_points,
            objects: resources.objects,
            npc_spawns: resources.npc_spawns,
            transitions: resources.transitions,
            signs: resources.signs,
        }
    }
}

impl ResourcesFile {
    /// Resources half of a document
    pub fn from_document(doc: &MapDocument) -> Self {
        Self {
            objects: doc.objects.clone(),
            npc_spawns: doc.npc_spawns.clone(),
            transitions: doc.transitions.clone(),
            signs: doc.signs.clone(),
        }
    }
}

/// File name of a map's tile data
pub fn map_file_name(id: u16) -> String {
    format!("map_{}.json", id)
}

/// File name of a map's resources
pub fn resources_file_name(id: u16) -> String {
    format!("resources_{}.json", id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Map,
    Resources,
}

fn parse_file_name(name: &str) -> Option<(FileKind, u16)> {
    let stem = name.strip_suffix(".json")?;
    let (kind, digits) = if let Some(digits) = stem.strip_prefix("map_") {
        (FileKind::Map, digits)
    } else {
        (FileKind::Resources, stem.strip_prefix("resources_")?)
    };
    // canonical names carry no leading zeros or signs
    if digits.is_empty() || digits.starts_with('0') || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().map(|id| (kind, id))
}

/// Writes `contents` to `path` through a temporary file in the same
/// directory, renamed into place once fully flushed. On any error the
/// temporary file is removed and `path` is left untouched.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(|e| Error::directory_create(&parent, e))?;

    let mut temp = NamedTempFile::new_in(&parent).map_err(|e| Error::file_write(path, e))?;
    temp.write_all(contents)
        .map_err(|e| Error::file_write(path, e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| Error::file_write(path, e))?;
    temp.persist(path)
        .map_err(|e| Error::file_write(path, e.error))?;

    trace!("Wrote {} ({} bytes)", path.display(), contents.len());
    Ok(())
}

fn to_json<T: Serialize>(path: &Path, value: &T) -> Result<Vec<u8>> {
    let mut json = serde_json::to_vec_pretty(value).map_err(|e| Error::json(path, e))?;
    json.push(b'\n');
    Ok(json)
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let data = std::fs::read(path).map_err(|e| Error::file_read(path, e))?;
    serde_json::from_slice(&data).map_err(|e| Error::json(path, e))
}

/// Persists both files of `doc` under `dir`
pub fn save_document(dir: &Path, doc: &MapDocument) -> Result<()> {
    let map_path = dir.join(map_file_name(doc.id));
    let resources_path = dir.join(resources_file_name(doc.id));
    write_atomic(&map_path, &to_json(&map_path, &MapFile::from_document(doc))?)?;
    write_atomic(
        &resources_path,
        &to_json(&resources_path, &ResourcesFile::from_document(doc))?,
    )?;
    Ok(())
}

/// Loads both files of map `id` from `dir`
pub fn load_document(dir: &Path, id: u16) -> Result<MapDocument> {
    let map_path = dir.join(map_file_name(id));
    let map: MapFile = read_json(&map_path)?;
    if map.id != id {
        return Err(Error::CorpusIncomplete {
            problems: vec![format!("{} declares id {}", map_file_name(id), map.id)],
        });
    }
    let resources: ResourcesFile = read_json(&dir.join(resources_file_name(id)))?;
    Ok(map.into_document(resources))
}

/// What a corpus directory holds, by file name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorpusListing {
    /// Ids with a `map_<id>.json`
    pub maps: BTreeSet<u16>,
    /// Ids with a `resources_<id>.json`
    pub resources: BTreeSet<u16>,
    /// Files that are not canonical corpus files
    pub unexpected: Vec<String>,
}

impl CorpusListing {
    /// Ids having both files
    pub fn complete_ids(&self) -> impl Iterator<Item = u16> + '_ {
        self.maps.intersection(&self.resources).copied()
    }

    /// Every deviation from `layout`, one line each, in a stable order
    pub fn problems(&self, layout: &CorpusLayout) -> Vec<String> {
        let mut problems = Vec::new();
        for id in layout.ids() {
            if !self.maps.contains(&id) {
                problems.push(format!("missing {}", map_file_name(id)));
            }
            if !self.resources.contains(&id) {
                problems.push(format!("missing {}", resources_file_name(id)));
            }
        }
        for id in self.maps.union(&self.resources) {
            if !layout.contains(*id) {
                problems.push(format!("map id {} outside {}..={}", id, layout.first_id, layout.last_id));
            }
        }
        for name in &self.unexpected {
            problems.push(format!("unexpected file {}", name));
        }
        problems
    }

    /// Whether the directory holds exactly the files `layout` asks for
    pub fn is_complete(&self, layout: &CorpusLayout) -> bool {
        self.problems(layout).is_empty()
    }
}

/// Lists the top level of a corpus directory
pub fn list_corpus_dir(dir: &Path) -> Result<CorpusListing> {
    let mut listing = CorpusListing::default();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
            Error::file_read(path, std::io::Error::other(e.to_string()))
        })?;
        let name = entry.file_name().to_string_lossy().into_owned();
        match parse_file_name(&name).filter(|_| entry.file_type().is_file()) {
            Some((FileKind::Map, id)) => {
                listing.maps.insert(id);
            }
            Some((FileKind::Resources, id)) => {
                listing.resources.insert(id);
            }
            None => listing.unexpected.push(name),
        }
    }
    Ok(listing)
}

impl Corpus {
    /// Loads every map/resources pair under `dir`.
    ///
    /// With `require_complete` the directory must match `layout` exactly,
    /// otherwise incomplete pairs and stray files are skipped.
    pub fn load_dir(dir: &Path, layout: &CorpusLayout, require_complete: bool) -> Result<Self> {
        let listing = list_corpus_dir(dir)?;
        if require_complete {
            let problems = listing.problems(layout);
            if !problems.is_empty() {
                return Err(Error::CorpusIncomplete { problems });
            }
        }

        let mut corpus = Corpus::new();
        for id in listing.complete_ids() {
            corpus.insert(load_document(dir, id)?)?;
        }
        debug!("Loaded {} maps from {}", corpus.len(), dir.display());
        Ok(corpus)
    }

    /// Persists every document under `dir`
    pub fn save_dir(&self, dir: &Path) -> Result<()> {
        for doc in self.iter() {
            save_document(dir, doc)?;
        }
        debug!("Saved {} maps to {}", self.len(), dir.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BlockKind, ObjectCategory, Plane};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn sample(id: u16) -> MapDocument {
        let mut doc = MapDocument::new(id, format!("Map {}", id), 3, 2);
        doc.blocked_tiles.push(BlockedTile {
            x: 2,
            y: 1,
            kind: BlockKind::Tree,
        });
        doc.spawn_points.push(SpawnPoint {
            x: 1,
            y: 1,
            description: "start".into(),
        });
        doc.objects.push(MapObject {
            x: 3,
            y: 2,
            catalog_id: 10,
            category: ObjectCategory::Door,
        });
        doc.transitions.push(Transition {
            from_map_id: id,
            from_x: 3,
            from_y: 1,
            to_map_id: id + 1,
            to_x: 1,
            to_y: 1,
        });
        doc
    }

    #[test]
    fn test_parse_file_name() {
        assert_eq!(parse_file_name("map_12.json"), Some((FileKind::Map, 12)));
        assert_eq!(parse_file_name("resources_290.json"), Some((FileKind::Resources, 290)));
        assert_eq!(parse_file_name("map_012.json"), None);
        assert_eq!(parse_file_name("map_.json"), None);
        assert_eq!(parse_file_name("map_1.txt"), None);
        assert_eq!(parse_file_name("notes.json"), None);
    }

    #[test]
    fn test_json_field_names() {
        let doc = sample(4);
        let map = serde_json::to_value(MapFile::from_document(&doc)).unwrap();
        assert_eq!(map["blocked_tiles"][0]["type"], "tree");
        assert_eq!(map["spawn_points"][0]["description"], "start");
        assert_eq!(map["layers"][0]["plane"], "ground");

        let resources = serde_json::to_value(ResourcesFile::from_document(&doc)).unwrap();
        assert_eq!(resources["objects"][0]["catalogId"], 10);
        assert_eq!(resources["objects"][0]["category"], "door");
        assert_eq!(resources["transitions"][0]["toMapId"], 5);
        assert!(resources["npc_spawns"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_save_and_load_document() {
        let dir = TempDir::new().unwrap();
        let mut doc = sample(7);
        doc.set_tile(Plane::Roof, crate::model::Coord::new(1, 2), 321);
        save_document(dir.path(), &doc).unwrap();

        assert!(dir.path().join("map_7.json").is_file());
        assert!(dir.path().join("resources_7.json").is_file());
        assert_eq!(load_document(dir.path(), 7).unwrap(), doc);
    }

    #[test]
    fn test_minimal_json_loads() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("map_2.json"),
            r#"{"id":2,"name":"Bare","width":2,"height":2,"blocked_tiles":[{"x":1,"y":1,"type":"rock"}],"spawn_points":[]}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("resources_2.json"), r#"{"objects":[]}"#).unwrap();

        let doc = load_document(dir.path(), 2).unwrap();
        assert!(doc.layers.is_empty());
        assert_eq!(doc.blocked_tiles[0].kind, BlockKind::Rock);
    }

    #[test]
    fn test_load_rejects_mismatched_id() {
        let dir = TempDir::new().unwrap();
        save_document(dir.path(), &sample(3)).unwrap();
        std::fs::rename(dir.path().join("map_3.json"), dir.path().join("map_4.json")).unwrap();
        std::fs::rename(
            dir.path().join("resources_3.json"),
            dir.path().join("resources_4.json"),
        )
        .unwrap();
        assert!(matches!(
            load_document(dir.path(), 4),
            Err(Error::CorpusIncomplete { .. })
        ));
    }

    #[test]
    fn test_write_atomic_replaces_whole_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("file.json");
        write_atomic(&path, b"first version, longer").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");

        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_listing_problems() {
        let dir = TempDir::new().unwrap();
        save_document(dir.path(), &sample(1)).unwrap();
        save_document(dir.path(), &sample(2)).unwrap();
        std::fs::remove_file(dir.path().join("resources_2.json")).unwrap();
        save_document(dir.path(), &sample(9)).unwrap();
        std::fs::write(dir.path().join("README.txt"), "hi").unwrap();

        let listing = list_corpus_dir(dir.path()).unwrap();
        let layout = CorpusLayout::with_range(1, 3);
        assert_eq!(
            listing.problems(&layout),
            vec![
                "missing resources_2.json".to_string(),
                "missing map_3.json".to_string(),
                "missing resources_3.json".to_string(),
                "map id 9 outside 1..=3".to_string(),
                "unexpected file README.txt".to_string(),
            ]
        );
        assert_eq!(listing.complete_ids().collect::<Vec<_>>(), vec![1, 9]);

        assert!(matches!(
            Corpus::load_dir(dir.path(), &layout, true),
            Err(Error::CorpusIncomplete { .. })
        ));
        let lenient = Corpus::load_dir(dir.path(), &layout, false).unwrap();
        assert_eq!(lenient.ids().collect::<Vec<_>>(), vec![1, 9]);
    }

    #[test]
    fn test_save_dir_is_byte_stable() {
        let corpus = Corpus::from_documents([sample(1), sample(2)]).unwrap();
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        corpus.save_dir(a.path()).unwrap();
        corpus.save_dir(b.path()).unwrap();
        for name in ["map_1.json", "resources_2.json"] {
            assert_eq!(
                std::fs::read(a.path().join(name)).unwrap(),
                std::fs::read(b.path().join(name)).unwrap()
            );
        }
    }
}
