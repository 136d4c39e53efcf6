//! Canonical in-memory map representation.
//!
//! A [`MapDocument`] is what the decoder produces and what the validator,
//! index and JSON persistence consume. Coordinates are 1-indexed.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Numeric id into the graphic catalog
pub type GrhIndex = u32;

/// Highest map id of the stock corpus
pub const DEFAULT_MAX_MAP_ID: u16 = 290;

/// A 1-indexed cell coordinate, ordered row-major (y first, then x)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coord {
    /// Column
    pub x: u16,
    /// Row
    pub y: u16,
}

impl Coord {
    /// Creates a coordinate
    pub const fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }

    /// Chebyshev distance, the number of king moves between two cells
    pub fn chebyshev(self, other: Coord) -> u16 {
        self.x.abs_diff(other.x).max(self.y.abs_diff(other.y))
    }
}

impl Ord for Coord {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.y, self.x).cmp(&(other.y, other.x))
    }
}

impl PartialOrd for Coord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Visual plane a tile layer belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plane {
    /// Floor graphics, always present
    Ground,
    /// Walls, trees, furniture
    Decoration,
    /// Drawn above characters
    Roof,
}

impl Plane {
    /// Every plane, bottom to top
    pub const ALL: [Plane; 3] = [Plane::Ground, Plane::Decoration, Plane::Roof];

    /// Position of this plane in [`Plane::ALL`]
    pub fn index(self) -> usize {
        match self {
            Plane::Ground => 0,
            Plane::Decoration => 1,
            Plane::Roof => 2,
        }
    }

    /// Lowercase name used in JSON and reports
    pub fn as_str(self) -> &'static str {
        match self {
            Plane::Ground => "ground",
            Plane::Decoration => "decoration",
            Plane::Roof => "roof",
        }
    }
}

/// One visual plane of graphic indices, row-major, `width * height` long
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileLayer {
    /// Which plane this layer draws
    pub plane: Plane,
    /// Graphic per cell; 0 means nothing is drawn
    pub tiles: Vec<GrhIndex>,
}

impl TileLayer {
    /// Creates an all-empty layer for a grid of `cells` cells
    pub fn empty(plane: Plane, cells: usize) -> Self {
        Self {
            plane,
            tiles: vec![0; cells],
        }
    }
}

/// Why a tile is impassable
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    /// Masonry, cliffs and similar
    Wall,
    /// Vegetation
    Tree,
    /// Rivers, lakes, sea
    Water,
    /// A door graphic; walkability depends on its state
    Door,
    /// Boulders and rock faces
    Rock,
}

impl BlockKind {
    /// Lowercase name used in JSON
    pub fn as_str(self) -> &'static str {
        match self {
            BlockKind::Wall => "wall",
            BlockKind::Tree => "tree",
            BlockKind::Water => "water",
            BlockKind::Door => "door",
            BlockKind::Rock => "rock",
        }
    }
}

/// An impassable cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedTile {
    /// Column
    pub x: u16,
    /// Row
    pub y: u16,
    /// Blocking reason
    #[serde(rename = "type")]
    pub kind: BlockKind,
}

impl BlockedTile {
    /// Cell this entry refers to
    pub fn coord(&self) -> Coord {
        Coord::new(self.x, self.y)
    }
}

/// A described location where an entity may appear
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnPoint {
    /// Column
    pub x: u16,
    /// Row
    pub y: u16,
    /// Free-form label
    pub description: String,
}

impl SpawnPoint {
    /// Cell this spawn refers to
    pub fn coord(&self) -> Coord {
        Coord::new(self.x, self.y)
    }
}

/// Category of a catalog entry, and therefore of the objects placed from it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectCategory {
    /// Anything without a dedicated category
    Other,
    /// Openable passage
    Door,
    /// Smithing anvil
    Anvil,
    /// Smelting forge
    Forge,
    /// Readable sign post
    Sign,
    /// Non-player character
    Npc,
    /// Harvestable resource (ore vein, tree)
    Resource,
    /// Loose item lying on the ground
    Item,
    /// The catalog id could not be resolved
    Unknown,
}

impl ObjectCategory {
    /// Maps the catalog's category byte
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Other,
            1 => Self::Door,
            2 => Self::Anvil,
            3 => Self::Forge,
            4 => Self::Sign,
            5 => Self::Npc,
            6 => Self::Resource,
            7 => Self::Item,
            _ => return None,
        })
    }

    /// Category byte for the catalog format; `Unknown` has none
    pub fn code(self) -> Option<u8> {
        Some(match self {
            Self::Other => 0,
            Self::Door => 1,
            Self::Anvil => 2,
            Self::Forge => 3,
            Self::Sign => 4,
            Self::Npc => 5,
            Self::Resource => 6,
            Self::Item => 7,
            Self::Unknown => return None,
        })
    }

    /// Lowercase name used in JSON and reports
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Other => "other",
            Self::Door => "door",
            Self::Anvil => "anvil",
            Self::Forge => "forge",
            Self::Sign => "sign",
            Self::Npc => "npc",
            Self::Resource => "resource",
            Self::Item => "item",
            Self::Unknown => "unknown",
        }
    }
}

/// An object placed on the map from the global catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapObject {
    /// Column
    pub x: u16,
    /// Row
    pub y: u16,
    /// Id into the object catalog
    pub catalog_id: u32,
    /// Category resolved from the catalog at decode time
    pub category: ObjectCategory,
}

impl MapObject {
    /// Cell this object occupies
    pub fn coord(&self) -> Coord {
        Coord::new(self.x, self.y)
    }
}

/// Where an NPC from the catalog is spawned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NpcSpawn {
    /// Column
    pub x: u16,
    /// Row
    pub y: u16,
    /// Id into the object catalog, expected to be an NPC entry
    pub npc_id: u32,
}

impl NpcSpawn {
    /// Cell of the spawn
    pub fn coord(&self) -> Coord {
        Coord::new(self.x, self.y)
    }
}

/// A link from a cell on one map to a cell on another
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    /// Map the link starts on
    pub from_map_id: u16,
    /// Source column
    pub from_x: u16,
    /// Source row
    pub from_y: u16,
    /// Destination map
    pub to_map_id: u16,
    /// Destination column
    pub to_x: u16,
    /// Destination row
    pub to_y: u16,
}

impl Transition {
    /// Source cell
    pub fn from(&self) -> Coord {
        Coord::new(self.from_x, self.from_y)
    }

    /// Destination cell
    pub fn to(&self) -> Coord {
        Coord::new(self.to_x, self.to_y)
    }
}

/// A readable sign; `text_id` 0 means no text was assigned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sign {
    /// Column
    pub x: u16,
    /// Row
    pub y: u16,
    /// Id into the sign text table
    pub text_id: u32,
}

impl Sign {
    /// Cell of the sign
    pub fn coord(&self) -> Coord {
        Coord::new(self.x, self.y)
    }
}

/// One map in canonical form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapDocument {
    /// Map id, unique across the corpus
    pub id: u16,
    /// Display name
    pub name: String,
    /// Columns
    pub width: u16,
    /// Rows
    pub height: u16,
    /// Tile layers, one per plane
    pub layers: Vec<TileLayer>,
    /// Impassable cells
    pub blocked_tiles: Vec<BlockedTile>,
    /// Described spawn locations
    pub spawn_points: Vec<SpawnPoint>,
    /// Placed catalog objects
    pub objects: Vec<MapObject>,
    /// NPC spawn locations
    pub npc_spawns: Vec<NpcSpawn>,
    /// Links to other maps
    pub transitions: Vec<Transition>,
    /// Sign posts
    pub signs: Vec<Sign>,
}

impl MapDocument {
    /// Creates an empty map with all three planes zeroed
    pub fn new(id: u16, name: impl Into<String>, width: u16, height: u16) -> Self {
        let cells = width as usize * height as usize;
        Self {
            id,
            name: name.into(),
            width,
            height,
            layers: Plane::ALL
                .iter()
                .map(|&plane| TileLayer::empty(plane, cells))
                .collect(),
            blocked_tiles: Vec::new(),
            spawn_points: Vec::new(),
            objects: Vec::new(),
            npc_spawns: Vec::new(),
            transitions: Vec::new(),
            signs: Vec::new(),
        }
    }

    /// Number of cells in the grid
    pub fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Whether `coord` lies inside `[1, width] x [1, height]`
    pub fn in_bounds(&self, coord: Coord) -> bool {
        (1..=self.width).contains(&coord.x) && (1..=self.height).contains(&coord.y)
    }

    /// Row-major cell index of an in-bounds coordinate
    pub fn cell_index(&self, coord: Coord) -> Option<usize> {
        if !self.in_bounds(coord) {
            return None;
        }
        Some((coord.y as usize - 1) * self.width as usize + (coord.x as usize - 1))
    }

    /// Coordinate of a row-major cell index
    pub fn coord_of(&self, index: usize) -> Coord {
        let width = self.width.max(1) as usize;
        Coord::new((index % width) as u16 + 1, (index / width) as u16 + 1)
    }

    /// Layer drawing `plane`, if present
    pub fn layer(&self, plane: Plane) -> Option<&TileLayer> {
        self.layers.iter().find(|l| l.plane == plane)
    }

    /// Graphic at `coord` on `plane`; absent layers and cells read as 0
    pub fn tile(&self, plane: Plane, coord: Coord) -> GrhIndex {
        self.cell_index(coord)
            .and_then(|i| self.layer(plane).and_then(|l| l.tiles.get(i).copied()))
            .unwrap_or(0)
    }

    /// Sets the graphic at `coord` on `plane`, creating the layer if needed.
    /// Returns false when `coord` is outside the grid.
    pub fn set_tile(&mut self, plane: Plane, coord: Coord, grh: GrhIndex) -> bool {
        let Some(index) = self.cell_index(coord) else {
            return false;
        };
        let cells = self.cell_count();
        let position = match self.layers.iter().position(|l| l.plane == plane) {
            Some(position) => position,
            None => {
                self.layers.push(TileLayer::empty(plane, cells));
                self.layers.sort_by_key(|l| l.plane);
                self.layers
                    .iter()
                    .position(|l| l.plane == plane)
                    .unwrap_or(0)
            }
        };
        match self.layers[position].tiles.get_mut(index) {
            Some(slot) => {
                *slot = grh;
                true
            }
            None => false,
        }
    }

    /// Bitmap of blocked cells for fast lookups
    pub fn blocking_grid(&self) -> BlockingGrid {
        BlockingGrid::from_document(self)
    }

    /// Sorts every list row-major without dropping anything. The sorts are
    /// stable, so objects sharing a cell keep their listed order.
    pub(crate) fn sort_entities(&mut self) {
        self.layers.sort_by_key(|l| l.plane);
        self.blocked_tiles.sort_by_key(BlockedTile::coord);
        self.spawn_points.sort_by_key(SpawnPoint::coord);
        self.npc_spawns.sort_by_key(NpcSpawn::coord);
        self.transitions.sort_by_key(|t| (t.from(), t.to_map_id, t.to()));
        self.signs.sort_by_key(Sign::coord);
        self.objects.sort_by_key(MapObject::coord);
    }

    /// Brings every list into canonical order.
    ///
    /// Entities are sorted row-major by their cell; objects sharing a cell
    /// collapse to the last one listed. Returns how many objects were dropped.
    pub fn normalize(&mut self) -> usize {
        self.sort_entities();
        self.blocked_tiles.dedup_by_key(|b| b.coord());

        let before = self.objects.len();
        let mut by_cell: BTreeMap<Coord, MapObject> = BTreeMap::new();
        for object in self.objects.drain(..) {
            by_cell.insert(object.coord(), object);
        }
        self.objects = by_cell.into_values().collect();
        before - self.objects.len()
    }

    /// Names of the sections that differ from `other`, for round-trip reports
    pub fn diff(&self, other: &MapDocument) -> Vec<&'static str> {
        let mut sections = Vec::new();
        if self.id != other.id {
            sections.push("id");
        }
        if self.name != other.name {
            sections.push("name");
        }
        if (self.width, self.height) != (other.width, other.height) {
            sections.push("dimensions");
        }
        if self.layers != other.layers {
            sections.push("layers");
        }
        if self.blocked_tiles != other.blocked_tiles {
            sections.push("blocked_tiles");
        }
        if self.spawn_points != other.spawn_points {
            sections.push("spawn_points");
        }
        if self.objects != other.objects {
            sections.push("objects");
        }
        if self.npc_spawns != other.npc_spawns {
            sections.push("npc_spawns");
        }
        if self.transitions != other.transitions {
            sections.push("transitions");
        }
        if self.signs != other.signs {
            sections.push("signs");
        }
        sections
    }
}

/// Dense blocked/walkable bitmap of one map
#[derive(Debug, Clone)]
pub struct BlockingGrid {
    width: u16,
    height: u16,
    cells: Vec<Option<BlockKind>>,
}

impl BlockingGrid {
    /// Builds the grid from a document's blocked tile list; out-of-bounds
    /// entries are ignored
    pub fn from_document(doc: &MapDocument) -> Self {
        let mut cells = vec![None; doc.cell_count()];
        for blocked in &doc.blocked_tiles {
            if let Some(index) = doc.cell_index(blocked.coord()) {
                cells[index] = Some(blocked.kind);
            }
        }
        Self {
            width: doc.width,
            height: doc.height,
            cells,
        }
    }

    fn index(&self, coord: Coord) -> Option<usize> {
        if coord.x == 0 || coord.y == 0 || coord.x > self.width || coord.y > self.height {
            return None;
        }
        Some((coord.y as usize - 1) * self.width as usize + (coord.x as usize - 1))
    }

    /// Blocking reason at `coord`, `None` when walkable or out of bounds
    pub fn kind(&self, coord: Coord) -> Option<BlockKind> {
        self.index(coord).and_then(|i| self.cells[i])
    }

    /// Whether `coord` is a blocked cell
    pub fn is_blocked(&self, coord: Coord) -> bool {
        self.kind(coord).is_some()
    }

    /// In-bounds orthogonal neighbours of `coord`
    pub fn neighbours(&self, coord: Coord) -> impl Iterator<Item = Coord> + '_ {
        let candidates = [
            (coord.x.checked_sub(1), Some(coord.y)),
            (coord.x.checked_add(1), Some(coord.y)),
            (Some(coord.x), coord.y.checked_sub(1)),
            (Some(coord.x), coord.y.checked_add(1)),
        ];
        candidates.into_iter().filter_map(move |(x, y)| {
            let c = Coord::new(x?, y?);
            self.index(c).map(|_| c)
        })
    }
}
