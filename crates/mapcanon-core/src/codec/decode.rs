//! Binary map decoder.

use super::reader::MapReader;
use super::tiles::TileCatalog;
use super::{FormatVersion, RawCell, MAP_MAGIC};
use crate::catalog::ObjectDatabase;
use crate::error::DecodeError;
use crate::model::{
    BlockedTile, Coord, MapDocument, MapObject, NpcSpawn, ObjectCategory, Sign, SpawnPoint,
    Transition,
};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, trace};

/// Configuration for the decoder
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Treat a stored blocking bit that disagrees with the tile catalog as a
    /// hard [`DecodeError::InvalidTileFlag`] instead of a warning
    pub strict_flags: bool,
    /// Largest accepted width or height
    pub max_dimension: u16,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            strict_flags: false,
            max_dimension: 1024,
        }
    }
}

impl DecoderConfig {
    /// Creates a new decoder config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets strict blocking-bit handling
    pub fn strict_flags(mut self, strict: bool) -> Self {
        self.strict_flags = strict;
        self
    }

    /// Sets the largest accepted width or height
    pub fn max_dimension(mut self, max: u16) -> Self {
        self.max_dimension = max;
        self
    }
}

/// Kind of non-fatal anomaly met while decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum DecodeWarningCode {
    /// Stored blocking bit disagrees with the tile catalog
    InvalidTileFlag,
    /// Several objects share a cell; the last one listed is the effective one
    DuplicateObject,
    /// Bytes remain after the sign section
    TrailingBytes,
}

impl fmt::Display for DecodeWarningCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A non-fatal decode anomaly
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodeWarning {
    /// What happened
    pub code: DecodeWarningCode,
    /// Cell concerned, if any
    pub coordinate: Option<Coord>,
    /// Human readable detail
    pub message: String,
}

/// Decoder output: the document plus anything worth reporting
#[derive(Debug, Clone)]
pub struct Decoded {
    /// The decoded document with entities in canonical order.
    ///
    /// Objects sharing a cell are all kept in read order, so the last one of
    /// each cell is the one that counts. [`MapDocument::normalize`] collapses
    /// them.
    pub document: MapDocument,
    /// Non-fatal anomalies in buffer order
    pub warnings: Vec<DecodeWarning>,
}

/// Decodes legacy binary maps against a tile catalog and, optionally, the
/// object catalog used to resolve object categories
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    tiles: &'a TileCatalog,
    objects: Option<&'a ObjectDatabase>,
    config: DecoderConfig,
}

impl<'a> Decoder<'a> {
    /// Creates a decoder with default configuration
    pub fn new(tiles: &'a TileCatalog) -> Self {
        Self {
            tiles,
            objects: None,
            config: DecoderConfig::default(),
        }
    }

    /// Resolves object categories through `objects`
    pub fn with_objects(mut self, objects: &'a ObjectDatabase) -> Self {
        self.objects = Some(objects);
        self
    }

    /// Replaces the configuration
    pub fn with_config(mut self, config: DecoderConfig) -> Self {
        self.config = config;
        self
    }

    /// Decodes one buffer declared to be in `version`
    pub fn decode(&self, data: &[u8], version: FormatVersion) -> Result<Decoded, DecodeError> {
        let mut reader = MapReader::new(data);
        let mut warnings = Vec::new();

        let magic: [u8; 4] = reader.read_array()?;
        if magic != MAP_MAGIC {
            return Err(DecodeError::BadMagicHeader { found: magic });
        }
        let found = FormatVersion::from_tag(reader.read_u16()?)?;
        if found != version {
            return Err(DecodeError::VersionMismatch {
                declared: version.tag(),
                found: found.tag(),
            });
        }

        let id = reader.read_u16()?;
        let name = reader.read_string()?;
        let width = reader.read_u16()?;
        let height = reader.read_u16()?;
        let cell_bytes = reader.read_u32()? as usize;
        trace!("Map {} header: {}x{}, {} cell bytes", id, width, height, cell_bytes);

        let cells = self.read_cells(reader.section(cell_bytes)?, version, width, height)?;

        let mut document = MapDocument::new(id, name, width, height);
        for (index, cell) in cells.iter().enumerate() {
            for (layer, grh) in document.layers.iter_mut().zip(cell.layers) {
                layer.tiles[index] = grh;
            }
            let at = document.coord_of(index);
            let derived = self.tiles.cell_kind(&cell.layers);

            if derived.is_some() != cell.blocked() {
                if self.config.strict_flags {
                    return Err(DecodeError::InvalidTileFlag {
                        x: at.x,
                        y: at.y,
                        flags: cell.flags.bits(),
                    });
                }
                trace!("Map {}: blocking bit disagrees with catalog at {}", id, at);
                warnings.push(DecodeWarning {
                    code: DecodeWarningCode::InvalidTileFlag,
                    coordinate: Some(at),
                    message: format!(
                        "stored bit says {}, tile catalog says {}",
                        blocked_word(cell.blocked()),
                        blocked_word(derived.is_some())
                    ),
                });
            }

            if let Some(kind) = derived {
                document.blocked_tiles.push(BlockedTile {
                    x: at.x,
                    y: at.y,
                    kind,
                });
            }
        }

        let mut seen = HashSet::new();
        for _ in 0..reader.read_u16()? {
            let x = reader.read_u16()?;
            let y = reader.read_u16()?;
            let catalog_id = reader.read_u32()?;
            let category = self
                .objects
                .and_then(|db| db.get(catalog_id))
                .map(|entry| entry.category)
                .unwrap_or(ObjectCategory::Unknown);
            let at = Coord::new(x, y);
            if !seen.insert(at) {
                warnings.push(DecodeWarning {
                    code: DecodeWarningCode::DuplicateObject,
                    coordinate: Some(at),
                    message: format!("object {} replaces an earlier object on this cell", catalog_id),
                });
            }
            document.objects.push(MapObject {
                x,
                y,
                catalog_id,
                category,
            });
        }

        for _ in 0..reader.read_u16()? {
            document.npc_spawns.push(NpcSpawn {
                x: reader.read_u16()?,
                y: reader.read_u16()?,
                npc_id: reader.read_u32()?,
            });
        }

        for _ in 0..reader.read_u16()? {
            document.spawn_points.push(SpawnPoint {
                x: reader.read_u16()?,
                y: reader.read_u16()?,
                description: reader.read_string()?,
            });
        }

        for _ in 0..reader.read_u16()? {
            document.transitions.push(Transition {
                from_map_id: id,
                from_x: reader.read_u16()?,
                from_y: reader.read_u16()?,
                to_map_id: reader.read_u16()?,
                to_x: reader.read_u16()?,
                to_y: reader.read_u16()?,
            });
        }

        for _ in 0..reader.read_u16()? {
            document.signs.push(Sign {
                x: reader.read_u16()?,
                y: reader.read_u16()?,
                text_id: reader.read_u32()?,
            });
        }

        if !reader.is_empty() {
            warnings.push(DecodeWarning {
                code: DecodeWarningCode::TrailingBytes,
                coordinate: None,
                message: format!(
                    "{} byte(s) after the sign section at offset {}",
                    reader.remaining(),
                    reader.offset()
                ),
            });
        }

        document.sort_entities();
        debug!(
            "Decoded map {} '{}' ({}x{}, {} blocked, {} objects, {} warnings)",
            document.id,
            document.name,
            width,
            height,
            document.blocked_tiles.len(),
            document.objects.len(),
            warnings.len()
        );

        Ok(Decoded { document, warnings })
    }

    fn read_cells(
        &self,
        mut section: MapReader<'_>,
        version: FormatVersion,
        width: u16,
        height: u16,
    ) -> Result<Vec<RawCell>, DecodeError> {
        let expected = width as usize * height as usize;
        let overflow = |cells: usize| DecodeError::DimensionOverflow {
            width,
            height,
            cells,
        };

        if width == 0
            || height == 0
            || width > self.config.max_dimension
            || height > self.config.max_dimension
        {
            return Err(overflow(0));
        }

        let mut cells = Vec::with_capacity(expected);
        while !section.is_empty() {
            let index = cells.len();
            if index == expected {
                return Err(overflow(index + 1));
            }
            let at = Coord::new(
                (index % width as usize) as u16 + 1,
                (index / width as usize) as u16 + 1,
            );
            match version.read_cell(&mut section, at) {
                Ok(cell) => cells.push(cell),
                // a record cut by the section end means the section length
                // and the declared grid disagree
                Err(DecodeError::UnexpectedEof { .. }) => return Err(overflow(index)),
                Err(other) => return Err(other),
            }
        }

        if cells.len() != expected {
            return Err(overflow(cells.len()));
        }
        Ok(cells)
    }
}

fn blocked_word(blocked: bool) -> &'static str {
    if blocked {
        "blocked"
    } else {
        "walkable"
    }
}
