//! Legacy binary map codec.
//!
//! The decoder turns a `.map` buffer into a [`MapDocument`](crate::model::MapDocument); the encoder
//! produces a buffer that decodes back to the same document. Historical
//! releases differ only in their per-cell record layout, which is dispatched
//! on [`FormatVersion`].
//!
//! ## Layout (little-endian)
//!
//! ```text
//! magic "TMAP" | version u16 | id u16 | name (u8 len) | width u16 | height u16
//! cell bytes u32 | cells (row-major)
//! objects | npc spawns | spawn points | transitions | signs   (u16 counted)
//! ```

mod decode;
mod encode;
pub(crate) mod reader;
mod tiles;
pub(crate) mod writer;

use crate::error::{DecodeError, Result};
use crate::model::{Coord, GrhIndex};
use bitflags::bitflags;
use reader::MapReader;
use std::fmt;
use std::str::FromStr;
use writer::MapWriter;

pub use decode::{DecodeWarning, DecodeWarningCode, Decoded, Decoder, DecoderConfig};
pub use encode::encode;
pub use tiles::{TileCatalog, TileTypeEntry};

/// Magic bytes opening every binary map
pub const MAP_MAGIC: [u8; 4] = *b"TMAP";

bitflags! {
    /// Flag byte leading every cell record
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CellFlags: u8 {
        /// Stored blocking bit
        const BLOCKED = 0x01;
        /// V2: a decoration graphic follows
        const DECORATION = 0x02;
        /// V2: a roof graphic follows
        const ROOF = 0x04;
    }
}

/// One decoded cell record before catalog interpretation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RawCell {
    /// Flag byte as stored; only the blocking bit is honoured on write
    pub(crate) flags: CellFlags,
    /// Ground, decoration, roof
    pub(crate) layers: [GrhIndex; 3],
}

impl RawCell {
    pub(crate) fn new(blocked: bool, layers: [GrhIndex; 3]) -> Self {
        let mut flags = CellFlags::empty();
        flags.set(CellFlags::BLOCKED, blocked);
        Self { flags, layers }
    }

    pub(crate) fn blocked(&self) -> bool {
        self.flags.contains(CellFlags::BLOCKED)
    }
}

/// Historical binary layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FormatVersion {
    /// Dense records: flags, then three u16 graphics
    V1,
    /// Sparse records: flags, u32 ground, optional u32 decoration and roof
    V2,
}

impl FormatVersion {
    /// Every known version, oldest first
    pub const ALL: [FormatVersion; 2] = [FormatVersion::V1, FormatVersion::V2];

    /// Version number stored in the header
    pub fn tag(self) -> u16 {
        match self {
            FormatVersion::V1 => 1,
            FormatVersion::V2 => 2,
        }
    }

    /// Resolves a header version number
    pub fn from_tag(tag: u16) -> std::result::Result<Self, DecodeError> {
        match tag {
            1 => Ok(FormatVersion::V1),
            2 => Ok(FormatVersion::V2),
            other => Err(DecodeError::UnsupportedVersion(other)),
        }
    }

    fn known_flags(self) -> CellFlags {
        match self {
            FormatVersion::V1 => CellFlags::BLOCKED,
            FormatVersion::V2 => CellFlags::all(),
        }
    }

    /// Reads one cell record; `at` is only used for error reporting
    pub(crate) fn read_cell(
        self,
        reader: &mut MapReader<'_>,
        at: Coord,
    ) -> std::result::Result<RawCell, DecodeError> {
        let raw = reader.read_u8()?;
        let flags = CellFlags::from_bits(raw)
            .filter(|flags| self.known_flags().contains(*flags))
            .ok_or(DecodeError::InvalidTileFlag {
                x: at.x,
                y: at.y,
                flags: raw,
            })?;

        let layers = match self {
            FormatVersion::V1 => [
                reader.read_u16()? as GrhIndex,
                reader.read_u16()? as GrhIndex,
                reader.read_u16()? as GrhIndex,
            ],
            FormatVersion::V2 => {
                let ground = reader.read_u32()?;
                let decoration = if flags.contains(CellFlags::DECORATION) {
                    reader.read_u32()?
                } else {
                    0
                };
                let roof = if flags.contains(CellFlags::ROOF) {
                    reader.read_u32()?
                } else {
                    0
                };
                [ground, decoration, roof]
            }
        };

        Ok(RawCell { flags, layers })
    }

    /// Writes one cell record; fails with a description when a graphic does
    /// not fit the layout
    pub(crate) fn write_cell(
        self,
        writer: &mut MapWriter,
        cell: &RawCell,
    ) -> std::result::Result<(), String> {
        let mut flags = CellFlags::empty();
        flags.set(CellFlags::BLOCKED, cell.blocked());

        match self {
            FormatVersion::V1 => {
                writer.put_u8(flags.bits());
                for grh in cell.layers {
                    let narrow = u16::try_from(grh)
                        .map_err(|_| format!("graphic {} does not fit a v1 cell", grh))?;
                    writer.put_u16(narrow);
                }
            }
            FormatVersion::V2 => {
                let [ground, decoration, roof] = cell.layers;
                flags.set(CellFlags::DECORATION, decoration != 0);
                flags.set(CellFlags::ROOF, roof != 0);
                writer.put_u8(flags.bits());
                writer.put_u32(ground);
                if decoration != 0 {
                    writer.put_u32(decoration);
                }
                if roof != 0 {
                    writer.put_u32(roof);
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.tag())
    }
}

impl FromStr for FormatVersion {
    type Err = DecodeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let digits = s.trim().trim_start_matches(['v', 'V']);
        let tag = digits
            .parse::<u16>()
            .map_err(|_| DecodeError::UnrecognizedVersionName(s.to_string()))?;
        Self::from_tag(tag)
    }
}

/// Outcome of a decode, encode, decode cycle
#[derive(Debug, Clone)]
pub struct RoundTrip {
    /// Map the buffer decoded to
    pub map_id: u16,
    /// Sections that changed across the cycle; empty when faithful
    pub differences: Vec<&'static str>,
    /// Size of the original buffer
    pub original_len: usize,
    /// Size of the regenerated buffer
    pub encoded_len: usize,
}

impl RoundTrip {
    /// Whether the second decode equals the first
    pub fn is_faithful(&self) -> bool {
        self.differences.is_empty()
    }
}

impl Decoder<'_> {
    /// Runs `decode(encode(decode(data)))` and compares it with `decode(data)`
    pub fn roundtrip(&self, data: &[u8], version: FormatVersion) -> Result<RoundTrip> {
        let first = self.decode(data, version)?;
        let encoded = encode(&first.document, version)?;
        let second = self.decode(&encoded, version)?;
        Ok(RoundTrip {
            map_id: first.document.id,
            differences: first.document.diff(&second.document),
            original_len: data.len(),
            encoded_len: encoded.len(),
        })
    }
}
