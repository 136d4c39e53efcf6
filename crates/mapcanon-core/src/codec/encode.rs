//! Binary map encoder, used to verify decoder fidelity.

use super::writer::MapWriter;
use super::{FormatVersion, RawCell, MAP_MAGIC};
use crate::error::{Error, Result};
use crate::model::{MapDocument, Plane};
use tracing::trace;

/// Encodes `doc` in the layout of `version`.
///
/// The stored blocking bit of each cell is taken from `doc.blocked_tiles`.
/// Fails when a value does not fit the layout (long names, oversized counts,
/// graphics too wide for v1) or a layer does not cover the grid.
pub fn encode(doc: &MapDocument, version: FormatVersion) -> Result<Vec<u8>> {
    let cells = doc.cell_count();

    let mut planes: [&[u32]; 3] = [&[], &[], &[]];
    for plane in Plane::ALL {
        if let Some(layer) = doc.layer(plane) {
            if layer.tiles.len() != cells {
                return Err(Error::encode(
                    doc.id,
                    format!(
                        "{} layer has {} tiles, grid has {} cells",
                        plane.as_str(),
                        layer.tiles.len(),
                        cells
                    ),
                ));
            }
            planes[plane.index()] = layer.tiles.as_slice();
        }
    }

    let mut blocked = vec![false; cells];
    for tile in &doc.blocked_tiles {
        let index = doc.cell_index(tile.coord()).ok_or_else(|| {
            Error::encode(doc.id, format!("blocked tile {} outside the grid", tile.coord()))
        })?;
        blocked[index] = true;
    }

    let mut cell_section = MapWriter::with_capacity(cells * 7);
    for (index, &is_blocked) in blocked.iter().enumerate() {
        let layer_at = |plane: usize| planes[plane].get(index).copied().unwrap_or(0);
        let cell = RawCell::new(is_blocked, [layer_at(0), layer_at(1), layer_at(2)]);
        version
            .write_cell(&mut cell_section, &cell)
            .map_err(|details| Error::encode(doc.id, details))?;
    }
    let cell_len = u32::try_from(cell_section.len())
        .map_err(|_| Error::encode(doc.id, "cell section exceeds 4 GiB"))?;

    let mut w = MapWriter::with_capacity(cell_section.len() + 256);
    w.put_bytes(&MAP_MAGIC);
    w.put_u16(version.tag());
    w.put_u16(doc.id);
    w.put_string(&doc.name)
        .ok_or_else(|| Error::encode(doc.id, "name longer than 255 bytes"))?;
    w.put_u16(doc.width);
    w.put_u16(doc.height);
    w.put_u32(cell_len);
    w.put_bytes(&cell_section.into_vec());

    w.put_u16(count(doc, "objects", doc.objects.len())?);
    for object in &doc.objects {
        w.put_u16(object.x);
        w.put_u16(object.y);
        w.put_u32(object.catalog_id);
    }

    w.put_u16(count(doc, "npc spawns", doc.npc_spawns.len())?);
    for spawn in &doc.npc_spawns {
        w.put_u16(spawn.x);
        w.put_u16(spawn.y);
        w.put_u32(spawn.npc_id);
    }

    w.put_u16(count(doc, "spawn points", doc.spawn_points.len())?);
    for spawn in &doc.spawn_points {
        w.put_u16(spawn.x);
        w.put_u16(spawn.y);
        w.put_string(&spawn.description).ok_or_else(|| {
            Error::encode(doc.id, format!("spawn description at {} too long", spawn.coord()))
        })?;
    }

    w.put_u16(count(doc, "transitions", doc.transitions.len())?);
    for transition in &doc.transitions {
        w.put_u16(transition.from_x);
        w.put_u16(transition.from_y);
        w.put_u16(transition.to_map_id);
        w.put_u16(transition.to_x);
        w.put_u16(transition.to_y);
    }

    w.put_u16(count(doc, "signs", doc.signs.len())?);
    for sign in &doc.signs {
        w.put_u16(sign.x);
        w.put_u16(sign.y);
        w.put_u32(sign.text_id);
    }

    trace!("Encoded map {} as {} ({} bytes)", doc.id, version, w.len());
    Ok(w.into_vec())
}

fn count(doc: &MapDocument, what: &str, len: usize) -> Result<u16> {
    u16::try_from(len).map_err(|_| Error::encode(doc.id, format!("too many {} ({})", what, len)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Decoder, TileCatalog};
    use crate::model::{BlockKind, BlockedTile, Coord, Sign};

    #[test]
    fn test_encode_rejects_bad_documents() {
        let mut doc = MapDocument::new(3, "x".repeat(300), 2, 2);
        assert!(encode(&doc, FormatVersion::V1).is_err());

        doc.name = "ok".into();
        doc.blocked_tiles.push(BlockedTile {
            x: 3,
            y: 1,
            kind: BlockKind::Rock,
        });
        assert!(encode(&doc, FormatVersion::V1).is_err());

        doc.blocked_tiles.clear();
        doc.layers[0].tiles.pop();
        let err = encode(&doc, FormatVersion::V2).unwrap_err();
        assert!(err.to_string().contains("ground layer has 3 tiles"));
    }

    #[test]
    fn test_wide_graphics_need_v2() {
        let mut doc = MapDocument::new(4, "wide", 1, 1);
        doc.set_tile(Plane::Ground, Coord::new(1, 1), 100_000);
        assert!(encode(&doc, FormatVersion::V1).is_err());

        let bytes = encode(&doc, FormatVersion::V2).unwrap();
        let tiles = TileCatalog::new();
        let back = Decoder::new(&tiles).decode(&bytes, FormatVersion::V2).unwrap();
        assert_eq!(back.document.tile(Plane::Ground, Coord::new(1, 1)), 100_000);
    }

    #[test]
    fn test_missing_layers_encode_as_empty() {
        let mut doc = MapDocument::new(5, "bare", 2, 1);
        doc.layers.retain(|l| l.plane == Plane::Ground);
        doc.signs.push(Sign {
            x: 2,
            y: 1,
            text_id: 8,
        });
        let bytes = encode(&doc, FormatVersion::V1).unwrap();
        let tiles = TileCatalog::new();
        let back = Decoder::new(&tiles).decode(&bytes, FormatVersion::V1).unwrap();
        assert_eq!(back.document.layers.len(), 3);
        assert_eq!(back.document.signs, doc.signs);
    }
}
