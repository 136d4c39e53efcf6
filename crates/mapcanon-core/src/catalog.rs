//! Global object/NPC catalog.
//!
//! The catalog is parsed once from its binary form and then shared by
//! reference; nothing mutates it after construction.
//!
//! ## Format
//!
//! ```text
//! magic    "ODB1"
//! count    u32
//! entries  { id u32, name (u8 len + UTF-8), graphic u32, category u8, attributes u8 }
//! ```

use crate::codec::reader::MapReader;
use crate::codec::writer::MapWriter;
use crate::error::{DecodeError, Error, Result};
use crate::model::{GrhIndex, ObjectCategory};
use bitflags::bitflags;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Magic bytes opening a catalog file
pub const CATALOG_MAGIC: [u8; 4] = *b"ODB1";

bitflags! {
    /// Interactive attributes of a catalog entry
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ObjectAttributes: u8 {
        /// Can be opened and closed
        const OPENABLE = 0x01;
        /// Needs a key
        const LOCKED = 0x02;
        /// Crafting station (anvil, forge)
        const WORKBENCH = 0x04;
        /// Shows text when used
        const READABLE = 0x08;
        /// Blocks movement while in its default state
        const BLOCKING = 0x10;
    }
}

/// One definition in the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectCatalogEntry {
    /// Catalog id referenced by maps
    pub id: u32,
    /// Display name
    pub name: String,
    /// Graphic drawn for the object
    pub graphic: GrhIndex,
    /// Category, never `Unknown`
    pub category: ObjectCategory,
    /// Interactive attributes
    pub attributes: ObjectAttributes,
}

/// Read-only mapping from catalog id to definition
#[derive(Debug, Clone, Default)]
pub struct ObjectDatabase {
    entries: BTreeMap<u32, ObjectCatalogEntry>,
}

impl ObjectDatabase {
    /// Builds a database from already parsed entries, rejecting duplicate ids
    pub fn from_entries(entries: impl IntoIterator<Item = ObjectCatalogEntry>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for entry in entries {
            if entry.category == ObjectCategory::Unknown {
                return Err(Error::catalog_parse(
                    0,
                    format!("entry {} has no category", entry.id),
                ));
            }
            let id = entry.id;
            if map.insert(id, entry).is_some() {
                return Err(Error::catalog_parse(0, format!("duplicate id {}", id)));
            }
        }
        Ok(Self { entries: map })
    }

    /// Parses the binary catalog
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = MapReader::new(data);
        let magic: [u8; 4] = reader.read_array().map_err(catalog_error)?;
        if magic != CATALOG_MAGIC {
            return Err(Error::catalog_parse(
                0,
                format!("bad magic {:02x?}", magic),
            ));
        }
        let count = reader.read_u32().map_err(catalog_error)?;

        let mut entries = BTreeMap::new();
        for _ in 0..count {
            let offset = reader.offset();
            let id = reader.read_u32().map_err(catalog_error)?;
            let name = reader.read_string().map_err(catalog_error)?;
            let graphic = reader.read_u32().map_err(catalog_error)?;
            let code = reader.read_u8().map_err(catalog_error)?;
            let category = ObjectCategory::from_code(code).ok_or_else(|| {
                Error::catalog_parse(offset, format!("entry {} has unknown category {}", id, code))
            })?;
            let raw = reader.read_u8().map_err(catalog_error)?;
            let attributes = ObjectAttributes::from_bits(raw).ok_or_else(|| {
                Error::catalog_parse(
                    offset,
                    format!("entry {} has unknown attribute bits 0x{:02x}", id, raw),
                )
            })?;

            let entry = ObjectCatalogEntry {
                id,
                name,
                graphic,
                category,
                attributes,
            };
            if entries.insert(id, entry).is_some() {
                return Err(Error::catalog_parse(offset, format!("duplicate id {}", id)));
            }
        }

        if !reader.is_empty() {
            return Err(Error::catalog_parse(
                reader.offset(),
                format!("{} trailing byte(s)", reader.remaining()),
            ));
        }

        debug!("Parsed object catalog with {} entries", entries.len());
        Ok(Self { entries })
    }

    /// Reads and parses a catalog file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| Error::file_read(path, e))?;
        Self::parse(&data)
    }

    /// Serializes the catalog back into its binary form
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = MapWriter::new();
        writer.put_bytes(&CATALOG_MAGIC);
        let count = u32::try_from(self.entries.len())
            .map_err(|_| Error::internal("catalog too large"))?;
        writer.put_u32(count);
        for entry in self.entries.values() {
            writer.put_u32(entry.id);
            writer.put_string(&entry.name).ok_or_else(|| {
                Error::internal(format!("entry {} name longer than 255 bytes", entry.id))
            })?;
            writer.put_u32(entry.graphic);
            let code = entry
                .category
                .code()
                .ok_or_else(|| Error::internal(format!("entry {} has no category", entry.id)))?;
            writer.put_u8(code);
            writer.put_u8(entry.attributes.bits());
        }
        Ok(writer.into_vec())
    }

    /// Looks up an id, failing with [`Error::ObjectNotFound`]
    pub fn lookup(&self, id: u32) -> Result<&ObjectCatalogEntry> {
        self.entries.get(&id).ok_or(Error::ObjectNotFound { id })
    }

    /// Looks up an id without building an error
    pub fn get(&self, id: u32) -> Option<&ObjectCatalogEntry> {
        self.entries.get(&id)
    }

    /// Entries in id order
    pub fn iter(&self) -> impl Iterator<Item = &ObjectCatalogEntry> {
        self.entries.values()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn catalog_error(err: DecodeError) -> Error {
    match err {
        DecodeError::UnexpectedEof { offset, needed } => {
            Error::catalog_parse(offset, format!("truncated, {} more byte(s) needed", needed))
        }
        DecodeError::InvalidString { offset } => Error::catalog_parse(offset, "name is not UTF-8"),
        other => Error::catalog_parse(0, other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn door() -> ObjectCatalogEntry {
        ObjectCatalogEntry {
            id: 10,
            name: "Oak door".into(),
            graphic: 500,
            category: ObjectCategory::Door,
            attributes: ObjectAttributes::OPENABLE | ObjectAttributes::BLOCKING,
        }
    }

    fn anvil() -> ObjectCatalogEntry {
        ObjectCatalogEntry {
            id: 20,
            name: "Anvil".into(),
            graphic: 610,
            category: ObjectCategory::Anvil,
            attributes: ObjectAttributes::WORKBENCH,
        }
    }

    #[test]
    fn test_parse_written_catalog() {
        let db = ObjectDatabase::from_entries([anvil(), door()]).unwrap();
        let bytes = db.to_bytes().unwrap();
        assert_eq!(&bytes[..4], b"ODB1");

        let parsed = ObjectDatabase::parse(&bytes).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed.lookup(10).unwrap(), &door());
        assert_eq!(parsed.iter().map(|e| e.id).collect::<Vec<_>>(), vec![10, 20]);
    }

    #[test]
    fn test_lookup_not_found() {
        let db = ObjectDatabase::from_entries([door()]).unwrap();
        assert!(matches!(db.lookup(99), Err(Error::ObjectNotFound { id: 99 })));
        assert!(db.get(99).is_none());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        assert!(ObjectDatabase::from_entries([door(), door()]).is_err());

        let mut bytes = ObjectDatabase::from_entries([door()]).unwrap().to_bytes().unwrap();
        let body = bytes[8..].to_vec();
        bytes.extend_from_slice(&body);
        bytes[4..8].copy_from_slice(&2u32.to_le_bytes());
        let err = ObjectDatabase::parse(&bytes).unwrap_err();
        assert!(err.to_string().contains("duplicate id 10"));
    }

    #[test]
    fn test_unknown_category_rejected() {
        let mut bytes = ObjectDatabase::from_entries([door()]).unwrap().to_bytes().unwrap();
        let category_at = bytes.len() - 2;
        bytes[category_at] = 42;
        let err = ObjectDatabase::parse(&bytes).unwrap_err();
        assert!(err.to_string().contains("unknown category 42"));
    }

    #[test]
    fn test_truncated_and_trailing() {
        let bytes = ObjectDatabase::from_entries([door()]).unwrap().to_bytes().unwrap();
        assert!(ObjectDatabase::parse(&bytes[..bytes.len() - 1]).is_err());

        let mut padded = bytes.clone();
        padded.push(0);
        let err = ObjectDatabase::parse(&padded).unwrap_err();
        assert!(err.to_string().contains("trailing"));

        assert!(ObjectDatabase::parse(b"NOPE\0\0\0\0").is_err());
    }
}
