use std::collections::HashSet;

use uuid::Uuid;

use crate::error::MapError;
use crate::import::ImportedMap;
use crate::map::MapData;
use crate::resolver::names_match;
use crate::tileset::TileSet;

/// Read side of persistence: existing tileset records.
pub trait TilesetStore {
    fn by_uuid(&self, uuid: &Uuid) -> Option<TileSet>;

    /// Exact name lookup.
    fn by_name(&self, name: &str) -> Option<TileSet>;

    /// Every record the resolver may consider for normalized-name and image matching.
    fn all(&self) -> Vec<TileSet>;
}

/// Write side of persistence. `commit` stores the map, its layers and any new
/// tilesets as one unit, or nothing at all.
pub trait MapSink {
    fn commit(&mut self, imported: &ImportedMap) -> Result<(), MapError>;
}

/// Store backed by plain vectors.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    tilesets: Vec<TileSet>,
    maps: Vec<MapData>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tilesets(tilesets: impl IntoIterator<Item = TileSet>) -> Self {
        InMemoryStore {
            tilesets: tilesets.into_iter().collect(),
            maps: Vec::new(),
        }
    }

    pub fn insert_tileset(&mut self, tileset: TileSet) {
        self.tilesets.retain(|t| t.uuid != tileset.uuid);
        self.tilesets.push(tileset);
    }

    pub fn tilesets(&self) -> &[TileSet] {
        &self.tilesets
    }

    pub fn maps(&self) -> &[MapData] {
        &self.maps
    }

    pub fn find_map(&self, name: &str) -> Option<&MapData> {
        self.maps.iter().find(|m| names_match(&m.map.name, name))
    }
}

impl TilesetStore for InMemoryStore {
    fn by_uuid(&self, uuid: &Uuid) -> Option<TileSet> {
        self.tilesets.iter().find(|t| t.uuid == *uuid).cloned()
    }

    fn by_name(&self, name: &str) -> Option<TileSet> {
        self.tilesets.iter().find(|t| t.name == name).cloned()
    }

    fn all(&self) -> Vec<TileSet> {
        self.tilesets.clone()
    }
}

impl MapSink for InMemoryStore {
    fn commit(&mut self, imported: &ImportedMap) -> Result<(), MapError> {
        let data = &imported.data;
        data.validate()?;

        if self.maps.iter().any(|m| m.map.uuid == data.map.uuid) {
            return Err(MapError::Commit(format!(
                "map {} already exists",
                data.map.uuid
            )));
        }

        let known: HashSet<Uuid> = self.tilesets.iter().map(|t| t.uuid).collect();
        for ts in &data.tilesets {
            if !known.contains(&ts.uuid) && !imported.created_tilesets.contains(&ts.uuid) {
                return Err(MapError::Commit(format!(
                    "tileset '{}' is neither stored nor created by this import",
                    ts.name
                )));
            }
        }

        // everything checked, apply
        for ts in imported.new_tilesets() {
            if !known.contains(&ts.uuid) {
                self.tilesets.push(ts.clone());
            }
        }
        self.maps.push(data.clone());
        log::info!(
            "committed map '{}' with {} layers",
            data.map.name,
            data.layers.len()
        );
        Ok(())
    }
}
