use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MapError;

pub const DEFAULT_TILE_SIZE: u32 = 32;

pub const FLIP_H: u32 = 0x8000_0000; // bit 31
pub const FLIP_V: u32 = 0x4000_0000; // bit 30
pub const FLIP_D: u32 = 0x2000_0000; // bit 29
pub const GID_MASK: u32 = 0x1FFF_FFFF;

const TILESET_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a4e_93b7_4d0e_8a55_0c3e_71d2_b9a4);

/// Canonical tileset record: one atlas image cut into a regular grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileSet {
    pub uuid: Uuid,
    pub name: String,
    pub image_width: u32,
    pub image_height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub image_path: String,
    #[serde(default)]
    pub margin: u32,
    #[serde(default)]
    pub spacing: u32,
}

impl TileSet {
    /// Stable identity for a tileset first seen under `name`.
    pub fn stable_uuid(name: &str) -> Uuid {
        Uuid::new_v5(&TILESET_NAMESPACE, name.as_bytes())
    }

    pub fn tiles_per_row(&self) -> u32 {
        if self.tile_width == 0 {
            0
        } else {
            self.image_width / self.tile_width
        }
    }

    pub fn tiles_per_column(&self) -> u32 {
        if self.tile_height == 0 {
            0
        } else {
            self.image_height / self.tile_height
        }
    }

    pub fn tile_count(&self) -> u32 {
        self.tiles_per_row() * self.tiles_per_column()
    }

    /// Rejects records whose grid has no columns, since no coordinate math is possible on them.
    pub fn validate(&self) -> Result<(), MapError> {
        if self.tiles_per_row() == 0 {
            return Err(MapError::InvalidTileset {
                name: self.name.clone(),
                reason: format!(
                    "tiles per row is 0 (image width {} / tile width {})",
                    self.image_width, self.tile_width
                ),
            });
        }
        Ok(())
    }

    pub fn contains_tile(&self, tile_x: u32, tile_y: u32) -> bool {
        tile_x < self.tiles_per_row() && tile_y < self.tiles_per_column()
    }

    /// File name of the atlas image, without directories.
    pub fn image_basename(&self) -> Option<&str> {
        image_basename(&self.image_path)
    }
}

pub(crate) fn image_basename(path: &str) -> Option<&str> {
    let normalized = path.rsplit(['/', '\\']).next()?;
    if normalized.is_empty() {
        None
    } else {
        Path::new(normalized).file_name().and_then(|n| n.to_str())
    }
}

/// Converts a 1-based sequential tile id into local tile coordinates.
pub fn sequential_to_local(
    tileset: &str,
    id: u32,
    tiles_per_row: Option<u32>,
) -> Result<(u32, u32), MapError> {
    let per_row = match tiles_per_row {
        Some(n) if n > 0 => n,
        _ => {
            return Err(MapError::UnknownTilesPerRow {
                tileset: tileset.to_owned(),
            })
        }
    };
    if id == 0 {
        return Err(MapError::InvalidSequentialId {
            tileset: tileset.to_owned(),
            id,
        });
    }
    let adjusted = id - 1;
    Ok((adjusted % per_row, adjusted / per_row))
}

/// One tileset's slice of the GID space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GidRange {
    pub first_gid: u32,
    pub tile_count: u32,
    pub columns: u32,
    pub tileset: Uuid,
}

impl GidRange {
    pub fn last_gid(&self) -> u32 {
        self.first_gid + self.tile_count.saturating_sub(1)
    }

    pub fn contains(&self, gid: u32) -> bool {
        self.tile_count > 0 && gid >= self.first_gid && gid <= self.last_gid()
    }
}

/// A GID resolved to its tileset and local coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GidTile {
    pub tileset: Uuid,
    pub tile_x: u32,
    pub tile_y: u32,
}

/// firstGid-sorted range table.
#[derive(Debug, Default, Clone)]
pub struct GidTable {
    ranges: Vec<GidRange>,
}

impl GidTable {
    pub fn new(mut ranges: Vec<GidRange>) -> Self {
        ranges.sort_unstable_by_key(|r| r.first_gid);
        Self { ranges }
    }

    pub fn ranges(&self) -> &[GidRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Looks up a GID with flip flags already masked off. GID 0 and GIDs outside every
    /// range both give `None`; callers tell them apart.
    pub fn lookup(&self, gid: u32) -> Option<GidTile> {
        if gid == 0 {
            return None;
        }
        let idx = self.ranges.partition_point(|r| r.first_gid <= gid);
        let range = self.ranges[..idx].last()?;
        if !range.contains(gid) || range.columns == 0 {
            return None;
        }
        let local = gid - range.first_gid;
        Some(GidTile {
            tileset: range.tileset,
            tile_x: local % range.columns,
            tile_y: local / range.columns,
        })
    }
}
