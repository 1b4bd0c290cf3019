use uuid::Uuid;

use crate::layer::{CellValue, FieldType, TileBrush};

/// Rectangular selection of tiles in one tileset, anchored at its top-left tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrushSelection {
    pub tileset: Uuid,
    pub tile_x: u32,
    pub tile_y: u32,
    pub tiles_wide: u32,
    pub tiles_high: u32,
}

impl BrushSelection {
    pub fn single(tileset: Uuid, tile_x: u32, tile_y: u32) -> Self {
        BrushSelection {
            tileset,
            tile_x,
            tile_y,
            tiles_wide: 1,
            tiles_high: 1,
        }
    }

    /// Tile at offset `(dx, dy)` from the anchor, wrapping around the pattern.
    #[inline]
    pub fn tile_at(&self, dx: u32, dy: u32) -> TileBrush {
        TileBrush {
            tileset: self.tileset,
            tile_x: self.tile_x + dx % self.tiles_wide.max(1),
            tile_y: self.tile_y + dy % self.tiles_high.max(1),
        }
    }
}

/// What a paint operation writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Brush {
    Tiles(BrushSelection),
    Field(FieldType),
}

impl Brush {
    pub fn tile(tileset: Uuid, tile_x: u32, tile_y: u32) -> Self {
        Brush::Tiles(BrushSelection::single(tileset, tile_x, tile_y))
    }

    #[inline]
    pub fn value_at(&self, dx: u32, dy: u32) -> CellValue {
        match self {
            Brush::Tiles(sel) => CellValue::Tile(sel.tile_at(dx, dy)),
            Brush::Field(ft) => CellValue::Field(*ft),
        }
    }

    /// Pattern size in cells.
    pub fn size(&self) -> (u32, u32) {
        match self {
            Brush::Tiles(sel) => (sel.tiles_wide.max(1), sel.tiles_high.max(1)),
            Brush::Field(_) => (1, 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_wraps_by_selection_size() {
        let sel = BrushSelection {
            tileset: Uuid::nil(),
            tile_x: 4,
            tile_y: 2,
            tiles_wide: 2,
            tiles_high: 3,
        };
        assert_eq!((sel.tile_at(0, 0).tile_x, sel.tile_at(0, 0).tile_y), (4, 2));
        assert_eq!((sel.tile_at(3, 4).tile_x, sel.tile_at(3, 4).tile_y), (5, 3));
        assert_eq!((sel.tile_at(2, 3).tile_x, sel.tile_at(2, 3).tile_y), (4, 2));
    }

    #[test]
    fn zero_sized_selection_behaves_as_single_tile() {
        let sel = BrushSelection {
            tiles_wide: 0,
            tiles_high: 0,
            ..BrushSelection::single(Uuid::nil(), 1, 1)
        };
        assert_eq!(sel.tile_at(7, 9), sel.tile_at(0, 0));
        assert_eq!(Brush::Tiles(sel).size(), (1, 1));
    }
}
