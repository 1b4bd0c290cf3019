use macroquad::math::Vec2;

use crate::brush::Brush;
use crate::layer::{Cell, Layer, LayerData};
use crate::map::{MapData, TileMap};
use crate::spatial::region::{connected_region, Region};

/// Map dimensions the editor needs for hit testing and bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapMetadata {
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
}

impl From<&TileMap> for MapMetadata {
    fn from(map: &TileMap) -> Self {
        MapMetadata {
            width: map.width,
            height: map.height,
            tile_width: map.tile_width,
            tile_height: map.tile_height,
        }
    }
}

/// Pixel position to cell. `None` outside the map; positions are never clamped.
pub fn calculate_tile_position(meta: &MapMetadata, pixel: Vec2) -> Option<Cell> {
    if meta.tile_width == 0 || meta.tile_height == 0 {
        return None;
    }
    let x = (pixel.x / meta.tile_width as f32).floor();
    let y = (pixel.y / meta.tile_height as f32).floor();
    if !(x.is_finite() && y.is_finite()) || x < 0.0 || y < 0.0 {
        return None;
    }
    if x >= meta.width as f32 || y >= meta.height as f32 {
        return None;
    }
    Some(Cell::new(x as u32, y as u32))
}

/// Writes the brush pattern over `region`, offset from the region's bounding box.
/// Returns how many cells changed.
pub fn fill_region(data: &mut LayerData, region: &Region, brush: &Brush) -> usize {
    let b = region.bounds;
    let mut changed = 0;
    for cell in &region.cells {
        let value = brush.value_at(cell.x - b.min_x, cell.y - b.min_y);
        if data.get(*cell) != Some(value) && data.insert(*cell, value) {
            changed += 1;
        }
    }
    changed
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tool {
    #[default]
    Draw,
    Erase,
    Fill,
    Stamp,
}

/// Editing state over one map's layers.
#[derive(Debug, Clone)]
pub struct EditSession {
    meta: MapMetadata,
    layers: Vec<Layer>,
    active_layer: usize,
    brush: Brush,
    tool: Tool,
    changed: bool,
}

impl EditSession {
    pub fn new(meta: MapMetadata, layers: Vec<Layer>, brush: Brush) -> Self {
        EditSession {
            meta,
            layers,
            active_layer: 0,
            brush,
            tool: Tool::default(),
            changed: false,
        }
    }

    pub fn from_map(data: &MapData, brush: Brush) -> Self {
        Self::new(MapMetadata::from(&data.map), data.layers.clone(), brush)
    }

    pub fn metadata(&self) -> &MapMetadata {
        &self.meta
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn into_layers(self) -> Vec<Layer> {
        self.layers
    }

    pub fn active_layer(&self) -> Option<&Layer> {
        self.layers.get(self.active_layer)
    }

    /// Returns `false` (and keeps the current layer) for an unknown index.
    pub fn set_active_layer(&mut self, index: usize) -> bool {
        if index >= self.layers.len() {
            return false;
        }
        self.active_layer = index;
        true
    }

    pub fn brush(&self) -> &Brush {
        &self.brush
    }

    pub fn set_brush(&mut self, brush: Brush) {
        self.brush = brush;
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn set_tool(&mut self, tool: Tool) {
        self.tool = tool;
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Reads and clears the changed flag.
    pub fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }

    /// Active layer and the cell, if the cell lies inside it.
    fn target(&self, x: u32, y: u32) -> Option<(&Layer, Cell)> {
        let layer = self.layers.get(self.active_layer)?;
        let (w, h) = layer.extent(self.meta.width, self.meta.height);
        (x < w && y < h).then_some((layer, Cell::new(x, y)))
    }

    fn brush_fits(&self, layer: &Layer) -> bool {
        matches!(
            (&self.brush, &layer.data),
            (Brush::Tiles(_), LayerData::Tiles(_)) | (Brush::Field(_), LayerData::FieldTypes(_))
        )
    }

    /// Puts the brush's anchor tile at `(x, y)`. `false` when nothing changed.
    pub fn place_tile(&mut self, x: u32, y: u32) -> bool {
        let Some((layer, cell)) = self.target(x, y) else {
            return false;
        };
        if !self.brush_fits(layer) {
            return false;
        }
        let value = self.brush.value_at(0, 0);
        if layer.data.get(cell) == Some(value) {
            return false;
        }
        let idx = self.active_layer;
        if self.layers[idx].data.insert(cell, value) {
            self.changed = true;
            return true;
        }
        false
    }

    /// Removes the value at `(x, y)`; `true` if there was one.
    pub fn erase_tile(&mut self, x: u32, y: u32) -> bool {
        if self.target(x, y).is_none() {
            return false;
        }
        let idx = self.active_layer;
        let existed = self.layers[idx].data.remove(Cell::new(x, y)).is_some();
        self.changed |= existed;
        existed
    }

    /// Places the whole brush with its top-left tile at `(x, y)`, clipping at the
    /// layer edge. Returns how many cells changed.
    pub fn stamp(&mut self, x: u32, y: u32) -> usize {
        let Some((layer, _)) = self.target(x, y) else {
            return 0;
        };
        if !self.brush_fits(layer) {
            return 0;
        }
        let (w, h) = layer.extent(self.meta.width, self.meta.height);
        let (bw, bh) = self.brush.size();
        let brush = self.brush;
        let data = &mut self.layers[self.active_layer].data;

        let mut changed = 0;
        for dy in 0..bh {
            for dx in 0..bw {
                let (cx, cy) = (x + dx, y + dy);
                if cx >= w || cy >= h {
                    continue;
                }
                let cell = Cell::new(cx, cy);
                let value = brush.value_at(dx, dy);
                if data.get(cell) != Some(value) && data.insert(cell, value) {
                    changed += 1;
                }
            }
        }
        self.changed |= changed > 0;
        changed
    }

    /// `true` if a fill at `(x, y)` would change the seed cell.
    pub fn can_fill(&self, x: u32, y: u32) -> bool {
        let Some((layer, cell)) = self.target(x, y) else {
            return false;
        };
        if !self.brush_fits(layer) {
            return false;
        }
        let Some(current) = layer.data.get(cell) else {
            return true;
        };
        let offset = if self.brush.size() == (1, 1) {
            (0, 0)
        } else {
            // the seed's pattern offset depends on where the region starts
            let (w, h) = layer.extent(self.meta.width, self.meta.height);
            match connected_region(&layer.data, cell, w, h) {
                Some(region) => (x - region.bounds.min_x, y - region.bounds.min_y),
                None => return false,
            }
        };
        self.brush.value_at(offset.0, offset.1) != current
    }

    /// Pattern-aware flood fill from `(x, y)`. Returns how many cells changed.
    pub fn flood_fill(&mut self, x: u32, y: u32) -> usize {
        let Some((layer, cell)) = self.target(x, y) else {
            return 0;
        };
        if !self.brush_fits(layer) {
            return 0;
        }
        let (w, h) = layer.extent(self.meta.width, self.meta.height);
        let Some(region) = connected_region(&layer.data, cell, w, h) else {
            return 0;
        };
        let brush = self.brush;
        let idx = self.active_layer;
        let changed = fill_region(&mut self.layers[idx].data, &region, &brush);
        log::debug!(
            "fill at {cell}: region of {} cells, {changed} changed",
            region.len()
        );
        self.changed |= changed > 0;
        changed
    }

    /// Applies the current tool at a pointer position. `true` if the layer changed.
    pub fn pointer_down(&mut self, pixel: Vec2) -> bool {
        let Some(cell) = calculate_tile_position(&self.meta, pixel) else {
            return false;
        };
        match self.tool {
            Tool::Draw => self.place_tile(cell.x, cell.y),
            Tool::Erase => self.erase_tile(cell.x, cell.y),
            Tool::Fill => self.can_fill(cell.x, cell.y) && self.flood_fill(cell.x, cell.y) > 0,
            Tool::Stamp => self.stamp(cell.x, cell.y) > 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brush::BrushSelection;
    use crate::layer::{CellValue, FieldType, LayerType, TileBrush};
    use macroquad::math::vec2;
    use uuid::Uuid;

    const META: MapMetadata = MapMetadata {
        width: 5,
        height: 4,
        tile_width: 32,
        tile_height: 16,
    };

    fn session() -> EditSession {
        let layers = vec![
            Layer::new("floor", LayerType::Floor, 1),
            Layer::new("field_type", LayerType::FieldType, 5),
        ];
        EditSession::new(META, layers, Brush::tile(Uuid::from_u128(3), 1, 2))
    }

    #[test]
    fn pixel_positions_floor_divide() {
        assert_eq!(calculate_tile_position(&META, vec2(0.0, 0.0)), Some(Cell::new(0, 0)));
        assert_eq!(calculate_tile_position(&META, vec2(63.9, 16.0)), Some(Cell::new(1, 1)));
        assert_eq!(calculate_tile_position(&META, vec2(159.9, 63.9)), Some(Cell::new(4, 3)));
    }

    #[test]
    fn pixel_positions_outside_are_none() {
        for p in [vec2(-0.1, 0.0), vec2(0.0, -3.0), vec2(160.0, 0.0), vec2(0.0, 64.0)] {
            assert_eq!(calculate_tile_position(&META, p), None, "{p:?}");
        }
    }

    #[test]
    fn draw_and_erase_track_changes() {
        let mut s = session();
        assert!(s.place_tile(2, 1));
        assert!(!s.place_tile(2, 1), "same tile twice is not a change");
        assert!(s.take_changed());
        assert!(!s.is_changed());

        assert!(s.erase_tile(2, 1));
        assert!(!s.erase_tile(2, 1));
        assert!(s.take_changed());
    }

    #[test]
    fn out_of_bounds_edits_are_no_ops() {
        let mut s = session();
        assert!(!s.place_tile(5, 0));
        assert!(!s.erase_tile(0, 4));
        assert_eq!(s.stamp(9, 9), 0);
        assert_eq!(s.flood_fill(5, 4), 0);
        assert!(!s.can_fill(5, 0));
        assert!(!s.pointer_down(vec2(-1.0, 5.0)));
        assert!(!s.is_changed());
        assert!(s.active_layer().unwrap().is_empty());
    }

    #[test]
    fn brush_kind_must_match_layer() {
        let mut s = session();
        assert!(s.set_active_layer(1));
        assert!(!s.place_tile(0, 0));

        s.set_brush(Brush::Field(FieldType::BLOCKED));
        assert!(s.place_tile(0, 0));
        assert_eq!(
            s.active_layer().unwrap().data.get(Cell::new(0, 0)),
            Some(CellValue::Field(FieldType::BLOCKED))
        );
        assert!(!s.set_active_layer(2));
    }

    #[test]
    fn stamp_clips_at_the_edge() {
        let mut s = session();
        s.set_brush(Brush::Tiles(BrushSelection {
            tileset: Uuid::from_u128(3),
            tile_x: 0,
            tile_y: 0,
            tiles_wide: 2,
            tiles_high: 2,
        }));
        assert_eq!(s.stamp(4, 3), 1);
        assert_eq!(s.stamp(0, 0), 4);
        assert_eq!(
            s.active_layer().unwrap().data.get(Cell::new(1, 1)),
            Some(CellValue::Tile(TileBrush {
                tileset: Uuid::from_u128(3),
                tile_x: 1,
                tile_y: 1
            }))
        );
    }

    #[test]
    fn fill_tool_runs_through_pointer_down() {
        let mut s = session();
        s.set_tool(Tool::Fill);
        assert!(s.pointer_down(vec2(40.0, 20.0)));
        assert_eq!(s.active_layer().unwrap().data.len(), 20);
        assert!(!s.can_fill(0, 0));
        assert!(!s.pointer_down(vec2(40.0, 20.0)));
        assert!(s.take_changed());
    }
}
