use crate::error::MapError;
use crate::ir_map::{IrLayer, IrLayerKind, IrTileRef};
use crate::layer::{Cell, CellValue, FieldType, Layer, LayerType, TileBrush};
use crate::resolver::{Resolution, TilesetResolver};
use crate::tileset::{sequential_to_local, GidTable, GID_MASK};

/// Legacy array name -> (layer type, z).
pub const LEGACY_LAYERS: [(&str, LayerType, i32); 5] = [
    ("field_bg", LayerType::Background, 0),
    ("field_layer1", LayerType::Floor, 1),
    ("field_layer2", LayerType::Floor, 2),
    ("field_layer4", LayerType::Sky, 3),
    ("field_layer5", LayerType::Sky, 4),
];

/// Maps a legacy field-type code onto the canonical id.
pub fn remap_legacy_field_type(code: i64, row: u32, col: u32) -> Result<FieldType, MapError> {
    match code {
        1 => Ok(FieldType::WALKABLE_WITH_MONSTERS),
        2 => Ok(FieldType::WALKABLE),
        3 => Ok(FieldType::BLOCKED),
        _ => Err(MapError::UnknownFieldTypeCode { row, col, code }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapDims {
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
}

struct Extent {
    width: u32,
    height: u32,
}

impl Extent {
    fn cell(&self, layer: &str, x: i64, y: i64) -> Result<Cell, MapError> {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return Err(MapError::CellOutOfBounds {
                layer: layer.to_owned(),
                x,
                y,
            });
        }
        Ok(Cell::new(x as u32, y as u32))
    }
}

/// Converts one format layer into a sparse canonical layer.
///
/// Returns `Ok(None)` for layers flagged `skip_if_empty` that end up with no cells.
pub fn normalize_layer(
    ir: &IrLayer,
    dims: MapDims,
    resolver: &mut TilesetResolver<'_>,
    gids: &GidTable,
) -> Result<Option<Layer>, MapError> {
    let name = ir.name.as_str();
    let mut layer = Layer::new(name, ir.layer_type, ir.z);
    layer.x = ir.x;
    layer.y = ir.y;
    layer.visible = ir.visible;
    layer.opacity = if (0.0..=1.0).contains(&ir.opacity) {
        ir.opacity
    } else {
        log::warn!("layer '{name}': opacity {} clamped to [0, 1]", ir.opacity);
        if ir.opacity.is_nan() {
            1.0
        } else {
            ir.opacity.clamp(0.0, 1.0)
        }
    };
    layer.width = ir.width.filter(|w| *w != dims.width);
    layer.height = ir.height.filter(|h| *h != dims.height);

    let holds_fields = ir.layer_type.holds_field_types();
    let kind_fits = match &ir.kind {
        IrLayerKind::Grid { .. } | IrLayerKind::Cells(_) => !holds_fields,
        IrLayerKind::FieldTypes(_) | IrLayerKind::LegacyFieldCodes(_) => holds_fields,
    };
    // an empty tile list on a field layer has nothing to mix
    let empty_cells = matches!(&ir.kind, IrLayerKind::Cells(c) if c.is_empty());
    if !kind_fits && !empty_cells {
        return Err(MapError::MixedLayerData(name.to_owned()));
    }

    let mut flipped = 0usize;
    match &ir.kind {
        IrLayerKind::Grid {
            width,
            height,
            data,
        } => {
            let expected = width * height;
            if data.len() != expected {
                return Err(MapError::InvalidLayerSize {
                    layer: name.to_owned(),
                    expected,
                    actual: data.len(),
                });
            }
            if *width as u32 != dims.width {
                layer.width = Some(*width as u32);
            }
            if *height as u32 != dims.height {
                layer.height = Some(*height as u32);
            }
            for (idx, raw) in data.iter().enumerate() {
                let gid = raw & GID_MASK;
                if gid == 0 {
                    continue;
                }
                if gid != *raw {
                    flipped += 1;
                }
                let tile = gids.lookup(gid).ok_or_else(|| MapError::InvalidTileGid {
                    layer: name.to_owned(),
                    gid,
                })?;
                let cell = Cell::new((idx % width) as u32, (idx / width) as u32);
                layer.data.insert(
                    cell,
                    CellValue::Tile(TileBrush {
                        tileset: tile.tileset,
                        tile_x: tile.tile_x,
                        tile_y: tile.tile_y,
                    }),
                );
            }
        }
        IrLayerKind::Cells(cells) => {
            let (w, h) = layer.extent(dims.width, dims.height);
            let extent = Extent { width: w, height: h };
            for c in cells {
                let cell = extent.cell(name, c.x, c.y)?;
                let brush = match &c.tile {
                    IrTileRef::Gid(raw) => {
                        let gid = raw & GID_MASK;
                        if gid == 0 {
                            continue;
                        }
                        if gid != *raw {
                            flipped += 1;
                        }
                        let tile = gids.lookup(gid).ok_or_else(|| MapError::InvalidTileGid {
                            layer: name.to_owned(),
                            gid,
                        })?;
                        TileBrush {
                            tileset: tile.tileset,
                            tile_x: tile.tile_x,
                            tile_y: tile.tile_y,
                        }
                    }
                    IrTileRef::Sequential { tileset, id } => {
                        let res = resolver.resolve(tileset, None)?;
                        let ts = resolved_or_err(&res, name, tileset)?;
                        let (tile_x, tile_y) =
                            sequential_to_local(&ts.name, *id, Some(ts.tiles_per_row()))?;
                        checked_brush(ts, name, cell, tile_x, tile_y)?
                    }
                    IrTileRef::Local {
                        tileset,
                        tile_x,
                        tile_y,
                    } => {
                        let res = resolver.resolve_reference(tileset)?;
                        let ts = resolved_or_err(&res, name, tileset)?;
                        checked_brush(ts, name, cell, *tile_x, *tile_y)?
                    }
                };
                layer.data.insert(cell, CellValue::Tile(brush));
            }
        }
        IrLayerKind::FieldTypes(values) => {
            let (w, h) = layer.extent(dims.width, dims.height);
            let extent = Extent { width: w, height: h };
            for (x, y, ft) in values {
                let cell = extent.cell(name, *x, *y)?;
                layer.data.insert(cell, CellValue::Field(*ft));
            }
        }
        IrLayerKind::LegacyFieldCodes(codes) => {
            let (w, h) = layer.extent(dims.width, dims.height);
            let extent = Extent { width: w, height: h };
            for (row, col, code) in codes {
                let cell = extent.cell(name, *col, *row)?;
                let ft = remap_legacy_field_type(*code, cell.y, cell.x)?;
                layer.data.insert(cell, CellValue::Field(ft));
            }
        }
    }

    if flipped > 0 {
        log::warn!("layer '{name}': ignored flip flags on {flipped} tiles");
    }
    if ir.skip_if_empty && layer.is_empty() {
        log::debug!("layer '{name}' has no cells, dropped");
        return Ok(None);
    }
    log::debug!(
        "layer '{name}' ({}, z={}) normalized with {} cells",
        layer.kind.as_str(),
        layer.z,
        layer.data.len()
    );
    Ok(Some(layer))
}

fn resolved_or_err<'r>(
    res: &'r Resolution,
    layer: &str,
    reference: &str,
) -> Result<&'r crate::tileset::TileSet, MapError> {
    res.tileset().ok_or_else(|| MapError::UnresolvedTileset {
        layer: layer.to_owned(),
        tileset: reference.to_owned(),
    })
}

fn checked_brush(
    ts: &crate::tileset::TileSet,
    layer: &str,
    cell: Cell,
    tile_x: u32,
    tile_y: u32,
) -> Result<TileBrush, MapError> {
    if !ts.contains_tile(tile_x, tile_y) {
        return Err(MapError::TileOutOfTileset {
            layer: layer.to_owned(),
            tileset: ts.name.clone(),
            x: cell.x,
            y: cell.y,
            tile_x,
            tile_y,
        });
    }
    Ok(TileBrush {
        tileset: ts.uuid,
        tile_x,
        tile_y,
    })
}
