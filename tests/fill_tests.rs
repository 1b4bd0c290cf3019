// tests/fill_tests.rs

use std::collections::HashSet;

use macroquad::math::vec2;
use pretty_assertions::assert_eq;
use tilemap_canon::{
    calculate_tile_position, connected_region, connected_region_ordered, fill_region, Brush,
    BrushSelection, Cell, CellValue, EditSession, FieldType, Layer, LayerType, MapMetadata,
    TileBrush, Tool, NEIGHBORS,
};
use uuid::Uuid;

const META: MapMetadata = MapMetadata {
    width: 5,
    height: 4,
    tile_width: 32,
    tile_height: 32,
};

const TERRAIN: Uuid = Uuid::from_u128(0x7e44_0001);

fn wall() -> CellValue {
    CellValue::Tile(TileBrush {
        tileset: TERRAIN,
        tile_x: 7,
        tile_y: 7,
    })
}

// W . W W W
// W . W W W   . = empty, W = wall
// W . . . W
// W W W W W
const L_SHAPE: [(u32, u32); 5] = [(1, 0), (1, 1), (1, 2), (2, 2), (3, 2)];

fn l_shaped_floor() -> Layer {
    let mut layer = Layer::new("floor", LayerType::Floor, 1);
    for y in 0..META.height {
        for x in 0..META.width {
            if !L_SHAPE.contains(&(x, y)) {
                layer.data.insert(Cell::new(x, y), wall());
            }
        }
    }
    layer
}

fn checker_brush() -> Brush {
    Brush::Tiles(BrushSelection {
        tileset: TERRAIN,
        tile_x: 4,
        tile_y: 6,
        tiles_wide: 2,
        tiles_high: 2,
    })
}

fn tile(tile_x: u32, tile_y: u32) -> Option<CellValue> {
    Some(CellValue::Tile(TileBrush {
        tileset: TERRAIN,
        tile_x,
        tile_y,
    }))
}

#[test]
fn two_by_two_brush_over_l_shape_matches_hand_computed_tiles() {
    let mut session = EditSession::new(META, vec![l_shaped_floor()], checker_brush());

    assert!(session.can_fill(1, 1));
    assert_eq!(session.flood_fill(1, 1), 5);
    assert!(session.take_changed());

    // bounding box starts at (1, 0)
    let expected = [
        ((1, 0), tile(4, 6)),
        ((1, 1), tile(4, 7)),
        ((1, 2), tile(4, 6)),
        ((2, 2), tile(5, 6)),
        ((3, 2), tile(4, 6)),
    ];
    let layer = session.active_layer().unwrap();
    for ((x, y), value) in expected {
        assert_eq!(layer.data.get(Cell::new(x, y)), value, "cell {x},{y}");
    }
    assert_eq!(layer.data.len(), 20);
    assert_eq!(layer.data.get(Cell::new(0, 0)), Some(wall()));
}

#[test]
fn fill_is_idempotent_for_a_uniform_brush() {
    let brush = Brush::tile(TERRAIN, 2, 1);
    let mut session = EditSession::new(META, vec![l_shaped_floor()], brush);
    assert_eq!(session.flood_fill(3, 2), 5);
    assert!(session.take_changed());

    let before = session.active_layer().unwrap().clone();
    for (x, y) in L_SHAPE {
        assert!(!session.can_fill(x, y), "cell {x},{y}");
        assert_eq!(session.flood_fill(x, y), 0);
    }
    assert_eq!(session.active_layer().unwrap(), &before);
    assert!(!session.is_changed());
}

#[test]
fn fill_tool_skips_cells_already_showing_the_brush() {
    let field = Layer::new("field_type", LayerType::FieldType, 5);
    let mut session = EditSession::new(META, vec![field], Brush::Field(FieldType::BLOCKED));
    session.set_tool(Tool::Fill);

    assert!(session.pointer_down(vec2(10.0, 10.0)));
    assert_eq!(session.active_layer().unwrap().data.len(), 20);
    assert!(session.take_changed());

    assert!(!session.pointer_down(vec2(100.0, 70.0)));
    assert!(!session.is_changed());
}

/// Every ordering of the four neighbor offsets.
fn neighbor_orders() -> Vec<Vec<(i64, i64)>> {
    let mut out = Vec::new();
    for a in 0..4 {
        for b in 0..4 {
            for c in 0..4 {
                for d in 0..4 {
                    let idx = [a, b, c, d];
                    let unique: HashSet<usize> = idx.iter().copied().collect();
                    if unique.len() == 4 {
                        out.push(idx.iter().map(|i| NEIGHBORS[*i]).collect());
                    }
                }
            }
        }
    }
    out
}

#[test]
fn fill_result_does_not_depend_on_neighbor_order() {
    let mut scattered = Layer::new("floor", LayerType::Floor, 1);
    for (x, y) in [(0, 1), (2, 0), (3, 1), (2, 3), (4, 2)] {
        scattered.data.insert(Cell::new(x, y), wall());
    }

    for base in [l_shaped_floor(), scattered] {
        for seed in [Cell::new(1, 1), Cell::new(4, 3), Cell::new(0, 0)] {
            let reference = connected_region(&base.data, seed, META.width, META.height).unwrap();
            let reference_set: HashSet<Cell> = reference.cells.iter().copied().collect();
            let mut reference_fill = base.data.clone();
            fill_region(&mut reference_fill, &reference, &checker_brush());

            let orders = neighbor_orders();
            assert_eq!(orders.len(), 24);
            for order in orders {
                let region =
                    connected_region_ordered(&base.data, seed, META.width, META.height, &order)
                        .unwrap();
                let set: HashSet<Cell> = region.cells.iter().copied().collect();
                assert_eq!(set, reference_set, "seed {seed}, order {order:?}");
                assert_eq!(region.bounds, reference.bounds);

                let mut filled = base.data.clone();
                fill_region(&mut filled, &region, &checker_brush());
                assert_eq!(filled, reference_fill, "seed {seed}, order {order:?}");
            }
        }
    }
}

#[test]
fn region_never_visits_a_cell_twice() {
    let empty = Layer::new("floor", LayerType::Floor, 1);
    let region = connected_region(&empty.data, Cell::new(2, 2), META.width, META.height).unwrap();
    let unique: HashSet<Cell> = region.cells.iter().copied().collect();
    assert_eq!(region.len(), 20);
    assert_eq!(unique.len(), 20);
}

#[test]
fn out_of_bounds_positions_and_edits_leave_the_layer_alone() {
    let mut session = EditSession::new(META, vec![l_shaped_floor()], checker_brush());
    let before = session.active_layer().unwrap().clone();

    for pixel in [vec2(-1.0, 0.0), vec2(0.0, -0.5), vec2(160.0, 10.0), vec2(10.0, 128.0)] {
        assert_eq!(calculate_tile_position(&META, pixel), None, "{pixel:?}");
        for tool in [Tool::Draw, Tool::Erase, Tool::Fill, Tool::Stamp] {
            session.set_tool(tool);
            assert!(!session.pointer_down(pixel));
        }
    }
    assert!(!session.erase_tile(5, 0));
    assert!(!session.erase_tile(0, 4));
    assert_eq!(session.flood_fill(5, 4), 0);
    assert!(!session.can_fill(9, 9));

    assert_eq!(session.active_layer().unwrap(), &before);
    assert!(!session.is_changed());
}

#[test]
fn pointer_positions_map_to_cells() {
    assert_eq!(calculate_tile_position(&META, vec2(33.0, 95.9)), Some(Cell::new(1, 2)));
    assert_eq!(calculate_tile_position(&META, vec2(159.0, 127.0)), Some(Cell::new(4, 3)));
}
