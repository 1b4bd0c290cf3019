use std::collections::VecDeque;

use crate::layer::{Cell, CellValue, LayerData};

/// 4-neighborhood: right, left, down, up.
pub const NEIGHBORS: [(i64, i64); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

/// Inclusive bounding box in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl Bounds {
    fn of(cell: Cell) -> Self {
        Bounds {
            min_x: cell.x,
            min_y: cell.y,
            max_x: cell.x,
            max_y: cell.y,
        }
    }

    fn grow(&mut self, cell: Cell) {
        self.min_x = self.min_x.min(cell.x);
        self.min_y = self.min_y.min(cell.y);
        self.max_x = self.max_x.max(cell.x);
        self.max_y = self.max_y.max(cell.y);
    }

    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }
}

/// Connected cells sharing the seed's value, in discovery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub cells: Vec<Cell>,
    pub bounds: Bounds,
}

impl Region {
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Fill predicate: two empty cells match, empty never matches occupied, and
/// occupied cells match on equal value (same tileset and tile, or same field type).
#[inline]
pub fn cells_match(a: Option<CellValue>, b: Option<CellValue>) -> bool {
    a == b
}

/// Region reachable from `seed` over cells matching the seed, within a
/// `width` x `height` grid. `None` when the seed is outside the grid.
pub fn connected_region(data: &LayerData, seed: Cell, width: u32, height: u32) -> Option<Region> {
    connected_region_ordered(data, seed, width, height, &NEIGHBORS)
}

/// [`connected_region`] with an explicit neighbor visiting order.
pub fn connected_region_ordered(
    data: &LayerData,
    seed: Cell,
    width: u32,
    height: u32,
    neighbors: &[(i64, i64)],
) -> Option<Region> {
    if seed.x >= width || seed.y >= height {
        return None;
    }
    let (w, h) = (width as usize, height as usize);
    let idx = |c: Cell| c.y as usize * w + c.x as usize;

    let target = data.get(seed);
    let mut visited = vec![false; w * h];
    let mut queue = VecDeque::with_capacity((w * h).min(1024));
    let mut cells = Vec::new();
    let mut bounds = Bounds::of(seed);

    visited[idx(seed)] = true;
    queue.push_back(seed);
    while let Some(cell) = queue.pop_front() {
        cells.push(cell);
        bounds.grow(cell);
        for (dx, dy) in neighbors {
            let nx = i64::from(cell.x) + dx;
            let ny = i64::from(cell.y) + dy;
            if nx < 0 || ny < 0 || nx >= i64::from(width) || ny >= i64::from(height) {
                continue;
            }
            let next = Cell::new(nx as u32, ny as u32);
            if visited[idx(next)] {
                continue;
            }
            // marked on enqueue, so the queue never holds more than w * h cells
            if cells_match(data.get(next), target) {
                visited[idx(next)] = true;
                queue.push_back(next);
            }
        }
    }

    Some(Region { cells, bounds })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{FieldType, LayerType};
    use std::collections::HashSet;

    fn walls() -> LayerData {
        // 4x3, blocked column at x = 2
        let mut data = LayerData::for_type(LayerType::FieldType);
        for y in 0..3 {
            data.insert(Cell::new(2, y), CellValue::Field(FieldType::BLOCKED));
        }
        data
    }

    #[test]
    fn empty_region_stops_at_occupied_cells() {
        let region = connected_region(&walls(), Cell::new(0, 0), 4, 3).unwrap();
        assert_eq!(region.len(), 6);
        assert_eq!(
            region.bounds,
            Bounds { min_x: 0, min_y: 0, max_x: 1, max_y: 2 }
        );
    }

    #[test]
    fn occupied_region_matches_equal_values() {
        let region = connected_region(&walls(), Cell::new(2, 1), 4, 3).unwrap();
        let cells: HashSet<Cell> = region.cells.into_iter().collect();
        assert_eq!(cells, (0..3).map(|y| Cell::new(2, y)).collect());
    }

    #[test]
    fn seed_outside_grid_gives_none() {
        assert!(connected_region(&walls(), Cell::new(4, 0), 4, 3).is_none());
    }
}
