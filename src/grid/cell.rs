use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    Mutex,
};

use crate::{utils::lock, Color, Grid, Pos};

/// stable index of a cell inside its [`Grid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(pub usize);

/// one grid unit, shared by every worker. each field is synchronized on its own.
#[derive(Debug)]
pub struct Cell {
    id: CellId,
    location: Pos,
    neighbors: Vec<CellId>,
    color: Mutex<Color>,
    updated: AtomicU32,
    edge: AtomicBool,
}

impl Cell {
    pub(super) fn new(id: CellId, location: Pos) -> Self {
        Self {
            id,
            location,
            neighbors: Vec::new(),
            color: Mutex::new(Color::UNSET),
            updated: AtomicU32::new(0),
            edge: AtomicBool::new(true),
        }
    }

    pub(super) fn set_neighbors(&mut self, neighbors: Vec<CellId>) {
        self.neighbors = neighbors;
    }

    pub fn id(&self) -> CellId {
        self.id
    }

    pub fn location(&self) -> Pos {
        self.location
    }

    pub fn neighbors(&self) -> &[CellId] {
        &self.neighbors
    }

    pub fn color(&self) -> Color {
        *lock(&self.color)
    }

    pub fn is_set(&self) -> bool {
        self.color().is_set()
    }

    /// replaces the color without counting it as a worker update.
    pub fn set_color(&self, color: Color) {
        *lock(&self.color) = color;
    }

    /// replaces the color and bumps the update counter.
    pub fn assign(&self, color: Color) {
        self.set_color(color);
        self.updated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn updated(&self) -> u32 {
        self.updated.load(Ordering::Relaxed)
    }

    pub fn is_settled(&self, threshold: u32) -> bool {
        self.updated() >= threshold
    }

    pub fn surrounding_colors(&self, grid: &Grid) -> Vec<Color> {
        grid.neighbors(self.id)
            .map(Cell::color)
            .filter(Color::is_set)
            .collect()
    }

    /// takes the average of the colored neighbors when unset, or always when
    /// `force` is given. returns the color the cell ends up with.
    pub fn bleed(&self, grid: &Grid, force: bool) -> Color {
        if force || !self.is_set() {
            let color = Color::average(&self.surrounding_colors(grid));
            self.set_color(color);
            color
        } else {
            self.color()
        }
    }

    /// whether some neighbor is still unset. once every neighbor has a color
    /// this stays false for good.
    pub fn is_edge(&self, grid: &Grid) -> bool {
        if !self.edge.load(Ordering::Acquire) {
            return false;
        }
        let all_colored = grid.neighbors(self.id).all(Cell::is_set);
        if all_colored {
            self.edge.store(false, Ordering::Release);
        }
        !all_colored
    }
}

#[cfg(test)]
mod tests {
    use crate::{grid, pos, Color, Pos};

    #[test]
    fn fresh_cells_are_unset_edges() {
        let grid = grid::wired(3, 3);
        let cell = grid.get(pos!(1, 1)).unwrap();
        assert!(!cell.is_set());
        assert_eq!(cell.updated(), 0);
        assert!(cell.is_edge(&grid));
        assert!(cell.surrounding_colors(&grid).is_empty());
    }

    #[test]
    fn surrounding_colors_skip_unset() {
        let grid = grid::wired(3, 3);
        grid.get(pos!(0, 0)).unwrap().set_color(Color([10.0, 10.0, 10.0]));
        grid.get(pos!(2, 2)).unwrap().set_color(Color([30.0, 30.0, 30.0]));
        let center = grid.get(pos!(1, 1)).unwrap();
        let mut colors = center.surrounding_colors(&grid);
        colors.sort_by(|a, b| a.sum().total_cmp(&b.sum()));
        assert_eq!(colors, vec![Color([10.0; 3]), Color([30.0; 3])]);
    }

    #[test]
    fn bleed_only_fills_unset_unless_forced() {
        let grid = grid::wired(2, 2);
        grid.get(pos!(1, 0)).unwrap().set_color(Color([20.0, 40.0, 60.0]));
        grid.get(pos!(0, 1)).unwrap().set_color(Color([40.0, 60.0, 80.0]));

        let target = grid.get(pos!(0, 0)).unwrap();
        assert_eq!(target.bleed(&grid, false), Color([30.0, 50.0, 70.0]));

        target.set_color(Color([1.0, 1.0, 1.0]));
        assert_eq!(target.bleed(&grid, false), Color([1.0, 1.0, 1.0]));
        assert_eq!(target.bleed(&grid, true), Color([30.0, 50.0, 70.0]));
    }

    #[test]
    fn bleed_without_colored_neighbors_stays_unset() {
        let grid = grid::wired(2, 2);
        let cell = grid.get(pos!(0, 0)).unwrap();
        assert_eq!(cell.bleed(&grid, false), Color::UNSET);
    }

    #[test]
    fn assign_counts_but_set_color_does_not() {
        let grid = grid::wired(2, 2);
        let cell = grid.get(pos!(1, 1)).unwrap();
        cell.set_color(Color([5.0; 3]));
        assert_eq!(cell.updated(), 0);
        cell.assign(Color([6.0; 3]));
        cell.assign(Color([7.0; 3]));
        assert_eq!(cell.updated(), 2);
        assert!(cell.is_settled(2));
        assert!(!cell.is_settled(3));
    }

    #[test]
    fn edge_latch_never_reopens() {
        let grid = grid::wired(2, 2);
        let corner = grid.get(pos!(0, 0)).unwrap();
        for cell in grid.cells().filter(|c| c.id() != corner.id()) {
            assert!(corner.is_edge(&grid));
            cell.set_color(Color([50.0; 3]));
        }
        assert!(!corner.is_edge(&grid));

        for cell in grid.cells() {
            cell.set_color(Color::UNSET);
        }
        assert!(!corner.is_edge(&grid));
    }
}
