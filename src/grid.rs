use std::ops::Index;

use rand::{seq::SliceRandom, Rng};
use thiserror::Error;

use crate::{pos, utils::MOORE, Pos};

pub use cell::{Cell, CellId};
mod cell;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GridError {
    #[error("grid dimensions must be positive, got {width}x{height}")]
    Empty { width: usize, height: usize },
    #[error("grid dimensions must fit in an i32, got {width}x{height}")]
    TooLarge { width: usize, height: usize },
    #[error("grid neighbors are already wired")]
    AlreadyWired,
}

/// fixed-size arena of cells, addressed row-major by [`CellId`].
#[derive(Debug)]
pub struct Grid {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
    wired: bool,
}

impl Grid {
    pub fn build(width: usize, height: usize) -> Result<Self, GridError> {
        if width == 0 || height == 0 {
            return Err(GridError::Empty { width, height });
        }

        let (Ok(columns), Ok(rows)) = (i32::try_from(width), i32::try_from(height)) else {
            return Err(GridError::TooLarge { width, height });
        };

        let cells = (0..rows)
            .flat_map(|y| (0..columns).map(move |x| pos!(x, y)))
            .enumerate()
            .map(|(index, location)| Cell::new(CellId(index), location))
            .collect();

        Ok(Self {
            width,
            height,
            cells,
            wired: false,
        })
    }

    /// computes every cell's Moore neighborhood. needs the whole grid to be
    /// addressable, so it runs once, after [`Grid::build`].
    pub fn wire_neighbors(&mut self) -> Result<(), GridError> {
        if self.wired {
            return Err(GridError::AlreadyWired);
        }

        let (width, height) = (self.width, self.height);
        for cell in &mut self.cells {
            let location = cell.location();
            let neighbors = MOORE
                .iter()
                .map(|offset| location + *offset)
                .filter(|pos| pos.within(width, height))
                .map(|pos| CellId(pos.y as usize * width + pos.x as usize))
                .collect();
            cell.set_neighbors(neighbors);
        }

        self.wired = true;
        Ok(())
    }

    pub fn is_wired(&self) -> bool {
        self.wired
    }

    /// picks a random row, then a random cell in it.
    pub fn random_cell<R: Rng + ?Sized>(&self, rng: &mut R) -> &Cell {
        let row = rng.gen_range(0..self.height);
        let start = row * self.width;
        let row = &self.cells[start..start + self.width];
        // rows are never empty, build refuses zero dimensions
        row.choose(rng).unwrap_or(&self.cells[start])
    }

    pub fn cell(&self, id: CellId) -> &Cell {
        &self.cells[id.0]
    }

    pub fn get(&self, pos: Pos) -> Option<&Cell> {
        pos.within(self.width, self.height)
            .then(|| &self.cells[pos.y as usize * self.width + pos.x as usize])
    }

    pub fn cells(&self) -> impl Iterator<Item = &Cell> + '_ {
        self.cells.iter()
    }

    pub fn neighbors(&self, id: CellId) -> impl Iterator<Item = &Cell> + '_ {
        self.cell(id).neighbors().iter().map(move |&id| self.cell(id))
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl Index<CellId> for Grid {
    type Output = Cell;

    fn index(&self, id: CellId) -> &Self::Output {
        self.cell(id)
    }
}

#[cfg(test)]
pub(crate) fn wired(width: usize, height: usize) -> Grid {
    let mut grid = Grid::build(width, height).expect("valid dimensions");
    grid.wire_neighbors().expect("fresh grid");
    grid
}
