//! Dense two-dimensional storage for graph edges.
//!
//! The matrix is stored row-major: `matrix[from]` is the slice of cells for
//! every destination of `from`. Rows can be erased (the last row moves into
//! the gap) but the height only ever grows. Height growth reserves extra
//! space so adding one node at a time does not reallocate every row on every
//! call.

use std::ops::{Index, IndexMut};

/// A `width x height` matrix whose height is grown lazily.
#[derive(Debug, Clone, Default)]
pub struct EdgeMatrix<E> {
    /// One vector per row. Every row holds `allocated_height` cells.
    rows: Vec<Vec<E>>,
    /// Logical height visible through indexing.
    height: usize,
    /// Physical length of every row.
    allocated_height: usize,
}

impl<E: Default + Clone> EdgeMatrix<E> {
    /// Create an empty matrix.
    pub fn new() -> Self {
        Self {
            rows: Vec::new(),
            height: 0,
            allocated_height: 0,
        }
    }

    /// Create a `width x height` matrix of default cells, allocated exactly.
    pub fn with_size(width: usize, height: usize) -> Self {
        Self {
            rows: vec![vec![E::default(); height]; width],
            height,
            allocated_height: height,
        }
    }

    /// Number of rows.
    pub fn width(&self) -> usize {
        self.rows.len()
    }

    /// Number of cells per row.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Grow the matrix to at least `width x height`. Never shrinks either
    /// dimension; new cells are default-initialised.
    pub fn grow(&mut self, width: usize, height: usize) {
        if height > self.allocated_height {
            let new_alloc = height.max(self.allocated_height.saturating_mul(2)).max(4);
            for row in &mut self.rows {
                row.resize(new_alloc, E::default());
            }
            self.allocated_height = new_alloc;
        }
        // Cells past the logical height are never written, so they are still
        // default when the height moves over them.
        self.height = self.height.max(height);
        while self.rows.len() < width {
            self.rows.push(vec![E::default(); self.allocated_height]);
        }
    }

    /// Remove row `x` by moving the last row into its place.
    pub fn erase_row(&mut self, x: usize) {
        self.rows.swap_remove(x);
    }
}

impl<E> Index<usize> for EdgeMatrix<E> {
    type Output = [E];

    fn index(&self, row: usize) -> &[E] {
        &self.rows[row][..self.height]
    }
}

impl<E> IndexMut<usize> for EdgeMatrix<E> {
    fn index_mut(&mut self, row: usize) -> &mut [E] {
        let height = self.height;
        &mut self.rows[row][..height]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_size_is_default_filled() {
        let m: EdgeMatrix<u32> = EdgeMatrix::with_size(3, 3);
        assert_eq!(m.width(), 3);
        assert_eq!(m.height(), 3);
        assert!(m[2].iter().all(|&c| c == 0));
    }

    #[test]
    fn grow_keeps_existing_cells() {
        let mut m: EdgeMatrix<u32> = EdgeMatrix::with_size(2, 2);
        m[1][0] = 7;
        m.grow(3, 3);
        assert_eq!(m.width(), 3);
        assert_eq!(m.height(), 3);
        assert_eq!(m[1][0], 7);
        assert_eq!(m[2][2], 0);
    }

    #[test]
    fn grow_never_shrinks() {
        let mut m: EdgeMatrix<u32> = EdgeMatrix::with_size(4, 4);
        m.grow(2, 2);
        assert_eq!(m.width(), 4);
        assert_eq!(m.height(), 4);
    }

    #[test]
    fn erase_row_moves_last_row_into_gap() {
        let mut m: EdgeMatrix<u32> = EdgeMatrix::with_size(3, 3);
        m[2][1] = 9;
        m.erase_row(0);
        assert_eq!(m.width(), 2);
        assert_eq!(m.height(), 3);
        assert_eq!(m[0][1], 9);
    }

    #[test]
    fn one_at_a_time_growth_reserves_height() {
        let mut m: EdgeMatrix<u32> = EdgeMatrix::new();
        for n in 1..=9 {
            m.grow(n, n);
            m[n - 1][n - 1] = n as u32;
        }
        assert_eq!(m.width(), 9);
        assert_eq!(m.height(), 9);
        assert!(m.allocated_height >= 9);
        assert_eq!(m[4][4], 5);
        assert_eq!(m[8][0], 0);
    }
}
