//! Flat per-node value tables.

/// A jagged table stored as one backing vector plus row offsets, avoiding a
/// heap allocation per node.
#[derive(Debug, Clone, Default)]
pub(crate) struct FlatTable<T> {
    offsets: Vec<usize>,
    data: Vec<T>,
}

impl<T: Clone + Default> FlatTable<T> {
    /// Build a zeroed table from per-row widths.
    pub fn from_row_widths(widths: impl Iterator<Item = usize>) -> Self {
        let mut offsets = vec![0];
        for width in widths {
            let last = *offsets.last().unwrap_or(&0);
            offsets.push(last + width);
        }
        let total = *offsets.last().unwrap_or(&0);
        Self {
            offsets,
            data: vec![T::default(); total],
        }
    }

    /// Number of rows.
    pub fn num_rows(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Width of row `n`.
    pub fn row_width(&self, n: usize) -> usize {
        self.offsets[n + 1] - self.offsets[n]
    }

    pub fn row(&self, n: usize) -> &[T] {
        &self.data[self.offsets[n]..self.offsets[n + 1]]
    }

    pub fn row_mut(&mut self, n: usize) -> &mut [T] {
        &mut self.data[self.offsets[n]..self.offsets[n + 1]]
    }

    /// Drop all rows and data.
    pub fn clear(&mut self) {
        self.offsets.clear();
        self.data.clear();
    }

    /// Whether the table holds no rows.
    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_disjoint_and_sized() {
        let mut table: FlatTable<f64> = FlatTable::from_row_widths([2, 0, 3].into_iter());
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.row_width(0), 2);
        assert_eq!(table.row_width(1), 0);
        assert_eq!(table.row_width(2), 3);

        table.row_mut(2)[1] = 7.0;
        assert!((table.row(2)[1] - 7.0).abs() < f64::EPSILON);
        assert!(table.row(0).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn clear_empties_the_table() {
        let mut table: FlatTable<usize> = FlatTable::from_row_widths([4].into_iter());
        assert!(!table.is_empty());
        table.clear();
        assert!(table.is_empty());
    }
}
