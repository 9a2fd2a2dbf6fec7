use std::ops::AddAssign;

/// Dense `rows x slots` matrix stored row-major in one flat vector.
///
/// Rows are resources (VNFs or links), columns are horizon-relative time slots.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimeMatrix<T> {
    rows: usize,
    slots: usize,
    data: Vec<T>,
}

impl<T: Copy + Default + PartialEq + AddAssign> TimeMatrix<T> {
    pub fn new(rows: usize, slots: usize) -> Self {
        Self { rows, slots, data: vec![T::default(); rows * slots] }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    pub fn get(&self, row: usize, slot: usize) -> T {
        self.data[row * self.slots + slot]
    }

    pub fn set(&mut self, row: usize, slot: usize, value: T) {
        self.data[row * self.slots + slot] = value;
    }

    pub fn add(&mut self, row: usize, slot: usize, value: T) {
        self.data[row * self.slots + slot] += value;
    }

    pub fn row(&self, row: usize) -> &[T] {
        &self.data[row * self.slots..(row + 1) * self.slots]
    }

    /// Iterates over all `(row, slot, value)` entries that differ from `T::default()`.
    pub fn nonzero(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        let zero = T::default();
        self.data.iter().enumerate().filter(move |(_, v)| **v != zero).map(|(i, v)| (i / self.slots, i % self.slots, *v))
    }

    pub fn is_zero(&self) -> bool {
        let zero = T::default();
        self.data.iter().all(|v| *v == zero)
    }
}
