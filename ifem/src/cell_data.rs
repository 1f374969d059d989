use crate::mesh::CellId;

type HashMap<K, V> = std::collections::HashMap<K, V, ahash::RandomState>;

/// Per cell storage of a fixed number of records, e.g. one per quadrature point.
///
/// Records are created in bulk by [`initialize`](CellDataStorage::initialize) and dropped
/// together by [`clear`](CellDataStorage::clear) whenever the mesh changes.
#[derive(Clone, Debug)]
pub struct CellDataStorage<T> {
    data: HashMap<CellId, Vec<T>>,
}

impl<T> Default for CellDataStorage<T> {
    fn default() -> Self {
        CellDataStorage {
            data: HashMap::default(),
        }
    }
}

impl<T: Clone> CellDataStorage<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates `n` copies of `init` for `cell` unless the cell already has data.
    pub fn initialize(&mut self, cell: CellId, n: usize, init: T) {
        self.data.entry(cell).or_insert_with(|| vec![init; n]);
    }

    pub fn get(&self, cell: CellId) -> Option<&[T]> {
        self.data.get(&cell).map(Vec::as_slice)
    }

    pub fn get_mut(&mut self, cell: CellId) -> Option<&mut [T]> {
        self.data.get_mut(&cell).map(Vec::as_mut_slice)
    }

    pub fn contains(&self, cell: CellId) -> bool {
        self.data.contains_key(&cell)
    }

    pub fn n_cells(&self) -> usize {
        self.data.len()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle() {
        let mut storage = CellDataStorage::new();
        storage.initialize(3, 4, 0.0);
        storage.get_mut(3).unwrap()[2] = 1.5;
        // Re-initializing keeps existing data.
        storage.initialize(3, 4, 0.0);
        assert_eq!(storage.get(3).unwrap(), &[0.0, 0.0, 1.5, 0.0]);
        assert!(storage.get(0).is_none());
        storage.clear();
        assert_eq!(storage.n_cells(), 0);
    }
}
