//! Sparse matrices assembled from element contributions.

/// Accumulates `(row, col, value)` triplets; duplicates are summed on conversion.
#[derive(Clone, Debug, Default)]
pub struct TripletMatrix {
    size: usize,
    rows: Vec<usize>,
    cols: Vec<usize>,
    values: Vec<f64>,
}

impl TripletMatrix {
    pub fn new(size: usize) -> Self {
        TripletMatrix {
            size,
            ..Default::default()
        }
    }

    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        self.rows.push(row);
        self.cols.push(col);
        self.values.push(value);
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn into_csr(self) -> SparseMatrix {
        let TripletMatrix {
            size,
            rows,
            cols,
            values,
        } = self;
        SparseMatrix {
            mat: sprs::TriMat::from_triplets((size, size), rows, cols, values).to_csr(),
        }
    }
}

/// Square CSR matrix.
#[derive(Clone, Debug)]
pub struct SparseMatrix {
    mat: sprs::CsMat<f64>,
}

impl SparseMatrix {
    pub fn zeros(size: usize) -> Self {
        SparseMatrix {
            mat: sprs::CsMat::zero((size, size)),
        }
    }

    pub fn size(&self) -> usize {
        self.mat.rows()
    }

    pub fn nnz(&self) -> usize {
        self.mat.nnz()
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.mat.get(row, col).copied().unwrap_or(0.0)
    }

    /// Computes `out = A x`.
    pub fn vmult(&self, x: &[f64], out: &mut [f64]) {
        debug_assert_eq!(x.len(), self.size());
        debug_assert_eq!(out.len(), self.size());
        for (row, vec) in self.mat.outer_iterator().enumerate() {
            out[row] = vec.iter().map(|(col, &val)| val * x[col]).sum();
        }
    }

    pub fn diagonal(&self) -> Vec<f64> {
        (0..self.size()).map(|i| self.get(i, i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_are_summed() {
        let mut trip = TripletMatrix::new(2);
        trip.add(0, 0, 1.0);
        trip.add(0, 0, 2.0);
        trip.add(1, 0, -1.0);
        trip.add(1, 1, 4.0);
        let mat = trip.into_csr();
        assert_eq!(mat.get(0, 0), 3.0);
        let mut out = vec![0.0; 2];
        mat.vmult(&[1.0, 2.0], &mut out);
        assert_eq!(out, vec![3.0, 7.0]);
        assert_eq!(mat.diagonal(), vec![3.0, 4.0]);
    }
}
