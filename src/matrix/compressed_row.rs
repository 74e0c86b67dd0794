//! Scalar compressed-row sparse matrix with block metadata.
//!
//! This is the output format of the inner-product builder and the input of
//! every sparse Cholesky backend. Symmetric matrices store a single triangle,
//! recorded in [`StorageType`].

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use super::block_structure::Block;
use crate::linalg::{LinAlgError, LinAlgResult};

/// Which part of the matrix is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StorageType {
    /// Every non-zero is stored
    #[default]
    Unsymmetric,
    /// Symmetric matrix, only entries with `col <= row` are stored
    LowerTriangular,
    /// Symmetric matrix, only entries with `col >= row` are stored
    UpperTriangular,
}

impl StorageType {
    pub fn is_symmetric(self) -> bool {
        !matches!(self, StorageType::Unsymmetric)
    }

    /// The triangle seen when the row-major arrays are read column-major.
    pub fn transposed(self) -> Self {
        match self {
            StorageType::Unsymmetric => StorageType::Unsymmetric,
            StorageType::LowerTriangular => StorageType::UpperTriangular,
            StorageType::UpperTriangular => StorageType::LowerTriangular,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompressedRowSparseMatrix {
    num_rows: usize,
    num_cols: usize,
    rows: Vec<usize>,
    cols: Vec<usize>,
    values: Vec<f64>,
    row_blocks: Vec<Block>,
    col_blocks: Vec<Block>,
    storage_type: StorageType,
}

impl CompressedRowSparseMatrix {
    /// Allocates a matrix with room for exactly `num_nonzeros` entries.
    ///
    /// Row offsets, column indices and values are zero-initialized; the
    /// caller fills them in.
    pub fn new(num_rows: usize, num_cols: usize, num_nonzeros: usize) -> Self {
        Self {
            num_rows,
            num_cols,
            rows: vec![0; num_rows + 1],
            cols: vec![0; num_nonzeros],
            values: vec![0.0; num_nonzeros],
            row_blocks: Vec::new(),
            col_blocks: Vec::new(),
            storage_type: StorageType::Unsymmetric,
        }
    }

    /// Builds a matrix from `(row, col, value)` triplets.
    ///
    /// Duplicate entries are summed. For a symmetric storage type, triplets
    /// outside the stored triangle are rejected.
    pub fn from_triplets(
        num_rows: usize,
        num_cols: usize,
        triplets: &[(usize, usize, f64)],
        storage_type: StorageType,
    ) -> LinAlgResult<Self> {
        let mut sorted = triplets.to_vec();
        for &(r, c, _) in &sorted {
            if r >= num_rows || c >= num_cols {
                return Err(LinAlgError::InvalidInput(format!(
                    "entry ({r}, {c}) outside a {num_rows}x{num_cols} matrix"
                )));
            }
            let outside = match storage_type {
                StorageType::LowerTriangular => c > r,
                StorageType::UpperTriangular => c < r,
                StorageType::Unsymmetric => false,
            };
            if outside {
                return Err(LinAlgError::InvalidInput(format!(
                    "entry ({r}, {c}) is outside the {storage_type:?} triangle"
                )));
            }
        }
        sorted.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        let mut rows = vec![0; num_rows + 1];
        let mut cols: Vec<usize> = Vec::with_capacity(sorted.len());
        let mut values: Vec<f64> = Vec::with_capacity(sorted.len());
        let mut last: Option<(usize, usize)> = None;
        for (r, c, v) in sorted {
            if last == Some((r, c)) {
                if let Some(value) = values.last_mut() {
                    *value += v;
                }
                continue;
            }
            last = Some((r, c));
            rows[r + 1] += 1;
            cols.push(c);
            values.push(v);
        }
        for r in 0..num_rows {
            rows[r + 1] += rows[r];
        }

        Ok(Self {
            num_rows,
            num_cols,
            rows,
            cols,
            values,
            row_blocks: Vec::new(),
            col_blocks: Vec::new(),
            storage_type,
        })
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    pub fn num_nonzeros(&self) -> usize {
        self.rows[self.num_rows]
    }

    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    pub fn mut_rows(&mut self) -> &mut [usize] {
        &mut self.rows
    }

    pub fn cols(&self) -> &[usize] {
        &self.cols
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn mut_values(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// Row offsets together with mutable values, for in-place numeric updates.
    pub fn rows_and_mut_values(&mut self) -> (&[usize], &mut [f64]) {
        (&self.rows, &mut self.values)
    }

    /// Row offsets together with mutable column indices, for filling a pattern.
    pub fn rows_and_mut_cols(&mut self) -> (&[usize], &mut [usize]) {
        (&self.rows, &mut self.cols)
    }

    pub fn row_blocks(&self) -> &[Block] {
        &self.row_blocks
    }

    pub fn mut_row_blocks(&mut self) -> &mut Vec<Block> {
        &mut self.row_blocks
    }

    pub fn col_blocks(&self) -> &[Block] {
        &self.col_blocks
    }

    pub fn mut_col_blocks(&mut self) -> &mut Vec<Block> {
        &mut self.col_blocks
    }

    pub fn storage_type(&self) -> StorageType {
        self.storage_type
    }

    pub fn set_storage_type(&mut self, storage_type: StorageType) {
        self.storage_type = storage_type;
    }

    pub fn set_zero(&mut self) {
        self.values.fill(0.0);
    }

    /// Copies the values of `other`, which must share this matrix's pattern.
    pub fn copy_values_from(&mut self, other: &CompressedRowSparseMatrix) -> LinAlgResult<()> {
        if other.values.len() != self.values.len() {
            return Err(LinAlgError::DimensionMismatch {
                expected: self.values.len(),
                actual: other.values.len(),
            });
        }
        self.values.copy_from_slice(&other.values);
        Ok(())
    }

    /// Checks the compressed-row invariants the factorization kernels rely on.
    ///
    /// Row offsets start at zero, never decrease and end at the length of the
    /// column and value arrays. Within a row, column indices are in bounds,
    /// strictly increasing and inside the stored triangle.
    pub fn validate_structure(&self) -> LinAlgResult<()> {
        let n = self.num_rows;
        if self.rows.len() != n + 1 || self.rows[0] != 0 {
            return Err(LinAlgError::InvalidStructure(format!(
                "row offsets must have length {} and start at 0",
                n + 1
            )));
        }
        let nnz = self.rows[n];
        if self.cols.len() != nnz || self.values.len() != nnz {
            return Err(LinAlgError::InvalidStructure(format!(
                "row offsets end at {nnz} but there are {} column indices and {} values",
                self.cols.len(),
                self.values.len()
            )));
        }

        for r in 0..n {
            let (start, end) = (self.rows[r], self.rows[r + 1]);
            if start > end {
                return Err(LinAlgError::InvalidStructure(format!(
                    "row offsets decrease at row {r} ({start} > {end})"
                )));
            }
            let mut previous: Option<usize> = None;
            for &c in &self.cols[start..end] {
                if c >= self.num_cols {
                    return Err(LinAlgError::InvalidStructure(format!(
                        "column {c} in row {r} is out of bounds for {} columns",
                        self.num_cols
                    )));
                }
                if previous.is_some_and(|p| p >= c) {
                    return Err(LinAlgError::InvalidStructure(format!(
                        "columns of row {r} are not strictly increasing"
                    )));
                }
                let outside = match self.storage_type {
                    StorageType::LowerTriangular => c > r,
                    StorageType::UpperTriangular => c < r,
                    StorageType::Unsymmetric => false,
                };
                if outside {
                    return Err(LinAlgError::InvalidStructure(format!(
                        "entry ({r}, {c}) is outside the {:?} triangle",
                        self.storage_type
                    )));
                }
                previous = Some(c);
            }
        }
        Ok(())
    }

    /// y += M·x, expanding the stored triangle for symmetric matrices.
    pub fn right_multiply_and_accumulate(&self, x: &[f64], y: &mut [f64]) {
        assert_eq!(x.len(), self.num_cols);
        assert_eq!(y.len(), self.num_rows);
        for r in 0..self.num_rows {
            for idx in self.rows[r]..self.rows[r + 1] {
                let c = self.cols[idx];
                let v = self.values[idx];
                y[r] += v * x[c];
                if self.storage_type.is_symmetric() && c != r {
                    y[c] += v * x[r];
                }
            }
        }
    }

    /// Reinterprets the row-major arrays as a column-major matrix without copying.
    pub fn transposed_view(&self) -> SymmetricTransposeView<'_> {
        SymmetricTransposeView {
            dimension: self.num_rows,
            col_ptrs: &self.rows,
            row_indices: &self.cols,
            values: &self.values,
            storage_type: self.storage_type.transposed(),
        }
    }

    /// Dense copy, with the missing triangle filled in for symmetric storage.
    pub fn to_dense(&self) -> DMatrix<f64> {
        let mut dense = DMatrix::zeros(self.num_rows, self.num_cols);
        for r in 0..self.num_rows {
            for idx in self.rows[r]..self.rows[r + 1] {
                let c = self.cols[idx];
                dense[(r, c)] += self.values[idx];
                if self.storage_type.is_symmetric() && c != r {
                    dense[(c, r)] += self.values[idx];
                }
            }
        }
        dense
    }
}

/// Column-major view borrowing the arrays of a symmetric [`CompressedRowSparseMatrix`].
///
/// A symmetric matrix stored row-major is also a valid column-major storage
/// of its transpose, which is the same matrix. The view therefore reuses the
/// owner's row offsets as column pointers and its column indices as row
/// indices, and the stored triangle flips. The view must not outlive the
/// owner, and is only meaningful when the owner's storage type is symmetric;
/// neither condition beyond the borrow is enforced by the type.
#[derive(Debug, Clone, Copy)]
pub struct SymmetricTransposeView<'a> {
    dimension: usize,
    col_ptrs: &'a [usize],
    row_indices: &'a [usize],
    values: &'a [f64],
    storage_type: StorageType,
}

impl<'a> SymmetricTransposeView<'a> {
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn col_ptrs(&self) -> &'a [usize] {
        self.col_ptrs
    }

    pub fn row_indices(&self) -> &'a [usize] {
        self.row_indices
    }

    pub fn values(&self) -> &'a [f64] {
        self.values
    }

    pub fn storage_type(&self) -> StorageType {
        self.storage_type
    }
}
