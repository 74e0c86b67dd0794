//! Row-major block-sparse matrix used for Jacobians.
//!
//! Every cell is a dense row-major block stored at `cell.position` in the
//! value array. Row blocks can be appended and removed from the end, which is
//! how the normal-equations solver injects the Levenberg-Marquardt damping
//! rows for the duration of a single inner product.

use nalgebra::DMatrix;

use super::block_structure::{Block, Cell, CompressedRow, CompressedRowBlockStructure};
use crate::linalg::{LinAlgError, LinAlgResult};

#[derive(Debug, Clone)]
pub struct BlockSparseMatrix {
    block_structure: CompressedRowBlockStructure,
    values: Vec<f64>,
    num_rows: usize,
    num_cols: usize,
    num_nonzeros: usize,
}

impl BlockSparseMatrix {
    /// Creates a zero-valued matrix with the given structure.
    pub fn new(block_structure: CompressedRowBlockStructure) -> LinAlgResult<Self> {
        let num_nonzeros = block_structure.num_nonzeros();
        Self::from_parts(block_structure, vec![0.0; num_nonzeros])
    }

    /// Creates a matrix from a structure and its value array.
    pub fn from_parts(
        block_structure: CompressedRowBlockStructure,
        values: Vec<f64>,
    ) -> LinAlgResult<Self> {
        let num_nonzeros = block_structure.num_nonzeros();
        if values.len() != num_nonzeros {
            return Err(LinAlgError::DimensionMismatch {
                expected: num_nonzeros,
                actual: values.len(),
            });
        }
        block_structure.validate(values.len())?;

        Ok(Self {
            num_rows: block_structure.num_scalar_rows(),
            num_cols: block_structure.num_scalar_cols(),
            num_nonzeros,
            block_structure,
            values,
        })
    }

    /// Creates a zero-valued matrix from column block sizes and, per row
    /// block, its size and the column blocks it touches.
    ///
    /// Cells are laid out row block by row block in the order given.
    pub fn from_block_pattern(
        col_block_sizes: &[usize],
        row_blocks: &[(usize, Vec<usize>)],
    ) -> LinAlgResult<Self> {
        let cols = CompressedRowBlockStructure::blocks_from_sizes(col_block_sizes);
        let mut rows = Vec::with_capacity(row_blocks.len());
        let mut row_position = 0;
        let mut value_position = 0;
        for (row_size, col_ids) in row_blocks {
            let mut cells = Vec::with_capacity(col_ids.len());
            for &block_id in col_ids {
                let col = cols.get(block_id).ok_or_else(|| {
                    LinAlgError::InvalidInput(format!(
                        "column block {block_id} of {}",
                        cols.len()
                    ))
                })?;
                cells.push(Cell::new(block_id, value_position));
                value_position += row_size * col.size;
            }
            rows.push(CompressedRow {
                block: Block::new(*row_size, row_position),
                cells,
            });
            row_position += row_size;
        }

        Self::new(CompressedRowBlockStructure { cols, rows })
    }

    /// Creates a block diagonal matrix whose scalar diagonal is `diagonal`.
    ///
    /// One row block is created per column block, so appending the result to
    /// a Jacobian `A` adds `diag(diagonal)ᵀ·diag(diagonal)` to `AᵀA`.
    pub fn create_diagonal_matrix(diagonal: &[f64], column_blocks: &[Block]) -> LinAlgResult<Self> {
        let num_cols = column_blocks.last().map_or(0, |b| b.position + b.size);
        if diagonal.len() != num_cols {
            return Err(LinAlgError::DimensionMismatch {
                expected: num_cols,
                actual: diagonal.len(),
            });
        }

        let mut rows = Vec::with_capacity(column_blocks.len());
        let mut values = Vec::with_capacity(column_blocks.iter().map(|b| b.size * b.size).sum());
        for (i, block) in column_blocks.iter().enumerate() {
            rows.push(CompressedRow {
                block: *block,
                cells: vec![Cell::new(i, values.len())],
            });
            for r in 0..block.size {
                for c in 0..block.size {
                    values.push(if r == c { diagonal[block.position + r] } else { 0.0 });
                }
            }
        }

        Self::from_parts(
            CompressedRowBlockStructure {
                cols: column_blocks.to_vec(),
                rows,
            },
            values,
        )
    }

    pub fn block_structure(&self) -> &CompressedRowBlockStructure {
        &self.block_structure
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn mut_values(&mut self) -> &mut [f64] {
        &mut self.values
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    pub fn num_nonzeros(&self) -> usize {
        self.num_nonzeros
    }

    pub fn num_row_blocks(&self) -> usize {
        self.block_structure.rows.len()
    }

    pub fn num_col_blocks(&self) -> usize {
        self.block_structure.cols.len()
    }

    /// Dense row-major values of `cell`, which must belong to a row block of `row_block_size` rows.
    pub fn cell_values(&self, cell: &Cell, row_block_size: usize) -> &[f64] {
        let col_block_size = self.block_structure.cols[cell.block_id].size;
        &self.values[cell.position..cell.position + row_block_size * col_block_size]
    }

    /// y += A·x
    pub fn right_multiply_and_accumulate(&self, x: &[f64], y: &mut [f64]) {
        assert_eq!(x.len(), self.num_cols);
        assert_eq!(y.len(), self.num_rows);
        let bs = &self.block_structure;
        for row in &bs.rows {
            for cell in &row.cells {
                let col = bs.cols[cell.block_id];
                let block = self.cell_values(cell, row.block.size);
                for r in 0..row.block.size {
                    let mut sum = 0.0;
                    for c in 0..col.size {
                        sum += block[r * col.size + c] * x[col.position + c];
                    }
                    y[row.block.position + r] += sum;
                }
            }
        }
    }

    /// y += Aᵀ·x
    pub fn left_multiply_and_accumulate(&self, x: &[f64], y: &mut [f64]) {
        assert_eq!(x.len(), self.num_rows);
        assert_eq!(y.len(), self.num_cols);
        let bs = &self.block_structure;
        for row in &bs.rows {
            for cell in &row.cells {
                let col = bs.cols[cell.block_id];
                let block = self.cell_values(cell, row.block.size);
                for r in 0..row.block.size {
                    let xr = x[row.block.position + r];
                    for c in 0..col.size {
                        y[col.position + c] += block[r * col.size + c] * xr;
                    }
                }
            }
        }
    }

    /// Appends the row blocks of `m` below the existing ones.
    ///
    /// `m` must share this matrix's column blocks.
    pub fn append_rows(&mut self, m: &BlockSparseMatrix) -> LinAlgResult<()> {
        if m.block_structure.cols != self.block_structure.cols {
            return Err(LinAlgError::InvalidStructure(
                "appended rows must share the column block structure".into(),
            ));
        }

        let value_offset = self.values.len();
        for row in &m.block_structure.rows {
            let cells = row
                .cells
                .iter()
                .map(|cell| Cell::new(cell.block_id, cell.position + value_offset))
                .collect();
            self.block_structure.rows.push(CompressedRow {
                block: Block::new(row.block.size, row.block.position + self.num_rows),
                cells,
            });
        }
        self.values.extend_from_slice(&m.values);
        self.num_rows += m.num_rows;
        self.num_nonzeros += m.num_nonzeros;
        Ok(())
    }

    /// Removes the last `delta_row_blocks` row blocks.
    ///
    /// Only row blocks added by [`append_rows`](Self::append_rows) should be
    /// removed this way; their values live at the end of the value array.
    pub fn delete_row_blocks(&mut self, delta_row_blocks: usize) {
        let num_row_blocks = self.block_structure.rows.len();
        assert!(
            delta_row_blocks <= num_row_blocks,
            "cannot delete {delta_row_blocks} of {num_row_blocks} row blocks"
        );

        let bs = &mut self.block_structure;
        for _ in 0..delta_row_blocks {
            if let Some(row) = bs.rows.pop() {
                self.num_rows -= row.block.size;
                for cell in &row.cells {
                    self.num_nonzeros -= row.block.size * bs.cols[cell.block_id].size;
                }
            }
        }
        self.values.truncate(self.num_nonzeros);
    }

    pub fn to_dense(&self) -> DMatrix<f64> {
        let mut dense = DMatrix::zeros(self.num_rows, self.num_cols);
        let bs = &self.block_structure;
        for row in &bs.rows {
            for cell in &row.cells {
                let col = bs.cols[cell.block_id];
                let block = self.cell_values(cell, row.block.size);
                for r in 0..row.block.size {
                    for c in 0..col.size {
                        dense[(row.block.position + r, col.position + c)] +=
                            block[r * col.size + c];
                    }
                }
            }
        }
        dense
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // [1 2 | 0 ]
    // [0 0 | 3 ]
    // [4 5 | 6 ]
    fn small_matrix() -> BlockSparseMatrix {
        let cols = CompressedRowBlockStructure::blocks_from_sizes(&[2, 1]);
        let rows = vec![
            CompressedRow {
                block: Block::new(1, 0),
                cells: vec![Cell::new(0, 0)],
            },
            CompressedRow {
                block: Block::new(1, 1),
                cells: vec![Cell::new(1, 2)],
            },
            CompressedRow {
                block: Block::new(1, 2),
                cells: vec![Cell::new(0, 3), Cell::new(1, 5)],
            },
        ];
        BlockSparseMatrix::from_parts(
            CompressedRowBlockStructure { cols, rows },
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        )
        .unwrap()
    }

    #[test]
    fn test_dimensions() {
        let a = small_matrix();
        assert_eq!(a.num_rows(), 3);
        assert_eq!(a.num_cols(), 3);
        assert_eq!(a.num_nonzeros(), 6);
        assert_eq!(a.num_row_blocks(), 3);
        assert_eq!(a.num_col_blocks(), 2);
    }

    #[test]
    fn test_from_parts_rejects_wrong_value_count() {
        let a = small_matrix();
        let result = BlockSparseMatrix::from_parts(a.block_structure().clone(), vec![1.0; 5]);
        assert!(matches!(
            result,
            Err(LinAlgError::DimensionMismatch {
                expected: 6,
                actual: 5
            })
        ));
    }

    #[test]
    fn test_multiplies_match_dense() {
        let a = small_matrix();
        let dense = a.to_dense();
        let x = [1.0, -1.0, 2.0];

        let mut y = vec![0.5; 3];
        a.right_multiply_and_accumulate(&x, &mut y);
        let expected = dense.clone() * nalgebra::DVector::from_row_slice(&x);
        for i in 0..3 {
            assert!((y[i] - 0.5 - expected[i]).abs() < 1e-12);
        }

        let mut z = vec![0.0; 3];
        a.left_multiply_and_accumulate(&x, &mut z);
        let expected = dense.transpose() * nalgebra::DVector::from_row_slice(&x);
        for i in 0..3 {
            assert!((z[i] - expected[i]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_create_diagonal_matrix() {
        let cols = CompressedRowBlockStructure::blocks_from_sizes(&[2, 1]);
        let d = BlockSparseMatrix::create_diagonal_matrix(&[1.0, 2.0, 3.0], &cols).unwrap();
        assert_eq!(d.num_row_blocks(), 2);
        assert_eq!(d.to_dense(), DMatrix::from_diagonal(&nalgebra::dvector![1.0, 2.0, 3.0]));
    }

    #[test]
    fn test_create_diagonal_matrix_rejects_wrong_length() {
        let cols = CompressedRowBlockStructure::blocks_from_sizes(&[2, 1]);
        assert!(BlockSparseMatrix::create_diagonal_matrix(&[1.0, 2.0], &cols).is_err());
    }

    #[test]
    fn test_append_and_delete_rows() {
        let mut a = small_matrix();
        let original = a.to_dense();
        let d = BlockSparseMatrix::create_diagonal_matrix(
            &[1.0, 2.0, 3.0],
            &a.block_structure().cols.clone(),
        )
        .unwrap();

        a.append_rows(&d).unwrap();
        assert_eq!(a.num_rows(), 6);
        assert_eq!(a.num_row_blocks(), 5);
        assert_eq!(a.num_nonzeros(), 6 + 5);
        let dense = a.to_dense();
        assert_eq!(dense[(3, 0)], 1.0);
        assert_eq!(dense[(4, 1)], 2.0);
        assert_eq!(dense[(5, 2)], 3.0);

        a.delete_row_blocks(d.num_row_blocks());
        assert_eq!(a.num_rows(), 3);
        assert_eq!(a.num_row_blocks(), 3);
        assert_eq!(a.num_nonzeros(), 6);
        assert_eq!(a.values().len(), 6);
        assert_eq!(a.to_dense(), original);
    }

    #[test]
    fn test_from_block_pattern() {
        let a = BlockSparseMatrix::from_block_pattern(&[2, 1], &[(1, vec![0]), (2, vec![0, 1])])
            .unwrap();
        assert_eq!(a.num_rows(), 3);
        assert_eq!(a.num_nonzeros(), 2 + 4 + 2);
        let second = &a.block_structure().rows[1];
        assert_eq!(second.block, Block::new(2, 1));
        assert_eq!(second.cells, vec![Cell::new(0, 2), Cell::new(1, 6)]);

        assert!(BlockSparseMatrix::from_block_pattern(&[2], &[(1, vec![1])]).is_err());
        assert!(BlockSparseMatrix::from_block_pattern(&[2, 1], &[(1, vec![1, 0])]).is_err());
    }
}
