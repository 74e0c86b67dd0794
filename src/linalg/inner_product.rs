//! Pattern-once computation of the symmetric product `AᵀA`.
//!
//! `InnerProductBuilder` inspects the block structure of a block-sparse `A`
//! once, allocates a compressed-row matrix holding one triangle of `AᵀA`, and
//! records for every product of two cells where in that matrix the block
//! product lands. Subsequent [`compute`](InnerProductBuilder::compute) calls
//! only multiply dense blocks and scatter them through the recorded offsets,
//! which is the hot path of every Gauss-Newton / Levenberg-Marquardt step.
//!
//! A row block with cells `c_0 .. c_k` contributes `c_iᵀ·c_j` to block
//! `(c_i.block_id, c_j.block_id)` of the product. Several row blocks
//! usually contribute to the same block; these duplicate terms share a
//! single offset and are summed in row-block order.
//!
//! The result is triangular at the scalar level: blocks on the block
//! diagonal only keep their lower (or upper) half, so scalar rows inside one
//! block row have different lengths.

use tracing::debug;

use super::{LinAlgError, LinAlgResult};
use crate::matrix::{Block, BlockSparseMatrix, CompressedRowSparseMatrix, StorageType};

/// Contribution of one cell pair to block `(row, col)` of the product.
///
/// `index` is the position of the pair in the enumeration order used by
/// [`InnerProductBuilder::compute`]; it breaks ties so the sort is total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct ProductTerm {
    row: usize,
    col: usize,
    index: usize,
}

pub struct InnerProductBuilder {
    result: CompressedRowSparseMatrix,
    /// Value offset of the first scalar row of every product term's block,
    /// indexed by `ProductTerm::index`
    result_offsets: Vec<usize>,
    start_row_block: usize,
    end_row_block: usize,
    storage_type: StorageType,
}

impl InnerProductBuilder {
    /// Builder for the product over all row blocks of `m`.
    pub fn new(m: &BlockSparseMatrix, storage_type: StorageType) -> LinAlgResult<Self> {
        Self::new_for_row_range(m, 0, m.num_row_blocks(), storage_type)
    }

    /// Builder for the product restricted to row blocks `start_row_block..end_row_block`.
    ///
    /// Only the triangle named by `storage_type` is computed.
    pub fn new_for_row_range(
        m: &BlockSparseMatrix,
        start_row_block: usize,
        end_row_block: usize,
        storage_type: StorageType,
    ) -> LinAlgResult<Self> {
        if m.num_nonzeros() == 0 {
            return Err(LinAlgError::InvalidInput(
                "inner product of a matrix without non-zeros".into(),
            ));
        }
        if !storage_type.is_symmetric() {
            return Err(LinAlgError::InvalidInput(format!(
                "inner product must be stored as a triangle, got {storage_type:?}"
            )));
        }
        if start_row_block >= end_row_block || end_row_block > m.num_row_blocks() {
            return Err(LinAlgError::InvalidInput(format!(
                "row block range {start_row_block}..{end_row_block} is invalid for {} row blocks",
                m.num_row_blocks()
            )));
        }

        let mut builder = Self {
            result: CompressedRowSparseMatrix::new(0, 0, 0),
            result_offsets: Vec::new(),
            start_row_block,
            end_row_block,
            storage_type,
        };
        builder.init(m);
        Ok(builder)
    }

    fn init(&mut self, m: &BlockSparseMatrix) {
        let bs = m.block_structure();
        let col_blocks = &bs.cols;

        let mut terms = Vec::new();
        for row in &bs.rows[self.start_row_block..self.end_row_block] {
            for (i, c1) in row.cells.iter().enumerate() {
                let (begin, end) = paired_cells(self.storage_type, i, row.cells.len());
                for c2 in &row.cells[begin..end] {
                    terms.push(ProductTerm {
                        row: c1.block_id,
                        col: c2.block_id,
                        index: terms.len(),
                    });
                }
            }
        }
        terms.sort_unstable();

        let row_block_width = compute_row_block_widths(&terms, col_blocks);
        let num_cols = m.num_cols();

        // Scalar row j of a block row of size s and width w holds w - s
        // off-diagonal columns plus j + 1 (lower) or s - j (upper) columns of
        // the diagonal block.
        let mut row_lengths = Vec::with_capacity(num_cols);
        for (block, &width) in col_blocks.iter().zip(&row_block_width) {
            for j in 0..block.size {
                row_lengths.push(match (width, self.storage_type) {
                    (0, _) => 0,
                    (_, StorageType::UpperTriangular) => width - j,
                    _ => width - block.size + j + 1,
                });
            }
        }
        let num_nonzeros = row_lengths.iter().sum();

        let mut result = CompressedRowSparseMatrix::new(num_cols, num_cols, num_nonzeros);
        result.set_storage_type(self.storage_type);
        *result.mut_row_blocks() = col_blocks.clone();
        *result.mut_col_blocks() = col_blocks.clone();
        let rows = result.mut_rows();
        for (k, length) in row_lengths.iter().enumerate() {
            rows[k + 1] = rows[k] + length;
        }

        let mut result_offsets = vec![0; terms.len()];
        let (rows, cols) = result.rows_and_mut_cols();
        let mut col_nnz = 0;
        for (i, term) in terms.iter().enumerate() {
            if i > 0 {
                let previous = terms[i - 1];
                if previous.row == term.row && previous.col == term.col {
                    result_offsets[term.index] = result_offsets[previous.index];
                    continue;
                }
                if previous.row == term.row {
                    col_nnz += col_blocks[previous.col].size;
                } else {
                    col_nnz = 0;
                }
            }
            fill_column_block(
                term,
                col_nnz,
                self.storage_type,
                col_blocks,
                rows,
                cols,
                &mut result_offsets,
            );
        }

        debug!(
            "Inner product structure: {} terms over {} row blocks, {}x{} {:?} result with {} non-zeros",
            terms.len(),
            self.end_row_block - self.start_row_block,
            num_cols,
            num_cols,
            self.storage_type,
            num_nonzeros
        );

        self.result = result;
        self.result_offsets = result_offsets;
    }

    /// Recomputes the values of the product from the current values of `m`.
    ///
    /// `m` must have the block structure the builder was created with.
    ///
    /// # Panics
    /// Panics if the number of cell pairs in `m` differs from the number
    /// recorded at construction.
    pub fn compute(&mut self, m: &BlockSparseMatrix) {
        let bs = m.block_structure();
        let col_blocks = &bs.cols;
        assert_eq!(
            m.num_cols(),
            self.result.num_cols(),
            "matrix does not match the inner product structure"
        );

        let storage_type = self.storage_type;
        let upper = storage_type == StorageType::UpperTriangular;
        self.result.set_zero();
        let (rows, values) = self.result.rows_and_mut_values();

        let mut cursor = 0;
        for row in &bs.rows[self.start_row_block..self.end_row_block] {
            let num_row_block_rows = row.block.size;
            for (i, c1) in row.cells.iter().enumerate() {
                let c1_block = col_blocks[c1.block_id];
                let a1 = m.cell_values(c1, num_row_block_rows);
                let (begin, end) = paired_cells(storage_type, i, row.cells.len());

                for c2 in &row.cells[begin..end] {
                    let c2_size = col_blocks[c2.block_id].size;
                    let a2 = m.cell_values(c2, num_row_block_rows);
                    let diagonal = c1.block_id == c2.block_id;
                    let offset = self.result_offsets[cursor];
                    cursor += 1;

                    // C[r, c] += Σ_k a1[k, r] · a2[k, c]
                    for r in 0..c1_block.size {
                        let (c_begin, c_end) = match (diagonal, upper) {
                            (false, _) => (0, c2_size),
                            (true, false) => (0, r + 1),
                            (true, true) => (r, c2_size),
                        };
                        let row_start = offset + rows[c1_block.position + r]
                            - rows[c1_block.position]
                            - if upper { r } else { 0 };
                        let out = &mut values[row_start + c_begin..row_start + c_end];
                        for k in 0..num_row_block_rows {
                            let a1_kr = a1[k * c1_block.size + r];
                            let a2_row = &a2[k * c2_size + c_begin..k * c2_size + c_end];
                            for (o, &a2_kc) in out.iter_mut().zip(a2_row) {
                                *o += a1_kr * a2_kc;
                            }
                        }
                    }
                }
            }
        }

        assert_eq!(
            cursor,
            self.result_offsets.len(),
            "number of product terms changed since the inner product was built"
        );
    }

    pub fn matrix(&self) -> &CompressedRowSparseMatrix {
        &self.result
    }

    /// Mutable access to the product, e.g. to add a diagonal in place.
    /// The pattern must not be changed.
    pub fn mut_matrix(&mut self) -> &mut CompressedRowSparseMatrix {
        &mut self.result
    }

    pub fn storage_type(&self) -> StorageType {
        self.storage_type
    }

    /// Number of cell pairs multiplied by every `compute` call.
    pub fn num_product_terms(&self) -> usize {
        self.result_offsets.len()
    }
}

/// Index range into a row block's cells paired with cell `i`.
fn paired_cells(storage_type: StorageType, i: usize, num_cells: usize) -> (usize, usize) {
    match storage_type {
        StorageType::UpperTriangular => (i, num_cells),
        _ => (0, i + 1),
    }
}

/// Sum of the widths of the distinct column blocks in every block row of the
/// product, diagonal block included. `terms` must be sorted.
fn compute_row_block_widths(terms: &[ProductTerm], col_blocks: &[Block]) -> Vec<usize> {
    let mut row_block_width = vec![0; col_blocks.len()];
    let Some(first) = terms.first() else {
        return row_block_width;
    };

    row_block_width[first.row] = col_blocks[first.col].size;
    for pair in terms.windows(2) {
        let (previous, current) = (pair[0], pair[1]);
        if current.row != previous.row || current.col != previous.col {
            row_block_width[current.row] += col_blocks[current.col].size;
        }
    }
    row_block_width
}

/// Records the value offset of `term` and writes the column indices of its
/// block into every scalar row of the block row.
///
/// `col_nnz` is the combined width of the blocks to the left of `term` in its
/// block row. In upper storage the diagonal block comes first and loses `j`
/// columns in scalar row `j`, which shifts every block of that row left.
fn fill_column_block(
    term: &ProductTerm,
    col_nnz: usize,
    storage_type: StorageType,
    col_blocks: &[Block],
    rows: &[usize],
    cols: &mut [usize],
    result_offsets: &mut [usize],
) {
    let row_block = col_blocks[term.row];
    let col_block = col_blocks[term.col];
    let upper = storage_type == StorageType::UpperTriangular;
    let diagonal = term.row == term.col;

    result_offsets[term.index] = rows[row_block.position] + col_nnz;

    for j in 0..row_block.size {
        let (c_begin, c_end) = match (diagonal, upper) {
            (false, _) => (0, col_block.size),
            (true, false) => (0, j + 1),
            (true, true) => (j, col_block.size),
        };
        let row_start = rows[row_block.position + j] + col_nnz - if upper { j } else { 0 };
        for c in c_begin..c_end {
            cols[row_start + c] = col_block.position + c;
        }
    }
}
