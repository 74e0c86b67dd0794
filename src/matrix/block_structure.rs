//! Block layout shared by the block-sparse and compressed-row matrices.
//!
//! A block-sparse matrix is described by its column blocks and a list of row
//! blocks. Each row block stores the non-zero column blocks ("cells") it
//! touches together with the offset of the dense cell inside the value array.

use crate::linalg::{LinAlgError, LinAlgResult};

/// A contiguous run of scalar rows or columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Block {
    /// Number of scalar rows/columns in the block
    pub size: usize,
    /// Index of the first scalar row/column of the block
    pub position: usize,
}

impl Block {
    pub fn new(size: usize, position: usize) -> Self {
        Self { size, position }
    }
}

/// A non-zero block inside a row block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    /// Column block index
    pub block_id: usize,
    /// Offset of the first value of the dense row-major cell
    pub position: usize,
}

impl Cell {
    pub fn new(block_id: usize, position: usize) -> Self {
        Self { block_id, position }
    }
}

/// One row block and its non-zero cells, sorted by column block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompressedRow {
    pub block: Block,
    pub cells: Vec<Cell>,
}

/// Row-major block structure of a [`BlockSparseMatrix`](super::BlockSparseMatrix).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompressedRowBlockStructure {
    pub cols: Vec<Block>,
    pub rows: Vec<CompressedRow>,
}

impl CompressedRowBlockStructure {
    /// Builds column blocks laid out back to back from their sizes.
    pub fn blocks_from_sizes(sizes: &[usize]) -> Vec<Block> {
        let mut position = 0;
        sizes
            .iter()
            .map(|&size| {
                let block = Block::new(size, position);
                position += size;
                block
            })
            .collect()
    }

    pub fn num_scalar_cols(&self) -> usize {
        self.cols.last().map_or(0, |b| b.position + b.size)
    }

    pub fn num_scalar_rows(&self) -> usize {
        self.rows.last().map_or(0, |r| r.block.position + r.block.size)
    }

    /// Number of stored values implied by the cells.
    pub fn num_nonzeros(&self) -> usize {
        self.rows
            .iter()
            .map(|row| {
                row.cells
                    .iter()
                    .map(|cell| row.block.size * self.cols[cell.block_id].size)
                    .sum::<usize>()
            })
            .sum()
    }

    /// Checks block contiguity, cell ordering and that every cell fits in `num_values`.
    pub fn validate(&self, num_values: usize) -> LinAlgResult<()> {
        let mut expected_position = 0;
        for (i, block) in self.cols.iter().enumerate() {
            if block.size == 0 {
                return Err(LinAlgError::InvalidStructure(format!(
                    "column block {i} is empty"
                )));
            }
            if block.position != expected_position {
                return Err(LinAlgError::InvalidStructure(format!(
                    "column block {i} starts at {} instead of {expected_position}",
                    block.position
                )));
            }
            expected_position += block.size;
        }

        let mut expected_position = 0;
        for (r, row) in self.rows.iter().enumerate() {
            if row.block.position != expected_position {
                return Err(LinAlgError::InvalidStructure(format!(
                    "row block {r} starts at {} instead of {expected_position}",
                    row.block.position
                )));
            }
            expected_position += row.block.size;

            for (j, cell) in row.cells.iter().enumerate() {
                let col = self.cols.get(cell.block_id).ok_or_else(|| {
                    LinAlgError::InvalidStructure(format!(
                        "row block {r} references column block {} of {}",
                        cell.block_id,
                        self.cols.len()
                    ))
                })?;
                if j > 0 && row.cells[j - 1].block_id >= cell.block_id {
                    return Err(LinAlgError::InvalidStructure(format!(
                        "cells of row block {r} are not sorted by column block"
                    )));
                }
                if cell.position + row.block.size * col.size > num_values {
                    return Err(LinAlgError::InvalidStructure(format!(
                        "cell ({r}, {}) overruns the value array",
                        cell.block_id
                    )));
                }
            }
        }
        Ok(())
    }
}
