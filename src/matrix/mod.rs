//! Sparse matrix containers consumed and produced by the normal-equations core.
//!
//! - [`BlockSparseMatrix`]: row-major block-sparse Jacobian
//! - [`CompressedRowSparseMatrix`]: scalar CRS matrix, optionally storing one triangle
//! - [`SymmetricTransposeView`]: borrowed column-major view of a symmetric CRS matrix

pub mod block_sparse;
pub mod block_structure;
pub mod compressed_row;

pub use block_sparse::BlockSparseMatrix;
pub use block_structure::{Block, Cell, CompressedRow, CompressedRowBlockStructure};
pub use compressed_row::{CompressedRowSparseMatrix, StorageType, SymmetricTransposeView};
