//! Full symmetric pattern built from a stored lower triangle.
//!
//! Backends that need both triangles (`nalgebra-sparse`, or `sprs-ldl` under
//! a permutation) expand the pattern once and keep a scatter map from every
//! full slot back to its source value, so later factorizations only gather.

use crate::matrix::CompressedRowSparseMatrix;

pub(crate) struct SymmetricExpansion {
    /// Compressed offsets of the full pattern, `dimension + 1` entries
    pub(crate) offsets: Vec<usize>,
    /// Sorted minor indices of the full pattern
    pub(crate) indices: Vec<usize>,
    /// Index into the lower triangle's values for every slot of the full pattern
    scatter: Vec<usize>,
    num_lower_nonzeros: usize,
}

impl SymmetricExpansion {
    /// `lhs` must be a structurally valid lower triangle.
    pub(crate) fn from_lower(lhs: &CompressedRowSparseMatrix) -> Self {
        let n = lhs.num_rows();
        let rows = lhs.rows();
        let cols = lhs.cols();

        let mut offsets = vec![0usize; n + 1];
        for r in 0..n {
            for &c in &cols[rows[r]..rows[r + 1]] {
                offsets[r + 1] += 1;
                if c != r {
                    offsets[c + 1] += 1;
                }
            }
        }
        for r in 0..n {
            offsets[r + 1] += offsets[r];
        }

        let full_nnz = offsets[n];
        let mut indices = vec![0usize; full_nnz];
        let mut scatter = vec![0usize; full_nnz];
        let mut cursor = offsets[..n].to_vec();

        // Row r holds its own lower entries (columns <= r) followed by the
        // mirrored entries of rows below it, so every row stays sorted.
        for r in 0..n {
            for idx in rows[r]..rows[r + 1] {
                indices[cursor[r]] = cols[idx];
                scatter[cursor[r]] = idx;
                cursor[r] += 1;
            }
        }
        for r in 0..n {
            for idx in rows[r]..rows[r + 1] {
                let c = cols[idx];
                if c != r {
                    indices[cursor[c]] = r;
                    scatter[cursor[c]] = idx;
                    cursor[c] += 1;
                }
            }
        }

        Self {
            offsets,
            indices,
            scatter,
            num_lower_nonzeros: lhs.num_nonzeros(),
        }
    }

    pub(crate) fn dimension(&self) -> usize {
        self.offsets.len() - 1
    }

    pub(crate) fn num_lower_nonzeros(&self) -> usize {
        self.num_lower_nonzeros
    }

    pub(crate) fn num_full_nonzeros(&self) -> usize {
        self.indices.len()
    }

    /// Whether `lhs` has the dimension and non-zero count this expansion was built from.
    pub(crate) fn matches(&self, lhs: &CompressedRowSparseMatrix) -> bool {
        self.dimension() == lhs.num_rows() && self.num_lower_nonzeros == lhs.num_nonzeros()
    }

    pub(crate) fn gather<T>(
        &self,
        lower_values: &[f64],
        full_values: &mut Vec<T>,
        convert: impl Fn(f64) -> T,
    ) {
        full_values.clear();
        full_values.extend(self.scatter.iter().map(|&idx| convert(lower_values[idx])));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::StorageType;

    #[test]
    fn test_expansion_mirrors_lower_triangle() {
        // Lower triangle of
        // [4 1 0]
        // [1 5 2]
        // [0 2 6]
        let lhs = CompressedRowSparseMatrix::from_triplets(
            3,
            3,
            &[(0, 0, 4.0), (1, 0, 1.0), (1, 1, 5.0), (2, 1, 2.0), (2, 2, 6.0)],
            StorageType::LowerTriangular,
        )
        .unwrap();
        let expansion = SymmetricExpansion::from_lower(&lhs);
        assert_eq!(expansion.dimension(), 3);
        assert_eq!(expansion.offsets, vec![0, 2, 5, 7]);
        assert_eq!(expansion.indices, vec![0, 1, 0, 1, 2, 1, 2]);
        assert_eq!(expansion.num_full_nonzeros(), 7);
        assert!(expansion.matches(&lhs));

        let mut full = Vec::new();
        expansion.gather(lhs.values(), &mut full, |v| v);
        assert_eq!(full, vec![4.0, 1.0, 1.0, 5.0, 2.0, 2.0, 6.0]);
    }
}
