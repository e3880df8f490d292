use nalgebra::{DMatrix, DVector};

use super::map::{DofMap, MultiMapExtractor};
use super::sparse::SparseMatrix;
use crate::error::FsiError;

/// Grid of sparse blocks over disjoint row and domain block maps.
#[derive(Clone, Debug)]
pub struct BlockSparseMatrix {
    range: MultiMapExtractor,
    domain: MultiMapExtractor,
    blocks: Vec<SparseMatrix>,
}

impl BlockSparseMatrix {
    pub fn new(range: MultiMapExtractor, domain: MultiMapExtractor) -> Self {
        let mut blocks = Vec::with_capacity(range.num_maps() * domain.num_maps());
        for r in 0..range.num_maps() {
            for c in 0..domain.num_maps() {
                blocks.push(SparseMatrix::new(range.map(r).clone(), domain.map(c).clone()));
            }
        }
        Self {
            range,
            domain,
            blocks,
        }
    }

    /// Split a matrix over the full maps into blocks; all blocks are completed.
    pub fn split(
        m: &SparseMatrix,
        range: MultiMapExtractor,
        domain: MultiMapExtractor,
    ) -> Result<Self, FsiError> {
        let mut out = Self::new(range, domain);
        let owner = |ex: &MultiMapExtractor, gid: usize| {
            (0..ex.num_maps()).find(|&b| ex.map(b).contains(gid))
        };
        for (r, c, v) in m.entries() {
            let br = owner(&out.range, r).ok_or(FsiError::DofNotInMap {
                gid: r,
                map: "block range",
            })?;
            let bc = owner(&out.domain, c).ok_or(FsiError::DofNotInMap {
                gid: c,
                map: "block domain",
            })?;
            out.matrix_mut(br, bc).insert(r, c, v)?;
        }
        out.complete()?;
        Ok(out)
    }

    pub fn rows(&self) -> usize {
        self.range.num_maps()
    }

    pub fn cols(&self) -> usize {
        self.domain.num_maps()
    }

    pub fn range_extractor(&self) -> &MultiMapExtractor {
        &self.range
    }

    pub fn domain_extractor(&self) -> &MultiMapExtractor {
        &self.domain
    }

    pub fn full_row_map(&self) -> &DofMap {
        self.range.full_map()
    }

    pub fn full_domain_map(&self) -> &DofMap {
        self.domain.full_map()
    }

    fn index(&self, r: usize, c: usize) -> usize {
        r * self.cols() + c
    }

    pub fn matrix(&self, r: usize, c: usize) -> &SparseMatrix {
        &self.blocks[self.index(r, c)]
    }

    pub fn matrix_mut(&mut self, r: usize, c: usize) -> &mut SparseMatrix {
        let idx = self.index(r, c);
        &mut self.blocks[idx]
    }

    /// Replace block (`r`, `c`). The matrix must live on the block's maps.
    pub fn assign(&mut self, r: usize, c: usize, m: SparseMatrix) -> Result<(), FsiError> {
        if m.row_map() != self.range.map(r) || m.domain_map() != self.domain.map(c) {
            return Err(FsiError::MapMismatch {
                context: "block assignment",
                expected: self.range.map(r).len() * self.domain.map(c).len(),
                actual: m.row_map().len() * m.domain_map().len(),
            });
        }
        let idx = self.index(r, c);
        self.blocks[idx] = m;
        Ok(())
    }

    /// Empty every block and put it back into the filling state.
    pub fn begin_insertion(&mut self) {
        self.blocks.iter_mut().for_each(SparseMatrix::reset);
    }

    /// Complete every block that is still being filled.
    pub fn complete(&mut self) -> Result<(), FsiError> {
        for b in self.blocks.iter_mut().filter(|b| !b.is_filled()) {
            b.complete()?;
        }
        Ok(())
    }

    pub fn is_filled(&self) -> bool {
        self.blocks.iter().all(SparseMatrix::is_filled)
    }

    pub fn apply(&self, x: &DVector<f64>) -> Result<DVector<f64>, FsiError> {
        let mut y = DVector::zeros(self.full_row_map().len());
        for c in 0..self.cols() {
            let xc = self.domain.extract_vector(x, c)?;
            for r in 0..self.rows() {
                let yr = self.matrix(r, c).apply(&xc)?;
                self.range.add_vector(&yr, r, &mut y, 1.0)?;
            }
        }
        Ok(y)
    }

    /// Zero the rows of `dbc` in every block; diagonal blocks get a unit
    /// diagonal when `diagonal` is set.
    pub fn apply_dirichlet(&mut self, dbc: &DofMap, diagonal: bool) -> Result<(), FsiError> {
        let cols = self.cols();
        for (idx, b) in self.blocks.iter_mut().enumerate() {
            b.apply_dirichlet(dbc, diagonal && idx / cols == idx % cols)?;
        }
        Ok(())
    }

    /// Merge all blocks into one completed matrix over the full maps.
    pub fn merged(&self) -> Result<SparseMatrix, FsiError> {
        let mut m = SparseMatrix::new(self.full_row_map().clone(), self.full_domain_map().clone());
        for b in &self.blocks {
            m.add(b, false, 1.0, 1.0)?;
        }
        m.complete()?;
        Ok(m)
    }

    pub fn to_dense(&self) -> DMatrix<f64> {
        let rows = self.full_row_map();
        let cols = self.full_domain_map();
        let mut dense = DMatrix::zeros(rows.len(), cols.len());
        for b in &self.blocks {
            for (r, c, v) in b.entries() {
                if let (Some(i), Some(j)) = (rows.lid(r), cols.lid(c)) {
                    dense[(i, j)] += v;
                }
            }
        }
        dense
    }
}
