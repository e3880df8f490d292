use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CsrMatrix};

use super::map::DofMap;
use crate::error::FsiError;

#[derive(Clone, Debug)]
enum Storage {
    /// Local-index triplets; duplicates are summed on completion.
    Filling(Vec<(usize, usize, f64)>),
    Completed(CsrMatrix<f64>),
}

/// Sparse matrix addressed by global DOF ids.
///
/// Rows live on `row_map`, columns on `domain_map`. The matrix is either
/// being filled (insertions allowed) or completed (compressed, ready for
/// products and scaling). Calling an operation in the wrong state is a
/// [`FsiError::MatrixState`].
#[derive(Clone, Debug)]
pub struct SparseMatrix {
    row_map: DofMap,
    domain_map: DofMap,
    storage: Storage,
}

impl SparseMatrix {
    pub fn new(row_map: DofMap, domain_map: DofMap) -> Self {
        Self {
            row_map,
            domain_map,
            storage: Storage::Filling(Vec::new()),
        }
    }

    /// Completed matrix from global triplets.
    pub fn from_triplets(
        row_map: DofMap,
        domain_map: DofMap,
        triplets: &[(usize, usize, f64)],
    ) -> Result<Self, FsiError> {
        let mut m = Self::new(row_map, domain_map);
        for &(r, c, v) in triplets {
            m.insert(r, c, v)?;
        }
        m.complete()?;
        Ok(m)
    }

    pub fn identity(map: &DofMap) -> Self {
        Self {
            row_map: map.clone(),
            domain_map: map.clone(),
            storage: Storage::Completed(CsrMatrix::identity(map.len())),
        }
    }

    pub fn row_map(&self) -> &DofMap {
        &self.row_map
    }

    pub fn domain_map(&self) -> &DofMap {
        &self.domain_map
    }

    pub fn is_filled(&self) -> bool {
        matches!(self.storage, Storage::Completed(_))
    }

    pub fn nnz(&self) -> usize {
        match &self.storage {
            Storage::Filling(t) => t.len(),
            Storage::Completed(csr) => csr.nnz(),
        }
    }

    /// Drop all entries and return to the filling state.
    pub fn reset(&mut self) {
        self.storage = Storage::Filling(Vec::new());
    }

    fn triplets_mut(&mut self, op: &'static str) -> Result<&mut Vec<(usize, usize, f64)>, FsiError> {
        match &mut self.storage {
            Storage::Filling(t) => Ok(t),
            Storage::Completed(_) => Err(FsiError::MatrixState {
                op,
                expected: "filling",
            }),
        }
    }

    fn csr(&self, op: &'static str) -> Result<&CsrMatrix<f64>, FsiError> {
        match &self.storage {
            Storage::Completed(csr) => Ok(csr),
            Storage::Filling(_) => Err(FsiError::MatrixState {
                op,
                expected: "completed",
            }),
        }
    }

    fn csr_mut(&mut self, op: &'static str) -> Result<&mut CsrMatrix<f64>, FsiError> {
        match &mut self.storage {
            Storage::Completed(csr) => Ok(csr),
            Storage::Filling(_) => Err(FsiError::MatrixState {
                op,
                expected: "completed",
            }),
        }
    }

    /// Sum `value` into entry (`row`, `col`).
    pub fn insert(&mut self, row: usize, col: usize, value: f64) -> Result<(), FsiError> {
        let r = self.row_map.try_lid(row, "matrix row")?;
        let c = self.domain_map.try_lid(col, "matrix domain")?;
        self.triplets_mut("insert")?.push((r, c, value));
        Ok(())
    }

    /// `self = scalar_b * self + scalar_a * op(a)` with `op` the optional transpose.
    pub fn add(
        &mut self,
        a: &SparseMatrix,
        transpose: bool,
        scalar_a: f64,
        scalar_b: f64,
    ) -> Result<(), FsiError> {
        let mut mapped = Vec::with_capacity(a.nnz());
        for (r, c, v) in a.entries() {
            let (r, c) = if transpose { (c, r) } else { (r, c) };
            mapped.push((
                self.row_map.try_lid(r, "matrix row")?,
                self.domain_map.try_lid(c, "matrix domain")?,
                scalar_a * v,
            ));
        }
        let triplets = self.triplets_mut("add")?;
        if scalar_b == 0.0 {
            triplets.clear();
        } else if scalar_b != 1.0 {
            triplets.iter_mut().for_each(|t| t.2 *= scalar_b);
        }
        triplets.extend(mapped);
        Ok(())
    }

    pub fn complete(&mut self) -> Result<(), FsiError> {
        let (nrows, ncols) = (self.row_map.len(), self.domain_map.len());
        let triplets = self.triplets_mut("complete")?;
        let mut coo = CooMatrix::new(nrows, ncols);
        for &(r, c, v) in triplets.iter() {
            coo.push(r, c, v);
        }
        self.storage = Storage::Completed(CsrMatrix::from(&coo));
        Ok(())
    }

    /// Return a completed matrix to the filling state, keeping its entries.
    pub fn un_complete(&mut self) -> Result<(), FsiError> {
        let csr = self.csr("un_complete")?;
        let triplets = csr.triplet_iter().map(|(r, c, &v)| (r, c, v)).collect();
        self.storage = Storage::Filling(triplets);
        Ok(())
    }

    /// Entries as global (row, col, value) triplets. A filling matrix may
    /// report the same position more than once.
    pub fn entries(&self) -> Vec<(usize, usize, f64)> {
        let to_gid = |r: usize, c: usize, v: f64| (self.row_map.gid(r), self.domain_map.gid(c), v);
        match &self.storage {
            Storage::Filling(t) => t.iter().map(|&(r, c, v)| to_gid(r, c, v)).collect(),
            Storage::Completed(csr) => csr.triplet_iter().map(|(r, c, &v)| to_gid(r, c, v)).collect(),
        }
    }

    /// Value at global position (`row`, `col`); zero if not stored.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        let (Some(r), Some(c)) = (self.row_map.lid(row), self.domain_map.lid(col)) else {
            return 0.0;
        };
        match &self.storage {
            Storage::Filling(t) => t
                .iter()
                .filter(|&&(i, j, _)| i == r && j == c)
                .map(|t| t.2)
                .sum(),
            Storage::Completed(csr) => {
                let row = csr.row(r);
                row.col_indices()
                    .iter()
                    .zip(row.values())
                    .filter(|&(&j, _)| j == c)
                    .map(|(_, v)| *v)
                    .sum()
            }
        }
    }

    pub fn scale(&mut self, factor: f64) {
        match &mut self.storage {
            Storage::Filling(t) => t.iter_mut().for_each(|e| e.2 *= factor),
            Storage::Completed(csr) => csr.values_mut().iter_mut().for_each(|v| *v *= factor),
        }
    }

    /// y = A x
    pub fn apply(&self, x: &DVector<f64>) -> Result<DVector<f64>, FsiError> {
        self.domain_map.check_vector(x, "matrix apply")?;
        let csr = self.csr("apply")?;
        let mut y = DVector::zeros(self.row_map.len());
        for (i, row) in csr.row_iter().enumerate() {
            y[i] = row
                .col_indices()
                .iter()
                .zip(row.values())
                .map(|(&j, &v)| v * x[j])
                .sum();
        }
        Ok(y)
    }

    /// Row offsets, local column indices and values of the completed storage.
    pub fn csr_parts(&self) -> Result<(Vec<usize>, Vec<usize>, Vec<f64>), FsiError> {
        let csr = self.csr("csr_parts")?;
        let (offsets, cols, values) = csr.csr_data();
        Ok((offsets.to_vec(), cols.to_vec(), values.to_vec()))
    }

    /// Row i is multiplied by `s[i]`.
    pub fn left_scale(&mut self, s: &DVector<f64>) -> Result<(), FsiError> {
        self.row_map.check_vector(s, "left scale")?;
        let csr = self.csr_mut("left_scale")?;
        let offsets = csr.row_offsets().to_vec();
        let values = csr.values_mut();
        for (i, w) in offsets.windows(2).enumerate() {
            values[w[0]..w[1]].iter_mut().for_each(|v| *v *= s[i]);
        }
        Ok(())
    }

    /// Column j is multiplied by `s[j]`.
    pub fn right_scale(&mut self, s: &DVector<f64>) -> Result<(), FsiError> {
        self.domain_map.check_vector(s, "right scale")?;
        let csr = self.csr_mut("right_scale")?;
        let cols = csr.col_indices().to_vec();
        for (v, j) in csr.values_mut().iter_mut().zip(cols) {
            *v *= s[j];
        }
        Ok(())
    }

    /// Reciprocal absolute row sums. Rows without a usable sum get 1.
    pub fn inv_row_sums(&self) -> Result<DVector<f64>, FsiError> {
        let csr = self.csr("inv_row_sums")?;
        let mut sums = DVector::zeros(self.row_map.len());
        for (i, row) in csr.row_iter().enumerate() {
            sums[i] = row.values().iter().map(|v| v.abs()).sum();
        }
        Ok(sums.map(reciprocal_or_one))
    }

    /// Reciprocal absolute column sums. Columns without a usable sum get 1.
    pub fn inv_col_sums(&self) -> Result<DVector<f64>, FsiError> {
        let csr = self.csr("inv_col_sums")?;
        let mut sums = DVector::zeros(self.domain_map.len());
        for (_, j, v) in csr.triplet_iter() {
            sums[j] += v.abs();
        }
        Ok(sums.map(reciprocal_or_one))
    }

    /// Zero all rows whose gid is in `dbc`. With `diagonal`, the row's
    /// diagonal entry is set to one when the gid is also a column of this
    /// matrix. Applying twice gives the same matrix as applying once.
    pub fn apply_dirichlet(&mut self, dbc: &DofMap, diagonal: bool) -> Result<(), FsiError> {
        let row_map = &self.row_map;
        let domain_map = &self.domain_map;
        let keep = |r: usize| !dbc.contains(row_map.gid(r));
        let mut triplets: Vec<(usize, usize, f64)> = match &self.storage {
            Storage::Filling(t) => t.iter().copied().filter(|t| keep(t.0)).collect(),
            Storage::Completed(csr) => csr
                .triplet_iter()
                .filter(|t| keep(t.0))
                .map(|(r, c, &v)| (r, c, v))
                .collect(),
        };
        if diagonal {
            for &gid in dbc.gids() {
                if let (Some(r), Some(c)) = (row_map.lid(gid), domain_map.lid(gid)) {
                    triplets.push((r, c, 1.0));
                }
            }
        }
        let was_filled = self.is_filled();
        self.storage = Storage::Filling(triplets);
        if was_filled {
            self.complete()?;
        }
        Ok(())
    }

    /// op(a) * op(b) for completed operands; the product is completed.
    pub fn multiply(
        a: &SparseMatrix,
        transpose_a: bool,
        b: &SparseMatrix,
        transpose_b: bool,
    ) -> Result<SparseMatrix, FsiError> {
        let (a_rows, a_inner) = if transpose_a {
            (&a.domain_map, &a.row_map)
        } else {
            (&a.row_map, &a.domain_map)
        };
        let (b_inner, b_cols) = if transpose_b {
            (&b.domain_map, &b.row_map)
        } else {
            (&b.row_map, &b.domain_map)
        };
        if a_inner != b_inner {
            return Err(FsiError::MapMismatch {
                context: "matrix product inner dimension",
                expected: a_inner.len(),
                actual: b_inner.len(),
            });
        }
        let oriented = |m: &CsrMatrix<f64>, t: bool| if t { m.transpose() } else { m.clone() };
        let lhs = oriented(a.csr("multiply")?, transpose_a);
        let rhs = oriented(b.csr("multiply")?, transpose_b);
        Ok(SparseMatrix {
            row_map: a_rows.clone(),
            domain_map: b_cols.clone(),
            storage: Storage::Completed(&lhs * &rhs),
        })
    }

    pub fn to_dense(&self) -> DMatrix<f64> {
        let mut dense = DMatrix::zeros(self.row_map.len(), self.domain_map.len());
        match &self.storage {
            Storage::Filling(t) => t.iter().for_each(|&(r, c, v)| dense[(r, c)] += v),
            Storage::Completed(csr) => csr.triplet_iter().for_each(|(r, c, &v)| dense[(r, c)] += v),
        }
        dense
    }
}

fn reciprocal_or_one(sum: f64) -> f64 {
    if sum.is_finite() && sum > f64::MIN_POSITIVE {
        1.0 / sum
    } else {
        1.0
    }
}
