use nalgebra::DVector;

use crate::error::FsiError;
use crate::linalg::SparseMatrix;

/// Structural conditioning transform (STC) applied to the structure unknowns.
///
/// With a transformation matrix `K` the structure increment is solved for as
/// `x_s = K y`. `Curr` right-multiplies every block acting on structure
/// columns by `K`; `CurrSym` additionally left-multiplies every block in
/// structure rows, and the structure right-hand side, by `K^T`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StcStrategy {
    #[default]
    Inactive,
    Curr,
    CurrSym,
}

impl StcStrategy {
    pub fn is_active(self) -> bool {
        self != StcStrategy::Inactive
    }

    pub fn is_symmetric(self) -> bool {
        self == StcStrategy::CurrSym
    }

    fn mat(self, stc: Option<&SparseMatrix>) -> Result<&SparseMatrix, FsiError> {
        stc.ok_or(FsiError::MissingState("stc matrix"))
    }

    /// K^T B for `CurrSym`, B otherwise.
    pub fn transform_rows(
        self,
        block: SparseMatrix,
        stc: Option<&SparseMatrix>,
    ) -> Result<SparseMatrix, FsiError> {
        if !self.is_symmetric() {
            return Ok(block);
        }
        SparseMatrix::multiply(self.mat(stc)?, true, &block, false)
    }

    /// B K for any active strategy.
    pub fn transform_cols(
        self,
        block: SparseMatrix,
        stc: Option<&SparseMatrix>,
    ) -> Result<SparseMatrix, FsiError> {
        if !self.is_active() {
            return Ok(block);
        }
        SparseMatrix::multiply(&block, false, self.mat(stc)?, false)
    }

    /// The structure diagonal block: S K, then K^T (S K) for `CurrSym`.
    pub fn transform_structure_block(
        self,
        block: SparseMatrix,
        stc: Option<&SparseMatrix>,
    ) -> Result<SparseMatrix, FsiError> {
        let block = self.transform_cols(block, stc)?;
        self.transform_rows(block, stc)
    }

    /// K^T v for `CurrSym`, v otherwise.
    pub fn transform_rhs(
        self,
        v: DVector<f64>,
        stc: Option<&SparseMatrix>,
    ) -> Result<DVector<f64>, FsiError> {
        if !self.is_symmetric() {
            return Ok(v);
        }
        let k = self.mat(stc)?;
        k.row_map().check_vector(&v, "stc right-hand side")?;
        let mut out = DVector::zeros(k.domain_map().len());
        for (r, c, val) in k.entries() {
            if let (Some(i), Some(j)) = (k.row_map().lid(r), k.domain_map().lid(c)) {
                out[j] += val * v[i];
            }
        }
        Ok(out)
    }

    /// x_s = K y for any active strategy.
    pub fn recover_solution(
        self,
        y: DVector<f64>,
        stc: Option<&SparseMatrix>,
    ) -> Result<DVector<f64>, FsiError> {
        if !self.is_active() {
            return Ok(y);
        }
        self.mat(stc)?.apply(&y)
    }
}
