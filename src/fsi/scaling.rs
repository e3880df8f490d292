//! Infinity-norm row/column scaling of the structure and ALE blocks.

use nalgebra::DVector;

use crate::error::FsiError;
use crate::fsi::fluid_split::MonolithicFluidSplit;
use crate::linalg::BlockSparseMatrix;
use crate::physics::{AleField, FluidField, StructureField};

/// Inverse absolute row and column sums of the structure and ALE diagonal blocks.
#[derive(Clone, Debug)]
pub struct ScalingFactors {
    pub srowsum: DVector<f64>,
    pub scolsum: DVector<f64>,
    pub arowsum: DVector<f64>,
    pub acolsum: DVector<f64>,
}

impl ScalingFactors {
    fn from_matrix(mat: &BlockSparseMatrix) -> Result<Self, FsiError> {
        Ok(Self {
            srowsum: mat.matrix(0, 0).inv_row_sums()?,
            scolsum: mat.matrix(0, 0).inv_col_sums()?,
            arowsum: mat.matrix(2, 2).inv_row_sums()?,
            acolsum: mat.matrix(2, 2).inv_col_sums()?,
        })
    }

    fn reciprocal(&self) -> Self {
        let inv = |v: &DVector<f64>| v.map(|x| 1.0 / x);
        Self {
            srowsum: inv(&self.srowsum),
            scolsum: inv(&self.scolsum),
            arowsum: inv(&self.arowsum),
            acolsum: inv(&self.acolsum),
        }
    }

    /// Structure rows/columns and ALE rows/columns of every block they touch.
    fn apply_to(&self, mat: &mut BlockSparseMatrix) -> Result<(), FsiError> {
        let a00 = mat.matrix_mut(0, 0);
        a00.left_scale(&self.srowsum)?;
        a00.right_scale(&self.scolsum)?;
        mat.matrix_mut(0, 1).left_scale(&self.srowsum)?;
        mat.matrix_mut(0, 2).left_scale(&self.srowsum)?;
        mat.matrix_mut(1, 0).right_scale(&self.scolsum)?;
        mat.matrix_mut(2, 0).right_scale(&self.scolsum)?;

        let a22 = mat.matrix_mut(2, 2);
        a22.left_scale(&self.arowsum)?;
        a22.right_scale(&self.acolsum)?;
        mat.matrix_mut(2, 0).left_scale(&self.arowsum)?;
        mat.matrix_mut(2, 1).left_scale(&self.arowsum)?;
        mat.matrix_mut(0, 2).right_scale(&self.acolsum)?;
        mat.matrix_mut(1, 2).right_scale(&self.acolsum)?;
        Ok(())
    }
}

impl<S, F, A> MonolithicFluidSplit<S, F, A>
where
    S: StructureField,
    F: FluidField,
    A: AleField,
{
    /// Scale the assembled matrix and `b` when `infnorm_scaling` is on.
    pub(crate) fn apply_scaling(&mut self, b: &mut DVector<f64>) -> Result<(), FsiError> {
        if !self.params.infnorm_scaling {
            self.scaling = None;
            return Ok(());
        }
        let factors = ScalingFactors::from_matrix(&self.system_matrix)?;
        factors.apply_to(&mut self.system_matrix)?;
        self.blocks.scale_block(b, 0, &factors.srowsum)?;
        self.blocks.scale_block(b, 2, &factors.arowsum)?;
        self.scaling = Some(factors);
        Ok(())
    }

    /// Undo the scaling on the solution, the right-hand side and the matrix,
    /// then record the linear residual of the ALE rows.
    pub(crate) fn remove_scaling(&mut self, x: &mut DVector<f64>, b: &mut DVector<f64>) -> Result<(), FsiError> {
        if let Some(factors) = self.scaling.take() {
            self.blocks.scale_block(x, 0, &factors.scolsum)?;
            self.blocks.scale_block(x, 2, &factors.acolsum)?;

            let inverse = factors.reciprocal();
            self.blocks.scale_block(b, 0, &inverse.srowsum)?;
            self.blocks.scale_block(b, 2, &inverse.arowsum)?;
            inverse.apply_to(&mut self.system_matrix)?;
        }

        let r = self.system_matrix.apply(x)? + &*b;
        self.aleresidual = -self.blocks.extract_vector(&r, 2)?;
        self.log_linear_residual(&r)
    }
}
