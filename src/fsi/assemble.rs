//! Global block matrix of the fluid-split scheme.
//!
//! ```text
//!  | S + c·F_ΓΓ/τ + c·F^G_ΓΓ   c·F_ΓI          c·F^G_ΓI |
//!  | F_IΓ/τ + F^G_IΓ           F_II (+ I_Γ)    F^G_II   |
//!  | A_IΓ                      0               A_II     |
//! ```
//! with τ the inverse fluid time scaling and c = (1−θs)/(1−θf) times the
//! fluid residual scaling.

use crate::coupling::{
    CouplingMasterConverter, CouplingSlaveConverter, matrix_col_transform, matrix_row_col_transform,
    matrix_row_transform,
};
use crate::error::FsiError;
use crate::fsi::context::IterationContext;
use crate::fsi::fluid_split::MonolithicFluidSplit;
use crate::linalg::SparseMatrix;
use crate::physics::{AleField, DofPartitionProvider, FluidField, JacobianProvider, StructureField};

impl<S, F, A> MonolithicFluidSplit<S, F, A>
where
    S: StructureField,
    F: FluidField,
    A: AleField,
{
    pub(crate) fn assemble_system_matrix(&mut self, ctx: &mut IterationContext) -> Result<(), FsiError> {
        let c = self.interface_weight();
        let scale = self.fluid.residual_scaling();
        let timescale = self.fluid.time_scaling();

        let stc = self.structure.stc_strategy();
        let stcmat = self.structure.stc_mat();
        let blockf = self.fluid.jacobian()?;
        let blocka = self.ale.jacobian()?;
        let mmm = self.fluid.shape_derivatives().filter(|_| self.params.shape_derivatives);

        let fii = blockf.matrix(0, 0);
        let fig = blockf.matrix(0, 1);
        let fgi = blockf.matrix(1, 0);
        let fgg = blockf.matrix(1, 1);
        let aii = blocka.matrix(0, 0);
        let aig = blocka.matrix(0, 1);

        let smap = self.blocks.map(0);
        let fmap = self.blocks.map(1);
        let amap = self.blocks.map(2);

        let sf = CouplingSlaveConverter(&self.couplings.coupsf);
        let sa = CouplingSlaveConverter(&self.couplings.coupsa);
        let fa = CouplingMasterConverter(&self.couplings.coupfa);

        let mut s = self.structure.jacobian()?.clone();
        if s.is_filled() {
            s.un_complete()?;
        }
        matrix_row_col_transform(fgg, c * scale * timescale, &sf, &sf, &mut s, true, true)?;

        let mut sfi = SparseMatrix::new(smap.clone(), fmap.clone());
        matrix_row_transform(fgi, c * scale, &sf, &mut sfi, false)?;
        sfi.complete()?;
        let sfi = stc.transform_rows(sfi, stcmat)?;

        let mut fsg = SparseMatrix::new(fmap.clone(), smap.clone());
        matrix_col_transform(fig, timescale, &sf, &mut fsg, true, false)?;
        if let Some(mmm) = mmm {
            matrix_col_transform(mmm.matrix(0, 1), 1.0, &sf, &mut fsg, false, true)?;
        }
        fsg.complete()?;
        let fsg = stc.transform_cols(fsg, stcmat)?;

        let mut ff = SparseMatrix::new(fmap.clone(), fmap.clone());
        ff.add(fii, false, 1.0, 0.0)?;
        for &gid in self.fluid.interface().cond_map().gids() {
            ff.insert(gid, gid, 1.0)?;
        }
        ff.complete()?;

        let mut asg = SparseMatrix::new(amap.clone(), smap.clone());
        matrix_col_transform(aig, 1.0, &sa, &mut asg, true, false)?;
        asg.complete()?;
        let asg = stc.transform_cols(asg, stcmat)?;

        let mut aa = SparseMatrix::new(amap.clone(), amap.clone());
        aa.add(aii, false, 1.0, 0.0)?;
        aa.complete()?;

        let mut fa_shape = SparseMatrix::new(fmap.clone(), amap.clone());
        let mut sa_shape = SparseMatrix::new(smap.clone(), amap.clone());
        if let Some(mmm) = mmm {
            let fmii = mmm.matrix(0, 0);
            let fmgi = mmm.matrix(1, 0);
            let fmgg = mmm.matrix(1, 1);
            matrix_row_col_transform(fmgg, c * scale, &sf, &sf, &mut s, false, true)?;
            matrix_col_transform(fmii, 1.0, &fa, &mut fa_shape, false, false)?;
            matrix_row_col_transform(fmgi, c * scale, &sf, &fa, &mut sa_shape, false, false)?;
        }
        fa_shape.complete()?;
        sa_shape.complete()?;
        let sa_shape = stc.transform_rows(sa_shape, stcmat)?;

        s.complete()?;
        let s = stc.transform_structure_block(s, stcmat)?;

        let snapshots = (
            Some(fgi.clone()),
            Some(fgg.clone()),
            mmm.map(|m| m.matrix(1, 0).clone()),
            mmm.map(|m| m.matrix(1, 1).clone()),
        );

        // blocks not assigned below stay empty
        let mat = &mut self.system_matrix;
        mat.begin_insertion();
        mat.assign(0, 0, s)?;
        mat.assign(0, 1, sfi)?;
        mat.assign(0, 2, sa_shape)?;
        mat.assign(1, 0, fsg)?;
        mat.assign(1, 1, ff)?;
        mat.assign(1, 2, fa_shape)?;
        mat.assign(2, 0, asg)?;
        mat.assign(2, 2, aa)?;
        mat.complete()?;
        mat.apply_dirichlet(&self.dbc_map, true)?;

        ctx.rotate_snapshots(snapshots.0, snapshots.1, snapshots.2, snapshots.3);
        Ok(())
    }
}
