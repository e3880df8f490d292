//! Right-hand side of the fluid-split system.

use nalgebra::DVector;

use crate::error::FsiError;
use crate::fsi::context::IterationContext;
use crate::fsi::fluid_split::MonolithicFluidSplit;
use crate::physics::{
    AleField, DofPartitionProvider, FluidField, JacobianProvider, ResidualProvider, StructureField,
    TimeIntegration,
};

impl<S, F, A> MonolithicFluidSplit<S, F, A>
where
    S: StructureField,
    F: FluidField,
    A: AleField,
{
    /// Field right-hand sides with the fluid interface part moved onto the
    /// structure interface, plus the linear ALE residual of the last solve.
    pub(crate) fn setup_rhs_residual(&self) -> Result<DVector<f64>, FsiError> {
        let c = self.interface_weight();
        let scale = self.fluid.residual_scaling();
        let fluid_ex = self.fluid.interface();

        let fv = self.fluid.rhs();
        let fcv = fluid_ex.extract_cond_vector(fv)?;
        let mut modsv = self.structure.rhs().clone();
        self.structure
            .interface()
            .add_cond_vector(&self.couplings.fluid_to_struct(&fcv)?, &mut modsv, c * scale)?;
        let modsv = self
            .structure
            .stc_strategy()
            .transform_rhs(modsv, self.structure.stc_mat())?;

        let fov = fluid_ex.insert_other_vector(&fluid_ex.extract_other_vector(fv)?)?;
        let aov = self.ale.interface().extract_other_vector(self.ale.rhs())?;

        let mut rhs = self.blocks.insert_vector(&modsv, 0)?;
        self.blocks.add_vector(&fov, 1, &mut rhs, 1.0)?;
        self.blocks.add_vector(&aov, 2, &mut rhs, 1.0)?;
        self.blocks.add_vector(&self.aleresidual, 2, &mut rhs, 1.0)?;
        Ok(rhs)
    }

    /// Old interface traction on the structure interface rows.
    pub(crate) fn setup_rhs_lambda(&self, rhs: &mut DVector<f64>) -> Result<(), FsiError> {
        let Some(lambda_old) = &self.lambda_old else {
            return Ok(());
        };
        let theta_s = self.structure.tim_int_param();
        let theta_f = self.fluid.tim_int_param();
        let weight = theta_s - theta_f * self.interface_weight();

        let lambdafull = self
            .structure
            .interface()
            .insert_cond_vector(&self.couplings.fluid_to_struct(lambda_old)?)?;
        self.blocks.add_vector(&lambdafull, 0, rhs, weight)
    }

    /// Terms that account for the fluid and ALE fields not yet knowing the
    /// interface predictor and the old interface velocity. Resets the
    /// iteration trackers in `ctx`.
    pub(crate) fn setup_rhs_firstiter(
        &self,
        ctx: &mut IterationContext,
        rhs: &mut DVector<f64>,
    ) -> Result<(), FsiError> {
        let ddgpred = self.ddgpred.as_ref().ok_or(FsiError::MissingState("interface predictor"))?;

        let c = self.interface_weight();
        let scale = self.fluid.residual_scaling();
        let timescale = self.fluid.time_scaling();
        let dt = self.fluid.dt();

        let blockf = self.fluid.jacobian()?;
        let blocka = self.ale.jacobian()?;
        let mmm = self.fluid.shape_derivatives().filter(|_| self.params.shape_derivatives);
        let fig = blockf.matrix(0, 1);
        let fgg = blockf.matrix(1, 1);
        let aig = blocka.matrix(0, 1);

        let fveln = self.fluid.extract_interface_veln();
        let ddgpred_f = self.couplings.struct_to_fluid(ddgpred)?;

        // structure interface rows
        let mut gamma = fgg.apply(&fveln)? * (c * scale * dt * timescale);
        gamma -= fgg.apply(&ddgpred_f)? * (c * scale * timescale);
        if let Some(mmm) = mmm {
            gamma -= mmm.matrix(1, 1).apply(&ddgpred_f)? * c;
        }
        self.add_structure_interface_rows(&gamma, rhs)?;

        // inner fluid rows
        let mut inner = fig.apply(&fveln)? * (dt * timescale);
        inner -= fig.apply(&ddgpred_f)? * timescale;
        if let Some(mmm) = mmm {
            inner -= mmm.matrix(0, 1).apply(&ddgpred_f)?;
        }
        let inner = self.fluid.interface().insert_other_vector(&inner)?;
        self.blocks.add_vector(&inner, 1, rhs, 1.0)?;

        // inner ALE rows
        let ale_rows = aig.apply(&self.couplings.struct_to_ale(ddgpred)?)?;
        self.blocks.add_vector(&ale_rows, 2, rhs, -1.0)?;

        ctx.reset_trackers(
            self.structure.interface().cond_map().len(),
            self.fluid.interface().other_map().len(),
            self.ale.interface().other_map().len(),
        );
        Ok(())
    }

    /// Map a fluid interface vector onto the structure interface rows of `rhs`.
    fn add_structure_interface_rows(&self, fluid_gamma: &DVector<f64>, rhs: &mut DVector<f64>) -> Result<(), FsiError> {
        let full = self
            .structure
            .interface()
            .insert_cond_vector(&self.couplings.fluid_to_struct(fluid_gamma)?)?;
        let full = self
            .structure
            .stc_strategy()
            .transform_rhs(full, self.structure.stc_mat())?;
        self.blocks.add_vector(&full, 0, rhs, 1.0)
    }
}
