//! Interface traction recovery and interface energy bookkeeping.

use nalgebra::DVector;
use tracing::debug;

use crate::error::FsiError;
use crate::fsi::context::IterationContext;
use crate::fsi::fluid_split::MonolithicFluidSplit;
use crate::linalg::export_vector;
use crate::numerics::IterationPhase;
use crate::physics::{
    AleField, DofPartitionProvider, FluidField, ResidualProvider, StructureField, TimeIntegration,
};

impl<S, F, A> MonolithicFluidSplit<S, F, A>
where
    S: StructureField,
    F: FluidField,
    A: AleField,
{
    /// Recover λ on the fluid interface from the condensed fluid interface
    /// equations, using the blocks of the last linearization:
    ///
    /// ```text
    /// λⁿ⁺¹ = −1/(1−θf) · ( θf·λⁿ + scale · ( r_Γ + F_ΓΓ·Δd_Γ/τ + F^G_ΓΓ·Δd_Γ
    ///                                      + F_ΓI·Δu_I + F^G_ΓI·Δd_I,ale
    ///                                      [+ dt/τ·F_ΓΓ·u_Γⁿ] ) )
    /// ```
    /// with r_Γ the fluid interface residual and Δ the last iteration increments.
    pub fn recover_lagrange_multiplier(&mut self, ctx: &IterationContext) -> Result<(), FsiError> {
        let theta_f = self.fluid.tim_int_param();
        let timescale = self.fluid.time_scaling();
        let scale = self.fluid.residual_scaling();

        let fggprev = ctx.fgg.for_recovery().ok_or(FsiError::MissingBlock("F_ΓΓ"))?;
        let fgiprev = ctx.fgi.for_recovery().ok_or(FsiError::MissingBlock("F_ΓI"))?;
        let ddginc = ctx.ddginc.as_ref().ok_or(FsiError::MissingState("interface increment"))?;
        let duiinc = ctx.duiinc.as_ref().ok_or(FsiError::MissingState("inner fluid increment"))?;

        let ddginc_f = self.couplings.struct_to_fluid(ddginc)?;

        let mut tmp = -self.fluid.interface().extract_cond_vector(self.fluid.rhs())?;
        tmp += fggprev.apply(&ddginc_f)? * timescale;
        if let Some(fmgg) = ctx.fmgg.for_recovery() {
            tmp += fmgg.apply(&ddginc_f)?;
        }
        tmp += fgiprev.apply(duiinc)?;
        if let Some(fmgi) = ctx.fmgi.for_recovery() {
            let ddialeinc = ctx
                .ddialeinc
                .as_ref()
                .ok_or(FsiError::MissingState("inner ALE increment"))?;
            tmp += fmgi.apply(&self.ale_increment_on_inner_fluid(ddialeinc)?)?;
        }
        // Newton loops leave the phase at SubsequentIteration; only a
        // recovery straight after the first assembly of a step sees uⁿ_Γ here
        if ctx.phase == IterationPhase::FirstIteration {
            tmp += fggprev.apply(&self.fluid.extract_interface_veln())? * (self.fluid.dt() * timescale);
        }

        let old = match &self.lambda_old {
            Some(l) => l * theta_f,
            None => DVector::zeros(tmp.len()),
        };
        self.lambda = (old + tmp * scale) * (-1.0 / (1.0 - theta_f));
        debug!(norm = self.lambda.norm(), "Lagrange multiplier recovered");
        Ok(())
    }

    /// Inner ALE increment as a vector over the inner fluid DOFs: velocity
    /// entries carry the mesh increment, pressure entries stay zero.
    fn ale_increment_on_inner_fluid(&self, ddialeinc: &DVector<f64>) -> Result<DVector<f64>, FsiError> {
        let ale_full = self.ale.interface().insert_other_vector(ddialeinc)?;
        let on_velocity = self.couplings.ale_to_fluid(&ale_full)?;
        export_vector(
            self.fluid.velocity_row_map(),
            &on_velocity,
            self.fluid.interface().other_map(),
        )
    }

    /// Work done by the change of interface traction over the step; added
    /// to the running sum.
    pub fn calculate_interface_energy_increment(&mut self) -> Result<f64, FsiError> {
        let theta_s = self.structure.tim_int_param();
        let theta_f = self.fluid.tim_int_param();

        let traction = match &self.lambda_old {
            Some(old) => old * (theta_s - theta_f) + &self.lambda * (theta_f - theta_s),
            None => &self.lambda * (theta_f - theta_s),
        };
        let traction = self.couplings.fluid_to_struct(&traction)?;
        let deltad = self.structure.dispnp() - self.structure.dispn();
        let deltad = self.structure.interface().extract_cond_vector(&deltad)?;

        let energy = traction.dot(&deltad);
        self.energy_sum += energy;
        debug!(energy, sum = self.energy_sum, "interface energy increment");
        Ok(energy)
    }
}
