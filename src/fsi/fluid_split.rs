//! Monolithic FSI with the fluid interface DOFs condensed onto the structure.
//!
//! The global unknown vector has three blocks: all structure DOFs, all fluid
//! DOFs and the inner ALE DOFs. The fluid interface velocities are slaved to
//! the structure interface displacements, so their rows in block 1 carry a
//! trivial identity and the fluid interface equations are moved into the
//! structure interface rows. The interface traction (Lagrange multiplier) is
//! recovered after convergence.

use nalgebra::DVector;
use tracing::{debug, info};

use crate::config::{FsiDynamicParams, MonolithicSolverParams, Verbosity};
use crate::error::FsiError;
use crate::fsi::context::{IterationContext, track_increment};
use crate::fsi::couplings::FsiCouplings;
use crate::fsi::scaling::ScalingFactors;
use crate::linalg::{BlockSparseMatrix, DofMap, MultiMapExtractor};
use crate::numerics::IterationPhase;
use crate::numerics::adaptivity::ErrorNorms;
use crate::numerics::solver::MonolithicSystem;
use crate::numerics::status::StatusTest;
use crate::numerics::transient::CoupledTimeIntegrator;
use crate::physics::{AleField, DofPartitionProvider, FluidField, StructureField, TimeIntegration};
use crate::processing::output::{RestartReader, ResultWriter};

/// Name of the Lagrange multiplier in result and restart files.
pub const LAMBDA_NAME: &str = "fsilambda";

pub struct MonolithicFluidSplit<S, F, A> {
    pub(crate) structure: S,
    pub(crate) fluid: F,
    pub(crate) ale: A,
    pub(crate) couplings: FsiCouplings,

    pub(crate) params: MonolithicSolverParams,
    pub(crate) verbosity: Verbosity,
    pub(crate) results_every: usize,
    pub(crate) restart_every: usize,

    /// structure full, fluid full, ALE inner
    pub(crate) blocks: MultiMapExtractor,
    pub(crate) dbc_map: DofMap,
    pub(crate) system_matrix: BlockSparseMatrix,
    pub(crate) status: StatusTest,

    pub(crate) scaling: Option<ScalingFactors>,
    /// Linear solver residual on the inner ALE rows, fed back into the next residual.
    pub(crate) aleresidual: DVector<f64>,
    /// Predictor of the structure interface displacement step increment.
    pub(crate) ddgpred: Option<DVector<f64>>,

    /// Interface traction on the fluid interface DOFs.
    pub(crate) lambda: DVector<f64>,
    pub(crate) lambda_old: Option<DVector<f64>>,
    pub(crate) energy_sum: f64,
}

impl<S, F, A> MonolithicFluidSplit<S, F, A>
where
    S: StructureField,
    F: FluidField,
    A: AleField,
{
    pub fn new(
        structure: S,
        fluid: F,
        ale: A,
        couplings: FsiCouplings,
        params: &FsiDynamicParams,
    ) -> Result<Self, FsiError> {
        let theta_f = fluid.tim_int_param();
        if !(theta_f < 1.0) {
            return Err(FsiError::InvalidParameter(format!(
                "fluid time integration parameter {theta_f} must be below 1"
            )));
        }
        couplings.check_interfaces(
            structure.interface().cond_map(),
            fluid.interface().cond_map(),
            ale.interface().cond_map(),
        )?;

        let conflicts = DofMap::intersect_maps(fluid.dbc_map(), fluid.interface().cond_map());
        if !conflicts.is_empty() {
            return Err(FsiError::SlaveInterfaceDirichlet {
                dofs: conflicts.gids().to_vec(),
            });
        }
        if fluid.interface().other_map().is_empty() {
            return Err(FsiError::NoInnerFluidDofs);
        }

        let blocks = MultiMapExtractor::new(vec![
            structure.dof_row_map().clone(),
            fluid.dof_row_map().clone(),
            ale.interface().other_map().clone(),
        ])?;

        let ale_inner_dbc = DofMap::intersect_maps(ale.dbc_map(), ale.interface().other_map());
        let dbc_map = DofMap::merge_maps(&[structure.dbc_map(), fluid.dbc_map(), &ale_inner_dbc]);

        let system_matrix = BlockSparseMatrix::new(blocks.clone(), blocks.clone());
        let lambda = DVector::zeros(fluid.interface().cond_map().len());
        let aleresidual = DVector::zeros(ale.interface().other_map().len());

        let mut split = Self {
            structure,
            fluid,
            ale,
            couplings,
            params: params.monolithic.clone(),
            verbosity: params.verbosity,
            results_every: params.results_every,
            restart_every: params.restart_every,
            blocks,
            dbc_map,
            system_matrix,
            status: StatusTest::FiniteValue,
            scaling: None,
            aleresidual,
            ddgpred: None,
            lambda,
            lambda_old: None,
            energy_sum: 0.0,
        };
        split.status = split.create_status_test();

        info!(
            structure = split.blocks.map(0).len(),
            fluid = split.blocks.map(1).len(),
            ale_inner = split.blocks.map(2).len(),
            dirichlet = split.dbc_map.len(),
            "fluid-split monolithic system set up"
        );
        Ok(split)
    }

    pub fn structure(&self) -> &S {
        &self.structure
    }

    pub fn fluid(&self) -> &F {
        &self.fluid
    }

    pub fn ale(&self) -> &A {
        &self.ale
    }

    pub fn structure_mut(&mut self) -> &mut S {
        &mut self.structure
    }

    pub fn fluid_mut(&mut self) -> &mut F {
        &mut self.fluid
    }

    pub fn couplings(&self) -> &FsiCouplings {
        &self.couplings
    }

    pub fn extractor(&self) -> &MultiMapExtractor {
        &self.blocks
    }

    pub fn dbc_map(&self) -> &DofMap {
        &self.dbc_map
    }

    pub fn lambda(&self) -> &DVector<f64> {
        &self.lambda
    }

    pub fn lambda_old(&self) -> Option<&DVector<f64>> {
        self.lambda_old.as_ref()
    }

    pub fn energy_sum(&self) -> f64 {
        self.energy_sum
    }

    pub fn ddgpred(&self) -> Option<&DVector<f64>> {
        self.ddgpred.as_ref()
    }

    /// (1−θs)/(1−θf)
    pub(crate) fn interface_weight(&self) -> f64 {
        (1.0 - self.structure.tim_int_param()) / (1.0 - self.fluid.tim_int_param())
    }

    /// Converged status tests over structure, structure interface, inner
    /// fluid velocity and fluid pressure.
    pub fn create_status_test(&self) -> StatusTest {
        let full = self.blocks.full_map();
        let tol = &self.params.tolerances;
        StatusTest::or(vec![
            StatusTest::FiniteValue,
            StatusTest::and(vec![
                StatusTest::MinIters(1),
                StatusTest::norm_group("structure", full, self.structure.dof_row_map(), &tol.dis),
                StatusTest::norm_group("interface", full, self.structure.interface().cond_map(), &tol.fsi),
                StatusTest::norm_group("fluid velocity", full, self.fluid.inner_velocity_row_map(), &tol.vel),
                StatusTest::norm_group("fluid pressure", full, self.fluid.pressure_row_map(), &tol.pre),
            ]),
            StatusTest::MaxIters(self.params.itemax),
        ])
    }

    /// Split the global step increment into field step increments.
    ///
    /// The fluid interface velocities and ALE interface displacements follow
    /// from the structure interface displacement. Iteration increments are
    /// tracked in `ctx` for the Lagrange multiplier recovery.
    pub fn extract_field_vectors(
        &self,
        ctx: &mut IterationContext,
        x: &DVector<f64>,
    ) -> Result<(DVector<f64>, DVector<f64>, DVector<f64>), FsiError> {
        let ddgpred = self.ddgpred.as_ref().ok_or(FsiError::MissingState("interface predictor"))?;

        let sx = self.blocks.extract_vector(x, 0)?;
        let scx = self.structure.interface().extract_cond_vector(&sx)? + ddgpred;

        let aox = self.blocks.extract_vector(x, 2)?;
        let acx = self.couplings.struct_to_ale(&scx)?;
        let ale_ex = self.ale.interface();
        let mut ax = ale_ex.insert_other_vector(&aox)?;
        ale_ex.add_cond_vector(&acx, &mut ax, 1.0)?;

        let fox = self
            .fluid
            .interface()
            .extract_other_vector(&self.blocks.extract_vector(x, 1)?)?;
        let mut fcx = self.couplings.ale_to_fluid_interface(&acx)?;
        self.fluid.displacement_to_velocity(&mut fcx)?;
        let fluid_ex = self.fluid.interface();
        let mut fx = fluid_ex.insert_other_vector(&fox)?;
        fluid_ex.add_cond_vector(&fcx, &mut fx, 1.0)?;

        ctx.ddginc = Some(track_increment(&mut ctx.disgprev, &scx));
        ctx.ddialeinc = Some(track_increment(&mut ctx.solialeprev, &aox));
        ctx.duiinc = Some(track_increment(&mut ctx.soliprev, &fox));

        Ok((sx, fx, ax))
    }

    /// Mesh displacement of the ALE field handed to the fluid.
    fn move_fluid_mesh(&mut self) -> Result<(), FsiError> {
        let on_velocity = self.couplings.ale_to_fluid(self.ale.dispnp())?;
        let disp = crate::linalg::export_vector(
            self.fluid.velocity_row_map(),
            &on_velocity,
            self.fluid.dof_row_map(),
        )?;
        self.fluid.apply_mesh_displacement(&disp)
    }

    /// Restore λ and λⁿ from the restart data of `step`.
    pub fn read_restart(&mut self, reader: &dyn RestartReader, step: usize) -> Result<(), FsiError> {
        let full = reader.read_vector(step, LAMBDA_NAME)?;
        let lambda = self.fluid.interface().extract_cond_vector(&full)?;
        self.lambda_old = Some(lambda.clone());
        self.lambda = lambda;
        info!(step, "Lagrange multiplier restored from restart");
        Ok(())
    }

    /// Write λ, inserted into the full fluid map, at result and restart steps.
    pub fn output_lambda(&self, writer: &mut dyn ResultWriter) -> Result<(), FsiError> {
        let step = self.structure.step();
        let due = |every: usize| every != 0 && step % every == 0;
        if due(self.restart_every) || due(self.results_every) {
            let full = self.fluid.interface().insert_cond_vector(&self.lambda)?;
            writer.write_vector(step, self.structure.time(), LAMBDA_NAME, &full)?;
        }
        Ok(())
    }

    pub(crate) fn log_linear_residual(&self, r: &DVector<f64>) -> Result<(), FsiError> {
        if self.verbosity != Verbosity::Full {
            return Ok(());
        }
        let rs = self.blocks.extract_vector(r, 0)?;
        let rf = self.blocks.extract_vector(r, 1)?;
        let ra = self.blocks.extract_vector(r, 2)?;
        debug!(
            "linear solver quality: L2 |r|={:.3e} |rs|={:.3e} |rf|={:.3e} |ra|={:.3e}",
            r.norm(),
            rs.norm(),
            rf.norm(),
            ra.norm()
        );
        debug!(
            "linear solver quality: Linf |r|={:.3e} |rs|={:.3e} |rf|={:.3e} |ra|={:.3e}",
            r.amax(),
            rs.amax(),
            rf.amax(),
            ra.amax()
        );
        Ok(())
    }
}

impl<S, F, A> MonolithicSystem for MonolithicFluidSplit<S, F, A>
where
    S: StructureField,
    F: FluidField,
    A: AleField,
{
    type Context = IterationContext;

    fn dof_row_map(&self) -> &DofMap {
        self.blocks.full_map()
    }

    fn evaluate(&mut self, ctx: &mut IterationContext, x: Option<&DVector<f64>>) -> Result<(), FsiError> {
        let fields = x.map(|x| self.extract_field_vectors(ctx, x)).transpose()?;
        let (sx, fx, ax) = match &fields {
            Some((sx, fx, ax)) => (Some(sx), Some(fx), Some(ax)),
            None => (None, None, None),
        };
        self.structure.evaluate(sx)?;
        self.ale.evaluate(ax)?;
        self.move_fluid_mesh()?;
        self.fluid.evaluate(fx)
    }

    fn residual(&mut self, ctx: &mut IterationContext, phase: IterationPhase) -> Result<DVector<f64>, FsiError> {
        ctx.phase = phase;
        let mut rhs = self.setup_rhs_residual()?;
        self.setup_rhs_lambda(&mut rhs)?;
        if phase == IterationPhase::FirstIteration {
            self.setup_rhs_firstiter(ctx, &mut rhs)?;
        }
        for &gid in self.dbc_map.gids() {
            if let Some(lid) = self.blocks.full_map().lid(gid) {
                rhs[lid] = 0.0;
            }
        }
        Ok(-rhs)
    }

    fn setup_system_matrix(&mut self, ctx: &mut IterationContext) -> Result<(), FsiError> {
        self.assemble_system_matrix(ctx)
    }

    fn system_matrix(&self) -> &BlockSparseMatrix {
        &self.system_matrix
    }

    fn scale_system(&mut self, b: &mut DVector<f64>) -> Result<(), FsiError> {
        self.apply_scaling(b)
    }

    fn unscale_solution(&mut self, x: &mut DVector<f64>, b: &mut DVector<f64>) -> Result<(), FsiError> {
        self.remove_scaling(x, b)
    }

    fn recover_solution(&self, x: &mut DVector<f64>) -> Result<(), FsiError> {
        let stc = self.structure.stc_strategy();
        if !stc.is_active() {
            return Ok(());
        }
        let y = self.blocks.extract_vector(x, 0)?;
        let xs = stc.recover_solution(y, self.structure.stc_mat())?;
        let delta = &xs - self.blocks.extract_vector(x, 0)?;
        self.blocks.add_vector(&delta, 0, x, 1.0)
    }

    fn status_test(&self) -> &StatusTest {
        &self.status
    }
}

impl<S, F, A> CoupledTimeIntegrator for MonolithicFluidSplit<S, F, A>
where
    S: StructureField,
    F: FluidField,
    A: AleField,
{
    fn time(&self) -> f64 {
        self.structure.time()
    }

    fn step(&self) -> usize {
        self.structure.step()
    }

    fn dt(&self) -> f64 {
        self.structure.dt()
    }

    fn set_dt(&mut self, dt: f64) {
        self.structure.set_dt(dt);
        self.fluid.set_dt(dt);
        self.ale.set_dt(dt);
    }

    fn prepare_time_step(&mut self) -> Result<(), FsiError> {
        self.structure.prepare_time_step()?;
        self.fluid.prepare_time_step()?;
        self.ale.prepare_time_step()?;

        let pred = self.structure.dispnp() - self.structure.dispn();
        self.ddgpred = Some(self.structure.interface().extract_cond_vector(&pred)?);
        Ok(())
    }

    fn post_converged(&mut self, ctx: &IterationContext) -> Result<f64, FsiError> {
        self.recover_lagrange_multiplier(ctx)?;
        self.calculate_interface_energy_increment()
    }

    fn error_norms(&self) -> ErrorNorms {
        let (structure, structure_fsi) = self.structure.local_error_norms();
        ErrorNorms {
            structure,
            structure_fsi,
            fluid_inner: self.fluid.local_error_norm_inner(),
        }
    }

    fn reset_step(&mut self) {
        self.structure.reset_step();
        self.fluid.reset_step();
        self.ale.reset_step();
        self.ddgpred = None;
    }

    fn update(&mut self) -> Result<(), FsiError> {
        self.lambda_old = Some(self.lambda.clone());
        self.structure.update();
        self.fluid.update();
        self.ale.update();
        Ok(())
    }

    fn output(&self, writer: &mut dyn ResultWriter) -> Result<(), FsiError> {
        let (step, time) = (self.structure.step(), self.structure.time());
        if self.results_every != 0 && step % self.results_every == 0 {
            writer.write_vector(step, time, "structure_displacement", self.structure.dispnp())?;
            writer.write_vector(step, time, "ale_displacement", self.ale.dispnp())?;
        }
        self.output_lambda(writer)
    }
}
