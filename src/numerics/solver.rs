use nalgebra::DVector;
use thiserror::Error;
use tracing::{debug, info};

#[allow(unused)]
use crate::numerics::timing::{finalize_and_print, record_assembly, record_linear_solve, reset_timing};
use crate::error::FsiError;
use crate::linalg::{BlockSparseMatrix, DofMap};
use crate::numerics::IterationPhase;
use crate::numerics::linear::LinearSolver;
use crate::numerics::status::{NewtonState, StatusTest, StatusType};

#[cfg(feature = "timing")]
use std::time::Instant;

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("linear solve failed")]
    LinearSolveFailed,
    #[error("Newton's method failed to converge within {iterations} iterations")]
    NonConvergence { iterations: u32 },
}

/// A coupled nonlinear system the monolithic Newton driver can iterate on.
///
/// The unknown is the step increment `x` of all fields since the start of
/// the time step. `Context` carries the per-iteration data the system hands
/// from one call to the next.
pub trait MonolithicSystem {
    type Context;

    fn dof_row_map(&self) -> &DofMap;

    /// Push `x` into the fields and evaluate them; `None` on the first iteration.
    fn evaluate(
        &mut self,
        ctx: &mut Self::Context,
        step_increment: Option<&DVector<f64>>,
    ) -> Result<(), FsiError>;

    /// Nonlinear residual (negative right-hand side), zero on Dirichlet DOFs.
    fn residual(&mut self, ctx: &mut Self::Context, phase: IterationPhase) -> Result<DVector<f64>, FsiError>;

    fn setup_system_matrix(&mut self, ctx: &mut Self::Context) -> Result<(), FsiError>;

    fn system_matrix(&self) -> &BlockSparseMatrix;

    fn scale_system(&mut self, b: &mut DVector<f64>) -> Result<(), FsiError>;

    fn unscale_solution(&mut self, x: &mut DVector<f64>, b: &mut DVector<f64>) -> Result<(), FsiError>;

    /// Map the solved increment back to physical unknowns.
    fn recover_solution(&self, x: &mut DVector<f64>) -> Result<(), FsiError>;

    fn status_test(&self) -> &StatusTest;
}

#[derive(Clone, Copy, Debug)]
pub struct IterationRecord {
    pub iteration: u32,
    pub residual: f64,
    pub fraction: f64,
    pub step_percent: f64,
}

pub struct SolverResult {
    /// Converged step increment.
    pub solution: DVector<f64>,
    pub iterations: u32,
    pub final_residual: f64,
    pub history: Vec<IterationRecord>,
}

/// Full Newton iteration on a [`MonolithicSystem`].
pub struct MonolithicNewton {
    pub linear_solver: Box<dyn LinearSolver>,
    pub logging: bool,
}

impl MonolithicNewton {
    pub fn new(linear_solver: Box<dyn LinearSolver>) -> Self {
        Self {
            linear_solver,
            logging: true,
        }
    }

    pub fn solve<M: MonolithicSystem>(
        &self,
        system: &mut M,
        ctx: &mut M::Context,
    ) -> Result<SolverResult, FsiError> {
        #[cfg(feature = "timing")]
        {
            reset_timing();
        }

        #[cfg(feature = "timing")]
        let solve_start = Instant::now();

        let n = system.dof_row_map().len();
        let mut x: Option<DVector<f64>> = None;
        let mut last_update = DVector::zeros(n);
        let mut initial_residual: Option<DVector<f64>> = None;
        let mut previous_norm: Option<f64> = None;
        let mut history = Vec::new();

        if self.logging {
            info!("{n} unknowns");
            info!("    Iter   | Residual |  Fraction |  Step % |  Initial");
        }

        let mut iteration = 0u32;
        loop {
            let phase = IterationPhase::of(iteration);
            let residual = record_assembly(|| -> Result<DVector<f64>, FsiError> {
                system.evaluate(ctx, x.as_ref())?;
                system.residual(ctx, phase)
            })?;

            let res_norm = residual.norm();
            let init = initial_residual.get_or_insert_with(|| residual.clone());
            let init_norm = init.norm();
            let fraction = if init_norm > 0.0 { res_norm / init_norm } else { 0.0 };
            let step_percent = previous_norm.map_or(0.0, |prev: f64| {
                if prev > 0.0 { (prev - res_norm) / prev * 100.0 } else { 0.0 }
            });
            previous_norm = Some(res_norm);
            log_iteration(iteration, res_norm, fraction, step_percent, init_norm, self.logging);
            history.push(IterationRecord {
                iteration,
                residual: res_norm,
                fraction,
                step_percent,
            });

            let state = NewtonState {
                iteration,
                residual: &residual,
                update: &last_update,
                initial_residual: init,
            };
            match system.status_test().check(&state) {
                StatusType::Converged => {
                    #[cfg(feature = "timing")]
                    finalize_and_print(solve_start.elapsed());

                    return Ok(SolverResult {
                        solution: x.unwrap_or_else(|| DVector::zeros(n)),
                        iterations: iteration,
                        final_residual: res_norm,
                        history,
                    });
                }
                StatusType::Failed => {
                    #[cfg(feature = "timing")]
                    finalize_and_print(solve_start.elapsed());

                    if !res_norm.is_finite() {
                        return Err(FsiError::NonFinite("nonlinear residual"));
                    }
                    for (name, value) in system.status_test().report(&state) {
                        tracing::warn!("  {name:<16} {value:>10.3e}");
                    }
                    return Err(SolverError::NonConvergence { iterations: iteration }.into());
                }
                StatusType::Unconverged => {}
            }
            if tracing::enabled!(tracing::Level::DEBUG) {
                for (name, value) in system.status_test().report(&state) {
                    debug!("  {name:<16} {value:>10.3e}");
                }
            }

            record_assembly(|| system.setup_system_matrix(ctx))?;

            let mut b = residual;
            system.scale_system(&mut b)?;
            let mut dx = record_linear_solve(|| self.linear_solver.solve(system.system_matrix(), &(-&b)))?;
            system.unscale_solution(&mut dx, &mut b)?;
            system.recover_solution(&mut dx)?;

            x = Some(match x {
                Some(prev) => prev + &dx,
                None => dx.clone(),
            });
            last_update = dx;
            iteration += 1;
        }
    }
}

pub(crate) fn log_iteration(
    i: u32,
    res_norm: f64,
    fraction: f64,
    step_percent: f64,
    init: f64,
    logging: bool,
) {
    if !logging {
        return;
    }
    info!("{i:>4} | {res_norm:>8.3e} | {fraction:>9.3e} | {step_percent:>6.2}% | {init:>8.3e}");
}
