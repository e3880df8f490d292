use tracing::{info, warn};

use crate::config::{DivergenceAction, FsiDynamicParams};
use crate::error::FsiError;
use crate::numerics::adaptivity::{AdaptiveStepSelector, ErrorNorms};
use crate::numerics::solver::{MonolithicNewton, MonolithicSystem};
use crate::processing::output::ResultWriter;
use crate::processing::summary::{RunSummary, StepRecord};

/// A monolithic system that can be marched in time.
pub trait CoupledTimeIntegrator: MonolithicSystem {
    fn time(&self) -> f64;
    fn step(&self) -> usize;
    fn dt(&self) -> f64;
    fn set_dt(&mut self, dt: f64);

    /// Advance all fields to the next time level and compute predictors.
    fn prepare_time_step(&mut self) -> Result<(), FsiError>;

    /// Post-process a finished Newton loop; returns the interface energy increment.
    fn post_converged(&mut self, ctx: &Self::Context) -> Result<f64, FsiError>;

    fn error_norms(&self) -> ErrorNorms;

    /// Return every field to the last accepted state.
    fn reset_step(&mut self);

    fn update(&mut self) -> Result<(), FsiError>;

    fn output(&self, writer: &mut dyn ResultWriter) -> Result<(), FsiError>;
}

/// Time loop around [`MonolithicNewton`] with optional error-based step size
/// control and a policy for non-converged steps.
pub struct FsiTimeLoop {
    pub newton: MonolithicNewton,
    pub numstep: usize,
    pub maxtime: f64,
    pub divercont: DivergenceAction,
    pub dtmin: f64,
    pub adapt_step_max: usize,
    pub adaptivity: Option<AdaptiveStepSelector>,
}

impl FsiTimeLoop {
    pub fn new(params: &FsiDynamicParams, newton: MonolithicNewton) -> Self {
        let ta = &params.time_adaptivity;
        Self {
            newton,
            numstep: params.numstep,
            maxtime: params.maxtime,
            divercont: ta.divercont,
            dtmin: ta.dtmin,
            adapt_step_max: ta.adapt_step_max.max(1),
            adaptivity: ta
                .time_adapt_on
                .then(|| AdaptiveStepSelector::new(ta.clone())),
        }
    }

    fn finished<M: CoupledTimeIntegrator>(&self, system: &M) -> bool {
        system.step() >= self.numstep || system.time() >= self.maxtime * (1.0 - 1e-12)
    }

    pub fn run<M>(&mut self, system: &mut M, writer: &mut dyn ResultWriter) -> Result<RunSummary, FsiError>
    where
        M: CoupledTimeIntegrator,
        M::Context: Default,
    {
        let mut summary = RunSummary::default();
        info!(
            "Starting coupled simulation: t = {:.4e}, {} steps max, T = {:.4e}",
            system.time(),
            self.numstep,
            self.maxtime
        );

        while !self.finished(system) {
            let record = self.advance(system, writer, &mut summary)?;
            summary.energy_sum += record.energy_increment;
            summary.steps.push(record);
        }
        Ok(summary)
    }

    /// Take one accepted time step, repeating it as the policies demand.
    fn advance<M>(
        &mut self,
        system: &mut M,
        writer: &mut dyn ResultWriter,
        summary: &mut RunSummary,
    ) -> Result<StepRecord, FsiError>
    where
        M: CoupledTimeIntegrator,
        M::Context: Default,
    {
        let mut attempts = 0usize;
        let mut restore_dt: Option<f64> = None;

        loop {
            attempts += 1;
            system.prepare_time_step()?;
            let mut ctx = M::Context::default();

            let iterations = match self.newton.solve(system, &mut ctx) {
                Ok(result) => result.iterations,
                Err(e) if e.is_recoverable() => match self.divercont {
                    DivergenceAction::Stop => return Err(e),
                    DivergenceAction::Continue => {
                        warn!(step = system.step(), "{e}; continuing with the unconverged state");
                        summary.unconverged_steps += 1;
                        let energy = system.post_converged(&ctx)?;
                        return self.accept(system, writer, 0, energy, None);
                    }
                    DivergenceAction::HalveStep | DivergenceAction::RevertDt => {
                        let dt = system.dt();
                        let half = 0.5 * dt;
                        if half < self.dtmin {
                            warn!(dt, dtmin = self.dtmin, "cannot halve the time step any further");
                            return Err(e);
                        }
                        warn!(step = system.step(), "{e}; repeating step with dt = {half:.4e}");
                        if self.divercont == DivergenceAction::RevertDt && restore_dt.is_none() {
                            restore_dt = Some(dt);
                        }
                        system.reset_step();
                        system.set_dt(half);
                        summary.repeated_steps += 1;
                        continue;
                    }
                },
                Err(e) => return Err(e),
            };

            let energy = system.post_converged(&ctx)?;

            let Some(selector) = self.adaptivity.as_mut() else {
                return self.accept(system, writer, iterations, energy, restore_dt);
            };

            let norms = system.error_norms();
            let accepted = selector.set_accepted(&norms) || attempts >= self.adapt_step_max;
            if !accepted {
                let retry = selector.retry_dt(&norms, system.dt());
                info!(
                    step = system.step(),
                    attempt = attempts,
                    "local error too large ({:.3e}/{:.3e}); repeating with dt = {retry:.4e}",
                    norms.structure,
                    norms.structure_fsi
                );
                system.reset_step();
                system.set_dt(retry);
                summary.repeated_steps += 1;
                continue;
            }

            let next = match restore_dt {
                Some(dt) => dt,
                None => selector.next_dt(&norms, system.dt()),
            };
            return self.accept(system, writer, iterations, energy, Some(next));
        }
    }

    fn accept<M: CoupledTimeIntegrator>(
        &self,
        system: &mut M,
        writer: &mut dyn ResultWriter,
        iterations: u32,
        energy_increment: f64,
        next_dt: Option<f64>,
    ) -> Result<StepRecord, FsiError> {
        let record = StepRecord {
            step: system.step(),
            time: system.time(),
            dt: system.dt(),
            iterations,
            energy_increment,
        };
        system.update()?;
        system.output(writer)?;
        info!(
            "Step {:>4} | t = {:.4e} | dt = {:.3e} | iters = {}",
            record.step, record.time, record.dt, record.iterations
        );
        if let Some(dt) = next_dt {
            system.set_dt(dt);
        }
        Ok(record)
    }
}
