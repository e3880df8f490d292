//! Error-based time step size selection for the coupled problem.

use tracing::debug;

use crate::config::{AuxIntegrator, TimeAdaptivityParams};

/// Local truncation error norms of one time step.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ErrorNorms {
    /// All structure DOFs.
    pub structure: f64,
    /// Structure DOFs on the FSI interface.
    pub structure_fsi: f64,
    /// Inner fluid velocities; `None` without an auxiliary fluid integrator.
    pub fluid_inner: Option<f64>,
}

/// Order of the explicit structure estimator.
const STRUCTURE_ESTIMATOR_ORDER: u32 = 1;

pub struct AdaptiveStepSelector {
    params: TimeAdaptivityParams,
    dt_history: Vec<f64>,
    increase_requests: usize,
}

impl AdaptiveStepSelector {
    pub fn new(params: TimeAdaptivityParams) -> Self {
        Self {
            params,
            dt_history: Vec::new(),
            increase_requests: 0,
        }
    }

    pub fn params(&self) -> &TimeAdaptivityParams {
        &self.params
    }

    pub fn structure_enabled(&self) -> bool {
        self.params.structure_error_estimation
    }

    pub fn fluid_enabled(&self) -> bool {
        self.params.aux_integrator_fluid != AuxIntegrator::None
    }

    fn fluid_order(&self) -> u32 {
        match self.params.aux_integrator_fluid {
            AuxIntegrator::Ab2 => 2,
            AuxIntegrator::ExplicitEuler | AuxIntegrator::None => 1,
        }
    }

    /// dt·safety·(tol/norm)^(1/(order+1)), limited by the size ratios and
    /// the absolute bounds.
    pub fn calculate_time_step_size(&self, norm: f64, tol: f64, order: u32, dt: f64) -> f64 {
        let p = &self.params;
        let ratio = if norm > f64::EPSILON * tol {
            p.safety_factor * (tol / norm).powf(1.0 / (order as f64 + 1.0))
        } else {
            p.size_ratio_max
        };
        let ratio = ratio.clamp(p.size_ratio_min, p.size_ratio_max);
        (dt * ratio).clamp(p.dtmin, p.dtmax)
    }

    /// Smallest step size suggested by the enabled estimators; `dt` when none is enabled.
    pub fn select_dt_error_based(&self, norms: &ErrorNorms, dt: f64) -> f64 {
        let mut suggestions = Vec::with_capacity(3);
        if self.structure_enabled() {
            let tol = self.params.loc_err_tol_structure;
            suggestions.push(self.calculate_time_step_size(norms.structure, tol, STRUCTURE_ESTIMATOR_ORDER, dt));
            suggestions.push(self.calculate_time_step_size(
                norms.structure_fsi,
                tol,
                STRUCTURE_ESTIMATOR_ORDER,
                dt,
            ));
        }
        if self.fluid_enabled() {
            if let Some(norm) = norms.fluid_inner {
                suggestions.push(self.calculate_time_step_size(
                    norm,
                    self.params.loc_err_tol_fluid,
                    self.fluid_order(),
                    dt,
                ));
            }
        }
        suggestions.into_iter().reduce(f64::min).unwrap_or(dt)
    }

    /// Every enabled estimator is below its tolerance. True when none is enabled.
    pub fn set_accepted(&self, norms: &ErrorNorms) -> bool {
        let structure_ok = !self.structure_enabled()
            || norms.structure.max(norms.structure_fsi) < self.params.loc_err_tol_structure;
        let fluid_ok = !self.fluid_enabled()
            || norms
                .fluid_inner
                .is_none_or(|n| n < self.params.loc_err_tol_fluid);
        structure_ok && fluid_ok
    }

    /// Step size for the next step after `dt` was accepted.
    ///
    /// Reductions apply at once. An increase is only granted after
    /// `num_increase_steps` consecutive requests and is then averaged with the
    /// previous accepted sizes using the `averaging_dt` weights.
    pub fn next_dt(&mut self, norms: &ErrorNorms, dt: f64) -> f64 {
        self.dt_history.push(dt);
        let candidate = self.select_dt_error_based(norms, dt);
        if candidate <= dt {
            self.increase_requests = 0;
            return candidate;
        }

        self.increase_requests += 1;
        if self.increase_requests < self.params.num_increase_steps {
            debug!(
                requests = self.increase_requests,
                needed = self.params.num_increase_steps,
                "deferring time step increase"
            );
            return dt;
        }
        self.increase_requests = 0;
        self.averaged(candidate).clamp(self.params.dtmin, self.params.dtmax)
    }

    /// The last weight applies to `candidate`, earlier weights to the most
    /// recent accepted step sizes.
    fn averaged(&self, candidate: f64) -> f64 {
        let weights = &self.params.averaging_dt;
        let Some((&w_new, w_old)) = weights.split_last() else {
            return candidate;
        };
        let mut sum = w_new * candidate;
        let mut total = w_new;
        for (w, dt) in w_old.iter().rev().zip(self.dt_history.iter().rev()) {
            sum += w * dt;
            total += w;
        }
        if total > 0.0 { sum / total } else { candidate }
    }

    /// Step size for a repetition after the step with `dt` was rejected.
    pub fn retry_dt(&self, norms: &ErrorNorms, dt: f64) -> f64 {
        self.select_dt_error_based(norms, dt)
    }
}
