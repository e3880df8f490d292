pub mod adaptivity;
pub mod linear;
pub mod solver;
pub mod status;
pub mod timing;
pub mod transient;

use nalgebra::DVector;

/// Reference norms below this are treated as zero in relative checks.
pub const NEGLIGIBLE_REFERENCE_NORM: f64 = 1e-14;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Tolerance {
    Absolute(f64),
    Relative(f64),
    Combined(f64, f64),
}

impl Tolerance {
    /// A relative check against a negligible reference falls back to
    /// comparing the absolute norm with the same tolerance.
    pub fn check(&self, norm: f64, reference: f64) -> bool {
        let relative = |tol: f64| {
            if reference < NEGLIGIBLE_REFERENCE_NORM {
                norm < tol
            } else {
                norm / reference < tol
            }
        };
        match *self {
            Tolerance::Absolute(tol) => norm < tol,
            Tolerance::Relative(tol) => relative(tol),
            Tolerance::Combined(abs_tol, rel_tol) => norm < abs_tol || relative(rel_tol),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConvergenceMetric {
    L2Norm,
    MaxNorm,
}

impl ConvergenceMetric {
    pub fn norm(&self, vector: &DVector<f64>) -> f64 {
        match self {
            ConvergenceMetric::L2Norm => vector.norm(),
            ConvergenceMetric::MaxNorm => vector.amax(),
        }
    }
}

/// Position of a Newton iteration within its time step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IterationPhase {
    #[default]
    FirstIteration,
    SubsequentIteration,
}

impl IterationPhase {
    pub fn of(iteration: u32) -> Self {
        if iteration == 0 {
            IterationPhase::FirstIteration
        } else {
            IterationPhase::SubsequentIteration
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_check_guards_zero_reference() {
        let tol = Tolerance::Relative(1e-6);
        assert!(tol.check(1e-8, 0.0));
        assert!(!tol.check(1e-3, 0.0));
        assert!(tol.check(1e-3, 1e4));
        assert!(Tolerance::Combined(1e-10, 1e-2).check(0.5, 100.0));
    }
}
