//! Composite convergence tests for the monolithic Newton iteration.

use nalgebra::DVector;

use super::{ConvergenceMetric, Tolerance};
use crate::linalg::DofMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusType {
    Unconverged,
    Converged,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VectorKind {
    Residual,
    Update,
}

/// `Scaled` divides the L2 norm by the square root of the DOF count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScaleType {
    Scaled,
    Unscaled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComboKind {
    And,
    Or,
}

/// What a status test sees after the residual of an iteration is known.
pub struct NewtonState<'a> {
    pub iteration: u32,
    pub residual: &'a DVector<f64>,
    /// Last Newton increment (zero before the first solve).
    pub update: &'a DVector<f64>,
    pub initial_residual: &'a DVector<f64>,
}

#[derive(Clone, Debug)]
pub enum StatusTest {
    Combo {
        kind: ComboKind,
        tests: Vec<StatusTest>,
    },
    PartialNorm {
        name: String,
        kind: VectorKind,
        metric: ConvergenceMetric,
        scale: ScaleType,
        /// Positions of the tested DOFs in the global vector.
        lids: Vec<usize>,
        tolerance: Tolerance,
    },
    MaxIters(u32),
    MinIters(u32),
    FiniteValue,
}

impl StatusTest {
    pub fn and(tests: Vec<StatusTest>) -> Self {
        StatusTest::Combo {
            kind: ComboKind::And,
            tests,
        }
    }

    pub fn or(tests: Vec<StatusTest>) -> Self {
        StatusTest::Combo {
            kind: ComboKind::Or,
            tests,
        }
    }

    /// Partial norm test over `subset`, positioned inside the global map `full`.
    pub fn partial_norm(
        name: impl Into<String>,
        full: &DofMap,
        subset: &DofMap,
        kind: VectorKind,
        metric: ConvergenceMetric,
        scale: ScaleType,
        tolerance: f64,
    ) -> Self {
        StatusTest::PartialNorm {
            name: name.into(),
            kind,
            metric,
            scale,
            lids: subset.gids().iter().filter_map(|&g| full.lid(g)).collect(),
            tolerance: Tolerance::Absolute(tolerance),
        }
    }

    /// The four residual/update L2/inf checks of one DOF group.
    pub fn norm_group(
        name: &str,
        full: &DofMap,
        subset: &DofMap,
        tol: &crate::config::NormTolerances,
    ) -> Self {
        use ConvergenceMetric::{L2Norm, MaxNorm};
        use ScaleType::{Scaled, Unscaled};
        use VectorKind::{Residual, Update};
        StatusTest::and(vec![
            Self::partial_norm(format!("{name} res L2"), full, subset, Residual, L2Norm, Scaled, tol.res_l2),
            Self::partial_norm(format!("{name} res inf"), full, subset, Residual, MaxNorm, Unscaled, tol.res_inf),
            Self::partial_norm(format!("{name} inc L2"), full, subset, Update, L2Norm, Scaled, tol.inc_l2),
            Self::partial_norm(format!("{name} inc inf"), full, subset, Update, MaxNorm, Unscaled, tol.inc_inf),
        ])
    }

    pub fn check(&self, state: &NewtonState<'_>) -> StatusType {
        match self {
            StatusTest::Combo { kind, tests } => {
                let results: Vec<StatusType> = tests.iter().map(|t| t.check(state)).collect();
                match kind {
                    ComboKind::And => {
                        if results.contains(&StatusType::Failed) {
                            StatusType::Failed
                        } else if results.iter().all(|s| *s == StatusType::Converged) {
                            StatusType::Converged
                        } else {
                            StatusType::Unconverged
                        }
                    }
                    ComboKind::Or => results
                        .into_iter()
                        .find(|s| *s != StatusType::Unconverged)
                        .unwrap_or(StatusType::Unconverged),
                }
            }
            StatusTest::PartialNorm {
                kind,
                metric,
                scale,
                lids,
                tolerance,
                ..
            } => {
                let vector = match kind {
                    VectorKind::Residual => state.residual,
                    VectorKind::Update => state.update,
                };
                let norm = partial_norm(vector, lids, *metric, *scale);
                let reference = match kind {
                    VectorKind::Residual => partial_norm(state.initial_residual, lids, *metric, *scale),
                    VectorKind::Update => 0.0,
                };
                if tolerance.check(norm, reference) {
                    StatusType::Converged
                } else {
                    StatusType::Unconverged
                }
            }
            StatusTest::MaxIters(max) => {
                if state.iteration >= *max {
                    StatusType::Failed
                } else {
                    StatusType::Unconverged
                }
            }
            StatusTest::MinIters(min) => {
                if state.iteration >= *min {
                    StatusType::Converged
                } else {
                    StatusType::Unconverged
                }
            }
            StatusTest::FiniteValue => {
                if state.residual.iter().all(|v| v.is_finite()) {
                    StatusType::Unconverged
                } else {
                    StatusType::Failed
                }
            }
        }
    }

    /// Current norms of every partial-norm test, for the iteration log.
    pub fn report(&self, state: &NewtonState<'_>) -> Vec<(String, f64)> {
        match self {
            StatusTest::Combo { tests, .. } => tests.iter().flat_map(|t| t.report(state)).collect(),
            StatusTest::PartialNorm {
                name,
                kind,
                metric,
                scale,
                lids,
                ..
            } => {
                let v = match kind {
                    VectorKind::Residual => state.residual,
                    VectorKind::Update => state.update,
                };
                vec![(name.clone(), partial_norm(v, lids, *metric, *scale))]
            }
            _ => Vec::new(),
        }
    }
}

fn partial_norm(v: &DVector<f64>, lids: &[usize], metric: ConvergenceMetric, scale: ScaleType) -> f64 {
    if lids.is_empty() {
        return 0.0;
    }
    let part = DVector::from_iterator(lids.len(), lids.iter().map(|&l| v[l]));
    let norm = metric.norm(&part);
    match (metric, scale) {
        (ConvergenceMetric::L2Norm, ScaleType::Scaled) => norm / (lids.len() as f64).sqrt(),
        _ => norm,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NormTolerances;

    fn state<'a>(
        iteration: u32,
        residual: &'a DVector<f64>,
        update: &'a DVector<f64>,
    ) -> NewtonState<'a> {
        NewtonState {
            iteration,
            residual,
            update,
            initial_residual: residual,
        }
    }

    fn composite() -> StatusTest {
        let full = DofMap::from_range(0..4);
        let tol = NormTolerances::default();
        StatusTest::or(vec![
            StatusTest::FiniteValue,
            StatusTest::and(vec![
                StatusTest::MinIters(1),
                StatusTest::norm_group("a", &full, &DofMap::new([0, 1]), &tol),
                StatusTest::norm_group("b", &full, &DofMap::new([2, 3]), &tol),
            ]),
            StatusTest::MaxIters(5),
        ])
    }

    #[test]
    fn converges_only_after_min_iterations() {
        let zero = DVector::zeros(4);
        let test = composite();
        assert_eq!(test.check(&state(0, &zero, &zero)), StatusType::Unconverged);
        assert_eq!(test.check(&state(1, &zero, &zero)), StatusType::Converged);
    }

    #[test]
    fn one_group_blocks_convergence() {
        let r = DVector::from_vec(vec![0.0, 0.0, 1e-3, 0.0]);
        let zero = DVector::zeros(4);
        assert_eq!(composite().check(&state(2, &r, &zero)), StatusType::Unconverged);
        assert_eq!(composite().check(&state(5, &r, &zero)), StatusType::Failed);
    }

    #[test]
    fn nan_fails_immediately() {
        let r = DVector::from_vec(vec![f64::NAN, 0.0, 0.0, 0.0]);
        let zero = DVector::zeros(4);
        assert_eq!(composite().check(&state(0, &r, &zero)), StatusType::Failed);
    }

    #[test]
    fn scaled_l2_divides_by_sqrt_n() {
        let v = DVector::from_vec(vec![3.0, 4.0]);
        let n = partial_norm(&v, &[0, 1], ConvergenceMetric::L2Norm, ScaleType::Scaled);
        assert!((n - 5.0 / 2f64.sqrt()).abs() < 1e-14);
    }
}
