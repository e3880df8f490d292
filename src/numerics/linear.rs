use std::sync::Arc;

use kryst::solver::LinearSolver as _;
use kryst::utils::convergence::ConvergedReason;
use kryst::{
    parallel::{NoComm, UniverseComm},
    preconditioner::PcSide,
};
use nalgebra::{DMatrix, DVector};
use tracing::{debug, trace};

use super::solver::SolverError;
use crate::config::{LinearBlockSolver, MonolithicSolverParams};
use crate::linalg::BlockSparseMatrix;

/// Solves the assembled block system `A x = b`.
pub trait LinearSolver {
    fn solve(&self, a: &BlockSparseMatrix, b: &DVector<f64>) -> Result<DVector<f64>, SolverError>;
}

/// Dense LU on the merged matrix.
#[derive(Clone, Copy, Debug, Default)]
pub struct DirectSolver;

impl LinearSolver for DirectSolver {
    fn solve(&self, a: &BlockSparseMatrix, b: &DVector<f64>) -> Result<DVector<f64>, SolverError> {
        let dense: DMatrix<f64> = a.to_dense();
        dense.lu().solve(b).ok_or(SolverError::LinearSolveFailed)
    }
}

/// Jacobi row-scaled BiCGStab on the merged matrix.
#[derive(Clone, Copy, Debug)]
pub struct BiCgStab {
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for BiCgStab {
    fn default() -> Self {
        Self {
            tolerance: 1e-3,
            max_iterations: 1000,
        }
    }
}

impl LinearSolver for BiCgStab {
    fn solve(&self, a: &BlockSparseMatrix, b: &DVector<f64>) -> Result<DVector<f64>, SolverError> {
        let merged = a.merged().map_err(|_| SolverError::LinearSolveFailed)?;
        let n = b.len();
        let d: Vec<f64> = (0..n)
            .map(|i| {
                let gid = merged.row_map().gid(i);
                let diag = merged.get(gid, gid);
                if diag.abs() < 1e-12 { 1.0 } else { diag }
            })
            .collect();

        let (offsets, cols, values) = merged.csr_parts().map_err(|_| SolverError::LinearSolveFailed)?;
        let mut jacobian =
            kryst::matrix::sparse::CsrMatrix::from_csr(n, merged.domain_map().len(), offsets, cols, values);

        // Scale rows by the inverse diagonal
        for (row_idx, di) in d.iter().enumerate() {
            let scale = 1.0 / di;
            for val in jacobian.row_values_mut(row_idx).iter_mut() {
                *val *= scale;
            }
        }
        let op = kryst::matrix::op::CsrOp::new(Arc::new(jacobian));

        let mut bicgstab_solver =
            kryst::solver::bicgstab::BiCgStabSolver::new(self.tolerance, self.max_iterations);
        let mut workspace = kryst::context::ksp_context::Workspace::new(n);
        bicgstab_solver.setup_workspace(&mut workspace);

        let rhs = DVector::from_iterator(n, b.iter().zip(&d).map(|(bi, di)| bi / di));
        if !rhs.iter().all(|v| v.is_finite()) {
            return Err(SolverError::LinearSolveFailed);
        }
        let mut x = DVector::zeros(n);
        let stats = bicgstab_solver
            .solve(
                &op,
                None,
                rhs.as_slice(),
                x.as_mut_slice(),
                PcSide::Left,
                &UniverseComm::NoComm(NoComm {}),
                None,
                Some(&mut workspace),
            )
            .map_err(|e| {
                debug!(error = ?e, "BiCGStab failed");
                SolverError::LinearSolveFailed
            })?;

        match stats.reason {
            ConvergedReason::ConvergedRtol
            | ConvergedReason::ConvergedAtol
            | ConvergedReason::ConvergedHappyBreakdown => {
                trace!(
                    iterations = stats.iterations,
                    residual = stats.final_residual,
                    "BiCGStab converged"
                );
            }
            reason => {
                debug!(?reason, iterations = stats.iterations, "BiCGStab did not converge");
                return Err(SolverError::LinearSolveFailed);
            }
        }
        if !x.iter().all(|v| v.is_finite()) {
            return Err(SolverError::LinearSolveFailed);
        }
        Ok(x)
    }
}

/// Linear solver selected by the monolithic solver parameters.
pub fn from_params(params: &MonolithicSolverParams) -> Box<dyn LinearSolver> {
    match params.linear_block_solver {
        LinearBlockSolver::LinalgSolver => Box::new(DirectSolver),
        LinearBlockSolver::PreconditionedKrylov => Box::new(BiCgStab {
            tolerance: params.basetol,
            max_iterations: params.krylov_itemax,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::{DofMap, MultiMapExtractor};
    use approx::assert_relative_eq;

    fn system() -> BlockSparseMatrix {
        let ex = MultiMapExtractor::new(vec![DofMap::from_range(0..2), DofMap::from_range(2..4)]).unwrap();
        let mut m = BlockSparseMatrix::new(ex.clone(), ex);
        m.matrix_mut(0, 0).insert(0, 0, 4.0).unwrap();
        m.matrix_mut(0, 0).insert(0, 1, -1.0).unwrap();
        m.matrix_mut(0, 0).insert(1, 0, -1.0).unwrap();
        m.matrix_mut(0, 0).insert(1, 1, 4.0).unwrap();
        m.matrix_mut(0, 1).insert(1, 2, -1.0).unwrap();
        m.matrix_mut(1, 0).insert(2, 1, -2.0).unwrap();
        m.matrix_mut(1, 1).insert(2, 2, 5.0).unwrap();
        m.matrix_mut(1, 1).insert(3, 3, 3.0).unwrap();
        m.matrix_mut(1, 1).insert(3, 2, 1.0).unwrap();
        m.complete().unwrap();
        m
    }

    #[test]
    fn direct_and_krylov_agree() {
        let a = system();
        let b = DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0]);
        let direct = DirectSolver.solve(&a, &b).unwrap();
        assert_relative_eq!(a.apply(&direct).unwrap(), b.clone(), epsilon = 1e-12);

        let krylov = BiCgStab {
            tolerance: 1e-12,
            max_iterations: 100,
        }
        .solve(&a, &b)
        .unwrap();
        assert_relative_eq!(krylov, direct, epsilon = 1e-9);
    }

    #[test]
    fn krylov_iteration_limit_is_an_error() {
        let a = system();
        let b = DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0]);
        let capped = BiCgStab {
            tolerance: 1e-14,
            max_iterations: 1,
        };
        assert!(matches!(capped.solve(&a, &b), Err(SolverError::LinearSolveFailed)));

        let zero = BiCgStab::default().solve(&a, &DVector::zeros(4)).unwrap();
        assert_eq!(zero, DVector::zeros(4));
    }

    #[test]
    fn singular_system_fails() {
        let ex = MultiMapExtractor::new(vec![DofMap::from_range(0..2)]).unwrap();
        let mut m = BlockSparseMatrix::new(ex.clone(), ex);
        m.matrix_mut(0, 0).insert(0, 0, 1.0).unwrap();
        m.complete().unwrap();
        let b = DVector::from_vec(vec![1.0, 1.0]);
        assert!(matches!(DirectSolver.solve(&m, &b), Err(SolverError::LinearSolveFailed)));
    }
}
