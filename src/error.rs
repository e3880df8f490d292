use thiserror::Error;

use crate::config::ConfigError;
use crate::numerics::solver::SolverError;

/// Fatal conditions raised by the coupling core.
///
/// Everything except a wrapped [`SolverError::NonConvergence`] indicates a
/// modelling or input error and aborts the run.
#[derive(Debug, Error)]
pub enum FsiError {
    #[error(
        "structure-fluid interface DOFs {dofs:?} carry fluid Dirichlet conditions; \
         in a fluid-split scheme the fluid (slave) interface must be free of Dirichlet \
         conditions, apply them on the structure (master) side instead"
    )]
    SlaveInterfaceDirichlet { dofs: Vec<usize> },

    #[error("no inner fluid equations: the fluid DOF map is empty")]
    NoInnerFluidDofs,

    #[error("matrix block {0} has not been built")]
    MissingBlock(&'static str),

    #[error("required state `{0}` is not available")]
    MissingState(&'static str),

    #[error("matrix operation `{op}` requires a {expected} matrix")]
    MatrixState { op: &'static str, expected: &'static str },

    #[error("global DOF {gid} is not part of the {map} map")]
    DofNotInMap { gid: usize, map: &'static str },

    #[error("map mismatch in {context}: expected {expected} entries, got {actual}")]
    MapMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("coupling setup failed: {0}")]
    Coupling(String),

    #[error("non-finite value encountered in {0}")]
    NonFinite(&'static str),

    #[error("invalid field parameter: {0}")]
    InvalidParameter(String),

    #[error(transparent)]
    Solver(#[from] SolverError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FsiError {
    /// True for outcomes the time loop may handle through its divergence policy.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FsiError::Solver(SolverError::NonConvergence { .. })
                | FsiError::Solver(SolverError::LinearSolveFailed)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_solver_failures_are_recoverable() {
        assert!(FsiError::Solver(SolverError::NonConvergence { iterations: 3 }).is_recoverable());
        assert!(!FsiError::NoInnerFluidDofs.is_recoverable());
        assert!(!FsiError::NonFinite("residual").is_recoverable());
    }

    #[test]
    fn dirichlet_conflict_names_dofs() {
        let msg = FsiError::SlaveInterfaceDirichlet { dofs: vec![4, 7] }.to_string();
        assert!(msg.contains("[4, 7]"));
        assert!(msg.contains("structure (master)"));
    }
}
